//! Cache entries and their expiry.

use std::time::{Duration, Instant};

/// Longest key stored, in bytes. Longer requests are never cached.
pub const MAX_KEY_LEN: usize = 255;

/// Longest value stored, in bytes. Longer responses are never cached.
pub const MAX_VALUE_LEN: usize = 4095;

/// A stored backend response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    key: Vec<u8>,
    value: Vec<u8>,
    /// `None` means the entry never expires.
    expire_at: Option<Instant>,
}

impl CacheEntry {
    /// Build an entry from bounded key and value bytes.
    ///
    /// A zero `ttl` never expires. Returns `None` if either side exceeds its
    /// bound or the buffers cannot be allocated.
    pub fn try_new(key: &[u8], value: &[u8], ttl: Duration, now: Instant) -> Option<Self> {
        let expire_at = if ttl.is_zero() {
            None
        } else {
            // An unrepresentable deadline is as good as never.
            now.checked_add(ttl)
        };

        if !fits(key, value) {
            return None;
        }

        Some(Self {
            key: try_copy(key)?,
            value: try_copy(value)?,
            expire_at,
        })
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn expire_at(&self) -> Option<Instant> {
        self.expire_at
    }

    /// Whether the entry has a deadline at or before `now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expire_at, Some(at) if at <= now)
    }

    /// Exact byte comparison.
    pub fn matches(&self, key: &[u8]) -> bool {
        self.key == key
    }
}

/// Whether a key/value pair is small enough to be stored whole.
pub fn fits(key: &[u8], value: &[u8]) -> bool {
    key.len() <= MAX_KEY_LEN && value.len() <= MAX_VALUE_LEN
}

fn try_copy(bytes: &[u8]) -> Option<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(bytes.len()).ok()?;
    buf.extend_from_slice(bytes);
    Some(buf)
}
