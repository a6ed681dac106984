//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use lc_proxy::config::{BackendConfig, ProxyConfig};
use lc_proxy::lifecycle::startup;
use lc_proxy::{ProxyState, Shutdown};

/// A mock backend: reads one request, waits `delay`, writes a fixed
/// response and closes.
pub struct MockBackend {
    pub addr: SocketAddr,
    requests: Arc<AtomicUsize>,
}

impl MockBackend {
    /// Connections that delivered at least one byte.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

pub async fn start_mock_backend(response: &'static str, delay: Duration) -> MockBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(AtomicUsize::new(0));
    let counter = requests.clone();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let counter = counter.clone();
                    tokio::spawn(async move {
                        let mut buf = [0u8; 4096];
                        match socket.read(&mut buf).await {
                            Ok(n) if n > 0 => {
                                counter.fetch_add(1, Ordering::SeqCst);
                            }
                            _ => return,
                        }
                        tokio::time::sleep(delay).await;
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    MockBackend { addr, requests }
}

/// An address nothing listens on.
pub fn closed_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// A proxy event loop running on its own thread.
pub struct ProxyHandle {
    pub addr: SocketAddr,
    pub state: ProxyState,
    shutdown: Shutdown,
    thread: JoinHandle<io::Result<()>>,
}

impl ProxyHandle {
    /// Active reservation count per backend.
    pub fn active(&self) -> Vec<usize> {
        self.state.selector.active_counts()
    }

    /// Trigger shutdown and wait for the loop to return.
    pub fn stop(self) -> io::Result<()> {
        self.shutdown.trigger();
        self.thread.join().expect("event loop thread panicked")
    }
}

pub fn proxy_config(backends: &[SocketAddr]) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.backends = backends
        .iter()
        .enumerate()
        .map(|(i, addr)| BackendConfig::new(format!("backend-{}", i), addr.ip().to_string(), addr.port()))
        .collect();
    config
}

pub fn start_proxy(config: &ProxyConfig) -> ProxyHandle {
    let (mut event_loop, state) = startup::build(config).unwrap();
    let addr = event_loop.local_addr().unwrap();
    let shutdown = event_loop.shutdown_handle();
    let thread = std::thread::spawn(move || event_loop.run());

    ProxyHandle {
        addr,
        state,
        shutdown,
        thread,
    }
}

/// Send `request` and read until the proxy closes the connection.
pub async fn exchange(addr: SocketAddr, request: &[u8]) -> io::Result<Vec<u8>> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(request).await?;
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await?;
    Ok(response)
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_for<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Run `fut` with a generous upper bound so a hung proxy fails the test.
pub async fn bounded<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(10), fut)
        .await
        .expect("operation timed out")
}
