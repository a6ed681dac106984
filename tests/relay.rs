mod common;

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use common::*;

const RESPONSE: &str = "HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello";
const SETTLE: Duration = Duration::from_secs(5);

#[tokio::test(flavor = "multi_thread")]
async fn relays_request_and_serves_repeat_get_from_cache() {
    let backend = start_mock_backend(RESPONSE, Duration::ZERO).await;
    let proxy = start_proxy(&proxy_config(&[backend.addr]));

    let first = bounded(exchange(proxy.addr, b"GET /index HTTP/1.1\r\n\r\n")).await.unwrap();
    assert_eq!(first, RESPONSE.as_bytes());
    assert_eq!(backend.requests(), 1);

    let second = bounded(exchange(proxy.addr, b"GET /index HTTP/1.1\r\n\r\n")).await.unwrap();
    assert_eq!(second, RESPONSE.as_bytes());
    assert_eq!(backend.requests(), 1);
    assert_eq!(proxy.state.cache.len(), 1);

    assert!(wait_for(SETTLE, || proxy.active() == vec![0]).await);
    proxy.stop().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn distinct_requests_are_cached_separately() {
    let backend = start_mock_backend(RESPONSE, Duration::ZERO).await;
    let proxy = start_proxy(&proxy_config(&[backend.addr]));

    bounded(exchange(proxy.addr, b"GET /a")).await.unwrap();
    bounded(exchange(proxy.addr, b"GET /b")).await.unwrap();
    assert_eq!(backend.requests(), 2);
    assert_eq!(proxy.state.cache.len(), 2);

    proxy.stop().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn full_buffer_response_is_served_identically_on_repeat() {
    let body: &'static str = "x".repeat(4096).leak();
    let backend = start_mock_backend(body, Duration::ZERO).await;
    let proxy = start_proxy(&proxy_config(&[backend.addr]));

    let first = bounded(exchange(proxy.addr, b"GET /big")).await.unwrap();
    let second = bounded(exchange(proxy.addr, b"GET /big")).await.unwrap();
    assert!(!first.is_empty());
    assert_eq!(first, second);

    proxy.stop().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn long_requests_sharing_a_prefix_are_not_confused() {
    let backend = start_mock_backend(RESPONSE, Duration::ZERO).await;
    let proxy = start_proxy(&proxy_config(&[backend.addr]));

    let mut base = b"GET /account HTTP/1.1\r\n".to_vec();
    base.resize(280, b'h');
    let mut one = base.clone();
    let mut two = base;
    one.extend_from_slice(b"\r\nCookie: user=one\r\n\r\n");
    two.extend_from_slice(b"\r\nCookie: user=two\r\n\r\n");

    bounded(exchange(proxy.addr, &one)).await.unwrap();
    bounded(exchange(proxy.addr, &two)).await.unwrap();
    assert_eq!(backend.requests(), 2);
    assert!(proxy.state.cache.is_empty());

    proxy.stop().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn non_get_requests_bypass_cache() {
    let backend = start_mock_backend(RESPONSE, Duration::ZERO).await;
    let proxy = start_proxy(&proxy_config(&[backend.addr]));

    for _ in 0..2 {
        let response = bounded(exchange(proxy.addr, b"POST /submit HTTP/1.1\r\n\r\n")).await.unwrap();
        assert_eq!(response, RESPONSE.as_bytes());
    }
    assert_eq!(backend.requests(), 2);
    assert!(proxy.state.cache.is_empty());

    proxy.stop().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn disabled_cache_forwards_every_request() {
    let backend = start_mock_backend(RESPONSE, Duration::ZERO).await;
    let mut config = proxy_config(&[backend.addr]);
    config.cache.enabled = false;
    let proxy = start_proxy(&config);

    for _ in 0..2 {
        bounded(exchange(proxy.addr, b"GET /")).await.unwrap();
    }
    assert_eq!(backend.requests(), 2);
    assert!(proxy.state.cache.is_empty());

    proxy.stop().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn expired_entries_are_refetched() {
    let backend = start_mock_backend(RESPONSE, Duration::ZERO).await;
    let mut config = proxy_config(&[backend.addr]);
    config.cache.ttl_secs = 1;
    let proxy = start_proxy(&config);

    bounded(exchange(proxy.addr, b"GET /")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;
    bounded(exchange(proxy.addr, b"GET /")).await.unwrap();
    assert_eq!(backend.requests(), 2);

    proxy.stop().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn clients_spread_across_least_loaded_backends() {
    let mut backends = Vec::new();
    for _ in 0..3 {
        backends.push(start_mock_backend(RESPONSE, Duration::from_millis(300)).await);
    }
    let addrs: Vec<_> = backends.iter().map(|b| b.addr).collect();
    let mut config = proxy_config(&addrs);
    config.cache.enabled = false;
    let proxy = start_proxy(&config);

    let mut clients = Vec::new();
    for i in 1..=3 {
        let addr = proxy.addr;
        clients.push(tokio::spawn(async move { exchange(addr, b"POST /work").await }));
        assert!(wait_for(SETTLE, || proxy.active().iter().sum::<usize>() == i).await);
    }
    assert_eq!(proxy.active(), vec![1, 1, 1]);

    for client in clients {
        let response = bounded(client).await.unwrap().unwrap();
        assert_eq!(response, RESPONSE.as_bytes());
    }
    for backend in &backends {
        assert_eq!(backend.requests(), 1);
    }
    assert!(wait_for(SETTLE, || proxy.active() == vec![0, 0, 0]).await);

    proxy.stop().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_backend_does_not_disturb_other_sessions() {
    let slow = start_mock_backend(RESPONSE, Duration::from_millis(300)).await;
    let mut config = proxy_config(&[slow.addr, closed_addr()]);
    config.cache.enabled = false;
    let proxy = start_proxy(&config);

    let addr = proxy.addr;
    let healthy = tokio::spawn(async move { exchange(addr, b"GET /slow").await });
    assert!(wait_for(SETTLE, || proxy.active() == vec![1, 0]).await);

    // Second client lands on the dead backend and is closed without a reply.
    let doomed = bounded(exchange(proxy.addr, b"GET /dead")).await.unwrap_or_default();
    assert!(doomed.is_empty());
    assert_eq!(proxy.active(), vec![1, 0]);

    let response = bounded(healthy).await.unwrap().unwrap();
    assert_eq!(response, RESPONSE.as_bytes());
    assert!(wait_for(SETTLE, || proxy.active() == vec![0, 0]).await);

    proxy.stop().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn silent_client_holds_reservation_until_disconnect() {
    let backend = start_mock_backend(RESPONSE, Duration::ZERO).await;
    let proxy = start_proxy(&proxy_config(&[backend.addr]));

    let client = TcpStream::connect(proxy.addr).await.unwrap();
    assert!(wait_for(SETTLE, || proxy.active() == vec![1]).await);

    // No idle timeout: the reservation stays while the client says nothing.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(proxy.active(), vec![1]);

    drop(client);
    assert!(wait_for(SETTLE, || proxy.active() == vec![0]).await);
    assert_eq!(backend.requests(), 0);

    proxy.stop().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn client_hangup_while_backend_is_silent_releases_reservation() {
    let backend = start_mock_backend(RESPONSE, Duration::from_secs(30)).await;
    let proxy = start_proxy(&proxy_config(&[backend.addr]));

    let mut client = TcpStream::connect(proxy.addr).await.unwrap();
    client.write_all(b"POST /slow").await.unwrap();
    assert!(wait_for(SETTLE, || backend.requests() == 1).await);
    assert_eq!(proxy.active(), vec![1]);

    drop(client);
    assert!(wait_for(Duration::from_secs(2), || proxy.active() == vec![0]).await);

    proxy.stop().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_tears_down_live_sessions() {
    let backend = start_mock_backend(RESPONSE, Duration::ZERO).await;
    let proxy = start_proxy(&proxy_config(&[backend.addr]));

    let mut client = TcpStream::connect(proxy.addr).await.unwrap();
    assert!(wait_for(SETTLE, || proxy.active() == vec![1]).await);

    let state = proxy.state.clone();
    tokio::task::spawn_blocking(move || proxy.stop()).await.unwrap().unwrap();
    assert_eq!(state.selector.active_counts(), vec![0]);

    let mut buf = Vec::new();
    let read = bounded(client.read_to_end(&mut buf)).await;
    assert!(read.is_err() || buf.is_empty());
}
