//! Integration tests for the legacy quote client
//!
//! Each test stands up an in-process TCP fixture playing the legacy quote
//! server — responsive, silent, or gone — and drives the real client
//! against it with short timeouts.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use quote_manager::legacy::{LegacyError, LegacyQuoteClient, QuoteFetcher, RetryPolicy};

fn policy_ms(base: u64, backoff: u64, ceiling: u64) -> RetryPolicy {
    RetryPolicy {
        base_retry_timeout: Duration::from_millis(base),
        initial_backoff: Duration::from_millis(backoff),
        deadline_ceiling: Duration::from_millis(ceiling),
    }
}

/// Quote server that answers every connection, counting them.
async fn spawn_responsive_server(response: &'static str) -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&connections);
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut reader = BufReader::new(stream);
                let mut line = String::new();
                let _ = reader.read_line(&mut line).await;
                let mut stream = reader.into_inner();
                let _ = stream.write_all(response.as_bytes()).await;
            });
        }
    });
    (addr, connections)
}

/// Quote server that reads the request and then goes silent, except for
/// connections past `silent_connections`, which get a real response.
async fn spawn_stalling_server(
    silent_connections: usize,
    response: &'static str,
) -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&connections);
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::spawn(async move {
                let mut reader = BufReader::new(stream);
                let mut line = String::new();
                let _ = reader.read_line(&mut line).await;
                if n <= silent_connections {
                    // Hold the connection open past any client deadline.
                    tokio::time::sleep(Duration::from_secs(30)).await;
                } else {
                    let mut stream = reader.into_inner();
                    let _ = stream.write_all(response.as_bytes()).await;
                }
            });
        }
    });
    (addr, connections)
}

#[tokio::test]
async fn test_fetch_parses_and_stamps_the_transaction() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        // The request line carries only stock and user.
        assert_eq!(line, "ABC,u1\n");
        let mut stream = reader.into_inner();
        stream
            .write_all(b"ABC,100.00,u1,1708123456789\n")
            .await
            .unwrap();
    });

    let client = LegacyQuoteClient::new(addr, policy_ms(250, 250, 5_000));
    let quote = client.fetch("ABC", "u1", 42).await.unwrap();

    assert_eq!(quote.stock, "ABC");
    assert_eq!(quote.price, "100.00".parse().unwrap());
    assert_eq!(quote.user_id, "u1");
    assert_eq!(quote.timestamp.timestamp_millis(), 1708123456789);
    // The server never saw 42; the client stamped it on.
    assert_eq!(quote.transaction_id, 42);
}

#[tokio::test]
async fn test_retry_succeeds_on_the_third_attempt() {
    let (addr, connections) = spawn_stalling_server(2, "ABC,100.00,u1,1708123456789\n").await;

    let client = LegacyQuoteClient::new(addr, policy_ms(50, 50, 5_000));
    let started = Instant::now();
    let quote = client.fetch("ABC", "u1", 7).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(quote.transaction_id, 7);
    // A fresh connection per attempt, never a reused one.
    assert_eq!(connections.load(Ordering::SeqCst), 3);
    // Two full deadlines were waited out: (50+50)ms, then (50+100)ms.
    assert!(
        elapsed >= Duration::from_millis(250),
        "expected two timed-out deadlines, elapsed {:?}",
        elapsed
    );
}

#[tokio::test]
async fn test_unresponsive_server_aborts_at_the_ceiling() {
    let (addr, connections) = spawn_stalling_server(usize::MAX, "").await;

    // Deadlines 150ms and 250ms fit under the 300ms ceiling; the third
    // (450ms) would not, so the fetch dies after two attempts.
    let client = LegacyQuoteClient::new(addr, policy_ms(50, 100, 300));
    let err = client.fetch("ABC", "u1", 7).await.unwrap_err();

    match err {
        LegacyError::RetryCeiling {
            attempts,
            next_deadline,
            ceiling,
        } => {
            assert_eq!(attempts, 2);
            assert_eq!(next_deadline, Duration::from_millis(450));
            assert_eq!(ceiling, Duration::from_millis(300));
        }
        err => panic!("Expected RetryCeiling, got {:?}", err),
    }
    assert_eq!(connections.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unreachable_server_is_fatal_without_retry() {
    // Bind then drop to get a port nothing listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = LegacyQuoteClient::new(addr, policy_ms(50, 50, 5_000));
    let err = client.fetch("ABC", "u1", 7).await.unwrap_err();

    assert!(matches!(err, LegacyError::Io(_)));
}

#[tokio::test]
async fn test_server_hangup_before_data_is_fatal() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        drop(stream);
    });

    let client = LegacyQuoteClient::new(addr, policy_ms(250, 250, 5_000));
    let err = client.fetch("ABC", "u1", 7).await.unwrap_err();

    assert!(matches!(err, LegacyError::EmptyResponse));
}

#[tokio::test]
async fn test_garbage_response_never_becomes_a_quote() {
    let (addr, _) = spawn_responsive_server("totally-not-a-quote\n").await;

    let client = LegacyQuoteClient::new(addr, policy_ms(250, 250, 5_000));
    let err = client.fetch("ABC", "u1", 7).await.unwrap_err();

    assert!(matches!(err, LegacyError::Malformed(_)));
}
