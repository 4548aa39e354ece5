// tests/transport_retry.rs
//
// Retry classification against a local mock server.
//
// Covered:
// - [503, 503, 200] → 3 attempts, success
// - [404] → 1 attempt, permanent error
// - [503 x4] → 4 attempts, last classified error
// - connection refused → 1 attempt, not retried
// - cancellation during backoff returns promptly
// - cancellation during a stalled body read returns promptly

use std::time::{Duration, Instant};

use lesson_catalog::config::SourcesConfig;
use lesson_catalog::sources::{GitHubSource, LessonSource};
use lesson_catalog::transport::{send_with_retry, RetryPolicy, TransportError};
use lesson_catalog::Cancel;
use reqwest::{Client, StatusCode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(40),
    }
}

async fn attempts(server: &MockServer) -> usize {
    server.received_requests().await.unwrap_or_default().len()
}

fn doc_error(status: StatusCode, _body: &[u8]) -> TransportError {
    TransportError::upstream("doc", status)
}

#[tokio::test]
async fn transient_then_success_takes_three_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/doc"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/doc"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
        .mount(&server)
        .await;

    let client = Client::new();
    let url = format!("{}/doc", server.uri());
    let resp = send_with_retry(&Cancel::never(), &fast_policy(), || client.get(&url), None)
        .await
        .expect("third attempt succeeds");

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "hello");
    assert_eq!(attempts(&server).await, 3);
}

#[tokio::test]
async fn permanent_status_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string(" missing \n"))
        .mount(&server)
        .await;

    let client = Client::new();
    let url = format!("{}/doc", server.uri());
    let err = send_with_retry(&Cancel::never(), &fast_policy(), || client.get(&url), None)
        .await
        .expect_err("404 is permanent");

    assert_eq!(err.status(), Some(404));
    assert_eq!(err.to_string(), "request failed with status 404: missing");
    assert_eq!(attempts(&server).await, 1);
}

#[tokio::test]
async fn exhausted_retries_return_last_classified_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = Client::new();
    let url = format!("{}/doc", server.uri());
    let err = send_with_retry(
        &Cancel::never(),
        &fast_policy(),
        || client.get(&url),
        Some(doc_error),
    )
    .await
    .expect_err("budget exhausted");

    assert_eq!(err.to_string(), "doc returned status 503");
    assert_eq!(attempts(&server).await, 4);
}

#[tokio::test]
async fn rate_limited_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let client = Client::new();
    let url = format!("{}/doc", server.uri());
    let resp = send_with_retry(&Cancel::never(), &fast_policy(), || client.get(&url), None)
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(attempts(&server).await, 2);
}

#[tokio::test]
async fn connection_refused_is_not_retried() {
    // Grab a free port, then close it so nothing listens there.
    let port = {
        let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap().port()
    };
    let url = format!("http://127.0.0.1:{port}/doc");

    let client = Client::new();
    let mut built = 0;
    let err = send_with_retry(
        &Cancel::never(),
        &fast_policy(),
        || {
            built += 1;
            client.get(&url)
        },
        None,
    )
    .await
    .expect_err("nothing listening");

    assert!(matches!(err, TransportError::Request(_)), "{err:?}");
    assert_eq!(built, 1);
}

#[tokio::test]
async fn cancel_during_backoff_returns_promptly() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let slow = RetryPolicy {
        max_retries: 3,
        base_delay: Duration::from_secs(20),
        max_delay: Duration::from_secs(20),
    };
    let (trigger, cancel) = Cancel::pair();
    let client = Client::new();
    let url = format!("{}/doc", server.uri());

    let t0 = Instant::now();
    let call = tokio::spawn(async move {
        send_with_retry(&cancel, &slow, || client.get(&url), None).await
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    trigger.cancel();

    let err = call.await.unwrap().expect_err("cancelled");
    assert!(err.is_cancelled());
    assert!(t0.elapsed() < Duration::from_secs(5));
    assert_eq!(attempts(&server).await, 1);
}

#[tokio::test]
async fn already_cancelled_sends_nothing() {
    let server = MockServer::start().await;
    let (trigger, cancel) = Cancel::pair();
    trigger.cancel();

    let client = Client::new();
    let url = format!("{}/doc", server.uri());
    let err = send_with_retry(&cancel, &fast_policy(), || client.get(&url), None)
        .await
        .expect_err("cancelled up front");
    assert!(err.is_cancelled());
    assert_eq!(attempts(&server).await, 0);
}

/// Raw server that sends headers promising 1000 body bytes, writes a few, then
/// holds the connection open.
async fn stalled_body_server(status_line: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut sock, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 2048];
                let _ = sock.read(&mut buf).await;
                let head = format!("HTTP/1.1 {status_line}\r\nContent-Length: 1000\r\n\r\npartial");
                let _ = sock.write_all(head.as_bytes()).await;
                tokio::time::sleep(Duration::from_secs(3600)).await;
            });
        }
    });
    format!("http://{addr}/doc")
}

#[tokio::test]
async fn cancel_during_error_body_read_returns_promptly() {
    let url = stalled_body_server("503 Service Unavailable").await;
    let (trigger, cancel) = Cancel::pair();
    let client = Client::new();

    let call = tokio::spawn(async move {
        send_with_retry(&cancel, &fast_policy(), || client.get(&url), None).await
    });
    tokio::time::sleep(Duration::from_millis(200)).await;
    trigger.cancel();

    let err = tokio::time::timeout(Duration::from_secs(5), call)
        .await
        .expect("returned after cancel")
        .unwrap()
        .expect_err("cancelled");
    assert!(err.is_cancelled(), "{err:?}");
}

#[tokio::test]
async fn cancel_during_document_body_read_returns_promptly() {
    let url = stalled_body_server("200 OK").await;
    let cfg = SourcesConfig {
        primer_url: url.clone(),
        secret_knowledge_url: url,
        ..Default::default()
    };
    let src = GitHubSource::new(Client::new(), &cfg).with_retry_policy(fast_policy());
    let (trigger, cancel) = Cancel::pair();

    let call = tokio::spawn(async move { src.fetch(&cancel).await });
    tokio::time::sleep(Duration::from_millis(200)).await;
    trigger.cancel();

    let err = tokio::time::timeout(Duration::from_secs(5), call)
        .await
        .expect("returned after cancel")
        .unwrap()
        .expect_err("cancelled");
    assert!(format!("{err:#}").contains("request cancelled"), "{err:#}");
}
