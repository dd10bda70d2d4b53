//! Integration tests for HttpPullTransport
//!
//! Verifies status, transport and decode failures map to the right
//! `PullError` variants against a wiremock server.

use std::time::Duration;

use livesync_core::domain::{FetchDescriptor, PullError};
use livesync_core::ports::IPullTransport;
use livesync_transport::HttpPullTransport;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_fetch_returns_json_body() {
    let (_server, transport) = common::setup_pull_mock().await;

    let body = transport
        .fetch(&FetchDescriptor::new("/api/stats"))
        .await
        .expect("fetch failed");

    assert_eq!(body["cpu"], 12.5);
    assert_eq!(body["memory"], 2048);
}

#[tokio::test]
async fn test_non_2xx_maps_to_status() {
    let (_server, transport) = common::setup_pull_mock().await;

    let err = transport
        .fetch(&FetchDescriptor::new("/api/broken"))
        .await
        .unwrap_err();

    assert_eq!(err, PullError::Status { status: 500 });
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_invalid_json_maps_to_decode() {
    let (_server, transport) = common::setup_pull_mock().await;

    let err = transport
        .fetch(&FetchDescriptor::new("/api/garbage"))
        .await
        .unwrap_err();

    assert!(matches!(err, PullError::Decode(_)));
}

#[tokio::test]
async fn test_bearer_token_is_sent() {
    let (server, transport) = common::setup_pull_mock().await;

    let err = transport
        .fetch(&FetchDescriptor::new("/api/secure"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(401));

    let transport = transport.with_bearer_token(common::TOKEN);
    let body = transport
        .fetch(&FetchDescriptor::new(format!("{}/api/secure", server.uri())))
        .await
        .expect("authorized fetch failed");
    assert_eq!(body["ok"], true);
}

#[tokio::test]
async fn test_unreachable_host_maps_to_transport() {
    let transport = HttpPullTransport::new(Duration::from_secs(2))
        .unwrap()
        .with_base_url("http://127.0.0.1:9")
        .unwrap();

    let err = transport
        .fetch(&FetchDescriptor::new("/api/stats"))
        .await
        .unwrap_err();

    assert!(matches!(err, PullError::Transport(_)));
}

#[tokio::test]
async fn test_timeout_maps_to_transport() {
    let (server, _) = common::setup_pull_mock().await;
    Mock::given(method("GET"))
        .and(path("/api/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let transport = HttpPullTransport::new(Duration::from_millis(200))
        .unwrap()
        .with_base_url(&server.uri())
        .unwrap();

    let err = transport
        .fetch(&FetchDescriptor::new("/api/slow"))
        .await
        .unwrap_err();

    assert!(matches!(err, PullError::Transport(_)));
}
