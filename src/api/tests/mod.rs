use super::*;
use crate::pipeline::test_helpers::{
    RecordingAnalyzer, RecordingNotifier, create_test_pulse, wait_for_job,
};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::time::Duration;
use tower::ServiceExt;


const BOUNDARY: &str = "----LogPulseBoundary7MA4YWxkTrZu0gW";

/// One part of a hand-built multipart body
enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                        .as_bytes(),
                );
            }
            Part::File(name, filename, content) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(content);
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/log/file")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Router over a test instance with recording collaborators
struct TestApp {
    router: Router,
    pulse: LogPulse,
    analyzer: Arc<RecordingAnalyzer>,
    notifier: Arc<RecordingNotifier>,
    _dir: tempfile::TempDir,
}

impl TestApp {
    async fn new() -> Self {
        Self::with_analyzer(Arc::new(RecordingAnalyzer::default())).await
    }

    async fn with_analyzer(analyzer: Arc<RecordingAnalyzer>) -> Self {
        let notifier = Arc::new(RecordingNotifier::default());
        let (pulse, dir) = create_test_pulse(analyzer.clone(), notifier.clone()).await;
        let router = create_router(Arc::new(pulse.clone()), pulse.config.clone());
        Self {
            router,
            pulse,
            analyzer,
            notifier,
            _dir: dir,
        }
    }

    async fn send(&self, request: Request<Body>) -> axum::response::Response {
        self.router.clone().oneshot(request).await.unwrap()
    }
}

#[tokio::test]
async fn test_api_server_spawns() {
    let app = TestApp::new().await;

    let mut config = app.pulse.config().clone();
    config.server.api.bind_address = "127.0.0.1:0".parse().unwrap();
    let config = Arc::new(config);

    let api_handle = tokio::spawn({
        let pulse = Arc::new(app.pulse.clone());
        let config = config.clone();
        async move { start_api_server(pulse, config).await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!api_handle.is_finished(), "server should still be serving");
    api_handle.abort();
}

#[tokio::test]
async fn test_cors_enabled() {
    let app = TestApp::new().await;

    let mut config = app.pulse.config().clone();
    config.server.api.cors_enabled = true;
    config.server.api.cors_origins = vec!["*".to_string()];
    let router = create_router(Arc::new(app.pulse.clone()), Arc::new(config));

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin"),
        "CORS header should be present when CORS is enabled"
    );
}

#[tokio::test]
async fn test_cors_disabled() {
    let app = TestApp::new().await;

    let mut config = app.pulse.config().clone();
    config.server.api.cors_enabled = false;
    let router = create_router(Arc::new(app.pulse.clone()), Arc::new(config));

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert!(
        !response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[test]
fn test_cors_layer_specific_origins() {
    // Builds without panicking for a mix of valid and invalid origins
    let _layer = build_cors_layer(&[
        "http://localhost:3000".to_string(),
        "not a header value\n".to_string(),
    ]);
}
