//! URL scan route handler

use crate::{api_handler::*, middleware::ClientInfo, AppState};
use axum::{
    extract::{rejection::JsonRejection, State},
    response::Json,
};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use url_scan_core::ScanResult;
use uuid::Uuid;

/// POST /api/scan
///
/// Body: `{"url": "example.com"}`. Runs the reputation scan and the
/// registration lookup for the URL and returns the merged result.
#[instrument(skip_all, fields(client_ip = %client.ip, request_id))]
pub async fn scan_url_handler(
    State(state): State<Arc<AppState>>,
    ClientInfo(client): ClientInfo,
    body: Result<Json<ScanRequestBody>, JsonRejection>,
) -> ApiResult<ScanResult> {
    let request_id = Uuid::new_v4().to_string();
    tracing::Span::current().record("request_id", &request_id);

    let Json(body) = body.map_err(|rejection| ApiError::InternalError(rejection.body_text()))?;

    info!("Scan requested for {:?}", body.url);
    let start_time = std::time::Instant::now();

    let result = state
        .pipeline
        .scan(body.url.as_deref(), &client)
        .await
        .map_err(ApiError::from)?;

    debug!("Scan completed in {:?}", start_time.elapsed());
    info!(
        "Scan finished: {} -> threat_level={}, detections={}/{}",
        result.url, result.threat_level, result.positives, result.total
    );

    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use crate::{config::AppConfig, create_router, AppState};
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        Router,
    };
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;
    use url_scan_core::testing::{found_report, FakeUpstream, Reply};
    use url_scan_core::ScanPipeline;

    fn app_for(upstream: &FakeUpstream) -> Router {
        let mut config = AppConfig::default();
        config.reputation = upstream.reputation_config();
        config.registration = upstream.registration_config();
        config.notifier = upstream.notifier_config();
        app_with(config)
    }

    fn app_with(config: AppConfig) -> Router {
        let pipeline = ScanPipeline::new(config.scan_config()).unwrap();
        create_router(AppState {
            pipeline: Arc::new(pipeline),
            config: Arc::new(config),
        })
    }

    async fn post_scan(app: Router, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/api/scan")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .header(header::USER_AGENT, "router-test/1.0")
            .body(Body::from(body.to_string()))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_safe_url() {
        let upstream = FakeUpstream::builder().start().await;
        let (status, body) = post_scan(app_for(&upstream), r#"{"url": "example.com"}"#).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["url"], "https://example.com");
        assert_eq!(body["threatLevel"], "safe");
        assert_eq!(body["positives"], 0);
        assert_eq!(body["total"], 70);
        assert_eq!(body["registration"]["registrar"], "RESERVED-Internet Assigned Numbers Authority");
        assert_eq!(body["perEngineResults"]["EngineA"]["detected"], false);
        assert_eq!(upstream.submitted_urls(), vec!["https://example.com".to_string()]);
    }

    #[tokio::test]
    async fn test_malicious_and_suspicious_urls() {
        for (positives, expected) in [(12, "malicious"), (3, "suspicious")] {
            let upstream = FakeUpstream::builder()
                .reputation_report(Reply::json(found_report(positives, 70)))
                .start()
                .await;
            let (status, body) = post_scan(app_for(&upstream), r#"{"url": "http://bad.test"}"#).await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["url"], "http://bad.test");
            assert_eq!(body["threatLevel"], expected);
            assert_eq!(body["positives"], positives);
        }
    }

    #[tokio::test]
    async fn test_queued_report() {
        let upstream = FakeUpstream::builder()
            .reputation_report(Reply::json(json!({"response_code": 0})))
            .start()
            .await;
        let (status, body) = post_scan(app_for(&upstream), r#"{"url": "example.com"}"#).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["threatLevel"], "unknown");
        assert_eq!(body["positives"], 0);
        assert_eq!(body["total"], 0);
        assert!(body["details"].as_str().unwrap().contains("try again"));
    }

    #[tokio::test]
    async fn test_registration_providers_down() {
        let upstream = FakeUpstream::builder()
            .rdap_primary(Reply::status(503))
            .rdap_fallback(Reply::status(404))
            .start()
            .await;
        let (status, body) = post_scan(app_for(&upstream), r#"{"url": "example.com"}"#).await;

        assert_eq!(status, StatusCode::OK);
        let registration = &body["registration"];
        assert_eq!(registration["domain"], "example.com");
        for field in ["registrar", "organization", "country", "creationDate", "expirationDate"] {
            assert_eq!(registration[field], "Unknown", "field {}", field);
        }
        assert_eq!(registration["nameServers"], json!([]));
    }

    #[tokio::test]
    async fn test_missing_url() {
        let upstream = FakeUpstream::builder().start().await;
        let (status, body) = post_scan(app_for(&upstream), "{}").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "URL is required");
        assert_eq!(body["error_code"], "INVALID_INPUT");
        assert!(upstream.submitted_urls().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_url() {
        let upstream = FakeUpstream::builder().start().await;
        let (status, body) = post_scan(app_for(&upstream), r#"{"url": "not a url"}"#).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid URL format");
        assert!(upstream.submitted_urls().is_empty());
        assert!(upstream.rdap_primary_objects().is_empty());
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let upstream = FakeUpstream::builder().start().await;
        let mut config = AppConfig::default();
        config.reputation = upstream.reputation_config();
        config.reputation.api_key = None;
        config.registration = upstream.registration_config();

        let (status, body) = post_scan(app_with(config), r#"{"url": "example.com"}"#).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "VirusTotal API key not configured");
        assert_eq!(body["error_code"], "CONFIGURATION_ERROR");
        assert!(upstream.rdap_primary_objects().is_empty());
    }

    #[tokio::test]
    async fn test_reputation_failure() {
        let upstream = FakeUpstream::builder()
            .reputation_submit(Reply::status(403))
            .start()
            .await;
        let (status, body) = post_scan(app_for(&upstream), r#"{"url": "example.com"}"#).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to submit URL to VirusTotal");
        assert_eq!(body["error_code"], "UPSTREAM_ERROR");
    }

    #[tokio::test]
    async fn test_notifier_failure_does_not_change_response() {
        let healthy = FakeUpstream::builder().start().await;
        let (ok_status, mut ok_body) = post_scan(app_for(&healthy), r#"{"url": "example.com"}"#).await;

        let failing = FakeUpstream::builder()
            .notification(Reply::status(500))
            .start()
            .await;
        let (status, mut body) = post_scan(app_for(&failing), r#"{"url": "example.com"}"#).await;

        assert_eq!(status, ok_status);
        assert_eq!(failing.notifications().len(), 1);

        // scan dates differ between runs only through the clock
        ok_body["scanDate"] = Value::Null;
        body["scanDate"] = Value::Null;
        assert_eq!(body, ok_body);
    }

    #[tokio::test]
    async fn test_notification_carries_client_details() {
        let upstream = FakeUpstream::builder().start().await;
        let (status, _) = post_scan(app_for(&upstream), r#"{"url": "example.com"}"#).await;
        assert_eq!(status, StatusCode::OK);

        let notifications = upstream.notifications();
        assert_eq!(notifications.len(), 1);
        let text = notifications[0]["text"].as_str().unwrap();
        assert!(text.contains("🔗 IP: 203.0.113.9"));
        assert!(text.contains("🖥️ User Agent: router-test/1.0"));
        assert_eq!(notifications[0]["parse_mode"], "HTML");
    }

    #[tokio::test]
    async fn test_invalid_json_body() {
        let upstream = FakeUpstream::builder().start().await;
        let (status, body) = post_scan(app_for(&upstream), "{not json").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error_code"], "INTERNAL_ERROR");
        assert!(upstream.submitted_urls().is_empty());
    }

    #[tokio::test]
    async fn test_security_headers_present() {
        let upstream = FakeUpstream::builder().start().await;
        let request = Request::builder()
            .method("POST")
            .uri("/api/scan")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();

        let response = app_for(&upstream).oneshot(request).await.unwrap();
        let headers = response.headers();
        assert_eq!(headers["x-content-type-options"], "nosniff");
        assert_eq!(headers["x-frame-options"], "DENY");
        assert_eq!(headers["x-api-version"], env!("CARGO_PKG_VERSION"));
    }
}
