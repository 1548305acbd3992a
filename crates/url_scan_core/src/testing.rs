//! In-process fake of the external services, for tests
//!
//! [`FakeUpstream`] binds an axum server to `127.0.0.1:0` that answers the
//! reputation, RDAP and Telegram endpoints with scripted [`Reply`]s and
//! records every request it receives. The server stops when the value is
//! dropped.

use crate::{NotifierConfig, RegistrationConfig, ReputationConfig, ScanConfig};
use axum::{
    extract::{Form, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

/// A scripted HTTP response
#[derive(Debug, Clone)]
pub struct Reply {
    status: u16,
    body: String,
    content_type: &'static str,
    delay_ms: u64,
}

impl Reply {
    pub fn json(value: Value) -> Self {
        Self {
            status: 200,
            body: value.to_string(),
            content_type: "application/json",
            delay_ms: 0,
        }
    }

    /// An error status with a small JSON body
    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: json!({"error": "scripted failure"}).to_string(),
            content_type: "application/json",
            delay_ms: 0,
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
            content_type: "text/plain",
            delay_ms: 0,
        }
    }

    /// Hold the response back for `delay_ms` milliseconds
    pub fn delayed(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    async fn respond(self) -> Response {
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, [(header::CONTENT_TYPE, self.content_type)], self.body).into_response()
    }
}

/// Reputation report with response code 1 and two engines
pub fn found_report(positives: u32, total: u32) -> Value {
    let detected = positives > 0;
    let label = if detected { "malicious site" } else { "clean site" };
    json!({
        "response_code": 1,
        "verbose_msg": "Scan finished, scan information embedded in this object",
        "resource": "http://bad.test",
        "scan_id": "abc123-1705314645",
        "scan_date": "2024-01-15 10:30:45",
        "permalink": "https://www.virustotal.com/url/abc123/analysis/1705314645/",
        "positives": positives,
        "total": total,
        "scans": {
            "EngineA": {"detected": detected, "version": "1.2", "result": label, "update": "20240115"},
            "EngineB": {"detected": false, "version": null, "result": "clean site", "update": "20240114"}
        }
    })
}

/// A fully populated RDAP domain object
pub fn sample_rdap_document() -> Value {
    json!({
        "objectClassName": "domain",
        "ldhName": "EXAMPLE.COM",
        "entities": [
            {
                "objectClassName": "entity",
                "roles": ["registrar"],
                "vcardArray": ["vcard", [
                    ["version", {}, "text", "4.0"],
                    ["fn", {}, "text", "RESERVED-Internet Assigned Numbers Authority"],
                    ["org", {}, "text", "RESERVED-Internet Assigned Numbers Authority"]
                ]]
            },
            {
                "objectClassName": "entity",
                "roles": ["registrant"],
                "vcardArray": ["vcard", [
                    ["version", {}, "text", "4.0"],
                    ["org", {}, "text", "Example Holdings"],
                    ["adr", {}, "text", ["", "", "123 Main St", "Los Angeles", "CA", "90001", "United States"]]
                ]]
            }
        ],
        "events": [
            {"eventAction": "registration", "eventDate": "1995-08-14T04:00:00Z"},
            {"eventAction": "expiration", "eventDate": "2025-08-13T04:00:00Z"},
            {"eventAction": "last changed", "eventDate": "2024-08-14T07:01:34Z"}
        ],
        "nameservers": [
            {"objectClassName": "nameserver", "ldhName": "A.IANA-SERVERS.NET"},
            {"objectClassName": "nameserver", "ldhName": "B.IANA-SERVERS.NET"}
        ],
        "status": ["client delete prohibited", "client transfer prohibited"]
    })
}

/// External endpoints served by [`FakeUpstream`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    ReputationSubmit,
    ReputationReport,
    RdapPrimary,
    RdapFallback,
    Notification,
}

/// Headers of one received request that matter for interop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenHeaders {
    pub accept: Option<String>,
    pub user_agent: Option<String>,
}

impl SeenHeaders {
    fn from_headers(headers: &HeaderMap) -> Self {
        let text = |name: header::HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Self {
            accept: text(header::ACCEPT),
            user_agent: text(header::USER_AGENT),
        }
    }
}

#[derive(Debug, Clone)]
struct Replies {
    submit: Reply,
    report: Reply,
    rdap_primary: Reply,
    rdap_fallback: Reply,
    notification: Reply,
}

#[derive(Debug, Default)]
struct Recorded {
    submitted_urls: Vec<String>,
    report_queries: Vec<HashMap<String, String>>,
    rdap_primary_objects: Vec<String>,
    rdap_fallback_domains: Vec<String>,
    notifications: Vec<Value>,
    headers: HashMap<Endpoint, Vec<SeenHeaders>>,
}

#[derive(Debug)]
struct Shared {
    replies: Replies,
    recorded: Mutex<Recorded>,
}

impl Shared {
    fn recorded(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record_headers(&self, endpoint: Endpoint, headers: &HeaderMap) {
        self.recorded()
            .headers
            .entry(endpoint)
            .or_default()
            .push(SeenHeaders::from_headers(headers));
    }
}

pub struct FakeUpstreamBuilder {
    replies: Replies,
}

impl FakeUpstreamBuilder {
    pub fn reputation_submit(mut self, reply: Reply) -> Self {
        self.replies.submit = reply;
        self
    }

    pub fn reputation_report(mut self, reply: Reply) -> Self {
        self.replies.report = reply;
        self
    }

    pub fn rdap_primary(mut self, reply: Reply) -> Self {
        self.replies.rdap_primary = reply;
        self
    }

    pub fn rdap_fallback(mut self, reply: Reply) -> Self {
        self.replies.rdap_fallback = reply;
        self
    }

    pub fn notification(mut self, reply: Reply) -> Self {
        self.replies.notification = reply;
        self
    }

    pub async fn start(self) -> FakeUpstream {
        let shared = Arc::new(Shared {
            replies: self.replies,
            recorded: Mutex::new(Recorded::default()),
        });

        let app = Router::new()
            .route("/vtapi/v2/url/scan", post(submit_handler))
            .route("/vtapi/v2/url/report", get(report_handler))
            .route("/rdap/primary", get(rdap_primary_handler))
            .route("/rdap/fallback/domain/{domain}", get(rdap_fallback_handler))
            .route(
                &format!("/bot{}/sendMessage", FakeUpstream::BOT_TOKEN),
                post(notification_handler),
            )
            .with_state(Arc::clone(&shared));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind fake upstream");
        let addr = listener.local_addr().expect("fake upstream has no address");
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        FakeUpstream {
            base_url: format!("http://{}", addr),
            shared,
            task,
        }
    }
}

/// Running fake of every external service
pub struct FakeUpstream {
    base_url: String,
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl FakeUpstream {
    pub const API_KEY: &'static str = "test-api-key";
    pub const BOT_TOKEN: &'static str = "test-bot-token";
    pub const CHAT_ID: &'static str = "424242";

    /// Builder whose defaults describe a healthy world: the URL is found
    /// clean (0/70), the primary RDAP provider answers with
    /// [`sample_rdap_document`] and Telegram accepts messages.
    pub fn builder() -> FakeUpstreamBuilder {
        let sample = Reply::json(sample_rdap_document());
        FakeUpstreamBuilder {
            replies: Replies {
                submit: Reply::json(json!({
                    "response_code": 1,
                    "verbose_msg": "Scan request successfully queued, come back later for the report"
                })),
                report: Reply::json(found_report(0, 70)),
                rdap_primary: sample.clone(),
                rdap_fallback: sample,
                notification: Reply::json(json!({"ok": true})),
            },
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Reputation settings pointing here, with no grace period
    pub fn reputation_config(&self) -> ReputationConfig {
        ReputationConfig {
            base_url: self.base_url.clone(),
            api_key: Some(Self::API_KEY.to_string()),
            report_delay_ms: 0,
            submit_timeout_ms: 2_000,
            report_timeout_ms: 2_000,
        }
    }

    pub fn registration_config(&self) -> RegistrationConfig {
        RegistrationConfig {
            primary_url: format!("{}/rdap/primary", self.base_url),
            primary_timeout_ms: 2_000,
            fallback_base_url: format!("{}/rdap/fallback", self.base_url),
            fallback_timeout_ms: 2_000,
        }
    }

    pub fn notifier_config(&self) -> NotifierConfig {
        NotifierConfig {
            api_base_url: self.base_url.clone(),
            bot_token: Some(Self::BOT_TOKEN.to_string()),
            chat_id: Some(Self::CHAT_ID.to_string()),
            timeout_ms: 2_000,
            detach: false,
        }
    }

    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            reputation: self.reputation_config(),
            registration: self.registration_config(),
            notifier: self.notifier_config(),
            user_agent: "url-scanner-tests".to_string(),
        }
    }

    pub fn submitted_urls(&self) -> Vec<String> {
        self.shared.recorded().submitted_urls.clone()
    }

    pub fn report_queries(&self) -> Vec<HashMap<String, String>> {
        self.shared.recorded().report_queries.clone()
    }

    pub fn rdap_primary_objects(&self) -> Vec<String> {
        self.shared.recorded().rdap_primary_objects.clone()
    }

    pub fn rdap_fallback_domains(&self) -> Vec<String> {
        self.shared.recorded().rdap_fallback_domains.clone()
    }

    pub fn notifications(&self) -> Vec<Value> {
        self.shared.recorded().notifications.clone()
    }

    /// Headers of every request received on `endpoint`, in arrival order
    pub fn headers_seen(&self, endpoint: Endpoint) -> Vec<SeenHeaders> {
        self.shared
            .recorded()
            .headers
            .get(&endpoint)
            .cloned()
            .unwrap_or_default()
    }
}

impl Drop for FakeUpstream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn submit_handler(
    State(shared): State<Arc<Shared>>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    shared.record_headers(Endpoint::ReputationSubmit, &headers);
    if form.get("apikey").map(String::as_str) == Some(FakeUpstream::API_KEY) {
        if let Some(url) = form.get("url") {
            shared.recorded().submitted_urls.push(url.clone());
        }
    }
    shared.replies.submit.clone().respond().await
}

async fn report_handler(
    State(shared): State<Arc<Shared>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    shared.record_headers(Endpoint::ReputationReport, &headers);
    shared.recorded().report_queries.push(query);
    shared.replies.report.clone().respond().await
}

async fn rdap_primary_handler(
    State(shared): State<Arc<Shared>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    shared.record_headers(Endpoint::RdapPrimary, &headers);
    if query.get("type").map(String::as_str) == Some("domain") {
        if let Some(object) = query.get("object") {
            shared.recorded().rdap_primary_objects.push(object.clone());
        }
    }
    shared.replies.rdap_primary.clone().respond().await
}

async fn rdap_fallback_handler(
    State(shared): State<Arc<Shared>>,
    headers: HeaderMap,
    Path(domain): Path<String>,
) -> Response {
    shared.record_headers(Endpoint::RdapFallback, &headers);
    shared.recorded().rdap_fallback_domains.push(domain);
    shared.replies.rdap_fallback.clone().respond().await
}

async fn notification_handler(
    State(shared): State<Arc<Shared>>,
    headers: HeaderMap,
    Json(message): Json<Value>,
) -> Response {
    shared.record_headers(Endpoint::Notification, &headers);
    shared.recorded().notifications.push(message);
    shared.replies.notification.clone().respond().await
}
