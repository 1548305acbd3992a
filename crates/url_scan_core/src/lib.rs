//! # url_scan_core
//!
//! Orchestration core for scanning user-submitted URLs against a third-party
//! reputation service and enriching the verdict with domain registration data.
//!
//! ## Features
//!
//! - **URL validation** with implicit `https://` normalization
//! - **Reputation lookup** (submit, wait, fetch report) with per-call timeouts
//! - **Registration data** over RDAP with a registry fallback and an
//!   all-`Unknown` placeholder when no provider answers
//! - **Threat classification** from the engine detection ratio
//! - **Best-effort notifications** to a Telegram chat
//!
//! ## Example
//!
//! ```rust,no_run
//! use url_scan_core::{ClientContext, ScanConfig, ScanPipeline};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = ScanConfig::default();
//!     config.reputation.api_key = Some("my-api-key".to_string());
//!     let pipeline = ScanPipeline::new(config)?;
//!
//!     let client = ClientContext::new("203.0.113.7", "curl/8.0");
//!     let result = pipeline.scan(Some("example.com"), &client).await?;
//!     println!("{} -> {:?}", result.url, result.threat_level);
//!
//!     Ok(())
//! }
//! ```

pub mod dates;
pub mod notifier;
pub mod registration;
pub mod reputation;
pub mod scan_pipeline;
pub mod validation;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Literal used for every registration field no provider could supply
pub const UNKNOWN: &str = "Unknown";

/// Deserialize an optional credential that config sources may have typed as
/// a number (Telegram chat ids are numeric, API keys can be all digits).
fn credential<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Unsigned(u64),
        Signed(i64),
        Float(f64),
    }

    let raw = Option::<Raw>::deserialize(deserializer)?;
    Ok(raw.map(|value| match value {
        Raw::Text(text) => text,
        Raw::Unsigned(n) => n.to_string(),
        Raw::Signed(n) => n.to_string(),
        Raw::Float(n) => n.to_string(),
    }))
}

/// Reputation service (VirusTotal v2) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReputationConfig {
    /// Base URL of the reputation service
    pub base_url: String,
    /// API key; scans are refused when absent
    #[serde(deserialize_with = "credential")]
    pub api_key: Option<String>,
    /// Grace period between submitting a URL and fetching its report
    pub report_delay_ms: u64,
    /// Timeout for the submit call
    pub submit_timeout_ms: u64,
    /// Timeout for the report call
    pub report_timeout_ms: u64,
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.virustotal.com".to_string(),
            api_key: None,
            report_delay_ms: 3_000,
            submit_timeout_ms: 10_000,
            report_timeout_ms: 10_000,
        }
    }
}

/// Registration-data (RDAP) lookup settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Public aggregator queried with `?type=domain&object=<host>`
    pub primary_url: String,
    pub primary_timeout_ms: u64,
    /// Registry endpoint queried as `{base}/domain/<host>`
    pub fallback_base_url: String,
    pub fallback_timeout_ms: u64,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            primary_url: "https://client.rdap.org/".to_string(),
            primary_timeout_ms: 15_000,
            fallback_base_url: "https://rdap.verisign.com/com/v1".to_string(),
            fallback_timeout_ms: 10_000,
        }
    }
}

/// Telegram notification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    pub api_base_url: String,
    /// Bot token; notifications are disabled when absent
    #[serde(deserialize_with = "credential")]
    pub bot_token: Option<String>,
    /// Target chat or user id; notifications are disabled when absent
    #[serde(deserialize_with = "credential")]
    pub chat_id: Option<String>,
    pub timeout_ms: u64,
    /// Send notifications on a background task instead of awaiting them
    pub detach: bool,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.telegram.org".to_string(),
            bot_token: None,
            chat_id: None,
            timeout_ms: 10_000,
            detach: false,
        }
    }
}

/// Configuration for the scan pipeline
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub reputation: ReputationConfig,
    pub registration: RegistrationConfig,
    pub notifier: NotifierConfig,
    /// User-Agent sent on every outbound request
    pub user_agent: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            reputation: ReputationConfig::default(),
            registration: RegistrationConfig::default(),
            notifier: NotifierConfig::default(),
            user_agent: Self::default_user_agent(),
        }
    }
}

impl ScanConfig {
    pub fn default_user_agent() -> String {
        format!("url-scanner/{}", env!("CARGO_PKG_VERSION"))
    }
}

/// Four-way verdict derived from the detection ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatLevel {
    Unknown,
    Safe,
    Suspicious,
    Malicious,
}

impl ThreatLevel {
    /// Ratio at or above which a URL is considered malicious
    pub const MALICIOUS_RATIO: f64 = 0.1;

    /// Classify a `positives / total` detection ratio.
    ///
    /// `total == 0` means no engine looked at the URL, which is `Unknown`
    /// rather than `Safe`.
    pub fn from_detections(positives: u32, total: u32) -> Self {
        if total == 0 {
            return ThreatLevel::Unknown;
        }

        let ratio = f64::from(positives) / f64::from(total);
        if ratio == 0.0 {
            ThreatLevel::Safe
        } else if ratio < Self::MALICIOUS_RATIO {
            ThreatLevel::Suspicious
        } else {
            ThreatLevel::Malicious
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatLevel::Unknown => "unknown",
            ThreatLevel::Safe => "safe",
            ThreatLevel::Suspicious => "suspicious",
            ThreatLevel::Malicious => "malicious",
        }
    }
}

impl std::fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict of a single scanning engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineResult {
    pub detected: bool,
    pub version: Option<String>,
    pub result_label: Option<String>,
    pub update_date: Option<String>,
}

/// Domain registration metadata
///
/// Scalar fields hold [`UNKNOWN`] when no provider supplied them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRecord {
    pub domain: String,
    pub registrar: String,
    pub organization: String,
    pub country: String,
    pub creation_date: String,
    pub expiration_date: String,
    pub name_servers: Vec<String>,
    pub status_codes: Vec<String>,
}

impl RegistrationRecord {
    /// Record returned when neither lookup provider could be used
    pub fn placeholder(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            registrar: UNKNOWN.to_string(),
            organization: UNKNOWN.to_string(),
            country: UNKNOWN.to_string(),
            creation_date: UNKNOWN.to_string(),
            expiration_date: UNKNOWN.to_string(),
            name_servers: Vec::new(),
            status_codes: Vec::new(),
        }
    }
}

/// Merged scan outcome returned to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    /// The normalized URL that was scanned
    pub url: String,
    pub threat_level: ThreatLevel,
    pub positives: u32,
    pub total: u32,
    /// Human-readable long-form scan timestamp
    pub scan_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permalink: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub per_engine_results: BTreeMap<String, EngineResult>,
    /// Absent when the lookup produced no usable data at all
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration: Option<RegistrationRecord>,
}

/// Who asked for the scan; only used for logging and notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientContext {
    pub ip: String,
    pub user_agent: String,
}

impl ClientContext {
    pub fn new(ip: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            user_agent: user_agent.into(),
        }
    }
}

/// Errors that can occur while scanning
#[derive(Error, Debug)]
pub enum ScanError {
    /// Missing or malformed input
    #[error("{0}")]
    Validation(String),
    /// Required credential not configured
    #[error("{0}")]
    Configuration(String),
    /// External service returned an unusable status or response code
    #[error("{0}")]
    Upstream(String),
    /// A bounded external call exceeded its deadline
    #[error("{0}")]
    Timeout(String),
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ScanError>;

// Re-export main types
pub use scan_pipeline::ScanPipeline;
pub use validation::ScanTarget;
