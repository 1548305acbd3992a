//! Reputation service client (VirusTotal public API v2)
//!
//! A scan is a two-step exchange: the URL is submitted for analysis, then,
//! after a fixed grace period, the report for the same resource is fetched.
//! Nothing here retries; every call is bounded by its own timeout.

use crate::{
    dates, EngineResult, ReputationConfig, Result, ScanError, ThreatLevel,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

pub const API_KEY_MISSING: &str = "VirusTotal API key not configured";
pub const QUEUED_DETAILS: &str = "URL queued for scanning. Please try again in a few minutes.";

const SUBMIT_FAILED: &str = "Failed to submit URL to VirusTotal";
const REPORT_FAILED: &str = "Failed to get VirusTotal report";
const UNKNOWN_UPSTREAM_ERROR: &str = "Unknown error from VirusTotal";

/// Semantic meaning of the service's numeric `response_code`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    /// `1`: a report is available
    Found,
    /// `0`: the resource is not in the dataset yet and was queued
    Queued,
    /// Anything else, including a missing code
    Error(Option<i64>),
}

impl From<Option<i64>> for ResponseCode {
    fn from(code: Option<i64>) -> Self {
        match code {
            Some(1) => ResponseCode::Found,
            Some(0) => ResponseCode::Queued,
            other => ResponseCode::Error(other),
        }
    }
}

/// Report as returned by the service, with wire names mapped
#[derive(Debug, Clone, PartialEq)]
pub struct ReputationReport {
    pub response_code: ResponseCode,
    pub verbose_message: Option<String>,
    pub positives: u32,
    pub total: u32,
    /// Raw scan date as sent by the service
    pub scan_date: Option<String>,
    pub permalink: Option<String>,
    pub per_engine_results: BTreeMap<String, EngineResult>,
}

/// Classified outcome of a report, ready to be merged into a scan result
#[derive(Debug, Clone, PartialEq)]
pub struct ReputationVerdict {
    pub threat_level: ThreatLevel,
    pub positives: u32,
    pub total: u32,
    pub scan_date: String,
    pub permalink: Option<String>,
    pub details: Option<String>,
    pub per_engine_results: BTreeMap<String, EngineResult>,
}

impl ReputationReport {
    /// Interpret the response code.
    ///
    /// `Found` is classified by detection ratio, `Queued` yields an `Unknown`
    /// verdict with no detections, any other code is an upstream error.
    pub fn into_verdict(self) -> Result<ReputationVerdict> {
        match self.response_code {
            ResponseCode::Found => {
                let scan_date = match self.scan_date.as_deref() {
                    Some(raw) => dates::format_scan_date(raw),
                    None => dates::format_long(chrono::Utc::now()),
                };
                Ok(ReputationVerdict {
                    threat_level: ThreatLevel::from_detections(self.positives, self.total),
                    positives: self.positives,
                    total: self.total,
                    scan_date,
                    permalink: self.permalink,
                    details: self.verbose_message,
                    per_engine_results: self.per_engine_results,
                })
            }
            ResponseCode::Queued => Ok(ReputationVerdict {
                threat_level: ThreatLevel::Unknown,
                positives: 0,
                total: 0,
                scan_date: dates::format_long(chrono::Utc::now()),
                permalink: None,
                details: Some(QUEUED_DETAILS.to_string()),
                per_engine_results: BTreeMap::new(),
            }),
            ResponseCode::Error(code) => {
                warn!("Reputation service returned response code {:?}", code);
                Err(ScanError::Upstream(
                    self.verbose_message
                        .filter(|msg| !msg.is_empty())
                        .unwrap_or_else(|| UNKNOWN_UPSTREAM_ERROR.to_string()),
                ))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawReport {
    response_code: Option<i64>,
    verbose_msg: Option<String>,
    scan_date: Option<String>,
    permalink: Option<String>,
    positives: Option<u32>,
    total: Option<u32>,
    scans: Option<BTreeMap<String, RawEngineResult>>,
}

#[derive(Debug, Deserialize)]
struct RawEngineResult {
    #[serde(default)]
    detected: bool,
    version: Option<String>,
    result: Option<String>,
    update: Option<String>,
}

impl From<RawReport> for ReputationReport {
    fn from(raw: RawReport) -> Self {
        let per_engine_results = raw
            .scans
            .unwrap_or_default()
            .into_iter()
            .map(|(engine, scan)| {
                (
                    engine,
                    EngineResult {
                        detected: scan.detected,
                        version: scan.version,
                        result_label: scan.result,
                        update_date: scan.update,
                    },
                )
            })
            .collect();

        Self {
            response_code: ResponseCode::from(raw.response_code),
            verbose_message: raw.verbose_msg,
            positives: raw.positives.unwrap_or(0),
            total: raw.total.unwrap_or(0),
            scan_date: raw.scan_date,
            permalink: raw.permalink,
            per_engine_results,
        }
    }
}

/// Client for the reputation service
#[derive(Debug, Clone)]
pub struct ReputationClient {
    http: reqwest::Client,
    config: ReputationConfig,
}

impl ReputationClient {
    pub fn new(http: reqwest::Client, config: ReputationConfig) -> Self {
        Self { http, config }
    }

    /// The configured API key, or a configuration error
    pub fn api_key(&self) -> Result<&str> {
        self.config
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ScanError::Configuration(API_KEY_MISSING.to_string()))
    }

    /// Submit `url`, wait for the grace period, then fetch its report
    #[instrument(skip(self), fields(url = %url))]
    pub async fn submit_and_report(&self, url: &str) -> Result<ReputationReport> {
        let api_key = self.api_key()?;

        self.submit(api_key, url).await?;

        debug!("Waiting {}ms before fetching report", self.config.report_delay_ms);
        tokio::time::sleep(Duration::from_millis(self.config.report_delay_ms)).await;

        let report = self.fetch_report(api_key, url).await?;
        info!(
            "Reputation report: code={:?} positives={} total={}",
            report.response_code, report.positives, report.total
        );
        Ok(report)
    }

    async fn submit(&self, api_key: &str, url: &str) -> Result<()> {
        let endpoint = self.endpoint("vtapi/v2/url/scan");
        let timeout_ms = self.config.submit_timeout_ms;

        let response = self
            .http
            .post(&endpoint)
            .form(&[("apikey", api_key), ("url", url)])
            .timeout(Duration::from_millis(timeout_ms))
            .send()
            .await
            .map_err(|e| outbound_error(SUBMIT_FAILED, timeout_ms, e))?;

        if !response.status().is_success() {
            warn!("Reputation submit returned HTTP {}", response.status());
            return Err(ScanError::Upstream(SUBMIT_FAILED.to_string()));
        }

        debug!("URL submitted for scanning");
        Ok(())
    }

    async fn fetch_report(&self, api_key: &str, url: &str) -> Result<ReputationReport> {
        let endpoint = self.endpoint("vtapi/v2/url/report");
        let timeout_ms = self.config.report_timeout_ms;

        let response = self
            .http
            .get(&endpoint)
            .query(&[("apikey", api_key), ("resource", url), ("allinfo", "1")])
            .timeout(Duration::from_millis(timeout_ms))
            .send()
            .await
            .map_err(|e| outbound_error(REPORT_FAILED, timeout_ms, e))?;

        if !response.status().is_success() {
            warn!("Reputation report returned HTTP {}", response.status());
            return Err(ScanError::Upstream(REPORT_FAILED.to_string()));
        }

        let raw: RawReport = response
            .json()
            .await
            .map_err(|e| outbound_error(REPORT_FAILED, timeout_ms, e))?;

        Ok(ReputationReport::from(raw))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

/// Map a transport error, keeping the API key (carried in the URL) out of the message
fn outbound_error(context: &str, timeout_ms: u64, err: reqwest::Error) -> ScanError {
    let err = err.without_url();
    if err.is_timeout() {
        warn!("{}: timed out after {}ms", context, timeout_ms);
        ScanError::Timeout(format!("{}: request timed out after {}ms", context, timeout_ms))
    } else {
        warn!("{}: {}", context, err);
        ScanError::Upstream(format!("{}: {}", context, err))
    }
}
