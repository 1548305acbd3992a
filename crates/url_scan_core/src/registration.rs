//! Domain registration lookup over RDAP
//!
//! Registration data is best effort and never fails a scan:
//!
//! 1. The public aggregator is queried first.
//! 2. If it answers with a non-success status, the registry endpoint is tried.
//! 3. If that fails too, a placeholder record with every field `Unknown`
//!    is returned.
//!
//! When the aggregator cannot be reached at all, or answers successfully with
//! an empty or non-JSON body, the lookup yields `None`.

use crate::{dates, RegistrationConfig, RegistrationRecord, UNKNOWN};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const ACCEPT_JSON: &str = "application/json";
const ACCEPT_RDAP: &str = "application/rdap+json";

/// Client for the registration-data providers
#[derive(Debug, Clone)]
pub struct RegistrationClient {
    http: reqwest::Client,
    config: RegistrationConfig,
}

impl RegistrationClient {
    pub fn new(http: reqwest::Client, config: RegistrationConfig) -> Self {
        Self { http, config }
    }

    /// Look up registration data for `hostname`.
    ///
    /// Never returns an error; see the module docs for the degradation order.
    #[instrument(skip(self), fields(hostname = %hostname))]
    pub async fn lookup(&self, hostname: &str) -> Option<RegistrationRecord> {
        debug!("Querying primary RDAP provider");

        let response = self
            .http
            .get(&self.config.primary_url)
            .query(&[("type", "domain"), ("object", hostname)])
            .header(reqwest::header::ACCEPT, ACCEPT_JSON)
            .timeout(Duration::from_millis(self.config.primary_timeout_ms))
            .send()
            .await;

        let response = match response {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                warn!("Primary RDAP provider returned HTTP {}", response.status());
                return Some(self.fallback(hostname).await);
            }
            Err(e) => {
                warn!("Primary RDAP provider unreachable: {}", e);
                return None;
            }
        };

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!("Failed to read primary RDAP response: {}", e);
                return None;
            }
        };

        let document = parse_document(&body)?;
        let record = parse_rdap(&document, hostname);
        info!("Registration data resolved via primary provider");
        Some(record)
    }

    /// Query the registry endpoint, degrading to a placeholder on any failure
    async fn fallback(&self, hostname: &str) -> RegistrationRecord {
        let endpoint = format!(
            "{}/domain/{}",
            self.config.fallback_base_url.trim_end_matches('/'),
            hostname
        );
        debug!("Querying fallback RDAP provider: {}", endpoint);

        let response = self
            .http
            .get(&endpoint)
            .header(reqwest::header::ACCEPT, ACCEPT_RDAP)
            .timeout(Duration::from_millis(self.config.fallback_timeout_ms))
            .send()
            .await;

        let body = match response {
            Ok(response) if response.status().is_success() => response.text().await.ok(),
            Ok(response) => {
                warn!("Fallback RDAP provider returned HTTP {}", response.status());
                None
            }
            Err(e) => {
                warn!("Fallback RDAP provider unreachable: {}", e);
                None
            }
        };

        match body.as_deref().and_then(parse_document) {
            Some(document) => {
                info!("Registration data resolved via fallback provider");
                parse_rdap(&document, hostname)
            }
            None => {
                warn!("No registration provider available, using placeholder");
                RegistrationRecord::placeholder(hostname)
            }
        }
    }
}

/// Parse a response body, treating blank or malformed bodies as absent
fn parse_document(body: &str) -> Option<Value> {
    if body.trim().is_empty() {
        warn!("RDAP provider returned an empty body");
        return None;
    }

    match serde_json::from_str(body) {
        Ok(document) => Some(document),
        Err(e) => {
            let preview: String = body.chars().take(100).collect();
            warn!("RDAP provider returned invalid JSON ({}): {}", e, preview);
            None
        }
    }
}

/// Extract a [`RegistrationRecord`] from an RDAP domain object.
///
/// Every field is read independently; a missing path only affects its own field.
pub fn parse_rdap(document: &Value, hostname: &str) -> RegistrationRecord {
    let domain = text_at(document, "/ldhName")
        .or_else(|| text_at(document, "/unicodeName"))
        .unwrap_or(hostname)
        .to_string();

    let registrar = entity_with_role(document, "registrar")
        .and_then(|entity| vcard_property(entity, "org"))
        .and_then(|org| text_at(org, "/3"));

    let registrant = entity_with_role(document, "registrant");
    let organization = registrant
        .and_then(|entity| vcard_property(entity, "org"))
        .and_then(|org| text_at(org, "/3"));
    // The country name is the 7th component of the structured address.
    let country = registrant
        .and_then(|entity| vcard_property(entity, "adr"))
        .and_then(|adr| text_at(adr, "/3/6"));

    let name_servers = array_at(document, "/nameservers")
        .iter()
        .filter_map(|ns| text_at(ns, "/ldhName").or_else(|| text_at(ns, "/unicodeName")))
        .map(str::to_string)
        .collect();

    let status_codes = array_at(document, "/status")
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect();

    RegistrationRecord {
        domain,
        registrar: or_unknown(registrar),
        organization: or_unknown(organization),
        country: or_unknown(country),
        creation_date: event_date(document, "registration"),
        expiration_date: event_date(document, "expiration"),
        name_servers,
        status_codes,
    }
}

/// Non-empty string at a JSON pointer
fn text_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
}

/// Array at a JSON pointer, empty when missing or of another type
fn array_at<'a>(value: &'a Value, pointer: &str) -> &'a [Value] {
    value
        .pointer(pointer)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn or_unknown(value: Option<&str>) -> String {
    value.unwrap_or(UNKNOWN).to_string()
}

/// First top-level entity whose `roles` contains `role`
fn entity_with_role<'a>(document: &'a Value, role: &str) -> Option<&'a Value> {
    array_at(document, "/entities").iter().find(|entity| {
        array_at(entity, "/roles")
            .iter()
            .any(|r| r.as_str() == Some(role))
    })
}

/// jCard property `[name, params, type, value...]` from an entity's `vcardArray`
fn vcard_property<'a>(entity: &'a Value, name: &str) -> Option<&'a Value> {
    array_at(entity, "/vcardArray/1")
        .iter()
        .find(|property| text_at(property, "/0") == Some(name))
}

/// Short date of the first event with the given action, or `Unknown`
fn event_date(document: &Value, action: &str) -> String {
    array_at(document, "/events")
        .iter()
        .find(|event| text_at(event, "/eventAction") == Some(action))
        .and_then(|event| text_at(event, "/eventDate"))
        .and_then(dates::format_event_date)
        .unwrap_or_else(|| UNKNOWN.to_string())
}
