//! Operator notifications via the Telegram Bot API
//!
//! Notifications are a side channel: [`Notifier::notify`] never returns an
//! error and never panics outward. Missing credentials turn it into a no-op.

use crate::{dates, ClientContext, NotifierConfig, ScanResult, UNKNOWN};
use anyhow::{bail, Context};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// User agents longer than this are truncated in the message
pub const USER_AGENT_LIMIT: usize = 100;

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
}

#[derive(Debug, Clone)]
pub struct Notifier {
    http: reqwest::Client,
    config: NotifierConfig,
}

impl Notifier {
    pub fn new(http: reqwest::Client, config: NotifierConfig) -> Self {
        Self { http, config }
    }

    pub fn is_enabled(&self) -> bool {
        self.credentials().is_some()
    }

    pub fn is_detached(&self) -> bool {
        self.config.detach
    }

    fn credentials(&self) -> Option<(&str, &str)> {
        let token = self.config.bot_token.as_deref().filter(|t| !t.is_empty())?;
        let chat_id = self.config.chat_id.as_deref().filter(|c| !c.is_empty())?;
        Some((token, chat_id))
    }

    /// Post a scan summary; failures are logged and swallowed
    pub async fn notify(&self, client: &ClientContext, result: &ScanResult) {
        let Some((token, chat_id)) = self.credentials() else {
            warn!("Telegram credentials not configured, skipping notification");
            return;
        };

        let text = format_message(client, result, chrono::Utc::now());
        match self.send(token, chat_id, &text).await {
            Ok(()) => info!("Telegram notification sent"),
            Err(e) => warn!("Failed to send Telegram notification: {:#}", e),
        }
    }

    async fn send(&self, token: &str, chat_id: &str, text: &str) -> anyhow::Result<()> {
        let endpoint = format!(
            "{}/bot{}/sendMessage",
            self.config.api_base_url.trim_end_matches('/'),
            token
        );
        let payload = SendMessage {
            chat_id,
            text,
            parse_mode: "HTML",
        };

        debug!("Posting notification to chat {}", chat_id);
        // The bot token is part of the URL, so it is stripped from any error.
        let response = self
            .http
            .post(&endpoint)
            .json(&payload)
            .timeout(Duration::from_millis(self.config.timeout_ms))
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context("sendMessage request failed")?;

        if !response.status().is_success() {
            bail!("sendMessage returned HTTP {}", response.status());
        }
        Ok(())
    }
}

/// Render the fixed-shape notification text
pub fn format_message(
    client: &ClientContext,
    result: &ScanResult,
    now: chrono::DateTime<chrono::Utc>,
) -> String {
    let registration = result.registration.as_ref();
    let organization = registration.map_or(UNKNOWN, |r| r.organization.as_str());
    let country = registration.map_or(UNKNOWN, |r| r.country.as_str());
    let registrar = registration.map_or(UNKNOWN, |r| r.registrar.as_str());

    format!(
        "🔍 URL Scan Alert\n\
         \n\
         📅 Time: {time} UTC\n\
         🌐 URL: {url}\n\
         🔗 IP: {ip}\n\
         🖥️ User Agent: {user_agent}\n\
         ⚠️ Threat Level: {threat}\n\
         🛡️ Detection: {positives}/{total}\n\
         🏢 Organization: {organization}\n\
         🌍 Country: {country}\n\
         📋 Registrar: {registrar}\n\
         \n\
         #URLScan #Security",
        time = dates::format_notification_time(now),
        url = escape_html(&result.url),
        ip = escape_html(&client.ip),
        user_agent = escape_html(&truncate_user_agent(&client.user_agent)),
        threat = result.threat_level,
        positives = result.positives,
        total = result.total,
        organization = escape_html(organization),
        country = escape_html(country),
        registrar = escape_html(registrar),
    )
}

/// Keep the first [`USER_AGENT_LIMIT`] characters, marking the cut with `...`
pub fn truncate_user_agent(user_agent: &str) -> String {
    if user_agent.chars().count() > USER_AGENT_LIMIT {
        let head: String = user_agent.chars().take(USER_AGENT_LIMIT).collect();
        format!("{}...", head)
    } else {
        user_agent.to_string()
    }
}

/// Escape the characters Telegram's HTML parse mode treats as markup
fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
