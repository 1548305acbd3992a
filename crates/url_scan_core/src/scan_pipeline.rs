//! Scan pipeline orchestrating validation, lookups and notification
//!
//! Validation and the credential check fail fast before any outbound call.
//! The reputation exchange and the registration lookup then run concurrently
//! and are joined before the result is merged and the operator notified.

use crate::{
    notifier::Notifier,
    registration::RegistrationClient,
    reputation::{ReputationClient, ReputationVerdict},
    validation::{self, ScanTarget},
    ClientContext, RegistrationRecord, Result, ScanConfig, ScanResult,
};
use anyhow::Context;
use tracing::{debug, info, instrument};

/// Main pipeline coordinating a single URL scan
pub struct ScanPipeline {
    reputation: ReputationClient,
    registration: RegistrationClient,
    notifier: Notifier,
}

impl ScanPipeline {
    /// Create a new scan pipeline with the given configuration
    ///
    /// # Returns
    /// * `Ok(ScanPipeline)` on success
    /// * `Err(ScanError)` if the HTTP client cannot be built
    pub fn new(config: ScanConfig) -> Result<Self> {
        info!("Initializing scan pipeline");

        let user_agent = if config.user_agent.is_empty() {
            ScanConfig::default_user_agent()
        } else {
            config.user_agent.clone()
        };

        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .context("Failed to build HTTP client")?;

        let notifier = Notifier::new(http.clone(), config.notifier);
        if !notifier.is_enabled() {
            info!("Telegram notifications disabled (credentials not configured)");
        }

        Ok(Self {
            reputation: ReputationClient::new(http.clone(), config.reputation),
            registration: RegistrationClient::new(http, config.registration),
            notifier,
        })
    }

    /// Whether the reputation service credential is present
    pub fn is_configured(&self) -> bool {
        self.reputation.api_key().is_ok()
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Scan a raw, user-supplied URL
    ///
    /// # Returns
    /// * `Ok(ScanResult)` with the merged verdict and registration data
    /// * `Err(ScanError::Validation)` for missing or malformed input
    /// * `Err(ScanError::Configuration)` when no API key is configured
    /// * `Err(ScanError::Upstream | ScanError::Timeout)` when the reputation exchange fails
    #[instrument(skip(self, client), fields(ip = %client.ip))]
    pub async fn scan(&self, raw_url: Option<&str>, client: &ClientContext) -> Result<ScanResult> {
        let target = validation::validate_url(raw_url)?;
        self.reputation.api_key()?;

        info!("Scanning {} (host {})", target.url, target.hostname);

        let (report, registration) = tokio::join!(
            self.reputation.submit_and_report(&target.url),
            self.registration.lookup(&target.hostname),
        );
        let verdict = report?.into_verdict()?;

        let result = merge(&target, verdict, registration);
        info!(
            "Scan completed: {} -> {} ({}/{})",
            result.url, result.threat_level, result.positives, result.total
        );

        self.dispatch_notification(client, &result).await;

        Ok(result)
    }

    async fn dispatch_notification(&self, client: &ClientContext, result: &ScanResult) {
        if self.notifier.is_detached() {
            debug!("Dispatching notification in the background");
            let notifier = self.notifier.clone();
            let client = client.clone();
            let result = result.clone();
            tokio::spawn(async move {
                notifier.notify(&client, &result).await;
            });
        } else {
            self.notifier.notify(client, result).await;
        }
    }
}

/// Combine the classified report with whatever registration data was found
fn merge(
    target: &ScanTarget,
    verdict: ReputationVerdict,
    registration: Option<RegistrationRecord>,
) -> ScanResult {
    ScanResult {
        url: target.url.clone(),
        threat_level: verdict.threat_level,
        positives: verdict.positives,
        total: verdict.total,
        scan_date: verdict.scan_date,
        permalink: verdict.permalink,
        details: verdict.details,
        per_engine_results: verdict.per_engine_results,
        registration,
    }
}
