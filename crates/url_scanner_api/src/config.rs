//! Configuration management for the URL scanner API
//!
//! Configuration is layered with figment: built-in defaults, then an optional
//! `Config.toml`, then `URL_SCANNER_*` environment variables (nested keys are
//! separated by `__`). The three service credentials are also accepted under
//! their conventional unprefixed names.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use url_scan_core::{NotifierConfig, RegistrationConfig, ReputationConfig, ScanConfig};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub reputation: ReputationConfig,
    pub registration: RegistrationConfig,
    pub notifier: NotifierConfig,
    pub http: HttpClientConfig,
    pub observability: ObservabilityConfig,
    pub security: SecurityConfig,
}

impl AppConfig {
    /// Core pipeline configuration derived from this config
    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            reputation: self.reputation.clone(),
            registration: self.registration.clone(),
            notifier: self.notifier.clone(),
            user_agent: self.http.user_agent.clone(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// Outbound HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpClientConfig {
    /// User-Agent header sent to external services
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            user_agent: ScanConfig::default_user_agent(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable JSON structured logging
    pub json_logs: bool,
    /// Log level filter used when `RUST_LOG` is not set
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            json_logs: false,
            log_level: "info".to_string(),
        }
    }
}

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum request body size in bytes
    pub max_body_size_bytes: usize,
    /// Allowed CORS origins (empty = allow all)
    pub cors_origins: Vec<String>,
    /// Address published in the security policy document
    pub contact_email: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size_bytes: 8 * 1024,
            cors_origins: Vec::new(),
            contact_email: "security@example.com".to_string(),
        }
    }
}

/// Environment variable names recognized outside the `URL_SCANNER_` prefix
pub mod env_vars {
    pub const PREFIX: &str = "URL_SCANNER_";
    pub const VIRUSTOTAL_API_KEY: &str = "VIRUSTOTAL_API_KEY";
    pub const TELEGRAM_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
    pub const TELEGRAM_USER_ID: &str = "TELEGRAM_USER_ID";
}

/// Figment holding every configuration layer
pub fn figment() -> Figment {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if std::path::Path::new("Config.toml").exists() {
        figment = figment.merge(Toml::file("Config.toml"));
    }

    figment
        .merge(Env::prefixed(env_vars::PREFIX).split("__"))
        .merge(credentials_env())
}

/// Load application configuration from environment and files
pub fn load_config() -> Result<AppConfig, figment::Error> {
    figment().extract()
}

/// Unprefixed credential variables and the config keys they set
const CREDENTIAL_KEYS: &[(&str, &str)] = &[
    (env_vars::VIRUSTOTAL_API_KEY, "reputation.api_key"),
    (env_vars::TELEGRAM_BOT_TOKEN, "notifier.bot_token"),
    (env_vars::TELEGRAM_USER_ID, "notifier.chat_id"),
];

/// Unprefixed credential variables, taken verbatim.
///
/// figment's `Env` provider would type `123456789` as an integer and `12e4`
/// as a float; credentials are opaque text and must keep their exact form.
fn credentials_env() -> Figment {
    CREDENTIAL_KEYS
        .iter()
        .filter_map(|(var, key)| std::env::var(var).ok().map(|value| (*key, value)))
        .fold(Figment::new(), |figment, (key, value)| {
            figment.merge(Serialized::default(key, value))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.reputation.report_delay_ms, 3_000);
        assert!(config.reputation.api_key.is_none());
        assert!(!config.observability.json_logs);
        assert!(!config.notifier.detach);
    }

    #[test]
    fn test_outbound_timeouts_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.reputation.submit_timeout_ms, 10_000);
        assert_eq!(config.reputation.report_timeout_ms, 10_000);
        assert_eq!(config.registration.primary_timeout_ms, 15_000);
        assert_eq!(config.registration.fallback_timeout_ms, 10_000);
    }

    #[test]
    fn test_security_config_defaults() {
        let config = SecurityConfig::default();
        assert_eq!(config.max_body_size_bytes, 8192);
        assert!(config.cors_origins.is_empty());
    }

    #[test]
    fn test_credentials_from_environment() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("VIRUSTOTAL_API_KEY", "vt-key");
            jail.set_env("TELEGRAM_BOT_TOKEN", "bot-token");
            jail.set_env("TELEGRAM_USER_ID", "1234");
            jail.set_env("URL_SCANNER_SERVER__PORT", "8080");
            jail.set_env("URL_SCANNER_REPUTATION__REPORT_DELAY_MS", "500");

            let config: AppConfig = figment().extract()?;
            assert_eq!(config.reputation.api_key.as_deref(), Some("vt-key"));
            assert_eq!(config.notifier.bot_token.as_deref(), Some("bot-token"));
            assert_eq!(config.notifier.chat_id.as_deref(), Some("1234"));
            assert_eq!(config.server.port, 8080);
            assert_eq!(config.reputation.report_delay_ms, 500);
            Ok(())
        });
    }

    #[test]
    fn test_numeric_credentials_keep_their_text() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("TELEGRAM_USER_ID", "123456789");
            jail.set_env("TELEGRAM_BOT_TOKEN", "123456:AAE-token");
            jail.set_env("VIRUSTOTAL_API_KEY", "0123e456");

            let config = load_config()?;
            assert_eq!(config.notifier.chat_id.as_deref(), Some("123456789"));
            assert_eq!(config.notifier.bot_token.as_deref(), Some("123456:AAE-token"));
            assert_eq!(config.reputation.api_key.as_deref(), Some("0123e456"));
            Ok(())
        });
    }

    #[test]
    fn test_numeric_chat_id_from_prefixed_env_and_file() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("URL_SCANNER_NOTIFIER__CHAT_ID", "-1001234567890");
            let config: AppConfig = figment().extract()?;
            assert_eq!(config.notifier.chat_id.as_deref(), Some("-1001234567890"));
            Ok(())
        });

        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "Config.toml",
                r#"
                [notifier]
                chat_id = 987654321
                "#,
            )?;
            let config: AppConfig = figment().extract()?;
            assert_eq!(config.notifier.chat_id.as_deref(), Some("987654321"));
            Ok(())
        });
    }

    #[test]
    fn test_config_file_layer() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "Config.toml",
                r#"
                [notifier]
                detach = true

                [security]
                contact_email = "psirt@example.org"
                "#,
            )?;

            let config: AppConfig = figment().extract()?;
            assert!(config.notifier.detach);
            assert_eq!(config.security.contact_email, "psirt@example.org");
            assert_eq!(config.server.port, 3000);
            Ok(())
        });
    }

    #[test]
    fn test_scan_config_conversion() {
        let mut config = AppConfig::default();
        config.reputation.api_key = Some("key".to_string());
        config.http.user_agent = "scanner-test".to_string();

        let scan = config.scan_config();
        assert_eq!(scan.reputation.api_key.as_deref(), Some("key"));
        assert_eq!(scan.user_agent, "scanner-test");
    }
}
