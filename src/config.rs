//! Configuration types.

use std::time::Duration;

use secrecy::SecretString;

/// Default Slack Web API base URL.
pub const DEFAULT_SLACK_API_URL: &str = "https://slack.com/api";

/// Default SMTP port when none is configured.
pub const DEFAULT_SMTP_PORT: u16 = 25;

/// Default per-call backend timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default HTTP listen port.
pub const DEFAULT_HTTP_PORT: u16 = 8181;

/// Courier configuration, read once at start-up.
#[derive(Debug, Clone)]
pub struct CourierConfig {
    /// Slack bot token. Chat is disabled without it.
    pub slack_token: Option<SecretString>,
    /// Channel used when a request names none.
    pub slack_channel: Option<String>,
    /// Slack Web API base URL (overridable for proxies and tests).
    pub slack_api_url: String,
    pub mail: MailDefaults,
    /// SMTP relay host. Mail is disabled without it.
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    /// Upgrade SMTP sessions with STARTTLS.
    pub smtp_starttls: bool,
    /// Upper bound for a single backend call.
    pub timeout: Duration,
    pub http_port: u16,
}

/// Fallback values for mail fields a request leaves out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailDefaults {
    pub from: Option<String>,
    pub to: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            slack_token: None,
            slack_channel: None,
            slack_api_url: DEFAULT_SLACK_API_URL.to_string(),
            mail: MailDefaults::default(),
            smtp_host: None,
            smtp_port: DEFAULT_SMTP_PORT,
            smtp_starttls: false,
            timeout: DEFAULT_TIMEOUT,
            http_port: DEFAULT_HTTP_PORT,
        }
    }
}

impl CourierConfig {
    /// Build config from `COURIER_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let smtp_port = parse_or(get("COURIER_SMTP_PORT"), "COURIER_SMTP_PORT", DEFAULT_SMTP_PORT);
        let timeout_secs = parse_or(
            get("COURIER_TIMEOUT_SECS"),
            "COURIER_TIMEOUT_SECS",
            DEFAULT_TIMEOUT.as_secs(),
        );
        let http_port = parse_or(get("COURIER_HTTP_PORT"), "COURIER_HTTP_PORT", DEFAULT_HTTP_PORT);

        Self {
            slack_token: get("COURIER_SLACK_TOKEN").map(SecretString::from),
            slack_channel: get("COURIER_SLACK_CHANNEL"),
            slack_api_url: get("COURIER_SLACK_API_URL")
                .unwrap_or_else(|| DEFAULT_SLACK_API_URL.to_string()),
            mail: MailDefaults {
                from: get("COURIER_MAIL_FROM"),
                to: get("COURIER_MAIL_TO"),
                subject: get("COURIER_MAIL_SUBJECT"),
                body: get("COURIER_MAIL_BODY"),
            },
            smtp_host: get("COURIER_SMTP_HOST"),
            smtp_port,
            smtp_starttls: get("COURIER_SMTP_STARTTLS")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            timeout: Duration::from_secs(timeout_secs.max(1)),
            http_port,
        }
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display,
{
    match value {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, fallback = %default, "Invalid config value, using default");
            default
        }),
    }
}
