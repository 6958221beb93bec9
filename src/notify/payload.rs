//! Payload normalization: validates a raw request and fills in defaults.

use serde::{Deserialize, Deserializer, Serialize};

use super::Backend;
use crate::config::MailDefaults;
use crate::error::DispatchError;

/// Channel used when neither the request nor the configuration names one.
pub const FALLBACK_CHANNEL: &str = "general";

/// Request payload as received from HTTP or an event.
///
/// Unknown keys are ignored. Fields holding a non-string JSON value are
/// treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPayload {
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub m_body: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub source: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub channel: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub m_from: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub m_to: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub m_subject: Option<String>,
    /// SMTP relay host for this request only.
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub m_server_fqdn: Option<String>,
    /// SMTP relay port, as a number or a numeric string.
    #[serde(
        default,
        deserialize_with = "lenient_port",
        skip_serializing_if = "Option::is_none"
    )]
    pub m_server_port: Option<u16>,
}

impl RawPayload {
    /// Payload carrying only a body.
    pub fn with_body(body: impl Into<String>) -> Self {
        Self {
            m_body: Some(body.into()),
            ..Default::default()
        }
    }

    /// Parse a loose JSON value. Anything that is not an object is empty.
    pub fn from_value(value: serde_json::Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::String(s) => Some(s),
        _ => None,
    }))
}

fn lenient_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }))
}

/// Validated payload with every default resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPayload {
    pub body: String,
    pub source: Option<String>,
    /// Resolved chat channel; never empty.
    pub channel: String,
    /// Chat text: `source` then `body`, space separated.
    pub text: String,
    pub from: Option<String>,
    /// Individual recipient addresses, in request order.
    pub to: Vec<String>,
    pub subject: Option<String>,
    /// Relay override; the mail backend falls back to its configured relay.
    pub server: Option<String>,
    pub port: Option<u16>,
}

/// Resolves request fields against configured defaults.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    default_channel: Option<String>,
    mail: MailDefaults,
}

impl Normalizer {
    pub fn new(default_channel: Option<String>, mail: MailDefaults) -> Self {
        Self {
            default_channel: non_empty(default_channel),
            mail,
        }
    }

    /// Validate `raw` for delivery through `target`.
    ///
    /// The body is mandatory. The mail path may take it from the configured
    /// default body; the chat path never does. Missing mail addresses are
    /// not an error here.
    pub fn normalize(
        &self,
        raw: &RawPayload,
        target: Backend,
    ) -> Result<NotificationPayload, DispatchError> {
        let explicit_body = non_empty(raw.m_body.clone());
        let body = match target {
            Backend::Chat => explicit_body,
            Backend::Mail => explicit_body.or_else(|| non_empty(self.mail.body.clone())),
        }
        .ok_or_else(DispatchError::missing_body)?;

        let channel = non_empty(raw.channel.clone())
            .or_else(|| self.default_channel.clone())
            .unwrap_or_else(|| FALLBACK_CHANNEL.to_string());

        let to = non_empty(raw.m_to.clone())
            .or_else(|| non_empty(self.mail.to.clone()))
            .map(|to| split_recipients(&to))
            .unwrap_or_default();

        Ok(NotificationPayload {
            text: chat_text(raw.source.as_deref(), Some(body.as_str())),
            body,
            source: raw.source.clone(),
            channel,
            from: non_empty(raw.m_from.clone()).or_else(|| non_empty(self.mail.from.clone())),
            to,
            subject: non_empty(raw.m_subject.clone())
                .or_else(|| non_empty(self.mail.subject.clone())),
            server: non_empty(raw.m_server_fqdn.clone()),
            port: raw.m_server_port,
        })
    }
}

/// Join the present parts with single spaces, dropping one leading space.
pub fn chat_text(source: Option<&str>, body: Option<&str>) -> String {
    let mut text = String::new();
    for part in [source, body].into_iter().flatten() {
        text.push(' ');
        text.push_str(part);
    }
    match text.strip_prefix(' ') {
        Some(rest) => rest.to_string(),
        None => text,
    }
}

/// Split a `"a@x.com, b@y.com"` list into individual addresses.
pub fn split_recipients(to: &str) -> Vec<String> {
    to.split(',')
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
        .map(str::to_string)
        .collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
