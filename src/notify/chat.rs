//! Chat backend — posts notifications to Slack via `chat.postMessage`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::config::{CourierConfig, DEFAULT_TIMEOUT};
use crate::error::{ChatClientError, ConfigError, DispatchError};

/// Chat service capability used by the adapter.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Post `text` to `channel`.
    async fn post_message(&self, channel: &str, text: &str) -> Result<(), ChatClientError>;
}

// ── Slack client ────────────────────────────────────────────────────

/// Slack Web API client.
pub struct SlackClient {
    token: SecretString,
    api_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SlackResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

impl SlackClient {
    /// Fails when no token is given or the HTTP client cannot be built.
    pub fn new(
        token: Option<SecretString>,
        api_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let token = token
            .filter(|t| !t.expose_secret().is_empty())
            .ok_or_else(|| ConfigError::ChatInit("no Slack token configured".into()))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::ChatInit(format!("HTTP client: {e}")))?;

        Ok(Self {
            token,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/{method}", self.api_url)
    }
}

#[async_trait]
impl ChatClient for SlackClient {
    async fn post_message(&self, channel: &str, text: &str) -> Result<(), ChatClientError> {
        let body = serde_json::json!({
            "channel": channel,
            "text": text,
        });

        let resp = self
            .client
            .post(self.api_url("chat.postMessage"))
            .bearer_auth(self.token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatClientError::Connection(e.to_string()))?;

        let status = resp.status();
        let raw = resp
            .text()
            .await
            .map_err(|e| ChatClientError::Connection(e.to_string()))?;

        if !status.is_success() {
            return Err(ChatClientError::Api(format!("Slack API returned {status}: {raw}")));
        }

        let parsed: SlackResponse = serde_json::from_str(&raw)
            .map_err(|e| ChatClientError::Api(format!("Invalid Slack API response: {e}")))?;

        if parsed.ok {
            Ok(())
        } else {
            Err(ChatClientError::Api(
                parsed.error.unwrap_or_else(|| "unknown_error".to_string()),
            ))
        }
    }
}

// ── Adapter ─────────────────────────────────────────────────────────

/// Chat backend adapter. Built once; a failed client initialization makes
/// every send fail with `ChatUnavailable` without touching the network.
#[derive(Clone)]
pub struct ChatBackend {
    client: Result<Arc<dyn ChatClient>, String>,
    timeout: Duration,
}

impl ChatBackend {
    pub fn new(client: Arc<dyn ChatClient>) -> Self {
        Self {
            client: Ok(client),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            client: Err(reason.into()),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Build the Slack-backed adapter from configuration.
    pub fn from_config(config: &CourierConfig) -> Self {
        let backend = match SlackClient::new(
            config.slack_token.clone(),
            config.slack_api_url.clone(),
            config.timeout,
        ) {
            Ok(client) => Self::new(Arc::new(client)),
            Err(e) => {
                tracing::warn!(error = %e, "Chat backend disabled");
                Self::unavailable(e.to_string())
            }
        };
        backend.with_timeout(config.timeout)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether the chat client initialized.
    pub fn is_available(&self) -> bool {
        self.client.is_ok()
    }

    /// Send `text` to `channel`, classifying any failure.
    pub async fn send_chat(&self, channel: &str, text: &str) -> Result<(), DispatchError> {
        let client = match &self.client {
            Ok(client) => client,
            Err(reason) => {
                tracing::error!(backend = "chat", reason = %reason, "Chat backend unavailable");
                return Err(DispatchError::ChatUnavailable(reason.clone()));
            }
        };

        tracing::info!(backend = "chat", channel, msg = %text, "Posting chat message");

        let result = tokio::time::timeout(self.timeout, client.post_message(channel, text))
            .await
            .unwrap_or_else(|_| {
                Err(ChatClientError::Connection(format!(
                    "timed out after {:?}",
                    self.timeout
                )))
            });

        match result {
            Ok(()) => Ok(()),
            Err(ChatClientError::Api(message)) => {
                tracing::error!(backend = "chat", channel, error = %message, "Chat API rejected message");
                Err(DispatchError::ChatApi(message))
            }
            Err(err @ ChatClientError::Connection(_)) => {
                tracing::error!(backend = "chat", channel, error = %err, "Chat connection failed");
                Err(DispatchError::ChatConnection(err.to_string()))
            }
        }
    }
}

impl std::fmt::Debug for ChatBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatBackend")
            .field("available", &self.is_available())
            .field("timeout", &self.timeout)
            .finish()
    }
}
