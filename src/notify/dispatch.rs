//! Dispatch engine — picks a backend and applies the chat → mail fallback.

use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use super::chat::ChatBackend;
use super::mail::MailBackend;
use super::payload::{Normalizer, RawPayload};
use super::Backend;
use crate::config::CourierConfig;
use crate::error::{DispatchError, ErrorInfo};

/// Which backends can be attempted. Fixed once the dispatcher is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BackendAvailability {
    pub chat_configured: bool,
    pub mail_configured: bool,
}

/// Backend that produced an outcome. Unlike [`Backend`] it can be `None`,
/// when auto mode had nothing to try.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendUsed {
    Chat,
    Mail,
    None,
}

/// Result of one dispatch request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchOutcome {
    pub delivered: bool,
    pub backend_used: BackendUsed,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl DispatchOutcome {
    fn delivered(backend: BackendUsed) -> Self {
        Self {
            delivered: true,
            backend_used: backend,
            error: None,
        }
    }

    fn failed(backend: BackendUsed, err: &DispatchError) -> Self {
        Self {
            delivered: false,
            backend_used: backend,
            error: Some(err.into()),
        }
    }
}

/// Orchestrates normalization and backend calls. Holds no per-request
/// state, so one instance serves concurrent requests.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    normalizer: Normalizer,
    chat: ChatBackend,
    mail: MailBackend,
    availability: BackendAvailability,
}

impl Dispatcher {
    pub fn new(normalizer: Normalizer, chat: ChatBackend, mail: MailBackend) -> Self {
        let availability = BackendAvailability {
            chat_configured: chat.is_available(),
            mail_configured: mail.is_available(),
        };
        Self {
            normalizer,
            chat,
            mail,
            availability,
        }
    }

    /// Build the dispatcher with the Slack and SMTP backends.
    pub fn from_config(config: &CourierConfig) -> Self {
        Self::new(
            Normalizer::new(config.slack_channel.clone(), config.mail.clone()),
            ChatBackend::from_config(config),
            MailBackend::from_config(config),
        )
    }

    pub fn availability(&self) -> BackendAvailability {
        self.availability
    }

    /// Deliver through chat only. Failures are returned, never retried on mail.
    pub async fn dispatch_chat(&self, raw: &RawPayload) -> DispatchOutcome {
        self.try_chat(raw)
            .instrument(tracing::info_span!("dispatch", id = %Uuid::new_v4(), mode = "chat"))
            .await
    }

    /// Deliver through mail only.
    pub async fn dispatch_mail(&self, raw: &RawPayload) -> DispatchOutcome {
        self.try_mail(raw)
            .instrument(tracing::info_span!("dispatch", id = %Uuid::new_v4(), mode = "mail"))
            .await
    }

    /// Best effort across configured backends: chat first, then mail on
    /// any chat failure, including validation failures.
    pub async fn dispatch_auto(&self, raw: &RawPayload) -> DispatchOutcome {
        let span = tracing::info_span!("dispatch", id = %Uuid::new_v4(), mode = "auto");
        async {
            let mut last = None;

            if self.availability.chat_configured {
                let outcome = self.try_chat(raw).await;
                if outcome.delivered {
                    return outcome;
                }
                tracing::warn!(error = ?outcome.error, "Chat delivery failed, trying next backend");
                last = Some(outcome);
            }

            if self.availability.mail_configured {
                return self.try_mail(raw).await;
            }

            last.unwrap_or_else(|| {
                let err = DispatchError::NoBackendConfigured;
                tracing::error!(error = %err, "Cannot deliver notification");
                DispatchOutcome::failed(BackendUsed::None, &err)
            })
        }
        .instrument(span)
        .await
    }

    async fn try_chat(&self, raw: &RawPayload) -> DispatchOutcome {
        let result = match self.normalizer.normalize(raw, Backend::Chat) {
            Ok(payload) => self.chat.send_chat(&payload.channel, &payload.text).await,
            Err(e) => {
                tracing::error!(backend = "chat", error = %e, "Rejected notification");
                Err(e)
            }
        };
        outcome(BackendUsed::Chat, result)
    }

    async fn try_mail(&self, raw: &RawPayload) -> DispatchOutcome {
        let result = match self.normalizer.normalize(raw, Backend::Mail) {
            Ok(payload) => {
                self.mail
                    .send_mail_via(
                        payload.server.as_deref(),
                        payload.port,
                        payload.from.as_deref(),
                        &payload.to,
                        payload.subject.as_deref(),
                        &payload.body,
                    )
                    .await
            }
            Err(e) => {
                tracing::error!(backend = "mail", error = %e, "Rejected notification");
                Err(e)
            }
        };
        outcome(BackendUsed::Mail, result)
    }
}

fn outcome(backend: BackendUsed, result: Result<(), DispatchError>) -> DispatchOutcome {
    match result {
        Ok(()) => DispatchOutcome::delivered(backend),
        Err(e) => DispatchOutcome::failed(backend, &e),
    }
}
