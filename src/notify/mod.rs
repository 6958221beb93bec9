//! Notification delivery: payload normalization, chat and mail backends,
//! and the dispatch engine choosing between them.

pub mod chat;
pub mod dispatch;
pub mod mail;
pub mod payload;

pub use chat::{ChatBackend, ChatClient, SlackClient};
pub use dispatch::{BackendAvailability, BackendUsed, DispatchOutcome, Dispatcher};
pub use mail::{MailBackend, MailSession, MailTransport, SmtpRelay};
pub use payload::{NotificationPayload, Normalizer, RawPayload};

/// A delivery backend a payload is normalized for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Chat,
    Mail,
}
