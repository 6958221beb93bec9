//! Internal notification events — fire-and-forget delivery requests from
//! other components of the host process.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::notify::{DispatchOutcome, Dispatcher, RawPayload};

/// Default event queue capacity.
pub const EVENT_BUFFER: usize = 256;

/// A delivery request published on the event bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", content = "message")]
pub enum CourierEvent {
    #[serde(rename = "courier.chat_send")]
    ChatSend(RawPayload),
    #[serde(rename = "courier.mail_send")]
    MailSend(RawPayload),
}

impl CourierEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ChatSend(_) => "courier.chat_send",
            Self::MailSend(_) => "courier.mail_send",
        }
    }
}

/// Publishing side of the event bus. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: mpsc::Sender<CourierEvent>,
}

impl EventBus {
    /// Create a bus and its receiving end.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<CourierEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Queue an event. Returns `false` if the consumer has stopped.
    pub async fn publish(&self, event: CourierEvent) -> bool {
        let name = event.name();
        match self.tx.send(event).await {
            Ok(()) => {
                debug!(event = name, "Event queued");
                true
            }
            Err(_) => {
                warn!(event = name, "Event consumer gone, dropping event");
                false
            }
        }
    }
}

/// Spawn the consumer task. It runs until every [`EventBus`] is dropped.
pub fn spawn_event_consumer(
    dispatcher: Arc<Dispatcher>,
    mut rx: mpsc::Receiver<CourierEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Event consumer started");
        while let Some(event) = rx.recv().await {
            handle_event(&dispatcher, event).await;
        }
        info!("Event consumer stopped");
    })
}

/// Publish newline-delimited JSON events read from `reader` (e.g. stdin).
///
/// Each line is `{"name": "courier.chat_send", "message": {...}}`. Lines
/// that do not parse are logged and skipped. Stops at EOF.
pub fn spawn_line_publisher<R>(reader: R, bus: EventBus) -> JoinHandle<()>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = reader.lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<CourierEvent>(line) {
                        Ok(event) => {
                            if !bus.publish(event).await {
                                break;
                            }
                        }
                        Err(e) => warn!(error = %e, "Ignoring malformed event line"),
                    }
                }
                Ok(None) => break, // EOF
                Err(e) => {
                    tracing::error!("Error reading events: {}", e);
                    break;
                }
            }
        }
        debug!("Event line reader finished");
    })
}

/// Dispatch one event. Failures are logged only.
pub async fn handle_event(dispatcher: &Dispatcher, event: CourierEvent) -> DispatchOutcome {
    let name = event.name();
    let outcome = match &event {
        CourierEvent::ChatSend(raw) => dispatcher.dispatch_chat(raw).await,
        CourierEvent::MailSend(raw) => dispatcher.dispatch_mail(raw).await,
    };

    match &outcome.error {
        None => info!(event = name, backend = ?outcome.backend_used, "Event delivered"),
        Some(err) => warn!(
            event = name,
            backend = ?outcome.backend_used,
            kind = %err.kind,
            error = %err.message,
            "Event delivery failed"
        ),
    }
    outcome
}
