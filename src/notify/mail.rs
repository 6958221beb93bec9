//! Mail backend — plain-text notifications over an SMTP relay via lettre.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use lettre::address::Envelope;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::client::{SmtpConnection, TlsParameters};
use lettre::transport::smtp::extension::ClientId;
use lettre::Message;

use crate::config::{CourierConfig, DEFAULT_TIMEOUT};
use crate::error::{DispatchError, MailTransportFailure};

/// SMTP capability used by the adapter.
pub trait MailTransport: Send + Sync {
    /// Open a session with the relay at `host:port`.
    fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Box<dyn MailSession>, MailTransportFailure>;
}

/// An open SMTP session.
pub trait MailSession: Send {
    /// Deliver the formatted `message` to every recipient of `envelope`.
    fn send(&mut self, envelope: &Envelope, message: &[u8]) -> Result<(), MailTransportFailure>;

    /// End the session. Must be safe to call on a failed session.
    fn close(&mut self);
}

/// Closes the wrapped session when dropped.
struct SessionGuard(Box<dyn MailSession>);

impl Deref for SessionGuard {
    type Target = dyn MailSession;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl DerefMut for SessionGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.as_mut()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.0.close();
    }
}

// ── lettre relay ────────────────────────────────────────────────────

/// Unauthenticated SMTP relay over lettre's low-level connection.
#[derive(Debug, Clone)]
pub struct SmtpRelay {
    hello_name: String,
    starttls: bool,
}

impl Default for SmtpRelay {
    fn default() -> Self {
        Self {
            hello_name: "localhost".to_string(),
            starttls: false,
        }
    }
}

impl SmtpRelay {
    pub fn with_starttls(mut self, starttls: bool) -> Self {
        self.starttls = starttls;
        self
    }
}

impl MailTransport for SmtpRelay {
    fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Box<dyn MailSession>, MailTransportFailure> {
        let hello = ClientId::Domain(self.hello_name.clone());
        let mut conn = SmtpConnection::connect((host, port), Some(timeout), &hello, None, None)
            .map_err(|e| MailTransportFailure(format!("SMTP connect to {host}:{port} failed: {e}")))?;

        if self.starttls {
            let upgraded = TlsParameters::new(host.to_string())
                .and_then(|tls| conn.starttls(&tls, &hello));
            if let Err(e) = upgraded {
                conn.abort();
                return Err(MailTransportFailure(format!("STARTTLS with {host} failed: {e}")));
            }
        }

        Ok(Box::new(SmtpSession { conn }))
    }
}

struct SmtpSession {
    conn: SmtpConnection,
}

impl MailSession for SmtpSession {
    fn send(&mut self, envelope: &Envelope, message: &[u8]) -> Result<(), MailTransportFailure> {
        self.conn
            .send(envelope, message)
            .map_err(|e| MailTransportFailure(format!("SMTP send failed: {e}")))?;
        Ok(())
    }

    fn close(&mut self) {
        if let Err(e) = self.conn.quit() {
            tracing::debug!(error = %e, "SMTP QUIT failed, aborting connection");
            self.conn.abort();
        }
    }
}

// ── Adapter ─────────────────────────────────────────────────────────

/// Mail backend adapter. Unavailable when no relay host is configured.
#[derive(Clone)]
pub struct MailBackend {
    host: Option<String>,
    port: u16,
    transport: Arc<dyn MailTransport>,
    timeout: Duration,
}

impl MailBackend {
    pub fn new(host: Option<String>, port: u16, transport: Arc<dyn MailTransport>) -> Self {
        Self {
            host: host.filter(|h| !h.is_empty()),
            port,
            transport,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Build the lettre-backed adapter from configuration.
    pub fn from_config(config: &CourierConfig) -> Self {
        Self::new(
            config.smtp_host.clone(),
            config.smtp_port,
            Arc::new(SmtpRelay::default().with_starttls(config.smtp_starttls)),
        )
        .with_timeout(config.timeout)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether a relay host is configured.
    pub fn is_available(&self) -> bool {
        self.host.is_some()
    }

    /// Send a plain-text mail through the configured relay.
    pub async fn send_mail(
        &self,
        from: Option<&str>,
        to: &[String],
        subject: Option<&str>,
        body: &str,
    ) -> Result<(), DispatchError> {
        self.send_mail_via(None, None, from, to, subject, body).await
    }

    /// Send a plain-text mail, one SMTP session per call.
    ///
    /// `server` and `port` override the configured relay for this call.
    pub async fn send_mail_via(
        &self,
        server: Option<&str>,
        port: Option<u16>,
        from: Option<&str>,
        to: &[String],
        subject: Option<&str>,
        body: &str,
    ) -> Result<(), DispatchError> {
        let host = server
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| self.host.clone());
        let Some(host) = host else {
            tracing::error!(backend = "mail", "No SMTP server configured");
            return Err(DispatchError::MailUnavailable(
                "no SMTP server configured".to_string(),
            ));
        };
        let port = port.unwrap_or(self.port);

        let message = build_message(from, to, subject, body).map_err(|e| {
            tracing::error!(backend = "mail", error = %e, "Failed to build mail");
            DispatchError::MailTransport(e.0)
        })?;

        let envelope = message.envelope().clone();
        let raw = message.formatted();
        let transport = Arc::clone(&self.transport);
        let timeout = self.timeout;

        let result = tokio::task::spawn_blocking(move || {
            let mut session = SessionGuard(transport.connect(&host, port, timeout)?);
            session.send(&envelope, &raw)
        })
        .await
        .unwrap_or_else(|e| Err(MailTransportFailure(format!("Mail task failed: {e}"))));

        match result {
            Ok(()) => {
                tracing::info!(backend = "mail", to = %to.join(", "), "An email was sent");
                Ok(())
            }
            Err(e) => {
                tracing::error!(backend = "mail", error = %e, "Mail transport failed");
                Err(DispatchError::MailTransport(e.0))
            }
        }
    }
}

impl std::fmt::Debug for MailBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailBackend")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Build a plain-text message. The `To` header lists every recipient,
/// comma separated; the envelope carries the bare addresses.
pub fn build_message(
    from: Option<&str>,
    to: &[String],
    subject: Option<&str>,
    body: &str,
) -> Result<Message, MailTransportFailure> {
    let from: Mailbox = from
        .ok_or_else(|| MailTransportFailure("Missing sender address (m_from)".into()))?
        .parse()
        .map_err(|e| MailTransportFailure(format!("Invalid from address: {e}")))?;

    if to.is_empty() {
        return Err(MailTransportFailure("Missing recipient address (m_to)".into()));
    }

    let mut builder = Message::builder().from(from);
    for addr in to {
        let mailbox: Mailbox = addr
            .parse()
            .map_err(|e| MailTransportFailure(format!("Invalid to address {addr}: {e}")))?;
        builder = builder.to(mailbox);
    }
    if let Some(subject) = subject {
        builder = builder.subject(subject);
    }

    builder
        .header(ContentType::TEXT_PLAIN)
        .body(body.to_string())
        .map_err(|e| MailTransportFailure(format!("Failed to build email: {e}")))
}
