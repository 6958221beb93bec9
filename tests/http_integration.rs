//! Integration tests for the courier REST surface.
//!
//! Each test spins up an Axum server on a random port with stub chat and
//! mail collaborators, then talks to it over real HTTP with reqwest.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lettre::address::Envelope;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use courier::config::MailDefaults;
use courier::error::{ChatClientError, MailTransportFailure};
use courier::notify::{
    ChatBackend, ChatClient, Dispatcher, MailBackend, MailSession, MailTransport, Normalizer,
};
use courier::routes::courier_routes;

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Chat collaborator that records posts and answers with a fixed result.
struct StubChat {
    result: Result<(), ChatClientError>,
    posts: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl ChatClient for StubChat {
    async fn post_message(&self, channel: &str, text: &str) -> Result<(), ChatClientError> {
        self.posts
            .lock()
            .unwrap()
            .push((channel.to_string(), text.to_string()));
        self.result.clone()
    }
}

#[derive(Default)]
struct RelayLog {
    open: usize,
    sent: Vec<(String, Vec<String>, String)>,
}

/// SMTP collaborator that records deliveries.
struct StubRelay {
    fail: bool,
    log: Arc<Mutex<RelayLog>>,
}

struct StubSession {
    fail: bool,
    log: Arc<Mutex<RelayLog>>,
}

impl MailTransport for StubRelay {
    fn connect(
        &self,
        _host: &str,
        _port: u16,
        _timeout: Duration,
    ) -> Result<Box<dyn MailSession>, MailTransportFailure> {
        self.log.lock().unwrap().open += 1;
        Ok(Box::new(StubSession {
            fail: self.fail,
            log: Arc::clone(&self.log),
        }))
    }
}

impl MailSession for StubSession {
    fn send(&mut self, envelope: &Envelope, message: &[u8]) -> Result<(), MailTransportFailure> {
        if self.fail {
            return Err(MailTransportFailure("Connection unexpectedly closed".into()));
        }
        self.log.lock().unwrap().sent.push((
            envelope.from().map(ToString::to_string).unwrap_or_default(),
            envelope.to().iter().map(ToString::to_string).collect(),
            String::from_utf8_lossy(message).into_owned(),
        ));
        Ok(())
    }

    fn close(&mut self) {
        self.log.lock().unwrap().open -= 1;
    }
}

struct Server {
    port: u16,
    chat: Arc<StubChat>,
    relay: Arc<Mutex<RelayLog>>,
}

impl Server {
    fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{path}", self.port)
    }
}

/// Start a courier server on a random port.
async fn start_server(chat_result: Result<(), ChatClientError>, mail_fails: bool) -> Server {
    let chat = Arc::new(StubChat {
        result: chat_result,
        posts: Mutex::new(Vec::new()),
    });
    let relay = Arc::new(Mutex::new(RelayLog::default()));

    let dispatcher = Dispatcher::new(
        Normalizer::new(
            Some("noc".into()),
            MailDefaults {
                from: Some("courier@example.com".into()),
                to: Some("ops@example.com".into()),
                subject: Some("Network notification".into()),
                body: None,
            },
        ),
        ChatBackend::new(chat.clone()),
        MailBackend::new(
            Some("mail.example.com".into()),
            25,
            Arc::new(StubRelay {
                fail: mail_fails,
                log: Arc::clone(&relay),
            }),
        ),
    );
    let app = courier_routes(Arc::new(dispatcher));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    Server { port, chat, relay }
}

async fn post(server: &Server, path: &str, body: Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(server.url(path))
        .json(&body)
        .send()
        .await
        .expect("request failed");
    let status = resp.status().as_u16();
    let json = resp.json::<Value>().await.expect("invalid JSON from server");
    (status, json)
}

// ── /notify_chat ────────────────────────────────────────────────────────

#[tokio::test]
async fn notify_chat_echoes_request() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(Ok(()), false).await;
        let body = json!({"source": "amlight/of_lldp", "m_body": "link up", "extra": 1});

        let (status, json) = post(&server, "/notify_chat", body.clone()).await;

        assert_eq!(status, 200);
        assert_eq!(json, body);
        let posts = server.chat.posts.lock().unwrap();
        assert_eq!(
            posts[0],
            ("noc".to_string(), "amlight/of_lldp link up".to_string())
        );
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn notify_chat_api_error_is_400() {
    timeout(TEST_TIMEOUT, async {
        let server =
            start_server(Err(ChatClientError::Api("channel_not_found".into())), false).await;

        let (status, json) = post(
            &server,
            "/notify_chat",
            json!({"channel": "missing", "m_body": "hi"}),
        )
        .await;

        assert_eq!(status, 400);
        assert_eq!(json["error"], "channel_not_found");
        assert_eq!(json["kind"], "ChatApiError");
        assert!(server.relay.lock().unwrap().sent.is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn notify_chat_missing_body_is_406() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(Ok(()), false).await;
        let (status, json) = post(&server, "/notify_chat", json!({"channel": "noc"})).await;
        assert_eq!(status, 406);
        assert_eq!(json["error"], "Missing the 'm_body' argument");
        assert!(server.chat.posts.lock().unwrap().is_empty());
    })
    .await
    .expect("test timed out");
}

// ── /notify_mail ────────────────────────────────────────────────────────

#[tokio::test]
async fn notify_mail_splits_recipients() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(Ok(()), false).await;
        let body = json!({
            "m_to": "a@x.com, b@y.com",
            "m_subject": "Maintenance",
            "m_body": "Window starts at 02:00"
        });

        let (status, json) = post(&server, "/notify_mail", body.clone()).await;

        assert_eq!(status, 200);
        assert_eq!(json, body);
        let relay = server.relay.lock().unwrap();
        assert_eq!(relay.open, 0);
        let (from, to, raw) = &relay.sent[0];
        assert_eq!(from, "courier@example.com");
        assert_eq!(to, &vec!["a@x.com".to_string(), "b@y.com".to_string()]);
        assert!(raw.contains("Subject: Maintenance"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn notify_mail_transport_error_is_400() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(Ok(()), true).await;
        let (status, json) = post(&server, "/notify_mail", json!({"m_body": "hi"})).await;
        assert_eq!(status, 400);
        assert_eq!(json["kind"], "MailTransportError");
        assert_eq!(json["error"], "Connection unexpectedly closed");
        assert_eq!(server.relay.lock().unwrap().open, 0);
    })
    .await
    .expect("test timed out");
}

// ── /notify ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn notify_uses_chat_when_it_works() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(Ok(()), false).await;
        let (status, _) = post(&server, "/notify", json!({"m_body": "hi"})).await;
        assert_eq!(status, 200);
        assert_eq!(server.chat.posts.lock().unwrap().len(), 1);
        assert!(server.relay.lock().unwrap().sent.is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn notify_falls_back_to_mail() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(Err(ChatClientError::Connection("refused".into())), false).await;
        let body = json!({"m_body": "controller restarted"});

        let (status, json) = post(&server, "/notify", body.clone()).await;

        assert_eq!(status, 200);
        assert_eq!(json, body);
        assert_eq!(server.chat.posts.lock().unwrap().len(), 1);
        let relay = server.relay.lock().unwrap();
        assert_eq!(relay.sent.len(), 1);
        assert_eq!(relay.sent[0].1, vec!["ops@example.com".to_string()]);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn notify_reports_final_backend_failure() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(Err(ChatClientError::Api("invalid_auth".into())), true).await;
        let (status, json) = post(&server, "/notify", json!({"m_body": "hi"})).await;
        assert_eq!(status, 400);
        assert_eq!(json["kind"], "MailTransportError");
    })
    .await
    .expect("test timed out");
}
