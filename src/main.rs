use std::sync::Arc;

use courier::config::CourierConfig;
use courier::events::{EVENT_BUFFER, EventBus, spawn_event_consumer, spawn_line_publisher};
use courier::notify::Dispatcher;
use courier::routes::courier_routes;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = CourierConfig::from_env();

    // ── Backends ─────────────────────────────────────────────────────────
    let dispatcher = Arc::new(Dispatcher::from_config(&config));
    let availability = dispatcher.availability();

    eprintln!("📨 Courier v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "   Chat: {}",
        if availability.chat_configured {
            format!(
                "enabled (default channel: {})",
                config.slack_channel.as_deref().unwrap_or("general")
            )
        } else {
            "disabled".to_string()
        }
    );
    eprintln!(
        "   Mail: {}",
        match &config.smtp_host {
            Some(host) => format!(
                "enabled (SMTP: {}:{}{})",
                host,
                config.smtp_port,
                if config.smtp_starttls { ", STARTTLS" } else { "" }
            ),
            None => "disabled".to_string(),
        }
    );
    if !availability.chat_configured && !availability.mail_configured {
        tracing::warn!("No notification backend configured; every request will fail");
    }

    // ── Events ───────────────────────────────────────────────────────────
    // Events arrive as JSON lines on stdin; the consumer stops at EOF.
    let (bus, rx) = EventBus::new(EVENT_BUFFER);
    let _consumer = spawn_event_consumer(Arc::clone(&dispatcher), rx);
    let _reader = spawn_line_publisher(tokio::io::BufReader::new(tokio::io::stdin()), bus);

    // ── HTTP ─────────────────────────────────────────────────────────────
    let app = courier_routes(dispatcher);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.http_port)).await?;
    tracing::info!(port = config.http_port, "Courier HTTP server started");
    eprintln!("   API: http://0.0.0.0:{}/notify\n", config.http_port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Courier is shutting down");
        })
        .await?;

    Ok(())
}
