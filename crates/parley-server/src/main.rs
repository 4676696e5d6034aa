//! # parley-server
//!
//! Encrypted chat relay. Clients connect over mutually-authenticated TLS,
//! register a unique display name, receive the roster and message backlog,
//! then exchange broadcast and direct messages until they disconnect.
//!
//! One tokio task per connection; the user registry and the append-only
//! message backlog are the only shared state, each behind its own lock.

mod backlog;
mod config;
mod error;
mod registry;
mod router;
mod search;
mod session;
mod tls;

use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::backlog::Backlog;
use crate::config::ServerConfig;
use crate::registry::Registry;
use crate::router::Router;
use crate::session::SessionState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,parley_server=debug")),
        )
        .init();

    info!("Starting Parley relay server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    let backlog = Backlog::open(&config.backlog_path).await?;
    let history = backlog.broadcasts().await;
    if !history.is_empty() {
        info!(messages = history.len(), "Restored message backlog");
        for msg in &history {
            println!("{} said: {}", msg.sender, msg.body);
        }
    }

    let registry = Registry::new();
    let router = Router::new(registry.clone(), backlog);
    let state = SessionState {
        registry,
        router,
        greeting: config.greeting.clone(),
    };

    let acceptor = tls::build_acceptor(&config.cert_path, &config.key_path, &config.ca_path)?;

    let listener = TcpListener::bind(config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening");

    tokio::select! {
        result = accept_loop(listener, acceptor, state) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}

async fn accept_loop(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    state: SessionState,
) -> anyhow::Result<()> {
    loop {
        let (socket, peer) = listener.accept().await?;
        info!(%peer, "Accepted connection");

        let acceptor = acceptor.clone();
        let state = state.clone();
        tokio::spawn(async move {
            let stream = match acceptor.accept(socket).await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(%peer, error = %e, "TLS handshake failed");
                    return;
                }
            };

            if let Err(e) = session::run(stream, peer, state).await {
                error!(%peer, error = %e, "Session failed");
                if e.is_fatal() {
                    // The durable log can no longer be written to.
                    std::process::exit(1);
                }
            }
            info!(%peer, "Connection closed");
        });
    }
}
