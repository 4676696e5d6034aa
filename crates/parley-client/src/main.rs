//! # parley-client
//!
//! Terminal client for the Parley relay. Connects over mutually-
//! authenticated TLS, registers a display name, then multiplexes inbound
//! frames with console input: plain lines broadcast, `@name` lines go to
//! one user, `!`/`!y` lines delegate a web search, `quit` disconnects.

mod compose;
mod config;
mod render;

use std::io::Write as _;
use std::sync::Arc;

use chrono::Utc;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader, Lines, Stdin};
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig as TlsConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tokio_util::codec::Framed;
use tracing_subscriber::EnvFilter;

use parley_shared::protocol::{ChatMessage, Frame};
use parley_shared::FrameCodec;

use crate::compose::Outgoing;
use crate::config::ClientConfig;
use crate::render::RenderOptions;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let config = ClientConfig::from_env();
    let opts = RenderOptions {
        show_time: config.show_time,
        show_user: config.show_user,
        message_gap: config.message_gap,
    };

    let connector = build_connector(&config)?;
    let tcp = TcpStream::connect(&config.server_addr).await?;
    let server_name = ServerName::try_from(config.server_name.clone())?;
    let stream = connector.connect(server_name, tcp).await?;
    tracing::debug!(addr = %config.server_addr, "TLS connection established");
    let mut framed = Framed::new(stream, FrameCodec);

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    let Some(username) = handshake(&mut framed, &mut stdin, &config, opts).await? else {
        return Ok(());
    };

    chat_loop(&mut framed, &mut stdin, &username, opts).await
}

fn build_connector(config: &ClientConfig) -> anyhow::Result<TlsConnector> {
    let ca_pem = std::fs::read(&config.ca_path)?;
    let mut roots = RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut &ca_pem[..]) {
        roots.add(cert?)?;
    }

    let cert_pem = std::fs::read(&config.cert_path)?;
    let certs = rustls_pemfile::certs(&mut &cert_pem[..]).collect::<Result<Vec<_>, _>>()?;

    let key_pem = std::fs::read(&config.key_path)?;
    let key = rustls_pemfile::private_key(&mut &key_pem[..])?.ok_or_else(|| {
        anyhow::anyhow!("no private key found in {}", config.key_path.display())
    })?;

    let tls = TlsConfig::builder()
        .with_root_certificates(roots)
        .with_client_auth_cert(certs, key)?;

    Ok(TlsConnector::from(Arc::new(tls)))
}

/// Prompt for a username until the server accepts one. Returns `None` if
/// the user quits at the prompt or stdin closes.
async fn handshake<S>(
    framed: &mut Framed<S, FrameCodec>,
    stdin: &mut Lines<BufReader<Stdin>>,
    config: &ClientConfig,
    opts: RenderOptions,
) -> anyhow::Result<Option<String>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        print!("Please enter your username: ");
        std::io::stdout().flush()?;

        let Some(line) = stdin.next_line().await? else {
            return Ok(None);
        };
        let name = line.trim().to_string();
        if name == "quit" {
            return Ok(None);
        }
        if name.is_empty() {
            continue;
        }

        framed.send(Frame::username(&name)).await?;
        let Some(reply) = framed.next().await else {
            anyhow::bail!("server closed the connection during the handshake");
        };
        let reply = reply?;

        match reply.username_accepted {
            Some(true) => {
                println!("\nConnected to {} as {name}!", config.server_addr);
                if let Some(info) = &reply.info {
                    println!("The server says: {info}");
                }
                match reply.user_list.as_deref() {
                    Some([only]) if only == &name => println!("You are the only user online!\n"),
                    Some(roster) => println!("Users online: {}\n", roster.join(", ")),
                    None => {}
                }
                if let Some(raw) = reply.messages.clone() {
                    for line in render::render_batch(raw, opts) {
                        println!("{line}");
                    }
                }
                return Ok(Some(name));
            }
            Some(false) => {
                let info = reply.info.unwrap_or_else(|| "No info provided.".to_string());
                println!("{info} Please try another name, or type quit to give up.");
            }
            // Not a handshake reply — nothing to do with it yet.
            None => {}
        }
    }
}

async fn chat_loop<S>(
    framed: &mut Framed<S, FrameCodec>,
    stdin: &mut Lines<BufReader<Stdin>>,
    username: &str,
    opts: RenderOptions,
) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            inbound = framed.next() => {
                let frame = match inbound {
                    Some(Ok(frame)) => frame,
                    Some(Err(e)) => anyhow::bail!("connection error: {e}"),
                    None => {
                        println!("Server closed the connection.");
                        return Ok(());
                    }
                };
                for line in render::render_frame(&frame, opts) {
                    println!("{line}");
                }
            }
            line = stdin.next_line() => {
                // Stdin closing behaves like `quit`.
                let Some(line) = line? else {
                    framed.close().await?;
                    return Ok(());
                };
                match compose::parse_line(&line) {
                    None => {}
                    Some(Outgoing::Quit) => {
                        framed.close().await?;
                        return Ok(());
                    }
                    Some(Outgoing::Chat { recipient, body }) => {
                        let msg = ChatMessage {
                            sender: username.to_string(),
                            recipient,
                            timestamp: Utc::now().timestamp(),
                            body,
                        };
                        framed.send(Frame::messages(&[msg])).await?;
                    }
                    Some(Outgoing::Search { query, share }) => {
                        framed
                            .send(Frame::browser_request(query, username, share))
                            .await?;
                    }
                }
            }
        }
    }
}
