//! Per-connection session — the handshake-then-authenticated state machine.
//!
//! Each accepted connection runs one session task. Inbound frames and the
//! session's outbound queue are multiplexed in a single `select!` loop, so
//! router deliveries and server pushes interleave FIFO on the wire. The
//! session is generic over the stream type; TLS never leaks in here.

use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing::{info, warn};

use parley_shared::protocol::{BrowserField, Frame};
use parley_shared::{FrameCodec, ProtocolError};

use crate::error::ServerError;
use crate::registry::{ConnId, Outbound, Registration, Registry};
use crate::router::Router;

/// Shared server state handed to every session task.
#[derive(Clone)]
pub struct SessionState {
    pub registry: Registry,
    pub router: Router,
    pub greeting: String,
}

/// Serve one connection until it closes.
///
/// On exit — clean close, truncated frame, or unrecoverable error — the
/// connection is unregistered exactly once, and if a name was bound the
/// remaining users are told it left.
pub async fn run<S>(stream: S, peer: SocketAddr, state: SessionState) -> Result<(), ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let conn = state.registry.next_conn_id();
    let mut framed = Framed::new(stream, FrameCodec);
    let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();
    let mut registered: Option<String> = None;

    let result = drive(&mut framed, &mut rx, &tx, conn, peer, &mut registered, &state).await;

    if let Some(name) = state.registry.unregister(conn).await {
        info!(%peer, name = %name, "User left");
        state
            .router
            .broadcast_notice(Frame::users_left(vec![name]), None)
            .await;
    }

    result
}

async fn drive<S>(
    framed: &mut Framed<S, FrameCodec>,
    rx: &mut mpsc::UnboundedReceiver<Frame>,
    tx: &Outbound,
    conn: ConnId,
    peer: SocketAddr,
    registered: &mut Option<String>,
    state: &SessionState,
) -> Result<(), ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            inbound = framed.next() => {
                let frame = match inbound {
                    Some(Ok(frame)) => frame,
                    Some(Err(ProtocolError::FrameTruncated)) => {
                        warn!(%peer, "Stream closed mid-frame");
                        return Ok(());
                    }
                    Some(Err(e)) => {
                        warn!(%peer, error = %e, "Unrecoverable read error");
                        return Ok(());
                    }
                    // Clean close between frames.
                    None => return Ok(()),
                };

                match registered {
                    None => {
                        handshake(framed, tx, conn, peer, registered, state, frame).await?;
                    }
                    Some(name) => {
                        let name = name.clone();
                        authenticated(conn, &name, frame, tx, state).await?;
                    }
                }
            }
            // `tx` is held by this task, so the queue never reports closed.
            Some(outbound) = rx.recv() => {
                framed.send(outbound).await?;
            }
        }
    }
}

/// AWAITING_HANDSHAKE: the frame must carry a candidate username. On
/// rejection the session stays in this state so the client can retry.
async fn handshake<S>(
    framed: &mut Framed<S, FrameCodec>,
    tx: &Outbound,
    conn: ConnId,
    peer: SocketAddr,
    registered: &mut Option<String>,
    state: &SessionState,
    frame: Frame,
) -> Result<(), ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let Some(name) = frame.username else {
        framed
            .send(Frame::error("A username is required before chatting."))
            .await?;
        return Ok(());
    };

    // Registration and the backlog snapshot are one atomic step, so a
    // broadcast racing this join lands in exactly one of: the snapshot
    // below, or the live fan-out once this session is registered.
    match state.router.admit(conn, &name, tx.clone()).await {
        (Registration::Rejected { reason }, _) => {
            info!(%peer, name = %name, "Rejected handshake");
            framed.send(Frame::handshake_rejected(reason)).await?;
        }
        (Registration::Accepted { roster }, backlog) => {
            info!(%peer, name = %name, "User joined");
            framed
                .send(Frame::handshake_accepted(
                    state.greeting.clone(),
                    roster,
                    &backlog,
                ))
                .await?;
            state
                .router
                .broadcast_notice(Frame::users_joined(vec![name.clone()]), Some(conn))
                .await;
            *registered = Some(name);
        }
    }
    Ok(())
}

/// AUTHENTICATED: a frame may carry a chat batch and/or a search request;
/// both are honored when both are present.
async fn authenticated(
    conn: ConnId,
    name: &str,
    frame: Frame,
    tx: &Outbound,
    state: &SessionState,
) -> Result<(), ServerError> {
    if let Some(raw) = frame.messages {
        state.router.route(raw, conn, tx).await?;
    }

    if let Some(BrowserField::Request(query, _sharer, share)) = frame.browser {
        state.router.search(&query, name, share != 0, tx).await;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::DuplexStream;

    use parley_shared::protocol::{self, ChatMessage};

    use crate::backlog::Backlog;

    async fn state(dir: &TempDir) -> SessionState {
        let backlog = Backlog::open(&dir.path().join("backup.txt")).await.unwrap();
        let registry = Registry::new();
        SessionState {
            router: Router::new(registry.clone(), backlog),
            registry,
            greeting: "Welcome to the server!".to_string(),
        }
    }

    /// Connect an in-memory client to a freshly spawned session task.
    fn connect(state: &SessionState) -> Framed<DuplexStream, FrameCodec> {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let peer: SocketAddr = ([127, 0, 0, 1], 0).into();
        let state = state.clone();
        tokio::spawn(async move {
            let _ = run(server, peer, state).await;
        });
        Framed::new(client, FrameCodec)
    }

    async fn recv(client: &mut Framed<DuplexStream, FrameCodec>) -> Frame {
        client.next().await.expect("stream closed").expect("decode")
    }

    fn chat(sender: &str, recipient: &str, body: &str) -> Frame {
        Frame::messages(&[ChatMessage {
            sender: sender.into(),
            recipient: recipient.into(),
            timestamp: 1000,
            body: body.into(),
        }])
    }

    fn bodies(frame: &Frame) -> Vec<String> {
        protocol::parse_batch(frame.messages.clone().unwrap())
            .unwrap()
            .into_iter()
            .map(|m| m.body)
            .collect()
    }

    #[tokio::test]
    async fn test_handshake_accept_and_roster() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir).await;

        let mut bob = connect(&state);
        bob.send(Frame::username("bob")).await.unwrap();

        let reply = recv(&mut bob).await;
        assert_eq!(reply.username_accepted, Some(true));
        assert_eq!(reply.user_list.as_deref(), Some(&["bob".to_string()][..]));
        assert_eq!(reply.info.as_deref(), Some("Welcome to the server!"));
        assert!(bodies(&reply).is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected_then_retry() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir).await;

        let mut bob = connect(&state);
        bob.send(Frame::username("bob")).await.unwrap();
        assert_eq!(recv(&mut bob).await.username_accepted, Some(true));

        let mut intruder = connect(&state);
        intruder.send(Frame::username("bob")).await.unwrap();
        let reply = recv(&mut intruder).await;
        assert_eq!(reply.username_accepted, Some(false));
        assert!(reply.info.unwrap().contains("already in use"));

        // Same connection retries with a fresh name.
        intruder.send(Frame::username("carol")).await.unwrap();
        let reply = recv(&mut intruder).await;
        assert_eq!(reply.username_accepted, Some(true));
        assert_eq!(reply.user_list.unwrap(), ["bob", "carol"]);
    }

    #[tokio::test]
    async fn test_chat_before_handshake_rejected() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir).await;

        let mut client = connect(&state);
        client.send(chat("bob", "ALL", "hi")).await.unwrap();

        let reply = recv(&mut client).await;
        assert!(reply.error.is_some());
        assert!(state.registry.snapshot_names().await.is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_echo_and_late_joiner_backlog() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir).await;

        let mut bob = connect(&state);
        bob.send(Frame::username("bob")).await.unwrap();
        assert_eq!(recv(&mut bob).await.username_accepted, Some(true));

        bob.send(chat("bob", "ALL", "hi")).await.unwrap();

        // The sender hears its own broadcast back.
        let echo = recv(&mut bob).await;
        assert_eq!(bodies(&echo), ["hi"]);

        // A later joiner gets the message in the handshake backlog.
        let mut carol = connect(&state);
        carol.send(Frame::username("carol")).await.unwrap();
        let reply = recv(&mut carol).await;
        assert_eq!(reply.username_accepted, Some(true));
        assert_eq!(
            reply.user_list.as_deref(),
            Some(&["bob".to_string(), "carol".to_string()][..])
        );
        assert_eq!(bodies(&reply), ["hi"]);

        // And bob is told carol joined.
        let notice = recv(&mut bob).await;
        assert_eq!(notice.users_joined.unwrap(), ["carol"]);
    }

    #[tokio::test]
    async fn test_join_racing_broadcast_sees_it_exactly_once() {
        for round in 0..100 {
            let dir = TempDir::new().unwrap();
            let state = state(&dir).await;

            let mut bob = connect(&state);
            bob.send(Frame::username("bob")).await.unwrap();
            assert_eq!(recv(&mut bob).await.username_accepted, Some(true));

            // Carol handshakes while bob's broadcast is in flight.
            let mut carol = connect(&state);
            let (sent, joined) = tokio::join!(
                bob.send(chat("bob", "ALL", "hi")),
                carol.send(Frame::username("carol")),
            );
            sent.unwrap();
            joined.unwrap();

            let reply = recv(&mut carol).await;
            assert_eq!(reply.username_accepted, Some(true));
            let mut copies = bodies(&reply).iter().filter(|b| b.as_str() == "hi").count();

            // Carol is registered once her acceptance is on the wire, so a
            // marker broadcast must reach her live; everything before the
            // marker is the window under test.
            bob.send(chat("bob", "ALL", "done")).await.unwrap();
            loop {
                let frame = recv(&mut carol).await;
                let Some(raw) = frame.messages.clone() else {
                    continue;
                };
                let batch = protocol::parse_batch(raw).unwrap();
                if batch.iter().any(|m| m.body == "done") {
                    break;
                }
                copies += batch.iter().filter(|m| m.body == "hi").count();
            }

            assert_eq!(copies, 1, "round {round}: wrong copy count");
        }
    }

    #[tokio::test]
    async fn test_disconnect_broadcasts_leave_notice() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir).await;

        let mut bob = connect(&state);
        bob.send(Frame::username("bob")).await.unwrap();
        assert_eq!(recv(&mut bob).await.username_accepted, Some(true));

        let mut carol = connect(&state);
        carol.send(Frame::username("carol")).await.unwrap();
        assert_eq!(recv(&mut carol).await.username_accepted, Some(true));
        assert_eq!(recv(&mut bob).await.users_joined.unwrap(), ["carol"]);

        drop(carol);

        let notice = recv(&mut bob).await;
        assert_eq!(notice.users_left.unwrap(), ["carol"]);
        assert_eq!(state.registry.snapshot_names().await, ["bob"]);
    }

    #[tokio::test]
    async fn test_search_request_in_session() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir).await;

        let mut bob = connect(&state);
        bob.send(Frame::username("bob")).await.unwrap();
        assert_eq!(recv(&mut bob).await.username_accepted, Some(true));

        bob.send(Frame::browser_request("ferris", "bob", false))
            .await
            .unwrap();
        let reply = recv(&mut bob).await;
        assert_eq!(
            reply.browser,
            Some(BrowserField::Redirect(
                "https://www.google.com/search?q=ferris".into()
            ))
        );
    }
}
