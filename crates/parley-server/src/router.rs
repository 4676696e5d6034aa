//! Message routing — decides which sessions receive a decoded batch and
//! performs delivery plus backlog persistence.
//!
//! Validation failures are reported back to the sender and never touch any
//! other session. Delivery is best-effort per destination: a dead outbound
//! channel is skipped, and the failure surfaces when that destination's own
//! session tears down.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use parley_shared::protocol::{self, ChatMessage, Frame};

use crate::backlog::Backlog;
use crate::error::ServerError;
use crate::registry::{ConnId, Outbound, Registration, Registry};
use crate::search;

/// Resolved destination of one message, captured before delivery.
enum Destination {
    Everyone,
    One(Outbound),
}

#[derive(Clone)]
pub struct Router {
    registry: Registry,
    backlog: Backlog,
    /// Serializes [`Router::admit`] against [`Router::route`]: a joining
    /// user either appears in a broadcast's fan-out or finds the message in
    /// its handshake snapshot, never neither and never both.
    gate: Arc<Mutex<()>>,
}

impl Router {
    pub fn new(registry: Registry, backlog: Backlog) -> Self {
        Self {
            registry,
            backlog,
            gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn backlog(&self) -> &Backlog {
        &self.backlog
    }

    /// Register `conn` under `name` and snapshot the backlog visible to it
    /// as one step. No batch is routed between the registration and the
    /// snapshot, so the snapshot plus subsequent live delivery cover every
    /// message exactly once.
    pub async fn admit(
        &self,
        conn: ConnId,
        name: &str,
        tx: Outbound,
    ) -> (Registration, Vec<ChatMessage>) {
        let _gate = self.gate.lock().await;
        match self.registry.register(conn, name, tx).await {
            Registration::Accepted { roster } => {
                let visible = self.backlog.visible_to(name).await;
                (Registration::Accepted { roster }, visible)
            }
            rejected => (rejected, Vec::new()),
        }
    }

    /// Route one inbound `MESSAGES` batch from the authenticated session
    /// `conn`. Protocol violations are answered on `reply` and discard the
    /// whole batch; only backlog write failures propagate, and those are
    /// fatal to the process.
    pub async fn route(
        &self,
        raw: Value,
        conn: ConnId,
        reply: &Outbound,
    ) -> Result<(), ServerError> {
        let batch = match protocol::parse_batch(raw) {
            Ok(batch) => batch,
            Err(e) => {
                debug!(%conn, error = %e, "Discarding malformed batch");
                let _ = reply.send(Frame::error("Message has incorrect type."));
                return Ok(());
            }
        };

        // The registry name bound to the submitting connection is the only
        // acceptable sender. No partial application: one mismatch discards
        // the whole batch.
        let Some(sender_name) = self.registry.name_of(conn).await else {
            return Ok(());
        };
        if batch.iter().any(|m| m.sender != sender_name) {
            debug!(%conn, name = %sender_name, "Discarding batch with forged sender");
            let _ = reply.send(Frame::error("Source username is not correct."));
            return Ok(());
        }

        let _gate = self.gate.lock().await;

        // Messages that reached a recipient; persisted as one record.
        let mut durable: Vec<ChatMessage> = Vec::new();
        let mut deliveries: Vec<(Destination, ChatMessage)> = Vec::new();

        for msg in batch {
            if msg.is_broadcast() {
                durable.push(msg.clone());
                deliveries.push((Destination::Everyone, msg));
            } else {
                match self.registry.resolve(&msg.recipient).await {
                    Some(tx) => {
                        durable.push(msg.clone());
                        deliveries.push((Destination::One(tx), msg));
                    }
                    None => {
                        debug!(
                            %conn,
                            recipient = %msg.recipient,
                            "Dropping message to unknown recipient"
                        );
                        let _ = reply
                            .send(Frame::error("The user you specified could not be found."));
                    }
                }
            }
        }

        // Durable before fan-out: once a copy is on any wire, a crash can
        // no longer lose the message.
        if !durable.is_empty() {
            self.backlog.append(&durable).await?;
        }

        for (dest, msg) in deliveries {
            let frame = Frame::messages(std::slice::from_ref(&msg));
            match dest {
                Destination::Everyone => {
                    info!("{} says: {}", msg.sender, msg.body);
                    for tx in self.registry.peers(None).await {
                        let _ = tx.send(frame.clone());
                    }
                }
                Destination::One(tx) => {
                    let _ = tx.send(frame);
                }
            }
        }
        Ok(())
    }

    /// Handle a `BROWSER` search request: always answer the requester with
    /// the redirect URL; when sharing, announce the search to everyone
    /// online. The announcement is informational and never persisted.
    pub async fn search(&self, query: &str, sharer: &str, share: bool, reply: &Outbound) {
        let _ = reply.send(Frame::browser_redirect(search::redirect_url(query)));

        if share {
            info!("{sharer} has just searched the following: {query}");
            self.broadcast_notice(
                Frame::info(format!("{sharer} has just searched the following: {query}")),
                None,
            )
            .await;
        }
    }

    /// Fan an informational frame (join/leave notices, search shares) out
    /// to every authenticated session except `exclude`. Never persisted.
    pub async fn broadcast_notice(&self, frame: Frame, exclude: Option<ConnId>) {
        for tx in self.registry.peers(exclude).await {
            let _ = tx.send(frame.clone());
        }
    }
}
