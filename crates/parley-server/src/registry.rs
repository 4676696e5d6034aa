//! The user registry — the single owner of all live users.
//!
//! Maps each connection to its display name and outbound channel, enforcing
//! name uniqueness. Every operation takes the one registry lock, so
//! check-then-bind sequences are never interleaved across connections.
//! Entries are kept in join order, which is also the roster order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use parley_shared::protocol::Frame;

/// Identity of one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(u64);

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Outbound channel of one session. Frames queued here are drained by that
/// session's own write path, FIFO, with no priority between router
/// deliveries and server pushes.
///
/// Unbounded on purpose: a stalled peer buffers here without ever blocking
/// the router or another session, and the buffer is reclaimed when the
/// peer's session tears down. Bounding it would force routing to either
/// block on the slowest client or drop already-persisted messages.
pub type Outbound = mpsc::UnboundedSender<Frame>;

struct UserEntry {
    conn: ConnId,
    name: String,
    tx: Outbound,
}

/// Outcome of a handshake registration attempt.
pub enum Registration {
    /// Bound. Carries the roster snapshot, in join order, including the
    /// new user.
    Accepted { roster: Vec<String> },
    /// The name is empty or already bound to a live connection.
    Rejected { reason: String },
}

/// Cheaply clonable handle to the shared registry.
#[derive(Clone)]
pub struct Registry {
    users: Arc<Mutex<Vec<UserEntry>>>,
    next_conn: Arc<AtomicU64>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            users: Arc::new(Mutex::new(Vec::new())),
            next_conn: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Allocate an identity for a freshly accepted connection.
    pub fn next_conn_id(&self) -> ConnId {
        ConnId(self.next_conn.fetch_add(1, Ordering::Relaxed))
    }

    /// Bind `name` to `conn` if it is valid and not already taken.
    /// The duplicate check and the bind are one critical section.
    pub async fn register(&self, conn: ConnId, name: &str, tx: Outbound) -> Registration {
        if name.is_empty() {
            return Registration::Rejected {
                reason: "Username must not be empty.".to_string(),
            };
        }

        let mut users = self.users.lock().await;
        if users.iter().any(|u| u.name == name) {
            return Registration::Rejected {
                reason: "Username already in use.".to_string(),
            };
        }

        users.push(UserEntry {
            conn,
            name: name.to_string(),
            tx,
        });
        debug!(%conn, name, "registered user");

        Registration::Accepted {
            roster: users.iter().map(|u| u.name.clone()).collect(),
        }
    }

    /// Remove the binding for `conn`, returning the name it held.
    /// Idempotent: a second call for the same connection is a no-op.
    pub async fn unregister(&self, conn: ConnId) -> Option<String> {
        let mut users = self.users.lock().await;
        let pos = users.iter().position(|u| u.conn == conn)?;
        let entry = users.remove(pos);
        debug!(%conn, name = %entry.name, "unregistered user");
        Some(entry.name)
    }

    /// Outbound channel of the user registered under `name`, if online.
    pub async fn resolve(&self, name: &str) -> Option<Outbound> {
        let users = self.users.lock().await;
        users.iter().find(|u| u.name == name).map(|u| u.tx.clone())
    }

    /// Name bound to `conn`, if the connection completed its handshake.
    pub async fn name_of(&self, conn: ConnId) -> Option<String> {
        let users = self.users.lock().await;
        users.iter().find(|u| u.conn == conn).map(|u| u.name.clone())
    }

    /// Currently registered names, in join order.
    pub async fn snapshot_names(&self) -> Vec<String> {
        let users = self.users.lock().await;
        users.iter().map(|u| u.name.clone()).collect()
    }

    /// Outbound channels of every registered user except `exclude`.
    pub async fn peers(&self, exclude: Option<ConnId>) -> Vec<Outbound> {
        let users = self.users.lock().await;
        users
            .iter()
            .filter(|u| Some(u.conn) != exclude)
            .map(|u| u.tx.clone())
            .collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
