//! Frame envelope and chat message types.
//!
//! Every frame on the wire is one JSON object carrying any subset of the
//! recognized uppercase fields. Absent fields are omitted when encoding and
//! unknown fields are ignored when decoding, so the two sides can evolve
//! independently.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// Reserved recipient value meaning "every connected user".
pub const BROADCAST: &str = "ALL";

/// A single chat message, as carried in the `MESSAGES` field and persisted
/// in the backlog. Immutable once created; ordering is by arrival only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: String,
    pub recipient: String,
    /// Unix seconds at the sender.
    pub timestamp: i64,
    pub body: String,
}

impl ChatMessage {
    pub fn is_broadcast(&self) -> bool {
        self.recipient == BROADCAST
    }
}

/// The `BROWSER` field: a search request from the client, or the redirect
/// URL in the server's reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BrowserField {
    /// Server reply: the redirect URL to open.
    Redirect(String),
    /// Client request: `[query, sharer, share]`. A non-zero share flag asks
    /// the server to announce the search to everyone online.
    Request(String, String, u8),
}

/// One wire frame. Any subset of fields may appear together; a frame may
/// for example carry both a `MESSAGES` batch and a `BROWSER` request.
///
/// `MESSAGES` is kept as raw JSON on decode: the shape of each entry is
/// validated per batch via [`parse_batch`], so a malformed batch can be
/// answered with an `ERROR` reply instead of killing the connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "USERNAME", default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(
        rename = "USERNAME_ACCEPTED",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub username_accepted: Option<bool>,

    #[serde(rename = "INFO", default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,

    #[serde(rename = "USER_LIST", default, skip_serializing_if = "Option::is_none")]
    pub user_list: Option<Vec<String>>,

    #[serde(rename = "MESSAGES", default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Value>,

    #[serde(rename = "USERS_JOINED", default, skip_serializing_if = "Option::is_none")]
    pub users_joined: Option<Vec<String>>,

    #[serde(rename = "USERS_LEFT", default, skip_serializing_if = "Option::is_none")]
    pub users_left: Option<Vec<String>>,

    #[serde(rename = "ERROR", default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(rename = "BROWSER", default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<BrowserField>,
}

impl Frame {
    /// Handshake request carrying the candidate display name.
    pub fn username(name: impl Into<String>) -> Self {
        Self {
            username: Some(name.into()),
            ..Self::default()
        }
    }

    /// Handshake acceptance: greeting, roster in join order, and the
    /// backlog messages visible to the new user.
    pub fn handshake_accepted(
        greeting: impl Into<String>,
        roster: Vec<String>,
        backlog: &[ChatMessage],
    ) -> Self {
        Self {
            username_accepted: Some(true),
            info: Some(greeting.into()),
            user_list: Some(roster),
            messages: serde_json::to_value(backlog).ok(),
            ..Self::default()
        }
    }

    /// Handshake rejection with a human-readable reason.
    pub fn handshake_rejected(reason: impl Into<String>) -> Self {
        Self {
            username_accepted: Some(false),
            info: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn messages(batch: &[ChatMessage]) -> Self {
        Self {
            messages: serde_json::to_value(batch).ok(),
            ..Self::default()
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self {
            info: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            error: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn users_joined(names: Vec<String>) -> Self {
        Self {
            users_joined: Some(names),
            ..Self::default()
        }
    }

    pub fn users_left(names: Vec<String>) -> Self {
        Self {
            users_left: Some(names),
            ..Self::default()
        }
    }

    pub fn browser_request(query: impl Into<String>, sharer: impl Into<String>, share: bool) -> Self {
        Self {
            browser: Some(BrowserField::Request(
                query.into(),
                sharer.into(),
                share as u8,
            )),
            ..Self::default()
        }
    }

    pub fn browser_redirect(url: impl Into<String>) -> Self {
        Self {
            browser: Some(BrowserField::Redirect(url.into())),
            ..Self::default()
        }
    }
}

/// Validate a raw `MESSAGES` value into typed chat messages.
///
/// Shape or type violations (non-array value, non-string sender/recipient/
/// body, non-integer timestamp) yield [`ProtocolError::MalformedMessage`].
pub fn parse_batch(raw: Value) -> Result<Vec<ChatMessage>, ProtocolError> {
    serde_json::from_value(raw).map_err(|e| ProtocolError::MalformedMessage(e.to_string()))
}
