//! Parsing of local console input into outgoing actions.
//!
//! - `quit` closes the connection.
//! - `@name text` sends a direct message; the recipient sees the full line,
//!   prefix included.
//! - `!query` asks the server for a search redirect; `!y query` also shares
//!   the search with everyone online.
//! - Anything else is a broadcast.

use parley_shared::BROADCAST;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Quit,
    Chat { recipient: String, body: String },
    Search { query: String, share: bool },
}

/// Parse one console line. Returns `None` for blank input.
pub fn parse_line(line: &str) -> Option<Outgoing> {
    let line = line.trim_end_matches(['\r', '\n']);

    if line == "quit" {
        return Some(Outgoing::Quit);
    }
    if line.is_empty() {
        return None;
    }

    if let Some(rest) = line.strip_prefix('@') {
        let recipient = rest.split(' ').next().unwrap_or(rest);
        if recipient.is_empty() {
            return None;
        }
        return Some(Outgoing::Chat {
            recipient: recipient.to_string(),
            body: line.to_string(),
        });
    }

    if let Some(rest) = line.strip_prefix('!') {
        return Some(match rest.strip_prefix("y ") {
            Some(query) => Outgoing::Search {
                query: query.to_string(),
                share: true,
            },
            None => Outgoing::Search {
                query: rest.to_string(),
                share: false,
            },
        });
    }

    Some(Outgoing::Chat {
        recipient: BROADCAST.to_string(),
        body: line.to_string(),
    })
}
