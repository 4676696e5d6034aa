//! Rendering of inbound frames for the terminal.

use chrono::{Local, TimeZone};
use serde_json::Value;

use parley_shared::protocol::{self, BrowserField, ChatMessage, Frame};

#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    pub show_time: bool,
    pub show_user: bool,
    pub message_gap: bool,
}

/// Turn one inbound frame into the lines to print, in order.
pub fn render_frame(frame: &Frame, opts: RenderOptions) -> Vec<String> {
    let mut lines = Vec::new();

    if let Some(raw) = frame.messages.clone() {
        lines.extend(render_batch(raw, opts));
    }

    if let Some(joined) = &frame.users_joined {
        for name in joined {
            lines.push(format!("{name} has joined the server!"));
        }
    }

    if let Some(left) = &frame.users_left {
        for name in left {
            lines.push(format!("{name} has left the server. Bye!"));
        }
    }

    if let Some(info) = &frame.info {
        lines.push(format!("The server says: {info}"));
    }

    if let Some(error) = &frame.error {
        lines.push(format!("The server responded with this error: {error}"));
    }

    if let Some(BrowserField::Redirect(url)) = &frame.browser {
        lines.push(format!("Open this search in your browser: {url}"));
    }

    lines
}

/// Render a raw `MESSAGES` value, surfacing a malformed batch as a line
/// rather than dropping it silently. Used for both the handshake backlog
/// and live frames.
pub fn render_batch(raw: Value, opts: RenderOptions) -> Vec<String> {
    match protocol::parse_batch(raw) {
        Ok(batch) => {
            let mut lines = Vec::new();
            for msg in &batch {
                lines.push(render_message(msg, opts));
                if opts.message_gap {
                    lines.push(String::new());
                }
            }
            lines
        }
        Err(e) => vec![format!("Could not read a message from the server: {e}")],
    }
}

pub fn render_message(msg: &ChatMessage, opts: RenderOptions) -> String {
    match (opts.show_time, opts.show_user) {
        (true, true) => format!(
            "At {}, {} said: {}",
            local_time(msg.timestamp),
            msg.sender,
            msg.body
        ),
        (true, false) => format!("{}: {}", local_time(msg.timestamp), msg.body),
        (false, true) => format!("{} said: {}", msg.sender, msg.body),
        (false, false) => msg.body.clone(),
    }
}

fn local_time(timestamp: i64) -> String {
    match Local.timestamp_opt(timestamp, 0).single() {
        Some(time) => time.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => timestamp.to_string(),
    }
}
