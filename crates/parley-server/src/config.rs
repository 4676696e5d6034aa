//! Server configuration loaded from environment variables.
//!
//! All settings have defaults suitable for local development, so the server
//! starts with zero configuration once the TLS material is in place.

use std::net::SocketAddr;
use std::path::PathBuf;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to listen on.
    /// Env: `LISTEN_ADDR`
    /// Default: `127.0.0.1:1060`
    pub listen_addr: SocketAddr,

    /// PEM certificate chain presented to clients.
    /// Env: `TLS_CERT`
    /// Default: `certs/server.crt`
    pub cert_path: PathBuf,

    /// PEM private key for the certificate.
    /// Env: `TLS_KEY`
    /// Default: `certs/server.key`
    pub key_path: PathBuf,

    /// PEM trust roots used to verify client certificates.
    /// Env: `TLS_CA`
    /// Default: `certs/ca.crt`
    pub ca_path: PathBuf,

    /// Append-only backlog file, replayed at startup.
    /// Env: `BACKLOG_PATH`
    /// Default: `backup.txt`
    pub backlog_path: PathBuf,

    /// Greeting sent in the handshake acceptance.
    /// Env: `GREETING`
    pub greeting: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: ([127, 0, 0, 1], 1060).into(),
            cert_path: PathBuf::from("certs/server.crt"),
            key_path: PathBuf::from("certs/server.key"),
            ca_path: PathBuf::from("certs/ca.crt"),
            backlog_path: PathBuf::from("backup.txt"),
            greeting: "Welcome to the server!".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("LISTEN_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.listen_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid LISTEN_ADDR, using default");
            }
        }

        if let Ok(path) = std::env::var("TLS_CERT") {
            config.cert_path = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("TLS_KEY") {
            config.key_path = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("TLS_CA") {
            config.ca_path = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("BACKLOG_PATH") {
            config.backlog_path = PathBuf::from(path);
        }

        if let Ok(greeting) = std::env::var("GREETING") {
            if !greeting.is_empty() {
                config.greeting = greeting;
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}
