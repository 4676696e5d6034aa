//! Client configuration loaded from environment variables.

use std::path::PathBuf;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address to connect to.
    /// Env: `SERVER_ADDR`
    /// Default: `127.0.0.1:1060`
    pub server_addr: String,

    /// Name the server's certificate is expected to carry (SNI).
    /// Env: `SERVER_NAME`
    /// Default: `localhost`
    pub server_name: String,

    /// PEM trust roots used to verify the server certificate.
    /// Env: `TLS_CA`
    /// Default: `certs/ca.crt`
    pub ca_path: PathBuf,

    /// PEM certificate chain presented to the server.
    /// Env: `TLS_CERT`
    /// Default: `certs/client.crt`
    pub cert_path: PathBuf,

    /// PEM private key for the certificate.
    /// Env: `TLS_KEY`
    /// Default: `certs/client.key`
    pub key_path: PathBuf,

    /// Prefix each message with its local arrival time.
    /// Env: `SHOW_TIME` (true/false)
    /// Default: `true`
    pub show_time: bool,

    /// Prefix each message with the sender's name.
    /// Env: `SHOW_USER` (true/false)
    /// Default: `true`
    pub show_user: bool,

    /// Print a blank line between messages.
    /// Env: `MESSAGE_GAP` (true/false)
    /// Default: `false`
    pub message_gap: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:1060".to_string(),
            server_name: "localhost".to_string(),
            ca_path: PathBuf::from("certs/ca.crt"),
            cert_path: PathBuf::from("certs/client.crt"),
            key_path: PathBuf::from("certs/client.key"),
            show_time: true,
            show_user: true,
            message_gap: false,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("SERVER_ADDR") {
            config.server_addr = addr;
        }

        if let Ok(name) = std::env::var("SERVER_NAME") {
            config.server_name = name;
        }

        if let Ok(path) = std::env::var("TLS_CA") {
            config.ca_path = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("TLS_CERT") {
            config.cert_path = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("TLS_KEY") {
            config.key_path = PathBuf::from(path);
        }

        if let Ok(val) = std::env::var("SHOW_TIME") {
            config.show_time = val != "false" && val != "0" && val != "n";
        }

        if let Ok(val) = std::env::var("SHOW_USER") {
            config.show_user = val != "false" && val != "0" && val != "n";
        }

        if let Ok(val) = std::env::var("MESSAGE_GAP") {
            config.message_gap = val == "true" || val == "1" || val == "y";
        }

        config
    }
}
