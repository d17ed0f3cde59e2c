// Relaymux process configuration — parsed once at startup via `clap`,
// distinct from the persisted `store::Config` (public_ws/private_ws),
// which an admin can change at runtime through the HTTP API.

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "relaymux", about = "Nostr relay multiplexer")]
pub struct AppConfig {
    /// Address the admin HTTP/WS surface binds to.
    #[arg(long, env = "RELAYMUX_BIND_ADDR", default_value = "127.0.0.1:4848")]
    pub bind_addr: String,

    /// Path to the sqlite database file.
    #[arg(long, env = "RELAYMUX_DB_PATH", default_value = "relaymux.sqlite3")]
    pub db_path: String,

    /// Bearer token required on every `/api/v1/*` admin request.
    #[arg(long, env = "RELAYMUX_ADMIN_TOKEN")]
    pub admin_token: String,

    /// 32-byte AES-256-GCM key (hex-encoded) used to decrypt private
    /// websocket ids. Required only when `config.private_ws` is enabled.
    #[arg(long, env = "RELAYMUX_PRIVATE_WS_KEY")]
    pub private_ws_key: Option<String>,

    /// Verify TLS certificates on outbound relay connections. Disable
    /// only for local development against self-signed relays.
    #[arg(long, env = "RELAYMUX_VERIFY_TLS", default_value_t = true)]
    pub verify_tls: bool,

    /// `RUST_LOG`-style filter directive passed straight to `env_logger`.
    #[arg(long, env = "RELAYMUX_LOG", default_value = "info")]
    pub log_filter: String,
}

impl AppConfig {
    pub fn private_ws_key_bytes(&self) -> Option<Vec<u8>> {
        self.private_ws_key.as_deref().and_then(|hex_key| hex::decode(hex_key).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_required_args() {
        let config = AppConfig::parse_from(["relaymux", "--admin-token", "secret"]);
        assert_eq!(config.bind_addr, "127.0.0.1:4848");
        assert!(config.verify_tls);
        assert_eq!(config.admin_token, "secret");
    }

    #[test]
    fn private_ws_key_bytes_decodes_hex() {
        let config = AppConfig::parse_from([
            "relaymux",
            "--admin-token",
            "secret",
            "--private-ws-key",
            "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff",
        ]);
        let key = config.private_ws_key_bytes().unwrap();
        assert_eq!(key.len(), 32);
    }
}
