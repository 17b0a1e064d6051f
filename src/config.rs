use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Directory holding `adbkey` / `adbkey.pub`.
    pub key_dir: PathBuf,

    /// Timeout for ordinary transport reads.
    pub read_timeout: Duration,

    /// Timeout for the read after presenting our public key; longer than
    /// `read_timeout` so the user has time to confirm the dialog.
    pub auth_timeout: Duration,

    /// How long to drain a closing stream before declaring the wire idle.
    pub close_grace: Duration,

    /// TCP connect timeout.
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            key_dir: default_key_dir(),
            read_timeout: Duration::from_secs(10),
            auth_timeout: Duration::from_secs(30),
            close_grace: Duration::from_millis(500),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// `~/.android`, the location stock tooling keeps its keys, so an already
/// authorized host stays authorized.
fn default_key_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".android"))
        .unwrap_or_else(|| PathBuf::from(".android"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.read_timeout, Duration::from_secs(10));
        assert!(config.auth_timeout > config.read_timeout);
        assert!(config.key_dir.ends_with(".android"));
    }
}
