//! Connection establishment state machine.
//!
//! Drives the CNXN/AUTH exchange against one transport. States are explicit
//! variants with exhaustive handling; the caller observes progress through
//! the returned error kind, not by inspecting intermediate state.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::auth::KeyStore;
use crate::error::AdbError;
use crate::protocol::constants::{
    AUTH_RSAPUBLICKEY, AUTH_SIGNATURE, AUTH_TOKEN, A_VERSION, HOST_BANNER, MAXDATA,
};
use crate::protocol::framer;
use crate::protocol::message::ProtocolError;
use crate::protocol::{AdbMessage, Command};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    NotConnected,
    WaitForAuth,
    SendPrivateKey,
    SendPublicKey,
    Connected,
}

/// Device identity reported in the CNXN reply payload
/// (`device::prop=value;...`).
#[derive(Debug, Clone)]
pub struct DeviceBanner {
    pub raw: String,
}

impl DeviceBanner {
    fn from_payload(payload: &[u8]) -> Self {
        Self {
            raw: String::from_utf8_lossy(payload)
                .trim_end_matches('\0')
                .to_string(),
        }
    }

    /// Look up one `key=value` property from the banner.
    pub fn property(&self, key: &str) -> Option<&str> {
        let (_, props) = self.raw.split_once("::")?;
        props
            .split(';')
            .filter_map(|kv| kv.split_once('='))
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }
}

pub struct ConnectionFsm {
    state: ConnectionState,
    read_timeout: Duration,
    auth_timeout: Duration,
}

impl ConnectionFsm {
    pub fn new(read_timeout: Duration, auth_timeout: Duration) -> Self {
        Self {
            state: ConnectionState::NotConnected,
            read_timeout,
            auth_timeout,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Reset to NOT_CONNECTED (explicit close or cancellation).
    pub fn reset(&mut self) {
        self.state = ConnectionState::NotConnected;
    }

    /// Run the handshake to completion. On success the FSM is CONNECTED and
    /// the device banner is returned. On failure the FSM is back at
    /// NOT_CONNECTED; `PendingUserApproval` and `Timeout` are retryable by
    /// calling `connect` again.
    pub async fn connect(
        &mut self,
        transport: &mut (dyn Transport + Send),
        keystore: &KeyStore,
    ) -> Result<DeviceBanner, AdbError> {
        match self.run_handshake(transport, keystore).await {
            Ok(banner) => {
                self.state = ConnectionState::Connected;
                info!("connected to {}", transport.device_id());
                Ok(banner)
            }
            Err(e) => {
                self.state = ConnectionState::NotConnected;
                Err(e)
            }
        }
    }

    async fn run_handshake(
        &mut self,
        transport: &mut (dyn Transport + Send),
        keystore: &KeyStore,
    ) -> Result<DeviceBanner, AdbError> {
        let banner = format!("{}\0", HOST_BANNER).into_bytes();
        framer::send_message(
            transport,
            &AdbMessage::new(Command::Cnxn, A_VERSION, MAXDATA as u32, banner),
        )
        .await?;
        self.state = ConnectionState::WaitForAuth;

        let reply = framer::recv_message(transport, self.read_timeout).await?;
        let token = match reply.command {
            Command::Cnxn => {
                debug!("device accepted connection without auth");
                return Ok(DeviceBanner::from_payload(&reply.payload));
            }
            Command::Auth if reply.arg0 == AUTH_TOKEN => reply.payload,
            other => {
                return Err(ProtocolError::UnexpectedCommand {
                    expected: "AUTH or CNXN",
                    got: other,
                }
                .into());
            }
        };

        // Sign the challenge with our stored key.
        self.state = ConnectionState::SendPrivateKey;
        let signature = keystore.sign(&token)?;
        framer::send_message(
            transport,
            &AdbMessage::new(Command::Auth, AUTH_SIGNATURE, 0, signature),
        )
        .await?;

        let reply = framer::recv_message(transport, self.read_timeout).await?;
        match reply.command {
            Command::Cnxn => {
                debug!("signature accepted");
                return Ok(DeviceBanner::from_payload(&reply.payload));
            }
            Command::Auth if reply.arg0 == AUTH_TOKEN => {
                debug!("signature rejected, presenting public key");
            }
            other => {
                return Err(ProtocolError::UnexpectedCommand {
                    expected: "AUTH or CNXN",
                    got: other,
                }
                .into());
            }
        }

        // The device does not know our key; send it and wait for the user
        // to confirm the dialog. A read timeout here is the documented
        // "not yet approved" signal, not a transport fault.
        self.state = ConnectionState::SendPublicKey;
        framer::send_message(
            transport,
            &AdbMessage::new(Command::Auth, AUTH_RSAPUBLICKEY, 0, keystore.auth_payload()?),
        )
        .await?;

        match framer::recv_message(transport, self.auth_timeout).await {
            Ok(reply) if reply.command == Command::Cnxn => {
                info!("public key accepted by device");
                Ok(DeviceBanner::from_payload(&reply.payload))
            }
            Ok(reply) => {
                warn!("device answered public key with {}", reply.command);
                Err(AdbError::AuthRefused)
            }
            Err(AdbError::Timeout) => Err(AdbError::PendingUserApproval),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_banner_property_lookup() {
        let banner = DeviceBanner {
            raw: "device::ro.product.name=emu;ro.product.model=Emulator;".to_string(),
        };
        assert_eq!(banner.property("ro.product.name"), Some("emu"));
        assert_eq!(banner.property("ro.product.model"), Some("Emulator"));
        assert_eq!(banner.property("missing"), None);
    }

    #[test]
    fn test_initial_state() {
        let fsm = ConnectionFsm::new(Duration::from_secs(10), Duration::from_secs(30));
        assert_eq!(fsm.state(), ConnectionState::NotConnected);
        assert!(!fsm.is_connected());
    }
}
