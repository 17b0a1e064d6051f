use thiserror::Error;

use crate::protocol::ProtocolError;
use crate::transport::TransportError;

/// Client-facing error taxonomy. Each variant is a distinct exit condition;
/// callers match on the kind rather than parsing strings.
#[derive(Error, Debug)]
pub enum AdbError {
    #[error("no ADB device found")]
    NoDevice,

    #[error("device refused authentication")]
    AuthRefused,

    /// The device is waiting for the user to accept our public key. The
    /// connection attempt may be retried once the dialog is confirmed.
    #[error("waiting for user approval on the device")]
    PendingUserApproval,

    #[error("operation timed out")]
    Timeout,

    #[error("device disconnected")]
    Disconnected,

    #[error("not connected")]
    NotConnected,

    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("stream refused by device: {0}")]
    StreamRefused(String),

    #[error("stream closed by device")]
    StreamClosed,

    #[error("sync failed: {0}")]
    Sync(String),

    #[error("key store error: {0}")]
    KeyStore(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<TransportError> for AdbError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout { .. } => AdbError::Timeout,
            TransportError::Disconnected => AdbError::Disconnected,
            TransportError::NoDevice => AdbError::NoDevice,
            TransportError::Io(e) => AdbError::Io(e),
            TransportError::Usb(msg) => {
                AdbError::Io(std::io::Error::other(msg))
            }
        }
    }
}

impl From<rsa::Error> for AdbError {
    fn from(err: rsa::Error) -> Self {
        AdbError::KeyStore(err.to_string())
    }
}
