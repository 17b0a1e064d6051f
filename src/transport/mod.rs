use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub mod mock;
pub mod tcp;
pub mod usb;

pub use tcp::TcpTransport;
pub use usb::UsbTransport;

/// Transport layer errors. Timeout is a distinct kind rather than a flavor of
/// I/O error: the connection state machine inspects it and sometimes treats
/// it as progress.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("read timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("endpoint disconnected")]
    Disconnected,

    #[error("no matching device")]
    NoDevice,

    #[error("USB error: {0}")]
    Usb(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportType {
    Usb,
    Tcp,
    Emulated,
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportType::Usb => write!(f, "USB"),
            TransportType::Tcp => write!(f, "TCP"),
            TransportType::Emulated => write!(f, "emulated"),
        }
    }
}

/// Raw byte pipe to one endpoint pair. Implementations do not interpret the
/// bytes; framing lives in [`crate::protocol::framer`].
#[async_trait]
pub trait Transport: Send {
    /// Write the whole buffer to the outbound endpoint.
    async fn send(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Read exactly `len` bytes from the inbound endpoint, failing with
    /// [`TransportError::Timeout`] if they do not arrive in time.
    async fn recv_exact(&mut self, len: usize, timeout: Duration)
        -> Result<Vec<u8>, TransportError>;

    fn device_id(&self) -> &str;

    fn transport_type(&self) -> TransportType;
}
