//! Framed message I/O over a [`Transport`].
//!
//! A message travels as two transport operations in each direction: the fixed
//! 24-byte header, then exactly `data_length` payload bytes. The header is
//! validated before the payload read is issued, so a corrupt length can never
//! cause an unbounded receive.

use std::time::Duration;

use bytes::Bytes;
use tracing::trace;

use super::constants::{HEADER_SIZE, MAXDATA};
use super::message::{AdbMessage, Header};
use crate::error::AdbError;
use crate::transport::Transport;

/// Send one message: header write, then payload write if non-empty.
pub async fn send_message(
    transport: &mut (dyn Transport + Send),
    message: &AdbMessage,
) -> Result<(), AdbError> {
    trace!(
        command = %message.command,
        arg0 = message.arg0,
        arg1 = message.arg1,
        len = message.payload.len(),
        "send"
    );
    transport.send(&message.encode_header()).await?;
    if !message.payload.is_empty() {
        transport.send(&message.payload).await?;
    }
    Ok(())
}

/// Receive one message: a 24-byte header read, then an exact payload read.
pub async fn recv_message(
    transport: &mut (dyn Transport + Send),
    timeout: Duration,
) -> Result<AdbMessage, AdbError> {
    let header_bytes = transport.recv_exact(HEADER_SIZE, timeout).await?;
    let header = match Header::decode(&header_bytes) {
        Ok(header) => header,
        Err(e) => {
            // The length field of a corrupt header still says how many
            // payload bytes follow; drain them so the next receive starts
            // on a message boundary.
            let claimed =
                u32::from_le_bytes(header_bytes[12..16].try_into().unwrap()) as usize;
            if claimed > 0 && claimed <= MAXDATA {
                let _ = transport.recv_exact(claimed, timeout).await;
            }
            return Err(e.into());
        }
    };

    let payload = if header.data_length > 0 {
        Bytes::from(
            transport
                .recv_exact(header.data_length as usize, timeout)
                .await?,
        )
    } else {
        Bytes::new()
    };

    let message = AdbMessage::from_parts(header, payload)?;
    trace!(
        command = %message.command,
        arg0 = message.arg0,
        arg1 = message.arg1,
        len = message.payload.len(),
        "recv"
    );
    Ok(message)
}
