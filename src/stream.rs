//! Logical stream sessions over a connected transport.
//!
//! One stream at a time: a session borrows the transport mutably for its
//! whole lifetime, so a second stream cannot be opened until the first is
//! closed. Flow control is a window of one; every WRTE waits for the peer's
//! OKAY echo before the next.

use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::error::AdbError;
use crate::protocol::constants::MAXDATA;
use crate::protocol::framer;
use crate::protocol::message::ProtocolError;
use crate::protocol::{AdbMessage, Command};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Opening,
    Open,
    Closing,
    Closed,
}

pub struct StreamSession<'t> {
    transport: &'t mut (dyn Transport + Send),
    local_id: u32,
    remote_id: u32,
    state: StreamState,
    read_timeout: Duration,
    close_grace: Duration,
}

impl<'t> StreamSession<'t> {
    /// Open a stream to `destination` (a service string such as `shell:ls`
    /// or `sync:`). The device answers OKAY to accept or CLSE to refuse.
    pub async fn open(
        transport: &'t mut (dyn Transport + Send),
        local_id: u32,
        destination: &str,
        read_timeout: Duration,
        close_grace: Duration,
    ) -> Result<StreamSession<'t>, AdbError> {
        debug_assert_ne!(local_id, 0);
        let payload = format!("{}\0", destination).into_bytes();
        framer::send_message(transport, &AdbMessage::new(Command::Open, local_id, 0, payload))
            .await?;

        let reply = framer::recv_message(transport, read_timeout).await?;
        match reply.command {
            Command::Okay => {
                if reply.arg1 != local_id {
                    return Err(ProtocolError::StreamIdMismatch {
                        arg0: reply.arg0,
                        arg1: reply.arg1,
                    }
                    .into());
                }
                debug!(
                    "stream {}:{} open for {:?}",
                    local_id, reply.arg0, destination
                );
                Ok(StreamSession {
                    transport,
                    local_id,
                    remote_id: reply.arg0,
                    state: StreamState::Open,
                    read_timeout,
                    close_grace,
                })
            }
            Command::Clse => {
                debug!("device refused stream for {:?}", destination);
                Err(AdbError::StreamRefused(destination.to_string()))
            }
            other => Err(ProtocolError::UnexpectedCommand {
                expected: "OKAY or CLSE",
                got: other,
            }
            .into()),
        }
    }

    pub fn local_id(&self) -> u32 {
        self.local_id
    }

    pub fn remote_id(&self) -> u32 {
        self.remote_id
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Send one WRTE (payload must fit MAXDATA) and wait for the OKAY echo.
    pub async fn write(&mut self, payload: &[u8]) -> Result<(), AdbError> {
        if self.state != StreamState::Open {
            return Err(AdbError::StreamClosed);
        }
        debug_assert!(payload.len() <= MAXDATA);
        framer::send_message(
            self.transport,
            &AdbMessage::new(Command::Wrte, self.local_id, self.remote_id, payload.to_vec()),
        )
        .await?;

        let reply = framer::recv_message(self.transport, self.read_timeout).await?;
        match reply.command {
            Command::Okay if reply.arg0 == self.remote_id && reply.arg1 == self.local_id => {
                Ok(())
            }
            Command::Okay => Err(ProtocolError::StreamIdMismatch {
                arg0: reply.arg0,
                arg1: reply.arg1,
            }
            .into()),
            Command::Clse => {
                self.state = StreamState::Closed;
                Err(AdbError::StreamClosed)
            }
            other => Err(ProtocolError::UnexpectedCommand {
                expected: "OKAY",
                got: other,
            }
            .into()),
        }
    }

    /// Send a buffer larger than one message by splitting it into
    /// MAXDATA-sized WRTEs, each individually acknowledged.
    pub async fn write_all(&mut self, payload: &[u8]) -> Result<(), AdbError> {
        for chunk in payload.chunks(MAXDATA) {
            self.write(chunk).await?;
        }
        Ok(())
    }

    /// Receive the next WRTE payload, acknowledging it immediately. Returns
    /// `StreamClosed` once the peer closes.
    pub async fn read(&mut self) -> Result<Bytes, AdbError> {
        if self.state == StreamState::Closed {
            return Err(AdbError::StreamClosed);
        }
        loop {
            let message = framer::recv_message(self.transport, self.read_timeout).await?;
            match message.command {
                Command::Wrte => {
                    if message.arg0 != self.remote_id || message.arg1 != self.local_id {
                        return Err(ProtocolError::StreamIdMismatch {
                            arg0: message.arg0,
                            arg1: message.arg1,
                        }
                        .into());
                    }
                    framer::send_message(
                        self.transport,
                        &AdbMessage::simple(Command::Okay, self.local_id, self.remote_id),
                    )
                    .await?;
                    return Ok(message.payload);
                }
                Command::Okay => {
                    // Duplicate flow-control ack; nothing to do.
                    trace!("ignoring stray OKAY on stream {}", self.local_id);
                }
                Command::Clse => {
                    self.state = StreamState::Closed;
                    return Err(AdbError::StreamClosed);
                }
                other => {
                    return Err(ProtocolError::UnexpectedCommand {
                        expected: "WRTE or CLSE",
                        got: other,
                    }
                    .into());
                }
            }
        }
    }

    /// Close the stream: send CLSE, then drain inbound traffic until the
    /// peer's CLSE arrives or the wire goes idle, leaving the transport
    /// clean for the next command.
    pub async fn close(&mut self) -> Result<(), AdbError> {
        let already_closed = self.state == StreamState::Closed;
        if self.state != StreamState::Closing {
            self.state = StreamState::Closing;
            framer::send_message(
                self.transport,
                &AdbMessage::simple(Command::Clse, self.local_id, self.remote_id),
            )
            .await?;
        }

        if !already_closed {
            loop {
                match framer::recv_message(self.transport, self.close_grace).await {
                    Ok(message) if message.command == Command::Clse => break,
                    Ok(message) => {
                        trace!("draining {} while closing", message.command);
                    }
                    Err(AdbError::Timeout) => break,
                    Err(AdbError::Disconnected) => break,
                    Err(e) => {
                        warn!("error while draining stream close: {}", e);
                        break;
                    }
                }
            }
        }
        self.state = StreamState::Closed;
        debug!("stream {}:{} closed", self.local_id, self.remote_id);
        Ok(())
    }
}
