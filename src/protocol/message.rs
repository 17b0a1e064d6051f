use bytes::Bytes;
use thiserror::Error;

use super::checksum;
use super::commands::Command;
use super::constants::{HEADER_SIZE, MAXDATA};

/// Protocol-level framing violations. All of these are fatal for the current
/// operation; magic, checksum and id-echo failures are never retried.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("unknown command word: 0x{0:08x}")]
    UnknownCommand(u32),
    #[error("bad magic: command 0x{command:08x}, magic 0x{magic:08x}")]
    BadMagic { command: u32, magic: u32 },
    #[error("bad checksum: header 0x{expected:08x}, payload 0x{actual:08x}")]
    BadChecksum { expected: u32, actual: u32 },
    #[error("payload length {0} exceeds MAXDATA")]
    PayloadTooLarge(usize),
    #[error("unexpected {got} (expected {expected})")]
    UnexpectedCommand { expected: &'static str, got: Command },
    #[error("stream id mismatch: arg0={arg0}, arg1={arg1}")]
    StreamIdMismatch { arg0: u32, arg1: u32 },
    #[error("truncated header: {0} bytes")]
    TruncatedHeader(usize),
}

/// Decoded 24-byte message header.
///
/// Wire layout, little-endian:
/// command(4) | arg0(4) | arg1(4) | data_length(4) | data_checksum(4) | magic(4)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub command: Command,
    pub arg0: u32,
    pub arg1: u32,
    pub data_length: u32,
    pub data_checksum: u32,
}

impl Header {
    /// Decode and validate a header. Rejects unknown command words, magic
    /// mismatches, and lengths beyond MAXDATA.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < HEADER_SIZE {
            return Err(ProtocolError::TruncatedHeader(bytes.len()));
        }

        let raw_command = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let arg0 = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        let arg1 = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        let data_length = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
        let data_checksum = u32::from_le_bytes(bytes[16..20].try_into().unwrap());
        let magic = u32::from_le_bytes(bytes[20..24].try_into().unwrap());

        if magic != !raw_command {
            return Err(ProtocolError::BadMagic {
                command: raw_command,
                magic,
            });
        }
        let command =
            Command::from_u32(raw_command).ok_or(ProtocolError::UnknownCommand(raw_command))?;
        if data_length as usize > MAXDATA {
            return Err(ProtocolError::PayloadTooLarge(data_length as usize));
        }

        Ok(Self {
            command,
            arg0,
            arg1,
            data_length,
            data_checksum,
        })
    }
}

/// A complete ADB message: validated header plus payload.
#[derive(Debug, Clone, PartialEq)]
pub struct AdbMessage {
    pub command: Command,
    pub arg0: u32,
    pub arg1: u32,
    pub payload: Bytes,
}

impl AdbMessage {
    pub fn new(command: Command, arg0: u32, arg1: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            command,
            arg0,
            arg1,
            payload: payload.into(),
        }
    }

    /// Empty-payload constructor for OKAY/CLSE style messages.
    pub fn simple(command: Command, arg0: u32, arg1: u32) -> Self {
        Self::new(command, arg0, arg1, Bytes::new())
    }

    /// Serialize the 24-byte header. The payload travels in a separate
    /// transport write, matching how the daemon reads it back.
    pub fn encode_header(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&(self.command as u32).to_le_bytes());
        buf[4..8].copy_from_slice(&self.arg0.to_le_bytes());
        buf[8..12].copy_from_slice(&self.arg1.to_le_bytes());
        buf[12..16].copy_from_slice(&(self.payload.len() as u32).to_le_bytes());
        buf[16..20].copy_from_slice(&checksum::calculate(&self.payload).to_le_bytes());
        buf[20..24].copy_from_slice(&self.command.magic().to_le_bytes());
        buf
    }

    /// Serialize header and payload into one buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        buf.extend_from_slice(&self.encode_header());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Pair a decoded header with its payload bytes, validating the checksum
    /// invariant.
    pub fn from_parts(header: Header, payload: Bytes) -> Result<Self, ProtocolError> {
        let actual = checksum::calculate(&payload);
        if actual != header.data_checksum {
            return Err(ProtocolError::BadChecksum {
                expected: header.data_checksum,
                actual,
            });
        }
        Ok(Self {
            command: header.command,
            arg0: header.arg0,
            arg1: header.arg1,
            payload,
        })
    }

    /// Decode a full message from one contiguous buffer.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let header = Header::decode(bytes)?;
        let end = HEADER_SIZE + header.data_length as usize;
        if bytes.len() < end {
            return Err(ProtocolError::TruncatedHeader(bytes.len()));
        }
        Self::from_parts(header, Bytes::copy_from_slice(&bytes[HEADER_SIZE..end]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_round_trip() {
        let msg = AdbMessage::new(Command::Cnxn, 0x01000000, 4096, &b"host::\0"[..]);
        let bytes = msg.encode();
        assert_eq!(bytes.len(), HEADER_SIZE + 7);

        let decoded = AdbMessage::decode(&bytes).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_header_layout_little_endian() {
        let msg = AdbMessage::new(Command::Wrte, 1, 2, &b"abc"[..]);
        let header = msg.encode_header();
        assert_eq!(&header[0..4], b"WRTE");
        assert_eq!(u32::from_le_bytes(header[4..8].try_into().unwrap()), 1);
        assert_eq!(u32::from_le_bytes(header[8..12].try_into().unwrap()), 2);
        assert_eq!(u32::from_le_bytes(header[12..16].try_into().unwrap()), 3);
        assert_eq!(
            u32::from_le_bytes(header[16..20].try_into().unwrap()),
            294 // 'a' + 'b' + 'c'
        );
        assert_eq!(
            u32::from_le_bytes(header[20..24].try_into().unwrap()),
            !(Command::Wrte as u32)
        );
    }

    #[test]
    fn test_bad_magic_rejected() {
        let msg = AdbMessage::simple(Command::Okay, 1, 2);
        let mut bytes = msg.encode();
        bytes[20] ^= 0xff;
        assert!(matches!(
            Header::decode(&bytes),
            Err(ProtocolError::BadMagic { .. })
        ));
    }

    #[test]
    fn test_bad_checksum_rejected() {
        let msg = AdbMessage::new(Command::Wrte, 1, 2, &b"payload"[..]);
        let mut bytes = msg.encode();
        bytes[HEADER_SIZE] ^= 0xff;
        assert!(matches!(
            AdbMessage::decode(&bytes),
            Err(ProtocolError::BadChecksum { .. })
        ));
    }

    #[test]
    fn test_unknown_command_rejected() {
        let mut bytes = [0u8; HEADER_SIZE];
        let bogus: u32 = 0x41414141;
        bytes[0..4].copy_from_slice(&bogus.to_le_bytes());
        bytes[20..24].copy_from_slice(&(!bogus).to_le_bytes());
        assert!(matches!(
            Header::decode(&bytes),
            Err(ProtocolError::UnknownCommand(0x41414141))
        ));
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let msg = AdbMessage::simple(Command::Wrte, 1, 2);
        let mut bytes = msg.encode().to_vec();
        bytes[12..16].copy_from_slice(&(MAXDATA as u32 + 1).to_le_bytes());
        assert!(matches!(
            Header::decode(&bytes),
            Err(ProtocolError::PayloadTooLarge(_))
        ));
    }

    #[test]
    fn test_empty_payload_checksum_zero() {
        let msg = AdbMessage::simple(Command::Okay, 7, 9);
        let header = msg.encode_header();
        assert_eq!(u32::from_le_bytes(header[16..20].try_into().unwrap()), 0);
    }
}
