pub mod checksum;
pub mod commands;
pub mod constants;
pub mod framer;
pub mod message;

pub use commands::Command;
pub use constants::*;
pub use message::{AdbMessage, Header, ProtocolError};
