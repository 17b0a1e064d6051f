use std::fmt;

use super::constants;

/// The six-command vocabulary of the ADB wire protocol.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Cnxn = constants::CNXN,
    Auth = constants::AUTH,
    Open = constants::OPEN,
    Okay = constants::OKAY,
    Wrte = constants::WRTE,
    Clse = constants::CLSE,
    Sync = constants::SYNC,
}

impl Command {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            constants::CNXN => Some(Command::Cnxn),
            constants::AUTH => Some(Command::Auth),
            constants::OPEN => Some(Command::Open),
            constants::OKAY => Some(Command::Okay),
            constants::WRTE => Some(Command::Wrte),
            constants::CLSE => Some(Command::Clse),
            constants::SYNC => Some(Command::Sync),
            _ => None,
        }
    }

    /// Magic field value for this command.
    pub fn magic(self) -> u32 {
        !(self as u32)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Cnxn => write!(f, "CNXN"),
            Command::Auth => write!(f, "AUTH"),
            Command::Open => write!(f, "OPEN"),
            Command::Okay => write!(f, "OKAY"),
            Command::Wrte => write!(f, "WRTE"),
            Command::Clse => write!(f, "CLSE"),
            Command::Sync => write!(f, "SYNC"),
        }
    }
}
