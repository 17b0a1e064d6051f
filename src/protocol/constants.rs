// ADB wire protocol constants
pub const A_VERSION: u32 = 0x01000000;
pub const MAXDATA: usize = 4096;
pub const HEADER_SIZE: usize = 24;

/// Length of the random challenge the device sends in AUTH(TOKEN).
pub const AUTH_TOKEN_SIZE: usize = 20;

// AUTH sub-types (carried in arg0)
pub const AUTH_TOKEN: u32 = 1;
pub const AUTH_SIGNATURE: u32 = 2;
pub const AUTH_RSAPUBLICKEY: u32 = 3;

// Command codes (ASCII, little-endian)
pub const CNXN: u32 = 0x4e584e43;
pub const AUTH: u32 = 0x48545541;
pub const OPEN: u32 = 0x4e45504f;
pub const OKAY: u32 = 0x59414b4f;
pub const WRTE: u32 = 0x45545257;
pub const CLSE: u32 = 0x45534c43;
pub const SYNC: u32 = 0x434e5953;

// Magic values (bitwise NOT of command)
pub const CNXN_MAGIC: u32 = !CNXN;
pub const AUTH_MAGIC: u32 = !AUTH;
pub const OPEN_MAGIC: u32 = !OPEN;
pub const OKAY_MAGIC: u32 = !OKAY;
pub const WRTE_MAGIC: u32 = !WRTE;
pub const CLSE_MAGIC: u32 = !CLSE;
pub const SYNC_MAGIC: u32 = !SYNC;

/// Connect banner sent in the host CNXN payload (null-terminated on the wire).
pub const HOST_BANNER: &str = "host::";
