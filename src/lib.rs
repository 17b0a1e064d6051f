//! droidbridge - host-side client for the Android Debug Bridge wire
//! protocol.
//!
//! Discovers ADB-capable devices over USB (or TCP), performs the CNXN/AUTH
//! handshake with RSA-signed challenge tokens, and runs shell, file-transfer
//! and package operations over authenticated streams.
//!
//! ```no_run
//! use std::sync::Arc;
//! use droidbridge::{discover, ClientConfig, KeyStore};
//!
//! # async fn example() -> Result<(), droidbridge::AdbError> {
//! let config = ClientConfig::default();
//! let keystore = Arc::new(KeyStore::load_or_generate(&config.key_dir)?);
//! let mut devices = discover(keystore, &config)?;
//! let device = &mut devices[0];
//! device.connect().await?;
//! let output = device.shell("getprop ro.product.model", false).await?;
//! println!("{}", output);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod connection;
pub mod device;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod services;
pub mod stream;
pub mod transport;

pub use auth::KeyStore;
pub use config::ClientConfig;
pub use connection::{ConnectionState, DeviceBanner};
pub use device::{connect_tcp, discover, from_transport, CommandOutput, Device, HostCommand};
pub use error::AdbError;
pub use services::{DirEntry, FileStat};
