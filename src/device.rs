//! Device handles and discovery.
//!
//! A [`Device`] owns one transport, one connection FSM and the key identity
//! used to authenticate. Commands are strictly sequential: stream sessions
//! borrow the handle mutably, so a second operation cannot start until the
//! first has closed its stream.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::auth::KeyStore;
use crate::config::ClientConfig;
use crate::connection::{ConnectionFsm, DeviceBanner};
use crate::error::AdbError;
use crate::services::{package, shell, sync, DirEntry, FileStat};
use crate::stream::StreamSession;
use crate::transport::{TcpTransport, Transport, UsbTransport};

/// The tagged request vocabulary dispatched through [`Device::execute`].
#[derive(Debug, Clone)]
pub enum HostCommand {
    Shell { command: String, echo: bool },
    Push { local: PathBuf, remote: String },
    Pull { remote: String, local: PathBuf },
    List { path: String },
    Stat { path: String },
    Install { apk: PathBuf },
    Uninstall { package: String },
    Reboot { target: Option<String> },
}

/// Result of one dispatched command.
#[derive(Debug)]
pub enum CommandOutput {
    Text(String),
    Entries(Vec<DirEntry>),
    Stat(FileStat),
    Done,
}

pub struct Device {
    transport: Box<dyn Transport + Send>,
    fsm: ConnectionFsm,
    keystore: Arc<KeyStore>,
    config: ClientConfig,
    banner: Option<DeviceBanner>,
    next_local_id: u32,
}

impl Device {
    pub fn new(
        transport: Box<dyn Transport + Send>,
        keystore: Arc<KeyStore>,
        config: ClientConfig,
    ) -> Self {
        let fsm = ConnectionFsm::new(config.read_timeout, config.auth_timeout);
        Self {
            transport,
            fsm,
            keystore,
            config,
            banner: None,
            next_local_id: 1,
        }
    }

    /// Perform the CNXN/AUTH handshake. `PendingUserApproval` and `Timeout`
    /// leave the handle reusable; call `connect` again to retry.
    pub async fn connect(&mut self) -> Result<(), AdbError> {
        let banner = self
            .fsm
            .connect(self.transport.as_mut(), &self.keystore)
            .await?;
        debug!("device banner: {}", banner.raw);
        self.banner = Some(banner);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.fsm.is_connected()
    }

    pub fn device_id(&self) -> &str {
        self.transport.device_id()
    }

    pub fn banner(&self) -> Option<&DeviceBanner> {
        self.banner.as_ref()
    }

    /// Drop the session; the next command requires a fresh `connect`.
    pub fn close(&mut self) {
        self.fsm.reset();
        self.banner = None;
    }

    /// Open a stream for one command. Fails with `NotConnected` before the
    /// handshake has completed.
    pub(crate) async fn open_stream(
        &mut self,
        destination: &str,
    ) -> Result<StreamSession<'_>, AdbError> {
        if !self.fsm.is_connected() {
            return Err(AdbError::NotConnected);
        }
        let local_id = self.next_local_id;
        self.next_local_id = if self.next_local_id == u32::MAX {
            1
        } else {
            self.next_local_id + 1
        };
        StreamSession::open(
            self.transport.as_mut(),
            local_id,
            destination,
            self.config.read_timeout,
            self.config.close_grace,
        )
        .await
    }

    /// Dispatch one tagged request. A `Disconnected` error closes the
    /// session; protocol violations abort the command but leave the
    /// connection usable.
    pub async fn execute(&mut self, command: HostCommand) -> Result<CommandOutput, AdbError> {
        let result = match command {
            HostCommand::Shell { command, echo } => self
                .shell(&command, echo)
                .await
                .map(CommandOutput::Text),
            HostCommand::Push { local, remote } => self
                .push(&local, &remote)
                .await
                .map(|_| CommandOutput::Done),
            HostCommand::Pull { remote, local } => self
                .pull(&remote, &local)
                .await
                .map(|_| CommandOutput::Done),
            HostCommand::List { path } => self.list(&path).await.map(CommandOutput::Entries),
            HostCommand::Stat { path } => self.stat(&path).await.map(CommandOutput::Stat),
            HostCommand::Install { apk } => {
                self.install(&apk).await.map(CommandOutput::Text)
            }
            HostCommand::Uninstall { package } => {
                self.uninstall(&package).await.map(CommandOutput::Text)
            }
            HostCommand::Reboot { target } => self
                .reboot(target.as_deref())
                .await
                .map(|_| CommandOutput::Done),
        };

        if let Err(AdbError::Disconnected) = &result {
            warn!("transport lost, closing device {}", self.device_id());
            self.close();
        }
        result
    }

    pub async fn shell(&mut self, command: &str, echo: bool) -> Result<String, AdbError> {
        shell::run(self, command, echo).await
    }

    pub async fn push(&mut self, local: &std::path::Path, remote: &str) -> Result<(), AdbError> {
        sync::push(self, local, remote).await
    }

    pub async fn pull(&mut self, remote: &str, local: &std::path::Path) -> Result<(), AdbError> {
        sync::pull(self, remote, local).await
    }

    pub async fn list(&mut self, path: &str) -> Result<Vec<DirEntry>, AdbError> {
        sync::list(self, path).await
    }

    pub async fn stat(&mut self, path: &str) -> Result<FileStat, AdbError> {
        sync::stat(self, path).await
    }

    pub async fn install(&mut self, apk: &std::path::Path) -> Result<String, AdbError> {
        package::install(self, apk).await
    }

    pub async fn uninstall(&mut self, package: &str) -> Result<String, AdbError> {
        package::uninstall(self, package).await
    }

    pub async fn reboot(&mut self, target: Option<&str>) -> Result<(), AdbError> {
        package::reboot(self, target).await
    }
}

/// Enumerate USB-attached devices and hand back one unconnected handle per
/// match. Ownership transfers to the caller; there is no registry.
pub fn discover(keystore: Arc<KeyStore>, config: &ClientConfig) -> Result<Vec<Device>, AdbError> {
    let transports = UsbTransport::discover()?;
    Ok(transports
        .into_iter()
        .map(|t| Device::new(Box::new(t), Arc::clone(&keystore), config.clone()))
        .collect())
}

/// Build a handle for a TCP-attached device (`host:port`).
pub async fn connect_tcp(
    addr: &str,
    keystore: Arc<KeyStore>,
    config: &ClientConfig,
) -> Result<Device, AdbError> {
    let transport = TcpTransport::connect(addr, config.connect_timeout).await?;
    Ok(Device::new(
        Box::new(transport),
        keystore,
        config.clone(),
    ))
}

/// A device over an arbitrary transport (emulated transports in tests).
pub fn from_transport(
    transport: Box<dyn Transport + Send>,
    keystore: Arc<KeyStore>,
    config: &ClientConfig,
) -> Device {
    Device::new(transport, keystore, config.clone())
}
