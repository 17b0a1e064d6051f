#![allow(dead_code)]

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use droidbridge::transport::mock::{AuthMode, EmulatedDevice, EmulatorHandle};
use droidbridge::{from_transport, ClientConfig, Device, KeyStore};

static KEYSTORE: OnceLock<Arc<KeyStore>> = OnceLock::new();

/// One RSA key pair for the whole test binary; generation is the slow part.
pub fn shared_keystore() -> Arc<KeyStore> {
    Arc::clone(KEYSTORE.get_or_init(|| {
        let dir = tempfile::tempdir().unwrap();
        Arc::new(KeyStore::load_or_generate(dir.path()).unwrap())
    }))
}

pub fn test_config() -> ClientConfig {
    ClientConfig {
        read_timeout: Duration::from_secs(2),
        auth_timeout: Duration::from_secs(2),
        close_grace: Duration::from_millis(100),
        ..ClientConfig::default()
    }
}

pub fn emulated_device(auth: AuthMode) -> (Device, EmulatorHandle) {
    let (transport, handle) = EmulatedDevice::new(auth);
    let device = from_transport(Box::new(transport), shared_keystore(), &test_config());
    (device, handle)
}

/// A device that has already completed the handshake (no-auth mode).
pub async fn connected_device() -> (Device, EmulatorHandle) {
    let (mut device, handle) = emulated_device(AuthMode::Open);
    device.connect().await.unwrap();
    (device, handle)
}
