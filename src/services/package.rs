//! Package management and power operations, composed from push + shell.

use std::path::Path;

use tracing::{debug, info};

use super::{shell, sync};
use crate::device::Device;
use crate::error::AdbError;

const REMOTE_STAGING_DIR: &str = "/data/local/tmp";

/// Install an APK: stage it under `/data/local/tmp`, run `pm install -r`,
/// then remove the staged copy. Returns the package manager's output.
pub async fn install(device: &mut Device, apk: &Path) -> Result<String, AdbError> {
    let name = apk
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| AdbError::Sync(format!("invalid APK path {:?}", apk)))?;
    let remote = format!("{}/{}", REMOTE_STAGING_DIR, name);

    info!("installing {:?} via {}", apk, remote);
    sync::push(device, apk, &remote).await?;

    let output = shell::run(
        device,
        &format!("pm install -r {}", shell::quote(&remote)),
        false,
    )
    .await?;

    // Clean up the staged APK regardless of the install verdict.
    let _ = shell::run(device, &format!("rm {}", shell::quote(&remote)), false).await;

    debug!("pm install output: {}", output.trim());
    Ok(output)
}

/// Uninstall a package by name.
pub async fn uninstall(device: &mut Device, package: &str) -> Result<String, AdbError> {
    shell::run(device, &format!("pm uninstall {}", shell::quote(package)), false).await
}

/// Reboot the device. Opens the `reboot:` service (optionally with a
/// `bootloader` / `recovery` target) and waits for the device to close the
/// stream.
pub async fn reboot(device: &mut Device, target: Option<&str>) -> Result<(), AdbError> {
    let service = match target {
        Some(target) => format!("reboot:{}", target),
        None => "reboot:".to_string(),
    };

    let mut session = device.open_stream(&service).await?;
    loop {
        match session.read().await {
            Ok(_) => continue,
            Err(AdbError::StreamClosed) => break,
            Err(e) => {
                let _ = session.close().await;
                return Err(e);
            }
        }
    }
    session.close().await?;
    info!("reboot requested ({})", service);
    Ok(())
}
