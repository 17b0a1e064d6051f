use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use droidbridge::{
    connect_tcp, discover, AdbError, ClientConfig, CommandOutput, Device, HostCommand, KeyStore,
};

#[derive(Parser, Debug)]
#[command(name = "droidbridge")]
#[command(about = "Host-side ADB protocol client")]
struct Args {
    /// Connect over TCP instead of USB (host:port)
    #[arg(long)]
    tcp: Option<String>,

    /// Directory holding adbkey / adbkey.pub
    #[arg(long)]
    key_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, short)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List attached devices
    Devices,
    /// Run a shell command and print its output
    Shell {
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },
    /// Copy a local file to the device
    Push { local: PathBuf, remote: String },
    /// Copy a device file to the host
    Pull { remote: String, local: PathBuf },
    /// List a directory on the device
    Ls { path: String },
    /// Stat a path on the device
    Stat { path: String },
    /// Install an APK
    Install { apk: PathBuf },
    /// Uninstall a package
    Uninstall { package: String },
    /// Reboot the device (optionally into bootloader or recovery)
    Reboot { target: Option<String> },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "droidbridge=debug,info"
    } else {
        "droidbridge=info,warn"
    };
    droidbridge::logging::init(default_filter)?;

    let mut config = ClientConfig::default();
    if let Some(key_dir) = args.key_dir {
        config.key_dir = key_dir;
    }
    let keystore = Arc::new(
        KeyStore::load_or_generate(&config.key_dir)
            .with_context(|| format!("failed to prepare key store in {:?}", config.key_dir))?,
    );

    if matches!(args.command, Command::Devices) {
        return list_devices(args.tcp.as_deref(), keystore, &config).await;
    }

    let mut device = select_device(args.tcp.as_deref(), keystore, &config).await?;
    connect_with_approval(&mut device).await?;

    let request = match args.command {
        Command::Devices => unreachable!(),
        Command::Shell { command } => HostCommand::Shell {
            command: command.join(" "),
            echo: true,
        },
        Command::Push { local, remote } => HostCommand::Push { local, remote },
        Command::Pull { remote, local } => HostCommand::Pull { remote, local },
        Command::Ls { path } => HostCommand::List { path },
        Command::Stat { path } => HostCommand::Stat { path },
        Command::Install { apk } => HostCommand::Install { apk },
        Command::Uninstall { package } => HostCommand::Uninstall { package },
        Command::Reboot { target } => HostCommand::Reboot { target },
    };

    match device.execute(request).await? {
        CommandOutput::Text(_) => {
            // Shell output was already echoed; pm output is echoed too.
        }
        CommandOutput::Entries(entries) => {
            for entry in entries {
                println!("{:o} {:>10} {}", entry.mode, entry.size, entry.name);
            }
        }
        CommandOutput::Stat(stat) => {
            println!("mode: {:o}", stat.mode);
            println!("size: {}", stat.size);
            println!("mtime: {}", stat.mtime);
        }
        CommandOutput::Done => {}
    }

    device.close();
    Ok(())
}

async fn select_device(
    tcp: Option<&str>,
    keystore: Arc<KeyStore>,
    config: &ClientConfig,
) -> Result<Device> {
    if let Some(addr) = tcp {
        return Ok(connect_tcp(addr, keystore, config).await?);
    }
    let mut devices = discover(keystore, config)?;
    if devices.len() > 1 {
        info!("multiple devices attached, using {}", devices[0].device_id());
    }
    Ok(devices.remove(0))
}

/// Retry the handshake while the device waits for the user to confirm the
/// authorization dialog.
async fn connect_with_approval(device: &mut Device) -> Result<()> {
    const ATTEMPTS: usize = 6;
    for attempt in 1..=ATTEMPTS {
        match device.connect().await {
            Ok(()) => return Ok(()),
            Err(AdbError::PendingUserApproval) => {
                eprintln!(
                    "waiting for authorization on the device ({}/{})...",
                    attempt, ATTEMPTS
                );
            }
            Err(e) => return Err(e.into()),
        }
    }
    bail!("device never authorized this host's key");
}

async fn list_devices(
    tcp: Option<&str>,
    keystore: Arc<KeyStore>,
    config: &ClientConfig,
) -> Result<()> {
    let devices = match tcp {
        Some(addr) => vec![connect_tcp(addr, keystore, config).await?],
        None => match discover(keystore, config) {
            Ok(devices) => devices,
            Err(AdbError::NoDevice) => {
                println!("no devices attached");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        },
    };

    for mut device in devices {
        match connect_with_approval(&mut device).await {
            Ok(()) => {
                let model = device
                    .banner()
                    .and_then(|b| b.property("ro.product.model"))
                    .unwrap_or("unknown");
                println!("{}\tdevice\t{}", device.device_id(), model);
            }
            Err(e) => {
                println!("{}\tunavailable\t{}", device.device_id(), e);
            }
        }
        device.close();
    }
    Ok(())
}
