use std::time::Duration;

use async_trait::async_trait;
use nusb::io::{EndpointRead, EndpointWrite};
use nusb::transfer::{Bulk, In, Out};
use nusb::MaybeFuture;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use super::{Transport, TransportError, TransportType};
use crate::protocol::constants::MAXDATA;

// ADB interface descriptor triple
const ADB_CLASS: u8 = 0xff;
const ADB_SUBCLASS: u8 = 0x42;
const ADB_PROTOCOL: u8 = 0x01;

// Android-partner vendor ids probed during enumeration
const ANDROID_VENDOR_IDS: &[u16] = &[
    0x18d1, // Google
    0x04e8, // Samsung
    0x0bb4, // HTC
    0x22b8, // Motorola
    0x1004, // LG
    0x054c, // Sony
    0x0fce, // Sony Ericsson
    0x2717, // Xiaomi
    0x12d1, // Huawei
    0x2a70, // OnePlus
    0x22d9, // OPPO
    0x2d95, // Vivo
    0x0b05, // Asus
    0x17ef, // Lenovo
    0x19d2, // ZTE
    0x0502, // Acer
    0x413c, // Dell
    0x0489, // Foxconn
    0x091e, // Garmin-Asus
    0x109b, // Hisense
    0x24e3, // K-Touch
    0x1ebf, // Coolpad
    0x2916, // Yota
];

struct AdbEndpoints {
    interface_number: u8,
    ep_in: u8,
    ep_out: u8,
}

/// USB transport over the claimed ADB interface of one device.
pub struct UsbTransport {
    device_id: String,
    writer: EndpointWrite<Bulk>,
    reader: EndpointRead<Bulk>,
}

impl UsbTransport {
    /// Enumerate attached devices and open a transport for every one that
    /// exposes an ADB interface. Surfaces `NoDevice` when nothing matches.
    pub fn discover() -> Result<Vec<UsbTransport>, TransportError> {
        let devices = nusb::list_devices()
            .wait()
            .map_err(|e| TransportError::Usb(format!("enumeration failed: {}", e)))?;

        let mut transports = Vec::new();
        for device_info in devices {
            if !ANDROID_VENDOR_IDS.contains(&device_info.vendor_id()) {
                continue;
            }
            match Self::open(&device_info) {
                Ok(Some(transport)) => transports.push(transport),
                Ok(None) => debug!(
                    "device {:04x}:{:04x} has no ADB interface",
                    device_info.vendor_id(),
                    device_info.product_id()
                ),
                Err(e) => warn!(
                    "failed to open device {:04x}:{:04x}: {}",
                    device_info.vendor_id(),
                    device_info.product_id(),
                    e
                ),
            }
        }

        if transports.is_empty() {
            return Err(TransportError::NoDevice);
        }
        Ok(transports)
    }

    /// Open one candidate device, returning `None` when no interface matches
    /// the ADB descriptor triple.
    fn open(device_info: &nusb::DeviceInfo) -> Result<Option<UsbTransport>, TransportError> {
        let device_id = match device_info.serial_number() {
            Some(serial) => serial.to_string(),
            None => format!(
                "usb:{}:{}",
                device_info.bus_id(),
                device_info.device_address()
            ),
        };

        let device = device_info
            .open()
            .wait()
            .map_err(|e| TransportError::Usb(format!("open failed: {}", e)))?;

        let endpoints = match find_adb_interface(&device)? {
            Some(endpoints) => endpoints,
            None => return Ok(None),
        };

        let interface = device
            .claim_interface(endpoints.interface_number)
            .wait()
            .map_err(|e| TransportError::Usb(format!("claim failed: {}", e)))?;

        let writer = interface
            .endpoint::<Bulk, Out>(endpoints.ep_out)
            .map_err(|e| TransportError::Usb(format!("out endpoint: {}", e)))?
            .writer(MAXDATA);
        let reader = interface
            .endpoint::<Bulk, In>(endpoints.ep_in)
            .map_err(|e| TransportError::Usb(format!("in endpoint: {}", e)))?
            .reader(MAXDATA);

        info!(
            "USB device {} ({:04x}:{:04x}) claimed interface {}",
            device_id,
            device_info.vendor_id(),
            device_info.product_id(),
            endpoints.interface_number
        );

        Ok(Some(UsbTransport {
            device_id,
            writer,
            reader,
        }))
    }
}

/// Scan the active configuration for an interface matching the ADB triple
/// with exactly one bulk IN and one bulk OUT endpoint.
fn find_adb_interface(device: &nusb::Device) -> Result<Option<AdbEndpoints>, TransportError> {
    let config = device
        .active_configuration()
        .map_err(|e| TransportError::Usb(format!("no active configuration: {}", e)))?;

    for group in config.interfaces() {
        for alt in group.alt_settings() {
            if alt.class() != ADB_CLASS
                || alt.subclass() != ADB_SUBCLASS
                || alt.protocol() != ADB_PROTOCOL
            {
                continue;
            }

            let mut ep_in = None;
            let mut ep_out = None;
            let mut endpoint_count = 0;
            for endpoint in alt.endpoints() {
                endpoint_count += 1;
                if endpoint.transfer_type() != nusb::descriptors::TransferType::Bulk {
                    continue;
                }
                match endpoint.direction() {
                    nusb::transfer::Direction::In => ep_in = Some(endpoint.address()),
                    nusb::transfer::Direction::Out => ep_out = Some(endpoint.address()),
                }
            }

            if endpoint_count != 2 {
                continue;
            }
            if let (Some(ep_in), Some(ep_out)) = (ep_in, ep_out) {
                return Ok(Some(AdbEndpoints {
                    interface_number: alt.interface_number(),
                    ep_in,
                    ep_out,
                }));
            }
        }
    }
    Ok(None)
}

#[async_trait]
impl Transport for UsbTransport {
    async fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.writer
            .write_all(data)
            .await
            .map_err(|_| TransportError::Disconnected)?;
        self.writer
            .flush()
            .await
            .map_err(|_| TransportError::Disconnected)?;
        debug!("sent {} bytes to {}", data.len(), self.device_id);
        Ok(())
    }

    async fn recv_exact(
        &mut self,
        len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let mut buf = vec![0u8; len];
        match tokio::time::timeout(timeout, self.reader.read_exact(&mut buf)).await {
            Ok(Ok(_)) => Ok(buf),
            Ok(Err(_)) => Err(TransportError::Disconnected),
            Err(_) => Err(TransportError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Usb
    }
}
