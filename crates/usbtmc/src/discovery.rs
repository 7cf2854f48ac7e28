//! USBTMC device discovery
//!
//! Enumerates the bus for devices exposing a USBTMC/USB488 interface and
//! yields the descriptor fields the matcher and transport factory need.

use crate::error::{Result, UsbTmcError};
use crate::session::find_usbtmc_interface;
use rusb::{Context, Device, UsbContext};
use tracing::debug;

/// Descriptor summary of a discovered USBTMC device
#[derive(Debug, Clone)]
pub struct UsbTmcDeviceInfo {
    pub vendor_id: u16,
    pub product_id: u16,
    pub bus_number: u8,
    pub device_address: u8,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

impl UsbTmcDeviceInfo {
    pub fn display_name(&self) -> String {
        match (&self.manufacturer, &self.product) {
            (Some(m), Some(p)) => format!("{} {}", m, p),
            (_, Some(p)) => p.clone(),
            _ => format!("{:04x}:{:04x}", self.vendor_id, self.product_id),
        }
    }
}

/// List every USBTMC-capable device on the bus
///
/// Devices that cannot be opened for string-descriptor reads are still
/// listed, with the string fields empty.
pub fn list_devices(context: &Context) -> Result<Vec<UsbTmcDeviceInfo>> {
    let mut found = Vec::new();
    for device in context.devices()?.iter() {
        if find_usbtmc_interface(&device)?.is_none() {
            continue;
        }
        let descriptor = device.device_descriptor()?;

        let strings = device.open().ok().map(|handle| {
            (
                descriptor
                    .manufacturer_string_index()
                    .and_then(|i| handle.read_string_descriptor_ascii(i).ok()),
                descriptor
                    .product_string_index()
                    .and_then(|i| handle.read_string_descriptor_ascii(i).ok()),
                descriptor
                    .serial_number_string_index()
                    .and_then(|i| handle.read_string_descriptor_ascii(i).ok()),
            )
        });
        let (manufacturer, product, serial_number) = strings.unwrap_or((None, None, None));

        debug!(
            "found USBTMC device {:04x}:{:04x} at bus {} addr {}",
            descriptor.vendor_id(),
            descriptor.product_id(),
            device.bus_number(),
            device.address()
        );
        found.push(UsbTmcDeviceInfo {
            vendor_id: descriptor.vendor_id(),
            product_id: descriptor.product_id(),
            bus_number: device.bus_number(),
            device_address: device.address(),
            manufacturer,
            product,
            serial_number,
        });
    }
    Ok(found)
}

/// Find one USBTMC device by vendor/product ID
pub fn find_device(context: &Context, vendor_id: u16, product_id: u16) -> Result<Device<Context>> {
    for device in context.devices()?.iter() {
        let descriptor = device.device_descriptor()?;
        if descriptor.vendor_id() != vendor_id || descriptor.product_id() != product_id {
            continue;
        }
        if find_usbtmc_interface(&device)?.is_some() {
            return Ok(device);
        }
    }
    Err(UsbTmcError::DeviceNotFound(format!(
        "no USBTMC device {:04x}:{:04x} on the bus",
        vendor_id, product_id
    )))
}
