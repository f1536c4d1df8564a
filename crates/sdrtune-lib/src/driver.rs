//! Driver: one backend plus device enumeration.

use std::sync::Arc;

use serde::Serialize;

use crate::backend::RadioBackend;
use crate::device::Device;
use crate::error::{Result, SdrError};
use crate::padding::parse_padded_string;
use crate::protocol::{RTLSDR_DRIVER_ID, USB_STRING_LEN};
use crate::rtlsdr::RtlSdrBackend;

/// Identity of an attached unit, as reported by enumeration.
///
/// String fields are empty when the backend could not read them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub index: u32,
    /// Backend device name, e.g. "Generic RTL2832U OEM".
    pub name: String,
    pub manufacturer: String,
    pub product: String,
    pub serial: String,
}

impl DeviceInfo {
    /// Short label for logs and CLI output: serial when known, else index.
    pub fn label(&self) -> String {
        if self.serial.is_empty() {
            format!("#{}", self.index)
        } else {
            format!("#{} ({})", self.index, self.serial)
        }
    }
}

/// A named backend that can enumerate and hand out devices.
#[derive(Clone)]
pub struct Driver {
    identifier: String,
    backend: Arc<dyn RadioBackend>,
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("identifier", &self.identifier)
            .finish_non_exhaustive()
    }
}

impl Driver {
    pub fn new(identifier: impl Into<String>, backend: Arc<dyn RadioBackend>) -> Self {
        Driver {
            identifier: identifier.into(),
            backend,
        }
    }

    /// The librtlsdr driver, or `None` when the library cannot be loaded.
    pub fn rtlsdr() -> Option<Self> {
        RtlSdrBackend::load().map(|b| Driver::new(RTLSDR_DRIVER_ID, Arc::new(b)))
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Exact, case-sensitive match. Blank identifiers never match.
    pub fn accepts_identifier(&self, identifier: &str) -> bool {
        !identifier.trim().is_empty() && identifier == self.identifier
    }

    pub fn backend(&self) -> &Arc<dyn RadioBackend> {
        &self.backend
    }

    pub fn device_count(&self) -> u32 {
        self.backend.device_count()
    }

    /// Identity of the unit at `index`.
    ///
    /// A failed string query is logged and leaves manufacturer, product and
    /// serial empty; the unit is still listed.
    pub fn device_info(&self, index: u32) -> DeviceInfo {
        let mut manufacturer = [0u8; USB_STRING_LEN];
        let mut product = [0u8; USB_STRING_LEN];
        let mut serial = [0u8; USB_STRING_LEN];
        let status =
            self.backend
                .device_usb_strings(index, &mut manufacturer, &mut product, &mut serial);
        let name = self.backend.device_name(index);
        if status < 0 {
            log::warn!("device {index}: USB strings unavailable (status {status})");
            return DeviceInfo {
                index,
                name,
                manufacturer: String::new(),
                product: String::new(),
                serial: String::new(),
            };
        }
        DeviceInfo {
            index,
            name,
            manufacturer: parse_padded_string(&manufacturer),
            product: parse_padded_string(&product),
            serial: parse_padded_string(&serial),
        }
    }

    /// Identity of every attached unit, without opening any of them.
    pub fn enumerate(&self) -> Vec<DeviceInfo> {
        (0..self.device_count())
            .map(|i| self.device_info(i))
            .collect()
    }

    /// One closed [`Device`] per attached unit.
    pub fn devices(&self) -> Vec<Device> {
        self.enumerate()
            .into_iter()
            .map(|info| Device::new(info, self.backend.clone()))
            .collect()
    }

    /// Closed [`Device`] at `index`, or `None` past the end of the list.
    pub fn device(&self, index: u32) -> Option<Device> {
        if index >= self.device_count() {
            return None;
        }
        Some(Device::new(self.device_info(index), self.backend.clone()))
    }

    /// Closed [`Device`] whose serial matches (case-insensitive).
    ///
    /// A blank serial selects the first unit.
    pub fn device_by_serial(&self, serial: &str) -> Result<Device> {
        let serial = serial.trim();
        let infos = self.enumerate();
        if infos.is_empty() {
            return Err(SdrError::Resource(format!(
                "device_by_serial: no {} devices attached",
                self.identifier
            )));
        }
        if serial.is_empty() {
            let first = infos.into_iter().next();
            return first
                .map(|info| Device::new(info, self.backend.clone()))
                .ok_or_else(|| SdrError::Resource("device_by_serial: no devices".into()));
        }
        let available: Vec<String> = infos
            .iter()
            .map(|d| {
                if d.serial.is_empty() {
                    "(no serial)".to_string()
                } else {
                    d.serial.clone()
                }
            })
            .collect();
        match infos
            .into_iter()
            .find(|d| d.serial.eq_ignore_ascii_case(serial))
        {
            Some(info) => Ok(Device::new(info, self.backend.clone())),
            None => Err(SdrError::Validation(format!(
                "device_by_serial: no device with serial '{serial}' (available: {})",
                available.join(", ")
            ))),
        }
    }
}
