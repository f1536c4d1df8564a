//! Device handle: exclusive owner of one native connection.
//!
//! A [`Device`] starts closed. [`Device::open`] acquires the native handle,
//! [`Device::close`] releases it, and dropping an open device closes it.
//! Every parameter operation goes through [`Device::handle`], which fails
//! with [`SdrError::State`] while closed.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::backend::{NativeHandle, RadioBackend};
use crate::driver::DeviceInfo;
use crate::error::{Result, SdrError};
use crate::tuner::TunerConfiguration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeviceState {
    Closed,
    Open,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceState::Closed => f.write_str("closed"),
            DeviceState::Open => f.write_str("open"),
        }
    }
}

pub struct Device {
    info: DeviceInfo,
    backend: Arc<dyn RadioBackend>,
    handle: Option<NativeHandle>,
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("info", &self.info)
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl Device {
    pub fn new(info: DeviceInfo, backend: Arc<dyn RadioBackend>) -> Self {
        Device {
            info,
            backend,
            handle: None,
        }
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn index(&self) -> u32 {
        self.info.index
    }

    pub fn state(&self) -> DeviceState {
        if self.handle.is_some() {
            DeviceState::Open
        } else {
            DeviceState::Closed
        }
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    pub fn backend(&self) -> &Arc<dyn RadioBackend> {
        &self.backend
    }

    /// Acquire the native connection. No-op when already open.
    pub fn open(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }
        let handle = self.backend.open(self.info.index).map_err(|status| {
            SdrError::Resource(format!(
                "open: device {} returned status {status}",
                self.info.index
            ))
        })?;
        log::debug!("Opened device {} (handle {handle})", self.info.label());
        self.handle = Some(handle);
        Ok(())
    }

    /// Release the native connection. No-op when already closed.
    ///
    /// The device is closed afterwards even if the backend reports a
    /// failure; that failure is logged and returned once.
    pub fn close(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        let status = self.backend.close(handle);
        if status < 0 {
            log::warn!(
                "Closing device {} failed with status {status}",
                self.info.label()
            );
            return Err(SdrError::Resource(format!(
                "close: device {} returned status {status}",
                self.info.index
            )));
        }
        log::debug!("Closed device {}", self.info.label());
        Ok(())
    }

    /// Native handle for a parameter operation named `op`.
    pub fn handle(&self, op: &str) -> Result<NativeHandle> {
        self.handle.ok_or_else(|| {
            SdrError::State(format!("{op}: device {} is not open", self.info.index))
        })
    }

    /// Open (if needed) and hand the device to a new configuration.
    pub fn configure(mut self) -> Result<TunerConfiguration> {
        self.open()?;
        Ok(TunerConfiguration::new(self))
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        // Failure already logged by close().
        let _ = self.close();
    }
}
