//! Driver registry: identifier → driver.

use crate::driver::Driver;

/// Drivers known to the process, looked up by identifier.
#[derive(Debug, Default)]
pub struct DriverRegistry {
    drivers: Vec<Driver>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in driver whose native library loads.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        match Driver::rtlsdr() {
            Some(driver) => registry.register(driver),
            None => log::debug!("RTL-SDR driver not registered: librtlsdr unavailable"),
        }
        registry
    }

    /// Add `driver`, replacing any driver with the same identifier.
    pub fn register(&mut self, driver: Driver) {
        self.drivers.retain(|d| d.identifier() != driver.identifier());
        log::debug!("Registered driver {}", driver.identifier());
        self.drivers.push(driver);
    }

    /// Driver for `identifier`, or `None` (also for a blank identifier).
    pub fn driver(&self, identifier: &str) -> Option<&Driver> {
        self.drivers.iter().find(|d| d.accepts_identifier(identifier))
    }

    pub fn identifiers(&self) -> Vec<&str> {
        self.drivers.iter().map(|d| d.identifier()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}
