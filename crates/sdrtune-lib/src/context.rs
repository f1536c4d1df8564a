//! Tuner context: resolves config → driver → device → applied configuration.
//!
//! Consolidates the resolution every CLI command repeats: look the driver up
//! in the registry, pick a device by serial or index, open it, and push the
//! configured parameters.

use crate::config::Config;
use crate::device::Device;
use crate::driver::Driver;
use crate::error::{Result, SdrError};
use crate::registry::DriverRegistry;
use crate::tuner::TunerConfiguration;

/// An opened, configured tuner together with the driver it came from.
#[derive(Debug)]
pub struct TunerContext {
    pub driver: Driver,
    pub tuner: TunerConfiguration,
}

impl TunerContext {
    /// Resolve the configured driver and device, open it and apply `config`.
    pub fn resolve(registry: &DriverRegistry, config: &Config) -> Result<Self> {
        let driver = lookup_driver(registry, &config.driver)?.clone();
        let tuner = open_configured(&driver, config)?;
        Ok(TunerContext { driver, tuner })
    }
}

/// Driver registered under `identifier`.
pub fn lookup_driver<'a>(registry: &'a DriverRegistry, identifier: &str) -> Result<&'a Driver> {
    registry.driver(identifier).ok_or_else(|| {
        let known = registry.identifiers();
        SdrError::Config(if known.is_empty() {
            format!("driver '{identifier}' is not available (no drivers loaded)")
        } else {
            format!(
                "driver '{identifier}' is not available (registered: {})",
                known.join(", ")
            )
        })
    })
}

/// The device `config` selects: by serial when set, else by index.
pub fn select_device(driver: &Driver, config: &Config) -> Result<Device> {
    if !config.device_serial.trim().is_empty() {
        return driver.device_by_serial(&config.device_serial);
    }
    let count = driver.device_count();
    driver.device(config.device_index).ok_or_else(|| {
        SdrError::Resource(format!(
            "no {} device at index {} ({count} attached)",
            driver.identifier(),
            config.device_index
        ))
    })
}

/// Select, open and configure a device.
pub fn open_configured(driver: &Driver, config: &Config) -> Result<TunerConfiguration> {
    let device = select_device(driver, config)?;
    let mut tuner = device.configure()?;
    if let Ok(kind) = tuner.tuner_type()
        && let Some(model) = kind.model()
    {
        for issue in config.check_against(model) {
            log::warn!("[config] {issue}");
        }
    }
    config.apply_to(&mut tuner)?;
    Ok(tuner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{FakeBackend, FakeUnit};
    use std::sync::Arc;

    fn registry_with(units: Vec<FakeUnit>) -> (Arc<FakeBackend>, DriverRegistry) {
        let fake = Arc::new(FakeBackend::with_units(units));
        let mut registry = DriverRegistry::new();
        registry.register(Driver::new("RTL-SDR", fake.clone()));
        (fake, registry)
    }

    #[test]
    fn resolves_default_config() {
        let (fake, registry) = registry_with(vec![FakeUnit::new("00000001")]);
        let ctx = TunerContext::resolve(&registry, &Config::default()).unwrap();
        assert_eq!(ctx.driver.identifier(), "RTL-SDR");
        assert!(ctx.tuner.device().is_open());
        assert_eq!(fake.state().center_freq, 100_000_000);
    }

    #[test]
    fn unknown_driver_lists_registered() {
        let (_, registry) = registry_with(vec![]);
        let config = Config {
            driver: "AIRSPY".into(),
            ..Config::default()
        };
        let err = TunerContext::resolve(&registry, &config).unwrap_err();
        assert!(matches!(err, SdrError::Config(_)));
        assert!(err.to_string().contains("RTL-SDR"));
    }

    #[test]
    fn empty_registry_message() {
        let err = lookup_driver(&DriverRegistry::new(), "RTL-SDR").unwrap_err();
        assert!(err.to_string().contains("no drivers loaded"));
    }

    #[test]
    fn selects_by_serial() {
        let (_, registry) = registry_with(vec![FakeUnit::new("A"), FakeUnit::new("B")]);
        let config = Config {
            device_serial: "B".into(),
            ..Config::default()
        };
        let ctx = TunerContext::resolve(&registry, &config).unwrap();
        assert_eq!(ctx.tuner.device().index(), 1);
    }

    #[test]
    fn selects_by_index() {
        let (_, registry) = registry_with(vec![FakeUnit::new("A"), FakeUnit::new("B")]);
        let config = Config {
            device_index: 1,
            ..Config::default()
        };
        let ctx = TunerContext::resolve(&registry, &config).unwrap();
        assert_eq!(ctx.tuner.device().info().serial, "B");
    }

    #[test]
    fn missing_index_is_resource_error() {
        let (_, registry) = registry_with(vec![FakeUnit::new("A")]);
        let config = Config {
            device_index: 3,
            ..Config::default()
        };
        let err = TunerContext::resolve(&registry, &config).unwrap_err();
        assert!(matches!(err, SdrError::Resource(_)));
        assert!(err.to_string().contains("1 attached"));
    }

    #[test]
    fn apply_failure_closes_device() {
        let (fake, registry) = registry_with(vec![FakeUnit::new("A")]);
        fake.fail("set_sample_rate", -1);
        assert!(TunerContext::resolve(&registry, &Config::default()).is_err());
        assert!(fake.state().open_handles.is_empty());
    }
}
