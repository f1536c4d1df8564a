//! `devices` subcommand: list attached tuners for the configured driver.

use std::path::Path;

use super::{DevicesOutput, DriverRegistry, Result, print_json};

pub(super) fn cmd_devices(json: bool, config_path: Option<&Path>) -> Result<()> {
    let config = super::load_config(config_path);
    let registry = DriverRegistry::with_defaults();
    let driver = registry.driver(&config.driver);
    let devices = driver.map(|d| d.enumerate()).unwrap_or_default();

    if json {
        return print_json(&DevicesOutput {
            driver: driver.map(|d| d.identifier().to_string()),
            count: devices.len(),
            devices,
        });
    }

    let Some(driver) = driver else {
        println!(
            "Driver '{}' is not available (is librtlsdr installed?).",
            config.driver
        );
        return Ok(());
    };

    if devices.is_empty() {
        println!("No {} devices found.", driver.identifier());
        return Ok(());
    }

    println!(
        "Found {} {} device{}:",
        devices.len(),
        driver.identifier(),
        if devices.len() == 1 { "" } else { "s" }
    );
    println!();

    for dev in &devices {
        println!("  [{}] {}", dev.index, dev.name);
        if !dev.manufacturer.is_empty() || !dev.product.is_empty() {
            println!("      {} {}", dev.manufacturer, dev.product);
        }
        if !dev.serial.is_empty() {
            println!("      Serial: {}", dev.serial);
        }
    }

    Ok(())
}
