//! `config` subcommand: show current configuration and file paths.

use std::path::Path;

use super::{
    Config, ConfigOutput, DriverRegistry, Result, format_gain, format_hz, kv, kv_indent,
    kv_width, print_json,
};

pub(super) fn cmd_config(json: bool, save: bool, custom_path: Option<&Path>) -> Result<()> {
    let config = super::load_config(custom_path);
    let config_path = custom_path.map(|p| p.to_path_buf()).or_else(Config::path);

    if save {
        let Some(path) = &config_path else {
            return Err(sdrtune_lib::SdrError::Config(
                "no config directory to save into".into(),
            ));
        };
        config.save_to(path)?;
        println!("Saved configuration to {}", path.display());
        return Ok(());
    }

    let config_exists = config_path.as_ref().is_some_and(|p| p.exists());
    let issues: Vec<String> = match config.validate() {
        Ok(()) => vec![],
        Err(issues) => issues.iter().map(|i| i.to_string()).collect(),
    };
    let registry = DriverRegistry::with_defaults();
    let drivers: Vec<String> = registry
        .identifiers()
        .into_iter()
        .map(String::from)
        .collect();

    if json {
        return print_json(&ConfigOutput {
            config_file: config_path.as_ref().map(|p| p.display().to_string()),
            config_file_exists: config_exists,
            settings: config,
            issues,
            drivers,
        });
    }

    // Human-readable output
    let w = kv_width(
        &["Config file:", "Drivers:"],
        &[
            "driver:",
            "device:",
            "center_frequency_hz:",
            "sample_rate_hz:",
            "correction_ppm:",
            "gain:",
            "agc:",
            "direct_sampling:",
            "offset_tuning:",
            "bias_tee:",
            "bandwidth_hz:",
            "read_size:",
            "async_buffers:",
        ],
    );

    match &config_path {
        Some(p) => {
            if config_exists {
                kv("Config file:", format_args!("{} (loaded)", p.display()), w);
            } else {
                kv(
                    "Config file:",
                    format_args!("{} (not found, using defaults)", p.display()),
                    w,
                );
            }
        }
        None => kv("Config file:", "(no config directory)", w),
    }
    if drivers.is_empty() {
        kv("Drivers:", "(none, librtlsdr not found)", w);
    } else {
        kv("Drivers:", drivers.join(", "), w);
    }
    println!();

    println!("Settings:");
    kv_indent("driver:", &config.driver, w);
    let device = if config.device_serial.is_empty() {
        format!("index {}", config.device_index)
    } else {
        format!("serial {}", config.device_serial)
    };
    kv_indent("device:", device, w);
    kv_indent(
        "center_frequency_hz:",
        format_args!(
            "{} ({})",
            config.center_frequency_hz,
            format_hz(config.center_frequency_hz)
        ),
        w,
    );
    kv_indent("sample_rate_hz:", config.sample_rate_hz, w);
    kv_indent("correction_ppm:", config.correction_ppm, w);
    let gain = match (config.automatic_gain, config.gain) {
        (true, _) => "automatic".to_string(),
        (false, Some(g)) => format!("{g} ({})", format_gain(g)),
        (false, None) => "manual (driver default)".to_string(),
    };
    kv_indent("gain:", gain, w);
    kv_indent("agc:", config.agc, w);
    kv_indent("direct_sampling:", config.direct_sampling, w);
    kv_indent("offset_tuning:", config.offset_tuning, w);
    kv_indent("bias_tee:", config.bias_tee, w);
    let bandwidth = match config.bandwidth_hz {
        0 => "automatic".to_string(),
        hz => hz.to_string(),
    };
    kv_indent("bandwidth_hz:", bandwidth, w);
    kv_indent("read_size:", config.read_size, w);
    kv_indent(
        "async_buffers:",
        format_args!(
            "{} x {} bytes",
            config.async_buffer_count, config.async_buffer_size
        ),
        w,
    );

    if !issues.is_empty() {
        println!();
        println!("Issues:");
        for issue in &issues {
            println!("  - {issue}");
        }
    }
    Ok(())
}
