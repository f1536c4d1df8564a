//! `info` subcommand: open the configured device and report tuner state.

use std::path::Path;

use sdrtune_lib::context::TunerContext;

use super::{
    DriverRegistry, InfoOutput, Result, TuneArgs, format_gain, format_hz, kv, kv_indent,
    kv_width, print_json,
};

pub(super) fn cmd_info(tune: &TuneArgs, json: bool, config_path: Option<&Path>) -> Result<()> {
    let mut config = super::load_config(config_path);
    tune.apply(&mut config);

    let registry = DriverRegistry::with_defaults();
    let ctx = TunerContext::resolve(&registry, &config)?;
    let summary = ctx.tuner.describe()?;
    let crystal = match ctx.tuner.crystal_frequency() {
        Ok(x) => Some(x),
        Err(e) => {
            log::debug!("crystal frequency unavailable: {e}");
            None
        }
    };

    if json {
        return print_json(&InfoOutput {
            driver: ctx.driver.identifier().to_string(),
            settings: ctx.tuner.settings().clone(),
            capabilities: summary.tuner.model(),
            summary,
            crystal,
        });
    }

    let w = kv_width(
        &[
            "Device:",
            "Tuner:",
            "Center frequency:",
            "Sample rate:",
            "Correction:",
            "Gain:",
            "Supported gains:",
            "Crystal:",
            "Tuning range:",
            "Features:",
        ],
        &["Manufacturer:", "Product:", "Serial:"],
    );

    let dev = &summary.device;
    kv("Device:", format_args!("{} ({})", dev.label(), dev.name), w);
    if !dev.manufacturer.is_empty() {
        kv_indent("Manufacturer:", &dev.manufacturer, w);
    }
    if !dev.product.is_empty() {
        kv_indent("Product:", &dev.product, w);
    }
    if !dev.serial.is_empty() {
        kv_indent("Serial:", &dev.serial, w);
    }
    println!();

    let model = summary
        .tuner
        .model()
        .map(|m| format!(" ({})", m.vendor))
        .unwrap_or_default();
    kv("Tuner:", format_args!("{}{model}", summary.tuner), w);
    kv(
        "Center frequency:",
        format_hz(summary.center_frequency_hz),
        w,
    );
    kv(
        "Sample rate:",
        format_args!("{} S/s", summary.sample_rate_hz),
        w,
    );
    kv(
        "Correction:",
        format_args!("{} ppm", summary.correction_ppm),
        w,
    );
    let mode = if ctx.tuner.settings().gain_mode_automatic {
        "automatic"
    } else {
        "manual"
    };
    kv(
        "Gain:",
        format_args!("{} ({mode})", format_gain(summary.gain)),
        w,
    );
    let gains: Vec<String> = summary
        .supported_gains
        .iter()
        .map(|g| format!("{:.1}", *g as f64 / 10.0))
        .collect();
    kv("Supported gains:", format_args!("{} dB", gains.join(", ")), w);
    if let Some(m) = summary.tuner.model() {
        let range = format!(
            "{} - {}",
            format_hz(m.min_frequency_hz),
            format_hz(m.max_frequency_hz)
        );
        if m.covers(summary.center_frequency_hz) {
            kv("Tuning range:", range, w);
        } else {
            kv("Tuning range:", format_args!("{range} (center frequency outside)"), w);
        }
        let mut features = Vec::new();
        if m.supports_offset_tuning {
            features.push("offset tuning");
        }
        if m.supports_dithering {
            features.push("dithering control");
        }
        if features.is_empty() {
            kv("Features:", "none", w);
        } else {
            kv("Features:", features.join(", "), w);
        }
    }
    match crystal {
        Some(x) => kv(
            "Crystal:",
            format_args!("RTL {} Hz, tuner {} Hz", x.rtl_hz, x.tuner_hz),
            w,
        ),
        None => kv("Crystal:", "unavailable", w),
    }

    Ok(())
}
