//! CLI subcommands: device listing, tuner info, sample capture, config.

mod capture;
mod config_cmd;
mod devices;
mod info;

use std::path::Path;

use clap::{Args, Subcommand};
use serde::Serialize;

pub(super) use crate::RUNNING;
pub(super) use sdrtune_lib::config::Config;
pub(super) use sdrtune_lib::driver::DeviceInfo;
pub(super) use sdrtune_lib::error::Result;
pub(super) use sdrtune_lib::models::TunerModel;
pub(super) use sdrtune_lib::registry::DriverRegistry;
pub(super) use sdrtune_lib::tuner::{CrystalFrequency, TunerSettings, TunerSummary};

const PADDING: usize = 2;

/// Compute alignment width for a command's key-value output.
/// Ensures at least PADDING spaces after the longest key in either level,
/// with top-level and indent values aligned to the same column.
pub(super) fn kv_width(top: &[&str], indent: &[&str]) -> usize {
    let top_max = top.iter().map(|k| k.len()).max().unwrap_or(0);
    let indent_max = indent.iter().map(|k| k.len()).max().unwrap_or(0);
    let top_need = if top.is_empty() { 0 } else { top_max + PADDING };
    // Indent keys lose 2 chars of inner width to the "  " prefix
    let indent_need = if indent.is_empty() {
        0
    } else {
        indent_max + PADDING + 2
    };
    top_need.max(indent_need)
}

pub(super) fn format_kv(key: &str, value: impl std::fmt::Display, w: usize) -> String {
    format!("{key:<width$}{value}", width = w)
}

pub(super) fn kv(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("{}", format_kv(key, value, w));
}

pub(super) fn kv_indent(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("  {key:<width$}{value}", width = w.saturating_sub(2));
}

/// Frequency in Hz as a short human-readable string ("1.090 GHz").
pub(super) fn format_hz(hz: u64) -> String {
    match hz {
        0..1_000 => format!("{hz} Hz"),
        1_000..1_000_000 => format!("{:.3} kHz", hz as f64 / 1e3),
        1_000_000..1_000_000_000 => format!("{:.3} MHz", hz as f64 / 1e6),
        _ => format!("{:.3} GHz", hz as f64 / 1e9),
    }
}

/// Gain in tenths of a dB as "49.6 dB".
pub(super) fn format_gain(tenths: i32) -> String {
    format!("{:.1} dB", tenths as f64 / 10.0)
}

pub(super) fn print_json(value: &impl Serialize) -> Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(std::io::Error::from)?;
    println!("{text}");
    Ok(())
}

/// Load config from `path` (or the platform default), logging parse warnings.
pub(super) fn load_config(path: Option<&Path>) -> Config {
    let (config, warnings) = match path {
        Some(p) => Config::load_from(p),
        None => Config::load_with_warnings(),
    };
    for w in &warnings {
        log::warn!("{w}");
    }
    config
}

// ── Shared device arguments ──

/// Per-invocation overrides of the configured device and tuning.
#[derive(Args, Debug, Default, Clone)]
pub struct TuneArgs {
    /// Select device by serial number
    #[arg(long)]
    serial: Option<String>,
    /// Select device by index (ignored when a serial is given)
    #[arg(long)]
    index: Option<u32>,
    /// Center frequency in Hz
    #[arg(short = 'f', long)]
    frequency: Option<u64>,
    /// Sample rate in Hz
    #[arg(short = 's', long)]
    rate: Option<u32>,
    /// Manual tuner gain in tenths of a dB (disables automatic gain)
    #[arg(short = 'g', long)]
    gain: Option<i32>,
    /// Frequency correction in ppm
    #[arg(long)]
    ppm: Option<i32>,
}

impl TuneArgs {
    pub(super) fn apply(&self, config: &mut Config) {
        if let Some(serial) = &self.serial {
            config.device_serial = serial.clone();
        }
        if let Some(index) = self.index {
            config.device_index = index;
            if self.serial.is_none() {
                config.device_serial.clear();
            }
        }
        if let Some(f) = self.frequency {
            config.center_frequency_hz = f;
        }
        if let Some(r) = self.rate {
            config.sample_rate_hz = r;
        }
        if let Some(g) = self.gain {
            config.gain = Some(g);
            config.automatic_gain = false;
        }
        if let Some(p) = self.ppm {
            config.correction_ppm = p;
        }
    }
}

// ── JSON output structs ──

#[derive(Serialize)]
pub(super) struct DevicesOutput {
    pub driver: Option<String>,
    pub count: usize,
    pub devices: Vec<DeviceInfo>,
}

#[derive(Serialize)]
pub(super) struct InfoOutput {
    pub driver: String,
    pub capabilities: Option<&'static TunerModel>,
    pub summary: TunerSummary,
    pub settings: TunerSettings,
    pub crystal: Option<CrystalFrequency>,
}

#[derive(Serialize)]
pub(super) struct CaptureOutput {
    pub device: DeviceInfo,
    pub mode: String,
    pub bytes: u64,
    pub seconds: f64,
    pub reconnects: u32,
    pub output: String,
}

#[derive(Serialize)]
pub(super) struct ConfigOutput {
    pub config_file: Option<String>,
    pub config_file_exists: bool,
    pub settings: Config,
    pub issues: Vec<String>,
    pub drivers: Vec<String>,
}

#[derive(Subcommand)]
pub enum Command {
    /// List attached devices
    Devices,

    /// Open the configured device and show its tuner parameters
    Info {
        #[command(flatten)]
        tune: TuneArgs,
    },

    /// Capture raw 8-bit I/Q samples to a file or stdout
    Capture {
        #[command(flatten)]
        tune: TuneArgs,
        /// Stop after this many bytes (default: until Ctrl+C)
        #[arg(short = 'n', long)]
        bytes: Option<u64>,
        /// Output file, "-" for stdout
        #[arg(short = 'o', long, default_value = "-")]
        output: String,
        /// Use the asynchronous read loop instead of blocking reads
        #[arg(long = "async")]
        use_async: bool,
        /// Do not try to reopen the device after a failure
        #[arg(long)]
        no_reconnect: bool,
    },

    /// Show current configuration and file paths
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        save: bool,
    },
}

/// Warn if `--json` was passed to a command that doesn't support it.
fn warn_json_unsupported(cmd_name: &str) {
    log::warn!("--json is not supported for `{cmd_name}` (ignored)");
}

pub fn run(cmd: Command, json: bool, config_path: Option<&Path>) -> Result<()> {
    match cmd {
        Command::Devices => devices::cmd_devices(json, config_path),
        Command::Info { tune } => info::cmd_info(&tune, json, config_path),
        Command::Capture {
            tune,
            bytes,
            output,
            use_async,
            no_reconnect,
        } => capture::cmd_capture(
            &tune,
            capture::CaptureArgs {
                bytes,
                output,
                use_async,
                reconnect: !no_reconnect,
            },
            json,
            config_path,
        ),
        Command::Config { save } => {
            if json && save {
                warn_json_unsupported("config --save");
            }
            config_cmd::cmd_config(json, save, config_path)
        }
    }
}

#[cfg(test)]
mod format_tests {
    use super::*;

    #[test]
    fn kv_width_top_only() {
        let w = kv_width(&["Tuner:", "Sample rate:"], &[]);
        // "Sample rate:" = 12 + PADDING = 14
        assert_eq!(w, 14);
    }

    #[test]
    fn kv_width_indent_drives_width() {
        let w = kv_width(&["A:"], &["center_frequency_hz:"]);
        // 20 + PADDING + 2 = 24
        assert_eq!(w, 24);
    }

    #[test]
    fn values_align_across_levels() {
        let w = kv_width(&["Top:"], &["Indent:"]);
        let top = format_kv("Top:", "V", w);
        let indent = format!("  {:<width$}{}", "Indent:", "V", width = w - 2);
        assert_eq!(top.find('V'), indent.find('V'));
    }

    #[test]
    fn format_kv_exact_width() {
        assert_eq!(format_kv("Frequency:", "1", 4), "Frequency:1");
    }

    #[test]
    fn kv_width_empty_both() {
        assert_eq!(kv_width(&[], &[]), 0);
    }

    #[test]
    fn hz_units() {
        assert_eq!(format_hz(999), "999 Hz");
        assert_eq!(format_hz(250_000), "250.000 kHz");
        assert_eq!(format_hz(2_048_000), "2.048 MHz");
        assert_eq!(format_hz(1_090_000_000), "1.090 GHz");
    }

    #[test]
    fn gain_tenths() {
        assert_eq!(format_gain(496), "49.6 dB");
        assert_eq!(format_gain(0), "0.0 dB");
        assert_eq!(format_gain(-10), "-1.0 dB");
    }
}
