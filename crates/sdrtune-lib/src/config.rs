//! Application configuration: TOML-based, platform-aware paths.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{TunerModel, TunerType};
use crate::properties::PropertyValue;
use crate::protocol::{
    DEFAULT_ASYNC_BUFFER_COUNT, DEFAULT_ASYNC_BUFFER_SIZE, PROPERTY_TUNER_OFFSET,
    RTLSDR_DRIVER_ID, TRANSFER_ALIGNMENT,
};
use crate::stream::StreamOptions;
use crate::tuner::TunerConfiguration;

/// Header comment prepended to saved config files.
const CONFIG_HEADER: &str = "# sdrtune configuration. Frequencies in Hz, gain in tenths of a dB.\n\n";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Registry identifier of the driver. Default: "RTL-SDR".
    #[serde(default = "default_driver")]
    pub driver: String,

    /// Preferred device serial number. Empty = use `device_index`.
    #[serde(default)]
    pub device_serial: String,

    /// Device index used when no serial is configured.
    #[serde(default)]
    pub device_index: u32,

    #[serde(default = "default_center_frequency")]
    pub center_frequency_hz: u64,

    #[serde(default = "default_sample_rate")]
    pub sample_rate_hz: u32,

    #[serde(default)]
    pub correction_ppm: i32,

    /// Explicit tuner gain. Only applied with `automatic_gain = false`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gain: Option<i32>,

    #[serde(default = "default_true")]
    pub automatic_gain: bool,

    /// RTL2832U digital AGC.
    #[serde(default)]
    pub agc: bool,

    #[serde(default)]
    pub direct_sampling: bool,

    #[serde(default)]
    pub offset_tuning: bool,

    #[serde(default)]
    pub bias_tee: bool,

    /// Tuner IF bandwidth. 0 = automatic.
    #[serde(default)]
    pub bandwidth_hz: u32,

    /// Bytes requested per synchronous read.
    #[serde(default = "default_read_size")]
    pub read_size: usize,

    #[serde(default = "default_async_buffer_count")]
    pub async_buffer_count: u32,

    #[serde(default = "default_async_buffer_size")]
    pub async_buffer_size: u32,
}

fn default_driver() -> String {
    RTLSDR_DRIVER_ID.into()
}
fn default_center_frequency() -> u64 {
    100_000_000
}
fn default_sample_rate() -> u32 {
    2_048_000
}
fn default_read_size() -> usize {
    256 * 1024
}
fn default_async_buffer_count() -> u32 {
    DEFAULT_ASYNC_BUFFER_COUNT
}
fn default_async_buffer_size() -> u32 {
    DEFAULT_ASYNC_BUFFER_SIZE
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Config {
            driver: default_driver(),
            device_serial: String::new(),
            device_index: 0,
            center_frequency_hz: default_center_frequency(),
            sample_rate_hz: default_sample_rate(),
            correction_ppm: 0,
            gain: None,
            automatic_gain: true,
            agc: false,
            direct_sampling: false,
            offset_tuning: false,
            bias_tee: false,
            bandwidth_hz: 0,
            read_size: default_read_size(),
            async_buffer_count: default_async_buffer_count(),
            async_buffer_size: default_async_buffer_size(),
        }
    }
}

/// Problems that [`Config::validate`] can report.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigIssue {
    EmptyDriver,
    /// Outside the ranges the RTL2832U resampler accepts.
    SampleRateOutOfRange(u32),
    ZeroCenterFrequency,
    ZeroReadSize,
    ZeroBufferCount,
    MisalignedBufferSize(u32),
    /// `gain` is set but `automatic_gain` would override it.
    GainIgnored,
    /// Offset tuning cannot be combined with direct sampling.
    OffsetTuningWithDirectSampling,
    /// Center frequency outside the nominal range of the detected tuner.
    FrequencyOutsideTunerRange {
        hz: u64,
        tuner: TunerType,
        min_hz: u64,
        max_hz: u64,
    },
    /// Offset tuning requested on a tuner family that rejects it.
    OffsetTuningUnsupported(TunerType),
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigIssue::EmptyDriver => write!(f, "Driver cannot be empty"),
            ConfigIssue::SampleRateOutOfRange(hz) => write!(
                f,
                "Sample rate {hz} Hz is outside 225001-300000 and 900001-3200000 Hz"
            ),
            ConfigIssue::ZeroCenterFrequency => write!(f, "Center frequency cannot be 0"),
            ConfigIssue::ZeroReadSize => write!(f, "read_size must be positive"),
            ConfigIssue::ZeroBufferCount => write!(f, "async_buffer_count must be positive"),
            ConfigIssue::MisalignedBufferSize(n) => write!(
                f,
                "async_buffer_size {n} is not a positive multiple of {TRANSFER_ALIGNMENT}"
            ),
            ConfigIssue::GainIgnored => {
                write!(f, "gain is ignored while automatic_gain is enabled")
            }
            ConfigIssue::OffsetTuningWithDirectSampling => {
                write!(f, "offset_tuning cannot be combined with direct_sampling")
            }
            ConfigIssue::FrequencyOutsideTunerRange {
                hz,
                tuner,
                min_hz,
                max_hz,
            } => write!(
                f,
                "Center frequency {hz} Hz is outside the {tuner} range {min_hz}-{max_hz} Hz"
            ),
            ConfigIssue::OffsetTuningUnsupported(tuner) => {
                write!(f, "offset_tuning is not supported by the {tuner} tuner")
            }
        }
    }
}

/// Whether the RTL2832U accepts `hz` as a sample rate.
pub fn sample_rate_supported(hz: u32) -> bool {
    (225_001..=300_000).contains(&hz) || (900_001..=3_200_000).contains(&hz)
}

impl Config {
    /// Platform-specific config directory.
    pub fn dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("sdrtune"))
    }

    /// Full path to config file.
    pub fn path() -> Option<PathBuf> {
        Self::dir().map(|d| d.join("config.toml"))
    }

    /// Load config from disk, or return defaults if not found.
    pub fn load() -> Self {
        let (config, warnings) = Self::load_with_warnings();
        for w in &warnings {
            log::warn!("{w}");
        }
        config
    }

    /// Save config to an arbitrary path atomically (write to temp file, then rename).
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let serialized = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        let contents = format!("{CONFIG_HEADER}{serialized}");
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, &contents)?;
        match std::fs::rename(&tmp, path) {
            Ok(()) => Ok(()),
            Err(_) => {
                // Rename can fail across filesystems; fall back to direct write + cleanup
                let result = std::fs::write(path, &contents);
                let _ = std::fs::remove_file(&tmp);
                result
            }
        }
    }

    /// Save config to the default platform path.
    pub fn save(&self) -> std::io::Result<()> {
        let Some(path) = Self::path() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "No config directory",
            ));
        };
        self.save_to(&path)
    }

    /// Load config from an arbitrary path, returning the config and any parse warnings.
    ///
    /// Returns `(defaults, [])` if the file doesn't exist.
    /// Returns `(defaults, [warning])` if the file exists but can't be parsed.
    pub fn load_from(path: &Path) -> (Self, Vec<String>) {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => (config, vec![]),
                Err(e) => {
                    let warning = format!(
                        "config parse error ({}), using defaults: {e}",
                        path.display()
                    );
                    (Self::default(), vec![warning])
                }
            },
            Err(_) => (Self::default(), vec![]),
        }
    }

    /// Load config from the default path, returning the config and any parse warnings.
    pub fn load_with_warnings() -> (Self, Vec<String>) {
        let Some(path) = Self::path() else {
            return (Self::default(), vec![]);
        };
        Self::load_from(&path)
    }

    /// Validate the entire config, collecting all issues.
    pub fn validate(&self) -> std::result::Result<(), Vec<ConfigIssue>> {
        let mut issues = Vec::new();

        if self.driver.trim().is_empty() {
            issues.push(ConfigIssue::EmptyDriver);
        }
        if self.center_frequency_hz == 0 {
            issues.push(ConfigIssue::ZeroCenterFrequency);
        }
        if !sample_rate_supported(self.sample_rate_hz) {
            issues.push(ConfigIssue::SampleRateOutOfRange(self.sample_rate_hz));
        }
        if self.read_size == 0 {
            issues.push(ConfigIssue::ZeroReadSize);
        }
        if self.async_buffer_count == 0 {
            issues.push(ConfigIssue::ZeroBufferCount);
        }
        if self.async_buffer_size == 0 || self.async_buffer_size % TRANSFER_ALIGNMENT != 0 {
            issues.push(ConfigIssue::MisalignedBufferSize(self.async_buffer_size));
        }
        if self.gain.is_some() && self.automatic_gain {
            issues.push(ConfigIssue::GainIgnored);
        }
        if self.offset_tuning && self.direct_sampling {
            issues.push(ConfigIssue::OffsetTuningWithDirectSampling);
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }

    /// Settings the detected tuner model cannot honor.
    ///
    /// The range check is skipped with direct sampling, which bypasses the
    /// tuner.
    pub fn check_against(&self, model: &TunerModel) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if !self.direct_sampling && !model.covers(self.center_frequency_hz) {
            issues.push(ConfigIssue::FrequencyOutsideTunerRange {
                hz: self.center_frequency_hz,
                tuner: model.tuner,
                min_hz: model.min_frequency_hz,
                max_hz: model.max_frequency_hz,
            });
        }
        if self.offset_tuning && !model.supports_offset_tuning {
            issues.push(ConfigIssue::OffsetTuningUnsupported(model.tuner));
        }
        issues
    }

    /// Async batching from `async_buffer_count` / `async_buffer_size`.
    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            buffer_count: self.async_buffer_count,
            buffer_size: self.async_buffer_size,
        }
    }

    /// Push every configured parameter to `tuner`, stopping at the first
    /// rejection.
    ///
    /// Optional features (correction, bandwidth, direct sampling, bias tee,
    /// offset tuning) are only sent when they differ from the hardware
    /// default, so tuners without them still configure cleanly.
    pub fn apply_to(&self, tuner: &mut TunerConfiguration) -> Result<()> {
        // librtlsdr rejects a correction equal to the current one.
        if self.correction_ppm != 0 {
            tuner.set_correction_frequency(self.correction_ppm)?;
        }
        if self.direct_sampling {
            tuner.set_direct_sampling(true)?;
        }
        tuner.set_center_frequency(self.center_frequency_hz)?;
        tuner.set_sample_rate(self.sample_rate_hz)?;
        tuner.set_gain_mode(self.automatic_gain)?;
        if !self.automatic_gain
            && let Some(gain) = self.gain
        {
            tuner.set_gain(gain)?;
        }
        if self.bandwidth_hz != 0 {
            tuner.set_bandwidth(self.bandwidth_hz)?;
        }
        tuner.set_agc_mode(self.agc)?;
        if self.bias_tee {
            tuner.set_bias_tee(true)?;
        }
        if self.offset_tuning {
            let props = HashMap::from([(
                PROPERTY_TUNER_OFFSET.to_string(),
                PropertyValue::Bool(true),
            )]);
            tuner.set_extra_properties(&props)?;
        }
        log::debug!(
            "Applied config to device {}: {} Hz, {} S/s",
            tuner.device().info().label(),
            self.center_frequency_hz,
            self.sample_rate_hz
        );
        Ok(())
    }
}
