//! Tuner configuration: validated parameter setters over an open device.
//!
//! Every setter makes exactly one backend call (plus a gain-table query for
//! [`TunerConfiguration::set_gain`]) and only records the new value in
//! [`TunerSettings`] when the backend accepts it. Failures map onto
//! [`SdrError`] kinds:
//!
//! | Setter | Negative status |
//! |---|---|
//! | gain, center frequency, correction, sample rate, bandwidth, crystal, IF gain | `Validation` |
//! | gain mode, AGC, direct sampling, bias tee | `State` |
//!
//! Extra properties have their own mapping, see [`crate::properties`].

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::backend::{NativeHandle, Status};
use crate::device::Device;
use crate::driver::DeviceInfo;
use crate::error::{Result, SdrError};
use crate::models::TunerType;
use crate::padding::trim_trailing_zero_values;
use crate::properties::PropertyValue;
use crate::protocol::GAIN_BUFFER_LEN;
use crate::stream::{SampleStream, StreamOptions};

/// Reference clock pair (RTL2832U, tuner chip).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CrystalFrequency {
    pub rtl_hz: u32,
    pub tuner_hz: u32,
}

/// Last values accepted by the backend through this configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TunerSettings {
    pub correction_ppm: i32,
    pub center_frequency_hz: u64,
    pub sample_rate_hz: u32,
    /// Explicit gain, always a member of the supported set when present.
    pub gain: Option<i32>,
    pub gain_mode_automatic: bool,
    pub agc_enabled: bool,
    pub direct_sampling_enabled: bool,
    pub offset_tuning_enabled: bool,
    pub bandwidth_hz: u32,
    pub bias_tee_enabled: bool,
    pub crystal_frequency: Option<CrystalFrequency>,
    pub extra_properties: BTreeMap<String, PropertyValue>,
}

/// Which error kind a rejected setter maps to.
#[derive(Clone, Copy)]
enum Rejection {
    Validation,
    State,
}

/// Parameter state of one open device. Owns the device.
#[derive(Debug)]
pub struct TunerConfiguration {
    pub(crate) device: Device,
    pub(crate) settings: TunerSettings,
}

impl TunerConfiguration {
    pub(crate) fn new(device: Device) -> Self {
        TunerConfiguration {
            device,
            settings: TunerSettings::default(),
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut Device {
        &mut self.device
    }

    pub fn settings(&self) -> &TunerSettings {
        &self.settings
    }

    pub(crate) fn handle(&self, op: &str) -> Result<NativeHandle> {
        self.device.handle(op)
    }

    fn check(&self, status: Status, op: &str, value: impl fmt::Display, kind: Rejection) -> Result<()> {
        if status >= 0 {
            return Ok(());
        }
        let msg = format!(
            "{op}: device {} rejected {value} (status {status})",
            self.device.index()
        );
        Err(match kind {
            Rejection::Validation => SdrError::Validation(msg),
            Rejection::State => SdrError::State(msg),
        })
    }

    // ── Setters ──

    /// Set an explicit gain. `gain` must be one of [`supported_gains`](Self::supported_gains);
    /// the table is queried fresh on every call and values are never clamped.
    pub fn set_gain(&mut self, gain: i32) -> Result<()> {
        let gains = self.supported_gains()?;
        if !gains.contains(&gain) {
            return Err(SdrError::Validation(format!(
                "set_gain: {gain} is not a supported gain of device {} (supported: {gains:?})",
                self.device.index()
            )));
        }
        let h = self.handle("set_gain")?;
        let status = self.device.backend().set_tuner_gain(h, gain);
        self.check(status, "set_gain", gain, Rejection::Validation)?;
        self.settings.gain = Some(gain);
        Ok(())
    }

    pub fn set_gain_mode(&mut self, automatic: bool) -> Result<()> {
        let h = self.handle("set_gain_mode")?;
        let status = self.device.backend().set_tuner_gain_mode(h, !automatic);
        let mode = if automatic { "automatic" } else { "manual" };
        self.check(status, "set_gain_mode", mode, Rejection::State)?;
        self.settings.gain_mode_automatic = automatic;
        Ok(())
    }

    pub fn set_center_frequency(&mut self, hz: u64) -> Result<()> {
        let h = self.handle("set_center_frequency")?;
        let status = self.device.backend().set_center_freq(h, hz);
        self.check(status, "set_center_frequency", format_args!("{hz} Hz"), Rejection::Validation)?;
        self.settings.center_frequency_hz = hz;
        Ok(())
    }

    pub fn set_correction_frequency(&mut self, ppm: i32) -> Result<()> {
        let h = self.handle("set_correction_frequency")?;
        let status = self.device.backend().set_freq_correction(h, ppm);
        self.check(status, "set_correction_frequency", format_args!("{ppm} ppm"), Rejection::Validation)?;
        self.settings.correction_ppm = ppm;
        Ok(())
    }

    pub fn set_sample_rate(&mut self, hz: u32) -> Result<()> {
        let h = self.handle("set_sample_rate")?;
        let status = self.device.backend().set_sample_rate(h, hz);
        self.check(status, "set_sample_rate", format_args!("{hz} Hz"), Rejection::Validation)?;
        self.settings.sample_rate_hz = hz;
        Ok(())
    }

    /// Tuner IF bandwidth; `0` selects automatic bandwidth.
    pub fn set_bandwidth(&mut self, hz: u32) -> Result<()> {
        let h = self.handle("set_bandwidth")?;
        let status = self.device.backend().set_tuner_bandwidth(h, hz);
        self.check(status, "set_bandwidth", format_args!("{hz} Hz"), Rejection::Validation)?;
        self.settings.bandwidth_hz = hz;
        Ok(())
    }

    pub fn set_crystal_frequency(&mut self, xtal: CrystalFrequency) -> Result<()> {
        let h = self.handle("set_crystal_frequency")?;
        let status = self
            .device
            .backend()
            .set_xtal_freq(h, xtal.rtl_hz, xtal.tuner_hz);
        self.check(
            status,
            "set_crystal_frequency",
            format_args!("{}/{} Hz", xtal.rtl_hz, xtal.tuner_hz),
            Rejection::Validation,
        )?;
        self.settings.crystal_frequency = Some(xtal);
        Ok(())
    }

    /// Gain of one IF stage (E4000 only on stock librtlsdr).
    pub fn set_if_gain(&mut self, stage: i32, gain: i32) -> Result<()> {
        let h = self.handle("set_if_gain")?;
        let status = self.device.backend().set_tuner_if_gain(h, stage, gain);
        self.check(
            status,
            "set_if_gain",
            format_args!("{gain} on stage {stage}"),
            Rejection::Validation,
        )
    }

    pub fn set_agc_mode(&mut self, on: bool) -> Result<()> {
        let h = self.handle("set_agc_mode")?;
        let status = self.device.backend().set_agc_mode(h, on);
        self.check(status, "set_agc_mode", on, Rejection::State)?;
        self.settings.agc_enabled = on;
        Ok(())
    }

    pub fn set_direct_sampling(&mut self, on: bool) -> Result<()> {
        let h = self.handle("set_direct_sampling")?;
        let status = self.device.backend().set_direct_sampling(h, on);
        self.check(status, "set_direct_sampling", on, Rejection::State)?;
        self.settings.direct_sampling_enabled = on;
        Ok(())
    }

    pub fn set_bias_tee(&mut self, on: bool) -> Result<()> {
        let h = self.handle("set_bias_tee")?;
        let status = self.device.backend().set_bias_tee(h, on);
        self.check(status, "set_bias_tee", on, Rejection::State)?;
        self.settings.bias_tee_enabled = on;
        Ok(())
    }

    // ── Queries ──

    /// Gains the tuner accepts, ascending, without duplicates.
    pub fn supported_gains(&self) -> Result<Vec<i32>> {
        let h = self.handle("supported_gains")?;
        let mut buf = [0i32; GAIN_BUFFER_LEN];
        let status = self.device.backend().get_tuner_gains(h, &mut buf);
        if status < 0 {
            return Err(SdrError::Resource(format!(
                "supported_gains: device {} returned status {status}",
                self.device.index()
            )));
        }
        // A positive status bounds the table exactly; otherwise fall back to
        // the zero padding.
        let filled = if status > 0 {
            &buf[..(status as usize).min(GAIN_BUFFER_LEN)]
        } else {
            trim_trailing_zero_values(&buf)
        };
        let mut gains = filled.to_vec();
        gains.sort_unstable();
        gains.dedup();
        Ok(gains)
    }

    pub fn tuner_type(&self) -> Result<TunerType> {
        let h = self.handle("tuner_type")?;
        Ok(TunerType::from_code(self.device.backend().get_tuner_type(h)))
    }

    pub fn correction_frequency(&self) -> Result<i32> {
        let h = self.handle("correction_frequency")?;
        Ok(self.device.backend().get_freq_correction(h))
    }

    pub fn center_frequency(&self) -> Result<u64> {
        let h = self.handle("center_frequency")?;
        Ok(self.device.backend().get_center_freq(h))
    }

    pub fn sample_rate(&self) -> Result<u32> {
        let h = self.handle("sample_rate")?;
        Ok(self.device.backend().get_sample_rate(h))
    }

    /// Current tuner gain as reported by the hardware.
    pub fn gain(&self) -> Result<i32> {
        let h = self.handle("gain")?;
        Ok(self.device.backend().get_tuner_gain(h))
    }

    pub fn crystal_frequency(&self) -> Result<CrystalFrequency> {
        let h = self.handle("crystal_frequency")?;
        let (rtl_hz, tuner_hz) = self.device.backend().get_xtal_freq(h).map_err(|status| {
            SdrError::Resource(format!(
                "crystal_frequency: device {} returned status {status}",
                self.device.index()
            ))
        })?;
        Ok(CrystalFrequency { rtl_hz, tuner_hz })
    }

    /// Read-only snapshot of the hardware-reported parameters.
    pub fn describe(&self) -> Result<TunerSummary> {
        Ok(TunerSummary {
            device: self.device.info().clone(),
            tuner: self.tuner_type()?,
            correction_ppm: self.correction_frequency()?,
            center_frequency_hz: self.center_frequency()?,
            sample_rate_hz: self.sample_rate()?,
            gain: self.gain()?,
            supported_gains: self.supported_gains()?,
        })
    }

    // ── Streaming ──

    /// New sample stream with default batching. No backend calls.
    pub fn tune(&mut self) -> SampleStream<'_> {
        self.tune_with(StreamOptions::default())
    }

    pub fn tune_with(&mut self, options: StreamOptions) -> SampleStream<'_> {
        log::debug!(
            "Tuning device {} at {} Hz",
            self.device.info().label(),
            self.settings.center_frequency_hz
        );
        SampleStream::new(self, options)
    }

    /// Close the underlying device. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        self.device.close()
    }
}

/// Snapshot returned by [`TunerConfiguration::describe`].
#[derive(Debug, Clone, Serialize)]
pub struct TunerSummary {
    pub device: DeviceInfo,
    pub tuner: TunerType,
    pub correction_ppm: i32,
    pub center_frequency_hz: u64,
    pub sample_rate_hz: u32,
    pub gain: i32,
    pub supported_gains: Vec<i32>,
}

impl fmt::Display for TunerSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let gains: Vec<String> = self.supported_gains.iter().map(|g| g.to_string()).collect();
        writeln!(f, "Tuner:            {}", self.tuner)?;
        writeln!(f, "Correction:       {} ppm", self.correction_ppm)?;
        writeln!(f, "Center frequency: {} Hz", self.center_frequency_hz)?;
        writeln!(f, "Sample rate:      {} Hz", self.sample_rate_hz)?;
        writeln!(f, "Gain:             {}", self.gain)?;
        write!(f, "Supported gains:  {}", gains.join(", "))
    }
}
