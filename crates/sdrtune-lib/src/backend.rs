//! Native radio backend boundary: trait + in-memory fake.
//!
//! [`RadioBackend`] mirrors the vendor driver's C ABI one call at a time:
//! setters return a raw status (negative = failure), queries return values,
//! and enumeration/gain/sample transfers fill caller-provided fixed buffers.
//! Translating statuses into [`crate::SdrError`]s is the job of the core
//! types ([`crate::device`], [`crate::tuner`], [`crate::stream`]), never of a
//! backend.

use std::fmt;

/// Raw status returned by backend calls. Negative means failure.
pub type Status = i32;

/// Opaque connection handle returned by [`RadioBackend::open`].
///
/// Only the [`crate::device::Device`] that opened it may use or release it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHandle(usize);

impl NativeHandle {
    pub fn from_raw(raw: usize) -> Self {
        NativeHandle(raw)
    }

    pub fn as_raw(self) -> usize {
        self.0
    }
}

impl fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

// ── Trait ──

/// The vendor driver contract the core is written against.
///
/// Implementations must be `Send + Sync`: the asynchronous read loop runs
/// on a worker thread and calls [`read_async`](Self::read_async) there while
/// the owning thread may call [`cancel_async`](Self::cancel_async).
pub trait RadioBackend: Send + Sync {
    // ── Enumeration ──

    fn device_count(&self) -> u32;
    fn device_name(&self, index: u32) -> String;
    /// Fill the three fixed buffers with NUL-padded identity strings.
    fn device_usb_strings(
        &self,
        index: u32,
        manufacturer: &mut [u8],
        product: &mut [u8],
        serial: &mut [u8],
    ) -> Status;

    // ── Connection ──

    fn open(&self, index: u32) -> std::result::Result<NativeHandle, Status>;
    fn close(&self, handle: NativeHandle) -> Status;

    // ── Parameters ──

    /// Tuner chip code, see `protocol::TUNER_TYPE_*`.
    fn get_tuner_type(&self, handle: NativeHandle) -> i32;
    fn set_freq_correction(&self, handle: NativeHandle, ppm: i32) -> Status;
    fn get_freq_correction(&self, handle: NativeHandle) -> i32;
    fn set_center_freq(&self, handle: NativeHandle, hz: u64) -> Status;
    fn get_center_freq(&self, handle: NativeHandle) -> u64;
    fn set_sample_rate(&self, handle: NativeHandle, hz: u32) -> Status;
    fn get_sample_rate(&self, handle: NativeHandle) -> u32;
    /// Fill `gains` with supported gain steps; returns the count or a negative status.
    fn get_tuner_gains(&self, handle: NativeHandle, gains: &mut [i32]) -> Status;
    fn set_tuner_gain(&self, handle: NativeHandle, gain: i32) -> Status;
    fn get_tuner_gain(&self, handle: NativeHandle) -> i32;
    fn set_tuner_gain_mode(&self, handle: NativeHandle, manual: bool) -> Status;
    fn set_tuner_if_gain(&self, handle: NativeHandle, stage: i32, gain: i32) -> Status;
    fn set_tuner_bandwidth(&self, handle: NativeHandle, hz: u32) -> Status;
    fn set_agc_mode(&self, handle: NativeHandle, on: bool) -> Status;
    fn set_direct_sampling(&self, handle: NativeHandle, on: bool) -> Status;
    fn set_offset_tuning(&self, handle: NativeHandle, on: bool) -> Status;
    fn set_xtal_freq(&self, handle: NativeHandle, rtl_hz: u32, tuner_hz: u32) -> Status;
    fn get_xtal_freq(&self, handle: NativeHandle) -> std::result::Result<(u32, u32), Status>;

    /// Default: not supported by this backend.
    fn set_dithering(&self, _handle: NativeHandle, _on: bool) -> Status {
        crate::protocol::STATUS_INVALID_HANDLE
    }

    /// Default: not supported by this backend.
    fn set_bias_tee(&self, _handle: NativeHandle, _on: bool) -> Status {
        crate::protocol::STATUS_INVALID_HANDLE
    }

    // ── Transfer ──

    fn reset_buffer(&self, handle: NativeHandle) -> Status;
    /// Blocking read into `buf`; unused tail is left zeroed.
    fn read_sync(&self, handle: NativeHandle, buf: &mut [u8], n_read: &mut usize) -> Status;
    /// Run the streaming loop until cancelled or the device stops delivering.
    /// Blocks the calling thread; `callback` gets one call per filled buffer.
    fn read_async(
        &self,
        handle: NativeHandle,
        callback: &mut dyn FnMut(&[u8]),
        buf_num: u32,
        buf_len: u32,
    ) -> Status;
    fn cancel_async(&self, handle: NativeHandle) -> Status;
}

// ── Fake backend for testing ──

/// In-memory backend for unit and integration tests.
///
/// Always compiled (zero runtime cost), hidden from public docs.
#[doc(hidden)]
pub mod mock {
    use super::*;
    use crate::protocol::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::{Mutex, MutexGuard};

    /// R820T gain table in tenths of a dB.
    pub const R820T_GAINS: [i32; 29] = [
        0, 9, 14, 27, 37, 77, 87, 125, 144, 157, 166, 197, 207, 229, 254, 280, 297, 328, 338, 364,
        372, 386, 402, 421, 434, 439, 445, 480, 496,
    ];

    /// One attached unit as reported by enumeration.
    #[derive(Debug, Clone)]
    pub struct FakeUnit {
        pub name: String,
        pub manufacturer: String,
        pub product: String,
        pub serial: String,
    }

    impl FakeUnit {
        pub fn new(serial: &str) -> Self {
            FakeUnit {
                name: "Generic RTL2832U OEM".into(),
                manufacturer: "Realtek".into(),
                product: "RTL2838UHIDIR".into(),
                serial: serial.into(),
            }
        }
    }

    /// Mutable state behind the fake. Tests reach it through [`FakeBackend::state`].
    #[derive(Debug)]
    pub struct FakeState {
        pub units: Vec<FakeUnit>,
        pub open_handles: HashSet<usize>,
        pub tuner_type: i32,
        pub gains: Vec<i32>,
        pub correction: i32,
        pub center_freq: u64,
        pub sample_rate: u32,
        pub gain: i32,
        pub manual_gain: bool,
        pub if_gains: Vec<(i32, i32)>,
        pub bandwidth: u32,
        pub agc: bool,
        pub direct_sampling: bool,
        pub offset_tuning: bool,
        pub dithering: bool,
        pub bias_tee: bool,
        pub xtal: (u32, u32),
        /// Bytes copied into every `read_sync` buffer; the rest stays zero.
        pub sample_data: Vec<u8>,
        /// Buffers delivered, in order, by `read_async`.
        pub async_buffers: Vec<Vec<u8>>,
        /// Injected statuses keyed by operation name (e.g. `"set_tuner_gain"`).
        pub statuses: HashMap<&'static str, Status>,
        /// Recorded operation names, in call order.
        pub calls: Vec<&'static str>,
        pub cancelled: bool,
    }

    pub struct FakeBackend {
        state: Mutex<FakeState>,
    }

    impl Default for FakeBackend {
        fn default() -> Self {
            Self::new()
        }
    }

    impl FakeBackend {
        /// One R820T unit with serial `00000001`.
        pub fn new() -> Self {
            Self::with_units(vec![FakeUnit::new("00000001")])
        }

        pub fn with_units(units: Vec<FakeUnit>) -> Self {
            FakeBackend {
                state: Mutex::new(FakeState {
                    units,
                    open_handles: HashSet::new(),
                    tuner_type: TUNER_TYPE_R820T,
                    gains: R820T_GAINS.to_vec(),
                    correction: 0,
                    center_freq: 0,
                    sample_rate: 0,
                    gain: 0,
                    manual_gain: false,
                    if_gains: Vec::new(),
                    bandwidth: 0,
                    agc: false,
                    direct_sampling: false,
                    offset_tuning: false,
                    dithering: false,
                    bias_tee: false,
                    xtal: (28_800_000, 28_800_000),
                    sample_data: Vec::new(),
                    async_buffers: Vec::new(),
                    statuses: HashMap::new(),
                    calls: Vec::new(),
                    cancelled: false,
                }),
            }
        }

        pub fn state(&self) -> MutexGuard<'_, FakeState> {
            self.state.lock().unwrap_or_else(|e| e.into_inner())
        }

        /// Make every subsequent call to `op` return `status`.
        pub fn fail(&self, op: &'static str, status: Status) {
            self.state().statuses.insert(op, status);
        }

        pub fn set_tuner_type(&self, code: i32) {
            self.state().tuner_type = code;
        }

        /// Recorded operation names, in call order.
        pub fn calls(&self) -> Vec<&'static str> {
            self.state().calls.clone()
        }

        pub fn call_count(&self, op: &str) -> usize {
            self.state().calls.iter().filter(|c| **c == op).count()
        }

        /// Record `op`, then return the injected status, `-1` for a handle that
        /// is not open, or `None` to let the caller proceed.
        fn enter(&self, state: &mut FakeState, op: &'static str, handle: NativeHandle) -> Option<Status> {
            state.calls.push(op);
            if let Some(&status) = state.statuses.get(op) {
                return Some(status);
            }
            if !state.open_handles.contains(&handle.as_raw()) {
                return Some(STATUS_INVALID_HANDLE);
            }
            None
        }

        /// Run a setter: on success apply `update` and return 0.
        fn set(
            &self,
            op: &'static str,
            handle: NativeHandle,
            update: impl FnOnce(&mut FakeState) -> Status,
        ) -> Status {
            let mut state = self.state();
            if let Some(status) = self.enter(&mut state, op, handle) {
                if status < 0 {
                    return status;
                }
            }
            update(&mut state)
        }

        /// Run a query; returns `default` when the handle is unusable.
        fn get<T>(&self, op: &'static str, handle: NativeHandle, default: T, read: impl FnOnce(&FakeState) -> T) -> T {
            let mut state = self.state();
            match self.enter(&mut state, op, handle) {
                Some(status) if status < 0 => default,
                _ => read(&state),
            }
        }
    }

    fn copy_padded(dst: &mut [u8], src: &str) {
        let n = src.len().min(dst.len().saturating_sub(1));
        dst[..n].copy_from_slice(&src.as_bytes()[..n]);
    }

    impl RadioBackend for FakeBackend {
        fn device_count(&self) -> u32 {
            let mut state = self.state();
            state.calls.push("device_count");
            state.units.len() as u32
        }

        fn device_name(&self, index: u32) -> String {
            let mut state = self.state();
            state.calls.push("device_name");
            state
                .units
                .get(index as usize)
                .map(|u| u.name.clone())
                .unwrap_or_default()
        }

        fn device_usb_strings(
            &self,
            index: u32,
            manufacturer: &mut [u8],
            product: &mut [u8],
            serial: &mut [u8],
        ) -> Status {
            let mut state = self.state();
            state.calls.push("device_usb_strings");
            if let Some(&status) = state.statuses.get("device_usb_strings") {
                return status;
            }
            let Some(unit) = state.units.get(index as usize) else {
                return STATUS_INVALID_HANDLE;
            };
            copy_padded(manufacturer, &unit.manufacturer);
            copy_padded(product, &unit.product);
            copy_padded(serial, &unit.serial);
            0
        }

        fn open(&self, index: u32) -> std::result::Result<NativeHandle, Status> {
            let mut state = self.state();
            state.calls.push("open");
            if let Some(&status) = state.statuses.get("open")
                && status < 0
            {
                return Err(status);
            }
            if index as usize >= state.units.len() {
                return Err(STATUS_INVALID_HANDLE);
            }
            let raw = index as usize + 1;
            if !state.open_handles.insert(raw) {
                // LIBUSB_ERROR_BUSY
                return Err(-6);
            }
            Ok(NativeHandle::from_raw(raw))
        }

        fn close(&self, handle: NativeHandle) -> Status {
            let mut state = self.state();
            state.calls.push("close");
            state.open_handles.remove(&handle.as_raw());
            state.statuses.get("close").copied().unwrap_or(0)
        }

        fn get_tuner_type(&self, handle: NativeHandle) -> i32 {
            self.get("get_tuner_type", handle, TUNER_TYPE_UNKNOWN, |s| s.tuner_type)
        }

        fn set_freq_correction(&self, handle: NativeHandle, ppm: i32) -> Status {
            self.set("set_freq_correction", handle, |s| {
                s.correction = ppm;
                0
            })
        }

        fn get_freq_correction(&self, handle: NativeHandle) -> i32 {
            self.get("get_freq_correction", handle, 0, |s| s.correction)
        }

        fn set_center_freq(&self, handle: NativeHandle, hz: u64) -> Status {
            self.set("set_center_freq", handle, |s| {
                s.center_freq = hz;
                0
            })
        }

        fn get_center_freq(&self, handle: NativeHandle) -> u64 {
            self.get("get_center_freq", handle, 0, |s| s.center_freq)
        }

        fn set_sample_rate(&self, handle: NativeHandle, hz: u32) -> Status {
            self.set("set_sample_rate", handle, |s| {
                s.sample_rate = hz;
                0
            })
        }

        fn get_sample_rate(&self, handle: NativeHandle) -> u32 {
            self.get("get_sample_rate", handle, 0, |s| s.sample_rate)
        }

        fn get_tuner_gains(&self, handle: NativeHandle, gains: &mut [i32]) -> Status {
            let mut state = self.state();
            if let Some(status) = self.enter(&mut state, "get_tuner_gains", handle)
                && status < 0
            {
                return status;
            }
            let n = state.gains.len().min(gains.len());
            gains[..n].copy_from_slice(&state.gains[..n]);
            n as Status
        }

        fn set_tuner_gain(&self, handle: NativeHandle, gain: i32) -> Status {
            self.set("set_tuner_gain", handle, |s| {
                s.gain = gain;
                0
            })
        }

        fn get_tuner_gain(&self, handle: NativeHandle) -> i32 {
            self.get("get_tuner_gain", handle, 0, |s| s.gain)
        }

        fn set_tuner_gain_mode(&self, handle: NativeHandle, manual: bool) -> Status {
            self.set("set_tuner_gain_mode", handle, |s| {
                s.manual_gain = manual;
                0
            })
        }

        fn set_tuner_if_gain(&self, handle: NativeHandle, stage: i32, gain: i32) -> Status {
            self.set("set_tuner_if_gain", handle, |s| {
                s.if_gains.push((stage, gain));
                0
            })
        }

        fn set_tuner_bandwidth(&self, handle: NativeHandle, hz: u32) -> Status {
            self.set("set_tuner_bandwidth", handle, |s| {
                s.bandwidth = hz;
                0
            })
        }

        fn set_agc_mode(&self, handle: NativeHandle, on: bool) -> Status {
            self.set("set_agc_mode", handle, |s| {
                s.agc = on;
                0
            })
        }

        fn set_direct_sampling(&self, handle: NativeHandle, on: bool) -> Status {
            self.set("set_direct_sampling", handle, |s| {
                s.direct_sampling = on;
                0
            })
        }

        fn set_offset_tuning(&self, handle: NativeHandle, on: bool) -> Status {
            self.set("set_offset_tuning", handle, |s| {
                if s.tuner_type == TUNER_TYPE_R820T || s.tuner_type == TUNER_TYPE_R828D {
                    return STATUS_OFFSET_TUNING_UNSUPPORTED;
                }
                if s.direct_sampling {
                    return STATUS_OFFSET_TUNING_CONFLICT;
                }
                s.offset_tuning = on;
                0
            })
        }

        fn set_xtal_freq(&self, handle: NativeHandle, rtl_hz: u32, tuner_hz: u32) -> Status {
            self.set("set_xtal_freq", handle, |s| {
                s.xtal = (rtl_hz, tuner_hz);
                0
            })
        }

        fn get_xtal_freq(&self, handle: NativeHandle) -> std::result::Result<(u32, u32), Status> {
            let mut state = self.state();
            match self.enter(&mut state, "get_xtal_freq", handle) {
                Some(status) if status < 0 => Err(status),
                _ => Ok(state.xtal),
            }
        }

        fn set_dithering(&self, handle: NativeHandle, on: bool) -> Status {
            let mut state = self.state();
            if let Some(status) = self.enter(&mut state, "set_dithering", handle) {
                return status;
            }
            state.dithering = on;
            0
        }

        fn set_bias_tee(&self, handle: NativeHandle, on: bool) -> Status {
            self.set("set_bias_tee", handle, |s| {
                s.bias_tee = on;
                0
            })
        }

        fn reset_buffer(&self, handle: NativeHandle) -> Status {
            self.set("reset_buffer", handle, |s| {
                s.cancelled = false;
                0
            })
        }

        fn read_sync(&self, handle: NativeHandle, buf: &mut [u8], n_read: &mut usize) -> Status {
            let mut state = self.state();
            if let Some(status) = self.enter(&mut state, "read_sync", handle)
                && status < 0
            {
                return status;
            }
            let n = state.sample_data.len().min(buf.len());
            buf[..n].copy_from_slice(&state.sample_data[..n]);
            *n_read = buf.len();
            0
        }

        fn read_async(
            &self,
            handle: NativeHandle,
            callback: &mut dyn FnMut(&[u8]),
            _buf_num: u32,
            _buf_len: u32,
        ) -> Status {
            let buffers = {
                let mut state = self.state();
                if let Some(status) = self.enter(&mut state, "read_async", handle)
                    && status < 0
                {
                    return status;
                }
                state.async_buffers.clone()
            };
            // The lock is released while delivering so `cancel_async` can land.
            for buffer in &buffers {
                if self.state().cancelled {
                    break;
                }
                callback(buffer);
            }
            0
        }

        fn cancel_async(&self, handle: NativeHandle) -> Status {
            self.set("cancel_async", handle, |s| {
                s.cancelled = true;
                0
            })
        }
    }
}
