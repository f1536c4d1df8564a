//! librtlsdr provider.
//!
//! The vendor library is loaded at runtime with `libloading` so the same
//! binary works with or without it installed. Loading happens at most once
//! per process; [`RtlSdrBackend::load`] returns `None` when no candidate
//! library (or one of its required symbols) is found.
//!
//! Symbols that only exist in newer or forked builds (bias tee, dithering,
//! IF gain, bandwidth) are optional and report a failure status when absent.

use std::any::Any;
use std::ffi::{CStr, c_char, c_int, c_uchar, c_uint, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::sync::OnceLock;

use libloading::Library;

use crate::backend::{NativeHandle, RadioBackend, Status};
use crate::protocol::{STATUS_DITHERING_REFUSED, STATUS_INVALID_HANDLE};

type Dev = *mut c_void;
type AsyncCallback = unsafe extern "C" fn(*mut c_uchar, c_uint, *mut c_void);

#[cfg(target_os = "linux")]
const LIB_NAMES: &[&str] = &["librtlsdr.so.0", "librtlsdr.so"];

#[cfg(target_os = "macos")]
const LIB_NAMES: &[&str] = &["librtlsdr.dylib", "librtlsdr.0.dylib"];

#[cfg(target_os = "windows")]
const LIB_NAMES: &[&str] = &["rtlsdr.dll", "librtlsdr.dll"];

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
const LIB_NAMES: &[&str] = &["librtlsdr.so"];

/// Resolved entry points. The `Library` is kept alive alongside the copied
/// function pointers and never unloaded.
struct RtlSdrLib {
    _lib: Library,
    get_device_count: unsafe extern "C" fn() -> c_uint,
    get_device_name: unsafe extern "C" fn(c_uint) -> *const c_char,
    get_device_usb_strings:
        unsafe extern "C" fn(c_uint, *mut c_char, *mut c_char, *mut c_char) -> c_int,
    open: unsafe extern "C" fn(*mut Dev, c_uint) -> c_int,
    close: unsafe extern "C" fn(Dev) -> c_int,
    get_tuner_type: unsafe extern "C" fn(Dev) -> c_int,
    set_freq_correction: unsafe extern "C" fn(Dev, c_int) -> c_int,
    get_freq_correction: unsafe extern "C" fn(Dev) -> c_int,
    set_center_freq: unsafe extern "C" fn(Dev, c_uint) -> c_int,
    get_center_freq: unsafe extern "C" fn(Dev) -> c_uint,
    set_sample_rate: unsafe extern "C" fn(Dev, c_uint) -> c_int,
    get_sample_rate: unsafe extern "C" fn(Dev) -> c_uint,
    get_tuner_gains: unsafe extern "C" fn(Dev, *mut c_int) -> c_int,
    set_tuner_gain: unsafe extern "C" fn(Dev, c_int) -> c_int,
    get_tuner_gain: unsafe extern "C" fn(Dev) -> c_int,
    set_tuner_gain_mode: unsafe extern "C" fn(Dev, c_int) -> c_int,
    set_agc_mode: unsafe extern "C" fn(Dev, c_int) -> c_int,
    set_direct_sampling: unsafe extern "C" fn(Dev, c_int) -> c_int,
    set_offset_tuning: unsafe extern "C" fn(Dev, c_int) -> c_int,
    set_xtal_freq: unsafe extern "C" fn(Dev, u32, u32) -> c_int,
    get_xtal_freq: unsafe extern "C" fn(Dev, *mut u32, *mut u32) -> c_int,
    reset_buffer: unsafe extern "C" fn(Dev) -> c_int,
    read_sync: unsafe extern "C" fn(Dev, *mut c_void, c_int, *mut c_int) -> c_int,
    read_async: unsafe extern "C" fn(Dev, AsyncCallback, *mut c_void, u32, u32) -> c_int,
    cancel_async: unsafe extern "C" fn(Dev) -> c_int,
    // Optional
    set_tuner_if_gain: Option<unsafe extern "C" fn(Dev, c_int, c_int) -> c_int>,
    set_tuner_bandwidth: Option<unsafe extern "C" fn(Dev, u32) -> c_int>,
    set_bias_tee: Option<unsafe extern "C" fn(Dev, c_int) -> c_int>,
    set_dithering: Option<unsafe extern "C" fn(Dev, c_int) -> c_int>,
}

static RTLSDR_LIB: OnceLock<Option<RtlSdrLib>> = OnceLock::new();

/// Copy a function pointer out of the library.
///
/// # Safety
/// `T` must match the C signature of `name`.
unsafe fn sym<T: Copy>(lib: &Library, name: &[u8]) -> Option<T> {
    unsafe { lib.get::<T>(name).ok().map(|s| *s) }
}

fn load_from(lib: Library) -> Option<RtlSdrLib> {
    // SAFETY: signatures below match rtl-sdr.h.
    unsafe {
        Some(RtlSdrLib {
            get_device_count: sym(&lib, b"rtlsdr_get_device_count\0")?,
            get_device_name: sym(&lib, b"rtlsdr_get_device_name\0")?,
            get_device_usb_strings: sym(&lib, b"rtlsdr_get_device_usb_strings\0")?,
            open: sym(&lib, b"rtlsdr_open\0")?,
            close: sym(&lib, b"rtlsdr_close\0")?,
            get_tuner_type: sym(&lib, b"rtlsdr_get_tuner_type\0")?,
            set_freq_correction: sym(&lib, b"rtlsdr_set_freq_correction\0")?,
            get_freq_correction: sym(&lib, b"rtlsdr_get_freq_correction\0")?,
            set_center_freq: sym(&lib, b"rtlsdr_set_center_freq\0")?,
            get_center_freq: sym(&lib, b"rtlsdr_get_center_freq\0")?,
            set_sample_rate: sym(&lib, b"rtlsdr_set_sample_rate\0")?,
            get_sample_rate: sym(&lib, b"rtlsdr_get_sample_rate\0")?,
            get_tuner_gains: sym(&lib, b"rtlsdr_get_tuner_gains\0")?,
            set_tuner_gain: sym(&lib, b"rtlsdr_set_tuner_gain\0")?,
            get_tuner_gain: sym(&lib, b"rtlsdr_get_tuner_gain\0")?,
            set_tuner_gain_mode: sym(&lib, b"rtlsdr_set_tuner_gain_mode\0")?,
            set_agc_mode: sym(&lib, b"rtlsdr_set_agc_mode\0")?,
            set_direct_sampling: sym(&lib, b"rtlsdr_set_direct_sampling\0")?,
            set_offset_tuning: sym(&lib, b"rtlsdr_set_offset_tuning\0")?,
            set_xtal_freq: sym(&lib, b"rtlsdr_set_xtal_freq\0")?,
            get_xtal_freq: sym(&lib, b"rtlsdr_get_xtal_freq\0")?,
            reset_buffer: sym(&lib, b"rtlsdr_reset_buffer\0")?,
            read_sync: sym(&lib, b"rtlsdr_read_sync\0")?,
            read_async: sym(&lib, b"rtlsdr_read_async\0")?,
            cancel_async: sym(&lib, b"rtlsdr_cancel_async\0")?,
            set_tuner_if_gain: sym(&lib, b"rtlsdr_set_tuner_if_gain\0"),
            set_tuner_bandwidth: sym(&lib, b"rtlsdr_set_tuner_bandwidth\0"),
            set_bias_tee: sym(&lib, b"rtlsdr_set_bias_tee\0"),
            set_dithering: sym(&lib, b"rtlsdr_set_dithering\0"),
            _lib: lib,
        })
    }
}

fn load_library() -> Option<RtlSdrLib> {
    for name in LIB_NAMES {
        // SAFETY: librtlsdr has no load-time initialisers with preconditions.
        let Ok(lib) = (unsafe { Library::new(name) }) else {
            continue;
        };
        match load_from(lib) {
            Some(loaded) => {
                log::info!("Loaded {name}");
                return Some(loaded);
            }
            None => log::debug!("{name} is missing required symbols"),
        }
    }
    log::debug!("librtlsdr not found (tried {})", LIB_NAMES.join(", "));
    None
}

fn dev(handle: NativeHandle) -> Dev {
    handle.as_raw() as Dev
}

fn flag(on: bool) -> c_int {
    c_int::from(on)
}

/// [`RadioBackend`] over the process-wide librtlsdr instance.
#[derive(Clone, Copy)]
pub struct RtlSdrBackend {
    lib: &'static RtlSdrLib,
}

impl RtlSdrBackend {
    /// Load librtlsdr (first call only) and return a backend over it.
    pub fn load() -> Option<Self> {
        RTLSDR_LIB
            .get_or_init(load_library)
            .as_ref()
            .map(|lib| RtlSdrBackend { lib })
    }

    pub fn is_available() -> bool {
        Self::load().is_some()
    }
}

/// State shared with [`async_trampoline`] for one `read_async` call.
struct AsyncContext<'a> {
    callback: &'a mut dyn FnMut(&[u8]),
    dev: Dev,
    cancel: unsafe extern "C" fn(Dev) -> c_int,
    panic: Option<Box<dyn Any + Send>>,
}

/// Forwards one filled transfer to the Rust callback in `ctx`.
///
/// A panicking callback must not unwind through librtlsdr: the payload is
/// parked in the context, the loop is cancelled and later buffers are
/// dropped. `read_async` resumes the panic once the loop has returned.
unsafe extern "C" fn async_trampoline(buf: *mut c_uchar, len: c_uint, ctx: *mut c_void) {
    if buf.is_null() || ctx.is_null() {
        return;
    }
    // SAFETY: `ctx` is the `AsyncContext` set up in `read_async`, which
    // outlives the loop; `buf` holds `len` bytes for the duration of the call.
    let ctx = unsafe { &mut *(ctx as *mut AsyncContext<'_>) };
    if ctx.panic.is_some() {
        return;
    }
    let bytes = unsafe { std::slice::from_raw_parts(buf, len as usize) };
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| (ctx.callback)(bytes))) {
        ctx.panic = Some(payload);
        unsafe { (ctx.cancel)(ctx.dev) };
    }
}

// SAFETY on every call below: function pointers come from a library that
// stays loaded for the whole process, and handles only ever come from
// `rtlsdr_open` via `Device`.
impl RadioBackend for RtlSdrBackend {
    fn device_count(&self) -> u32 {
        unsafe { (self.lib.get_device_count)() }
    }

    fn device_name(&self, index: u32) -> String {
        let ptr = unsafe { (self.lib.get_device_name)(index) };
        if ptr.is_null() {
            return String::new();
        }
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
    }

    fn device_usb_strings(
        &self,
        index: u32,
        manufacturer: &mut [u8],
        product: &mut [u8],
        serial: &mut [u8],
    ) -> Status {
        // librtlsdr writes at most 256 bytes into each buffer.
        if [manufacturer.len(), product.len(), serial.len()]
            .iter()
            .any(|&n| n < crate::protocol::USB_STRING_LEN)
        {
            return STATUS_INVALID_HANDLE;
        }
        unsafe {
            (self.lib.get_device_usb_strings)(
                index,
                manufacturer.as_mut_ptr() as *mut c_char,
                product.as_mut_ptr() as *mut c_char,
                serial.as_mut_ptr() as *mut c_char,
            )
        }
    }

    fn open(&self, index: u32) -> std::result::Result<NativeHandle, Status> {
        let mut raw: Dev = std::ptr::null_mut();
        let status = unsafe { (self.lib.open)(&mut raw, index) };
        if status < 0 || raw.is_null() {
            return Err(status.min(STATUS_INVALID_HANDLE));
        }
        Ok(NativeHandle::from_raw(raw as usize))
    }

    fn close(&self, handle: NativeHandle) -> Status {
        unsafe { (self.lib.close)(dev(handle)) }
    }

    fn get_tuner_type(&self, handle: NativeHandle) -> i32 {
        unsafe { (self.lib.get_tuner_type)(dev(handle)) }
    }

    fn set_freq_correction(&self, handle: NativeHandle, ppm: i32) -> Status {
        unsafe { (self.lib.set_freq_correction)(dev(handle), ppm) }
    }

    fn get_freq_correction(&self, handle: NativeHandle) -> i32 {
        unsafe { (self.lib.get_freq_correction)(dev(handle)) }
    }

    fn set_center_freq(&self, handle: NativeHandle, hz: u64) -> Status {
        // librtlsdr tunes with a 32-bit frequency.
        match u32::try_from(hz) {
            Ok(hz) => unsafe { (self.lib.set_center_freq)(dev(handle), hz) },
            Err(_) => STATUS_INVALID_HANDLE,
        }
    }

    fn get_center_freq(&self, handle: NativeHandle) -> u64 {
        u64::from(unsafe { (self.lib.get_center_freq)(dev(handle)) })
    }

    fn set_sample_rate(&self, handle: NativeHandle, hz: u32) -> Status {
        unsafe { (self.lib.set_sample_rate)(dev(handle), hz) }
    }

    fn get_sample_rate(&self, handle: NativeHandle) -> u32 {
        unsafe { (self.lib.get_sample_rate)(dev(handle)) }
    }

    fn get_tuner_gains(&self, handle: NativeHandle, gains: &mut [i32]) -> Status {
        // Count-only probe first so a short buffer is never overrun.
        let count = unsafe { (self.lib.get_tuner_gains)(dev(handle), std::ptr::null_mut()) };
        if count < 0 {
            return count;
        }
        if count as usize > gains.len() {
            return STATUS_INVALID_HANDLE;
        }
        unsafe { (self.lib.get_tuner_gains)(dev(handle), gains.as_mut_ptr()) }
    }

    fn set_tuner_gain(&self, handle: NativeHandle, gain: i32) -> Status {
        unsafe { (self.lib.set_tuner_gain)(dev(handle), gain) }
    }

    fn get_tuner_gain(&self, handle: NativeHandle) -> i32 {
        unsafe { (self.lib.get_tuner_gain)(dev(handle)) }
    }

    fn set_tuner_gain_mode(&self, handle: NativeHandle, manual: bool) -> Status {
        unsafe { (self.lib.set_tuner_gain_mode)(dev(handle), flag(manual)) }
    }

    fn set_tuner_if_gain(&self, handle: NativeHandle, stage: i32, gain: i32) -> Status {
        match self.lib.set_tuner_if_gain {
            Some(f) => unsafe { f(dev(handle), stage, gain) },
            None => STATUS_INVALID_HANDLE,
        }
    }

    fn set_tuner_bandwidth(&self, handle: NativeHandle, hz: u32) -> Status {
        match self.lib.set_tuner_bandwidth {
            Some(f) => unsafe { f(dev(handle), hz) },
            None => STATUS_INVALID_HANDLE,
        }
    }

    fn set_agc_mode(&self, handle: NativeHandle, on: bool) -> Status {
        unsafe { (self.lib.set_agc_mode)(dev(handle), flag(on)) }
    }

    fn set_direct_sampling(&self, handle: NativeHandle, on: bool) -> Status {
        unsafe { (self.lib.set_direct_sampling)(dev(handle), flag(on)) }
    }

    fn set_offset_tuning(&self, handle: NativeHandle, on: bool) -> Status {
        unsafe { (self.lib.set_offset_tuning)(dev(handle), flag(on)) }
    }

    fn set_xtal_freq(&self, handle: NativeHandle, rtl_hz: u32, tuner_hz: u32) -> Status {
        unsafe { (self.lib.set_xtal_freq)(dev(handle), rtl_hz, tuner_hz) }
    }

    fn get_xtal_freq(&self, handle: NativeHandle) -> std::result::Result<(u32, u32), Status> {
        let (mut rtl, mut tuner) = (0u32, 0u32);
        let status = unsafe { (self.lib.get_xtal_freq)(dev(handle), &mut rtl, &mut tuner) };
        if status < 0 {
            return Err(status);
        }
        Ok((rtl, tuner))
    }

    fn set_dithering(&self, handle: NativeHandle, on: bool) -> Status {
        match self.lib.set_dithering {
            Some(f) => unsafe { f(dev(handle), flag(on)) },
            None => STATUS_DITHERING_REFUSED,
        }
    }

    fn set_bias_tee(&self, handle: NativeHandle, on: bool) -> Status {
        match self.lib.set_bias_tee {
            Some(f) => unsafe { f(dev(handle), flag(on)) },
            None => STATUS_INVALID_HANDLE,
        }
    }

    fn reset_buffer(&self, handle: NativeHandle) -> Status {
        unsafe { (self.lib.reset_buffer)(dev(handle)) }
    }

    fn read_sync(&self, handle: NativeHandle, buf: &mut [u8], n_read: &mut usize) -> Status {
        let Ok(len) = c_int::try_from(buf.len()) else {
            return STATUS_INVALID_HANDLE;
        };
        let mut got: c_int = 0;
        let status = unsafe {
            (self.lib.read_sync)(dev(handle), buf.as_mut_ptr() as *mut c_void, len, &mut got)
        };
        *n_read = usize::try_from(got).unwrap_or(0).min(buf.len());
        status
    }

    fn read_async(
        &self,
        handle: NativeHandle,
        callback: &mut dyn FnMut(&[u8]),
        buf_num: u32,
        buf_len: u32,
    ) -> Status {
        let mut ctx = AsyncContext {
            callback,
            dev: dev(handle),
            cancel: self.lib.cancel_async,
            panic: None,
        };
        let ctx_ptr = &mut ctx as *mut AsyncContext<'_> as *mut c_void;
        let status = unsafe {
            (self.lib.read_async)(dev(handle), async_trampoline, ctx_ptr, buf_num, buf_len)
        };
        if let Some(payload) = ctx.panic {
            panic::resume_unwind(payload);
        }
        status
    }

    fn cancel_async(&self, handle: NativeHandle) -> Status {
        unsafe { (self.lib.cancel_async)(dev(handle)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn lib_names_not_empty() {
        assert!(!LIB_NAMES.is_empty());
        assert!(LIB_NAMES.iter().all(|n| n.contains("rtlsdr")));
    }

    #[test]
    fn load_is_stable_across_calls() {
        // Whether or not librtlsdr is installed, the answer must not change.
        assert_eq!(RtlSdrBackend::is_available(), RtlSdrBackend::is_available());
    }

    static CANCELLED: AtomicBool = AtomicBool::new(false);

    unsafe extern "C" fn record_cancel(_dev: Dev) -> c_int {
        CANCELLED.store(true, Ordering::SeqCst);
        0
    }

    unsafe extern "C" fn no_cancel(_dev: Dev) -> c_int {
        0
    }

    #[test]
    fn trampoline_forwards_bytes() {
        let mut seen = Vec::new();
        let mut cb = |b: &[u8]| seen.extend_from_slice(b);
        let mut ctx = AsyncContext {
            callback: &mut cb,
            dev: std::ptr::null_mut(),
            cancel: no_cancel,
            panic: None,
        };
        let ptr = &mut ctx as *mut AsyncContext<'_> as *mut c_void;
        let mut data = [1u8, 2, 3];
        unsafe { async_trampoline(data.as_mut_ptr(), 3, ptr) };
        assert!(ctx.panic.is_none());
        drop(ctx);
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn panicking_callback_cancels_loop() {
        let mut calls = 0;
        let mut cb = |_: &[u8]| {
            calls += 1;
            if calls > 0 {
                panic!("callback failed");
            }
        };
        let mut ctx = AsyncContext {
            callback: &mut cb,
            dev: std::ptr::null_mut(),
            cancel: record_cancel,
            panic: None,
        };
        let ptr = &mut ctx as *mut AsyncContext<'_> as *mut c_void;
        let mut data = [0u8; 4];
        unsafe {
            async_trampoline(data.as_mut_ptr(), 4, ptr);
            async_trampoline(data.as_mut_ptr(), 4, ptr);
        }
        assert!(ctx.panic.is_some());
        assert!(CANCELLED.load(Ordering::SeqCst));
        drop(ctx);
        // The second buffer never reached the callback.
        assert_eq!(calls, 1);
    }

    #[test]
    fn trampoline_ignores_null() {
        unsafe { async_trampoline(std::ptr::null_mut(), 0, std::ptr::null_mut()) };
    }
}
