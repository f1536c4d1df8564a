//! Backend calling-convention constants.
//!
//! Values follow librtlsdr, the reference backend. Other backends implementing
//! [`crate::backend::RadioBackend`] are expected to report the same status
//! codes for the same conditions.

// ── Status codes ──

/// Generic failure / missing handle. Every negative status is a failure.
pub const STATUS_INVALID_HANDLE: i32 = -1;

/// `set_offset_tuning`: the tuner family cannot offset-tune (R820T/R828D).
pub const STATUS_OFFSET_TUNING_UNSUPPORTED: i32 = -2;

/// `set_offset_tuning`: direct sampling is active.
pub const STATUS_OFFSET_TUNING_CONFLICT: i32 = -3;

/// `set_dithering`: positive status returned when the tuner refuses the request.
pub const STATUS_DITHERING_REFUSED: i32 = 1;

// ── Tuner type codes (`rtlsdr_get_tuner_type`) ──

pub const TUNER_TYPE_UNKNOWN: i32 = 0;
pub const TUNER_TYPE_E4000: i32 = 1;
pub const TUNER_TYPE_FC0012: i32 = 2;
pub const TUNER_TYPE_FC0013: i32 = 3;
pub const TUNER_TYPE_FC2580: i32 = 4;
pub const TUNER_TYPE_R820T: i32 = 5;
pub const TUNER_TYPE_R828D: i32 = 6;

// ── Fixed buffer sizes ──

/// Size of each manufacturer/product/serial buffer passed to enumeration.
pub const USB_STRING_LEN: usize = 256;

/// Entries in the buffer passed to the supported-gains query.
pub const GAIN_BUFFER_LEN: usize = 256;

// ── Async batching ──

/// Buffers queued by the backend for an asynchronous read loop.
pub const DEFAULT_ASYNC_BUFFER_COUNT: u32 = 64;

/// Bytes per asynchronous buffer (16 KiB, ~3.4 ms at 2.4 MS/s).
/// librtlsdr requires a multiple of 512.
pub const DEFAULT_ASYNC_BUFFER_SIZE: u32 = 0x4000;

/// Transfer sizes handed to the backend must be multiples of this.
pub const TRANSFER_ALIGNMENT: u32 = 512;

// ── Extra property keys ──

/// Enables offset tuning (bool). Incompatible with direct sampling.
pub const PROPERTY_TUNER_OFFSET: &str = "TUNER_OFFSET";

/// Enables PLL dithering (bool). R820T only.
pub const PROPERTY_TUNER_DITHERING: &str = "TUNER_DITHERING";

// ── Driver identifiers ──

/// Registry identifier of the librtlsdr driver.
pub const RTLSDR_DRIVER_ID: &str = "RTL-SDR";
