//! Fixed-buffer helpers.
//!
//! The backend fills caller-provided fixed-size buffers and pads whatever it
//! did not use with zeros. These helpers strip that padding.
//!
//! Trimming sample data cannot tell padding apart from payload bytes that
//! happen to be zero: a transfer whose real data ends in `0x00` loses those
//! bytes. [`crate::stream::SampleStream::read_sync_raw`] skips the trim for
//! callers that cannot accept that.

/// Slice of `bytes` without its trailing zero bytes.
pub fn trim_trailing_zeros(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &bytes[..end]
}

/// Slice of `values` without its trailing zero entries.
pub fn trim_trailing_zero_values(values: &[i32]) -> &[i32] {
    let end = values.iter().rposition(|&v| v != 0).map_or(0, |i| i + 1);
    &values[..end]
}

/// Parse a NUL-terminated string out of a fixed buffer.
pub fn parse_padded_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_zero_padding() {
        assert_eq!(trim_trailing_zeros(&[1, 2, 3, 0, 0]), &[1, 2, 3]);
    }

    #[test]
    fn keeps_interior_zeros() {
        assert_eq!(trim_trailing_zeros(&[0, 7, 0, 9, 0]), &[0, 7, 0, 9]);
    }

    #[test]
    fn all_zero_buffer_is_empty() {
        assert!(trim_trailing_zeros(&[0; 1024]).is_empty());
    }

    #[test]
    fn empty_buffer_is_empty() {
        assert!(trim_trailing_zeros(&[]).is_empty());
    }

    #[test]
    fn gain_padding_keeps_leading_zero_gain() {
        // R820T reports 0 as its lowest gain step.
        let mut buf = [0i32; 8];
        buf[..3].copy_from_slice(&[0, 9, 14]);
        assert_eq!(trim_trailing_zero_values(&buf), &[0, 9, 14]);
    }

    #[test]
    fn parses_nul_terminated_string() {
        let mut buf = [0u8; 16];
        buf[..7].copy_from_slice(b"Realtek");
        assert_eq!(parse_padded_string(&buf), "Realtek");
    }

    #[test]
    fn parses_unterminated_string() {
        assert_eq!(parse_padded_string(b"RTL2838UHIDIR"), "RTL2838UHIDIR");
    }

    #[test]
    fn empty_string_buffer() {
        assert_eq!(parse_padded_string(&[0u8; 256]), "");
    }
}
