//! Capture sink: writes raw sample bytes to any `Write`, up to a byte limit.

use std::io::{self, Write};

/// Byte-limited, counting writer for captured samples.
#[derive(Debug)]
pub struct CaptureSink<W: Write> {
    out: W,
    limit: Option<u64>,
    written: u64,
}

impl<W: Write> CaptureSink<W> {
    /// `limit = None` captures until the caller stops.
    pub fn new(out: W, limit: Option<u64>) -> Self {
        CaptureSink {
            out,
            limit,
            written: 0,
        }
    }

    /// Write as much of `samples` as the limit allows.
    ///
    /// Returns `true` while more data is wanted.
    pub fn write_samples(&mut self, samples: &[u8]) -> io::Result<bool> {
        let take = match self.remaining() {
            Some(left) => samples.len().min(usize::try_from(left).unwrap_or(usize::MAX)),
            None => samples.len(),
        };
        self.out.write_all(&samples[..take])?;
        self.written += take as u64;
        Ok(!self.is_full())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Bytes left before the limit, `None` when unlimited.
    pub fn remaining(&self) -> Option<u64> {
        self.limit.map(|l| l.saturating_sub(self.written))
    }

    pub fn is_full(&self) -> bool {
        self.remaining() == Some(0)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_writes_everything() {
        let mut sink = CaptureSink::new(Vec::new(), None);
        assert!(sink.write_samples(&[1, 2, 3]).unwrap());
        assert!(sink.write_samples(&[4]).unwrap());
        assert_eq!(sink.written(), 4);
        assert_eq!(sink.remaining(), None);
        assert_eq!(sink.into_inner(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn limit_truncates_last_block() {
        let mut sink = CaptureSink::new(Vec::new(), Some(5));
        assert!(sink.write_samples(&[1, 2, 3]).unwrap());
        assert!(!sink.write_samples(&[4, 5, 6, 7]).unwrap());
        assert!(sink.is_full());
        assert_eq!(sink.into_inner(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn writes_after_full_are_dropped() {
        let mut sink = CaptureSink::new(Vec::new(), Some(2));
        sink.write_samples(&[1, 2]).unwrap();
        assert!(!sink.write_samples(&[3]).unwrap());
        assert_eq!(sink.written(), 2);
    }

    #[test]
    fn zero_limit_is_full_immediately() {
        let sink = CaptureSink::new(Vec::new(), Some(0));
        assert!(sink.is_full());
    }

    #[test]
    fn io_errors_propagate() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }
        let mut sink = CaptureSink::new(Broken, None);
        let err = sink.write_samples(&[1]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(sink.written(), 0);
    }
}
