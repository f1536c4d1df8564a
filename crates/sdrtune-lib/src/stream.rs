//! Sample stream: synchronous or asynchronous reads from a tuned device.
//!
//! A stream is bound to one read discipline by its first read and keeps it
//! until closed. Asynchronous reads run the backend loop on a dedicated
//! worker thread; the callback is invoked there once per filled buffer.
//!
//! ```text
//!            read_sync              read_async
//!   Unset ─────────────► Synchronous   Unset ─────────────► Asynchronous
//!     │                      │            │                      │
//!     └──────── close ───────┴────────────┴──────── close ───────┘──► Closed
//! ```

use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use serde::Serialize;

use crate::error::{Result, SdrError};
use crate::padding::trim_trailing_zeros;
use crate::protocol::{DEFAULT_ASYNC_BUFFER_COUNT, DEFAULT_ASYNC_BUFFER_SIZE, TRANSFER_ALIGNMENT};
use crate::tuner::TunerConfiguration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StreamMode {
    Unset,
    Synchronous,
    Asynchronous,
}

impl fmt::Display for StreamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamMode::Unset => f.write_str("unset"),
            StreamMode::Synchronous => f.write_str("synchronous"),
            StreamMode::Asynchronous => f.write_str("asynchronous"),
        }
    }
}

/// Batching of the asynchronous read loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOptions {
    /// Buffers queued by the backend.
    pub buffer_count: u32,
    /// Bytes per buffer; a multiple of 512.
    pub buffer_size: u32,
}

impl Default for StreamOptions {
    fn default() -> Self {
        StreamOptions {
            buffer_count: DEFAULT_ASYNC_BUFFER_COUNT,
            buffer_size: DEFAULT_ASYNC_BUFFER_SIZE,
        }
    }
}

impl StreamOptions {
    pub fn validate(&self) -> Result<()> {
        if self.buffer_count == 0 {
            return Err(SdrError::Validation(
                "read_async: buffer count must be at least 1".into(),
            ));
        }
        if self.buffer_size == 0 || self.buffer_size % TRANSFER_ALIGNMENT != 0 {
            return Err(SdrError::Validation(format!(
                "read_async: buffer size {} is not a positive multiple of {TRANSFER_ALIGNMENT}",
                self.buffer_size
            )));
        }
        Ok(())
    }
}

/// Reads from one [`TunerConfiguration`], which it borrows exclusively.
pub struct SampleStream<'a> {
    tuner: &'a mut TunerConfiguration,
    mode: StreamMode,
    closed: bool,
    options: StreamOptions,
    worker: Option<JoinHandle<i32>>,
}

impl fmt::Debug for SampleStream<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleStream")
            .field("device", &self.tuner.device().index())
            .field("mode", &self.mode)
            .field("closed", &self.closed)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<'a> SampleStream<'a> {
    pub(crate) fn new(tuner: &'a mut TunerConfiguration, options: StreamOptions) -> Self {
        SampleStream {
            tuner,
            mode: StreamMode::Unset,
            closed: false,
            options,
            worker: None,
        }
    }

    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether an asynchronous loop is still delivering.
    pub fn is_streaming(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    pub fn options(&self) -> StreamOptions {
        self.options
    }

    fn bind(&mut self, op: &str, mode: StreamMode) -> Result<()> {
        if self.closed {
            return Err(SdrError::State(format!("{op}: stream is closed")));
        }
        if self.mode != StreamMode::Unset && self.mode != mode {
            return Err(SdrError::State(format!(
                "{op}: stream already bound to {} mode",
                self.mode
            )));
        }
        self.mode = mode;
        Ok(())
    }

    fn reset_buffer(&self, op: &str) -> Result<()> {
        let h = self.tuner.handle(op)?;
        let status = self.tuner.device().backend().reset_buffer(h);
        if status < 0 {
            return Err(SdrError::Resource(format!(
                "{op}: resetting buffer of device {} failed (status {status})",
                self.tuner.device().index()
            )));
        }
        Ok(())
    }

    fn read_block(&mut self, op: &str, len: usize) -> Result<Vec<u8>> {
        if len == 0 {
            return Err(SdrError::Validation(format!("{op}: length must be positive")));
        }
        self.bind(op, StreamMode::Synchronous)?;
        self.reset_buffer(op)?;
        let h = self.tuner.handle(op)?;
        let mut buf = vec![0u8; len];
        let mut n_read = 0usize;
        let status = self
            .tuner
            .device()
            .backend()
            .read_sync(h, &mut buf, &mut n_read);
        if status < 0 {
            return Err(SdrError::Resource(format!(
                "{op}: device {} failed reading {len} bytes (status {status})",
                self.tuner.device().index()
            )));
        }
        buf.truncate(n_read.min(len));
        Ok(buf)
    }

    /// Blocking read of up to `len` bytes.
    ///
    /// Trailing zero bytes are dropped as padding; `Ok(None)` means nothing
    /// was left (end of stream).
    pub fn read_sync(&mut self, len: usize) -> Result<Option<Vec<u8>>> {
        let mut buf = self.read_block("read_sync", len)?;
        let kept = trim_trailing_zeros(&buf).len();
        buf.truncate(kept);
        if buf.is_empty() {
            return Ok(None);
        }
        Ok(Some(buf))
    }

    /// Blocking read of up to `len` bytes, returned exactly as delivered.
    pub fn read_sync_raw(&mut self, len: usize) -> Result<Vec<u8>> {
        self.read_block("read_sync_raw", len)
    }

    /// Start the asynchronous read loop on a worker thread.
    ///
    /// `callback` receives each filled buffer untrimmed, on the worker
    /// thread. Returns once the loop has been started. A panic in
    /// `callback` stops the loop and is logged when the worker is joined.
    pub fn read_async<F>(&mut self, callback: F) -> Result<()>
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        self.options.validate()?;
        self.bind("read_async", StreamMode::Asynchronous)?;
        if self.is_streaming() {
            return Err(SdrError::State(
                "read_async: an asynchronous loop is already running".into(),
            ));
        }
        // A previous loop that ended on its own.
        self.join_worker();
        self.reset_buffer("read_async")?;

        let h = self.tuner.handle("read_async")?;
        let backend = Arc::clone(self.tuner.device().backend());
        let index = self.tuner.device().index();
        let StreamOptions {
            buffer_count,
            buffer_size,
        } = self.options;

        let worker = thread::Builder::new()
            .name(format!("sdrtune-rx-{index}"))
            .spawn(move || {
                let mut callback = callback;
                log::debug!("Async read loop started on device {index}");
                let status = backend.read_async(h, &mut callback, buffer_count, buffer_size);
                if status < 0 {
                    log::error!("Async read loop on device {index} ended with status {status}");
                } else {
                    log::debug!("Async read loop on device {index} finished");
                }
                status
            })
            .map_err(|e| SdrError::Resource(format!("read_async: cannot start worker: {e}")))?;
        self.worker = Some(worker);
        Ok(())
    }

    fn join_worker(&mut self) {
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            log::error!("Async read worker panicked");
        }
    }

    /// Cancel a running loop (best effort) and wait for the worker.
    fn stop_worker(&mut self) {
        if self.worker.is_none() {
            return;
        }
        if let Ok(h) = self.tuner.handle("cancel_async") {
            let status = self.tuner.device().backend().cancel_async(h);
            if status < 0 {
                log::debug!("cancel_async returned {status}");
            }
        }
        self.join_worker();
    }

    /// Stop any asynchronous loop and close the device. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stop_worker();
        self.tuner.close()
    }
}

impl Drop for SampleStream<'_> {
    fn drop(&mut self) {
        // Device stays open so the configuration can tune again.
        self.stop_worker();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::FakeBackend;
    use crate::driver::Driver;
    use std::sync::Mutex;

    fn tuner() -> (Arc<FakeBackend>, TunerConfiguration) {
        let fake = Arc::new(FakeBackend::new());
        let driver = Driver::new("FAKE", fake.clone());
        let t = driver.device(0).unwrap().configure().unwrap();
        (fake, t)
    }

    #[test]
    fn panicking_callback_stays_on_worker() {
        let (fake, mut t) = tuner();
        fake.state().async_buffers = vec![vec![1; 512]];
        let mut stream = t.tune();
        stream.read_async(|_| panic!("callback failed")).unwrap();
        while stream.is_streaming() {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        stream.close().unwrap();
        assert!(stream.is_closed());
    }

    #[test]
    fn tune_makes_no_backend_calls() {
        let (fake, mut t) = tuner();
        let before = fake.calls().len();
        let stream = t.tune();
        assert_eq!(stream.mode(), StreamMode::Unset);
        drop(stream);
        assert_eq!(fake.calls().len(), before);
    }

    #[test]
    fn read_sync_zero_is_validation_without_backend_call() {
        let (fake, mut t) = tuner();
        let mut s = t.tune();
        let before = fake.calls().len();
        assert!(matches!(s.read_sync(0), Err(SdrError::Validation(_))));
        assert_eq!(fake.calls().len(), before);
        assert_eq!(s.mode(), StreamMode::Unset);
    }

    #[test]
    fn read_sync_all_zero_is_end_of_stream() {
        let (_, mut t) = tuner();
        let mut s = t.tune();
        assert_eq!(s.read_sync(1024).unwrap(), None);
        assert_eq!(s.mode(), StreamMode::Synchronous);
    }

    #[test]
    fn read_sync_trims_padding() {
        let (fake, mut t) = tuner();
        fake.state().sample_data = vec![127, 128, 0, 126];
        let mut s = t.tune();
        assert_eq!(s.read_sync(16).unwrap(), Some(vec![127, 128, 0, 126]));
    }

    #[test]
    fn read_sync_raw_keeps_padding() {
        let (fake, mut t) = tuner();
        fake.state().sample_data = vec![127, 128];
        let mut s = t.tune();
        assert_eq!(s.read_sync_raw(4).unwrap(), vec![127, 128, 0, 0]);
    }

    #[test]
    fn read_sync_resets_buffer_first() {
        let (fake, mut t) = tuner();
        let mut s = t.tune();
        s.read_sync(512).unwrap();
        let calls = fake.calls();
        let reset = calls.iter().rposition(|c| *c == "reset_buffer").unwrap();
        let read = calls.iter().rposition(|c| *c == "read_sync").unwrap();
        assert!(reset < read);
    }

    #[test]
    fn read_sync_failures_are_resource() {
        let (fake, mut t) = tuner();
        fake.fail("reset_buffer", -1);
        assert!(matches!(t.tune().read_sync(16), Err(SdrError::Resource(_))));

        let (fake, mut t) = tuner();
        fake.fail("read_sync", -7);
        assert!(matches!(t.tune().read_sync(16), Err(SdrError::Resource(_))));
    }

    #[test]
    fn modes_are_exclusive() {
        let (_, mut t) = tuner();
        let mut s = t.tune();
        s.read_sync(16).unwrap();
        let err = s.read_async(|_| {}).unwrap_err();
        assert!(matches!(err, SdrError::State(_)));
        assert!(err.to_string().contains("synchronous"));
    }

    #[test]
    fn async_then_sync_is_state_error() {
        let (_, mut t) = tuner();
        let mut s = t.tune();
        s.read_async(|_| {}).unwrap();
        assert!(matches!(s.read_sync(16), Err(SdrError::State(_))));
        s.close().unwrap();
    }

    #[test]
    fn read_async_delivers_buffers_untrimmed() {
        let (fake, mut t) = tuner();
        fake.state().async_buffers = vec![vec![1, 2, 0], vec![3, 0, 0]];
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut s = t.tune();
        s.read_async(move |b| sink.lock().unwrap().push(b.to_vec()))
            .unwrap();
        while s.is_streaming() {
            thread::sleep(std::time::Duration::from_millis(1));
        }
        s.close().unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![vec![1, 2, 0], vec![3, 0, 0]]);
    }

    #[test]
    fn read_async_rejects_bad_batching() {
        let (_, mut t) = tuner();
        let mut s = t.tune_with(StreamOptions {
            buffer_count: 4,
            buffer_size: 1000,
        });
        assert!(matches!(s.read_async(|_| {}), Err(SdrError::Validation(_))));
        assert_eq!(s.mode(), StreamMode::Unset);
    }

    #[test]
    fn close_is_idempotent_and_closes_device() {
        let (fake, mut t) = tuner();
        {
            let mut s = t.tune();
            s.read_sync(16).unwrap();
            s.close().unwrap();
            s.close().unwrap();
            assert!(s.is_closed());
            assert!(matches!(s.read_sync(16), Err(SdrError::State(_))));
        }
        assert!(!t.device().is_open());
        assert_eq!(fake.call_count("close"), 1);
    }

    #[test]
    fn drop_keeps_device_open_for_next_stream() {
        let (fake, mut t) = tuner();
        t.tune().read_sync(16).unwrap();
        let resets = fake.call_count("reset_buffer");
        let mut s = t.tune();
        assert_eq!(s.mode(), StreamMode::Unset);
        s.read_sync(16).unwrap();
        assert_eq!(fake.call_count("reset_buffer"), resets + 1);
    }

    #[test]
    fn read_after_device_closed_is_state() {
        let (_, mut t) = tuner();
        t.close().unwrap();
        let mut s = t.tune();
        assert!(matches!(s.read_sync(16), Err(SdrError::State(_))));
    }

    #[test]
    fn default_options() {
        let o = StreamOptions::default();
        assert_eq!(o.buffer_count, 64);
        assert_eq!(o.buffer_size, 16 * 1024);
        assert!(o.validate().is_ok());
    }
}
