//! `capture` subcommand: stream raw I/Q bytes to a file or stdout.
//!
//! Samples are written as delivered (interleaved unsigned 8-bit I/Q). When
//! the output is stdout, progress and the final summary go to stderr.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use sdrtune_lib::SdrError;
use sdrtune_lib::capture::CaptureSink;
use sdrtune_lib::context::TunerContext;
use sdrtune_lib::driver::Driver;
use sdrtune_lib::error::ErrorKind;
use sdrtune_lib::reconnect::{self, ReconnectConfig, ReconnectState};
use sdrtune_lib::stream::{StreamMode, StreamOptions};
use sdrtune_lib::tuner::TunerConfiguration;

use super::{
    CaptureOutput, Config, DriverRegistry, RUNNING, Result, TuneArgs, format_hz, print_json,
};

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const MAX_RECONNECT_ATTEMPTS: u32 = 10;

pub(super) struct CaptureArgs {
    pub bytes: Option<u64>,
    pub output: String,
    pub use_async: bool,
    pub reconnect: bool,
}

type SharedSink = Arc<Mutex<CaptureSink<Box<dyn Write + Send>>>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn open_output(path: &str) -> Result<Box<dyn Write + Send>> {
    if path == "-" {
        return Ok(Box::new(BufWriter::new(io::stdout())));
    }
    Ok(Box::new(BufWriter::new(File::create(path)?)))
}

fn is_broken_pipe(e: &SdrError) -> bool {
    matches!(e, SdrError::Io(io) if io.kind() == io::ErrorKind::BrokenPipe)
}

pub(super) fn cmd_capture(
    tune: &TuneArgs,
    args: CaptureArgs,
    json: bool,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut config = super::load_config(config_path);
    tune.apply(&mut config);
    if let Err(issues) = config.validate() {
        for issue in &issues {
            log::warn!("[config] {issue}");
        }
    }

    let registry = DriverRegistry::with_defaults();
    let TunerContext { driver, mut tuner } = TunerContext::resolve(&registry, &config)?;
    let device = tuner.device().info().clone();
    let mode = if args.use_async {
        StreamMode::Asynchronous
    } else {
        StreamMode::Synchronous
    };
    eprintln!(
        "[capture] {} at {}, {} S/s ({mode})",
        device.label(),
        format_hz(config.center_frequency_hz),
        config.sample_rate_hz
    );

    let sink: SharedSink = Arc::new(Mutex::new(CaptureSink::new(
        open_output(&args.output)?,
        args.bytes,
    )));
    let mut backoff = ReconnectState::new(ReconnectConfig {
        max_attempts: Some(MAX_RECONNECT_ATTEMPTS),
        ..ReconnectConfig::default()
    });
    let mut reconnects = 0u32;
    let started = Instant::now();

    loop {
        let outcome = if args.use_async {
            capture_async(&mut tuner, config.stream_options(), &sink)
        } else {
            capture_sync(&mut tuner, config.read_size, &sink)
        };
        let err = match outcome {
            Ok(()) => break,
            Err(e) if is_broken_pipe(&e) => {
                log::debug!("output closed, stopping capture");
                break;
            }
            Err(e) => e,
        };
        if err.kind() != ErrorKind::Resource || !args.reconnect {
            return Err(err);
        }
        log::warn!("[capture] {err}, reconnecting");
        close_quietly(&mut tuner);
        match reopen(&mut backoff, &driver, &config) {
            Some(t) => {
                tuner = t;
                reconnects += 1;
                eprintln!("[capture] reconnected to {}", tuner.device().info().label());
            }
            None if !RUNNING.load(Ordering::SeqCst) => break,
            None => return Err(err),
        }
    }

    lock(&sink).flush()?;
    close_quietly(&mut tuner);

    let output = CaptureOutput {
        device,
        mode: mode.to_string(),
        bytes: lock(&sink).written(),
        seconds: started.elapsed().as_secs_f64(),
        reconnects,
        output: args.output.clone(),
    };
    report(&output, json)
}

/// Close the device; a failing close only warns, the capture already ended.
fn close_quietly(tuner: &mut TunerConfiguration) {
    if let Err(e) = tuner.close() {
        log::warn!("[capture] {e}");
    }
}

/// Retry opening the device until it succeeds, Ctrl+C, or the backoff gives up.
fn reopen(
    backoff: &mut ReconnectState,
    driver: &Driver,
    config: &Config,
) -> Option<TunerConfiguration> {
    while RUNNING.load(Ordering::SeqCst) && !backoff.exhausted() {
        if let Some(tuner) = reconnect::try_reopen(backoff, driver, config) {
            return Some(tuner);
        }
        std::thread::sleep(backoff.remaining().min(POLL_INTERVAL * 5));
    }
    None
}

fn capture_sync(tuner: &mut TunerConfiguration, read_size: usize, sink: &SharedSink) -> Result<()> {
    let mut stream = tuner.tune();
    while RUNNING.load(Ordering::SeqCst) {
        let block = stream.read_sync_raw(read_size)?;
        if block.is_empty() {
            log::info!("device returned no data, stopping");
            break;
        }
        if !lock(sink).write_samples(&block)? {
            break;
        }
    }
    Ok(())
}

fn capture_async(
    tuner: &mut TunerConfiguration,
    options: StreamOptions,
    sink: &SharedSink,
) -> Result<()> {
    let mut stream = tuner.tune_with(options);
    let done = Arc::new(AtomicBool::new(false));
    let write_error: Arc<Mutex<Option<io::Error>>> = Arc::new(Mutex::new(None));

    let cb_sink = Arc::clone(sink);
    let cb_done = Arc::clone(&done);
    let cb_error = Arc::clone(&write_error);
    stream.read_async(move |buf| {
        if cb_done.load(Ordering::Relaxed) {
            return;
        }
        match lock(&cb_sink).write_samples(buf) {
            Ok(true) => {}
            Ok(false) => cb_done.store(true, Ordering::Relaxed),
            Err(e) => {
                *lock(&cb_error) = Some(e);
                cb_done.store(true, Ordering::Relaxed);
            }
        }
    })?;

    while RUNNING.load(Ordering::SeqCst) && !done.load(Ordering::Relaxed) && stream.is_streaming()
    {
        std::thread::sleep(POLL_INTERVAL);
    }
    let ended_on_its_own = !stream.is_streaming()
        && !done.load(Ordering::Relaxed)
        && RUNNING.load(Ordering::SeqCst);
    // Cancels the loop and joins the worker; the device stays open.
    drop(stream);

    if let Some(e) = lock(&write_error).take() {
        return Err(e.into());
    }
    if ended_on_its_own {
        return Err(SdrError::Resource("read_async: loop ended unexpectedly".into()));
    }
    Ok(())
}

fn report(output: &CaptureOutput, json: bool) -> Result<()> {
    let summary_on_stdout = output.output != "-";
    if json && summary_on_stdout {
        return print_json(output);
    }
    if json {
        let text = serde_json::to_string_pretty(output).map_err(io::Error::from)?;
        eprintln!("{text}");
        return Ok(());
    }

    let line = format!(
        "Captured {} bytes from {} in {:.1}s{}",
        output.bytes,
        output.device.label(),
        output.seconds,
        match output.reconnects {
            0 => String::new(),
            n => format!(" ({n} reconnect{})", if n == 1 { "" } else { "s" }),
        }
    );
    if summary_on_stdout {
        println!("{line}");
    } else {
        eprintln!("{line}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdrtune_lib::backend::mock::FakeBackend;

    fn tuner(fake: &Arc<FakeBackend>) -> TunerConfiguration {
        Driver::new("RTL-SDR", fake.clone())
            .device(0)
            .unwrap()
            .configure()
            .unwrap()
    }

    fn memory_sink(limit: Option<u64>) -> (SharedSink, Arc<Mutex<Vec<u8>>>) {
        struct Shared(Arc<Mutex<Vec<u8>>>);
        impl Write for Shared {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                lock(&self.0).extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }
        let bytes = Arc::new(Mutex::new(Vec::new()));
        let out: Box<dyn Write + Send> = Box::new(Shared(bytes.clone()));
        (Arc::new(Mutex::new(CaptureSink::new(out, limit))), bytes)
    }

    #[test]
    fn sync_capture_stops_at_limit() {
        let fake = Arc::new(FakeBackend::new());
        fake.state().sample_data = vec![0x80; 4096];
        let mut t = tuner(&fake);
        let (sink, bytes) = memory_sink(Some(10_000));
        capture_sync(&mut t, 4096, &sink).unwrap();
        assert_eq!(lock(&bytes).len(), 10_000);
        // Every blocking read resets the backend buffer first.
        assert_eq!(fake.call_count("reset_buffer"), 3);
        assert!(t.device().is_open());
    }

    #[test]
    fn sync_capture_read_failure_is_resource() {
        let fake = Arc::new(FakeBackend::new());
        fake.fail("read_sync", -8);
        let mut t = tuner(&fake);
        let (sink, _) = memory_sink(Some(1));
        let err = capture_sync(&mut t, 512, &sink).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Resource);
    }

    #[test]
    fn async_capture_collects_buffers() {
        let fake = Arc::new(FakeBackend::new());
        fake.state().async_buffers = vec![vec![1; 512], vec![2; 512]];
        let mut t = tuner(&fake);
        let (sink, bytes) = memory_sink(Some(700));
        let options = StreamOptions {
            buffer_count: 2,
            buffer_size: 512,
        };
        // Limit reached before the fake loop runs dry.
        capture_async(&mut t, options, &sink).unwrap();
        let got = lock(&bytes);
        assert_eq!(got.len(), 700);
        assert_eq!(got[0], 1);
        assert_eq!(got[699], 2);
    }

    #[test]
    fn close_failure_is_not_fatal() {
        let fake = Arc::new(FakeBackend::new());
        let mut t = tuner(&fake);
        fake.fail("close", -5);
        close_quietly(&mut t);
        assert!(!t.device().is_open());
        assert_eq!(fake.call_count("close"), 1);
    }

    #[test]
    fn broken_pipe_detection() {
        let e = SdrError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "closed"));
        assert!(is_broken_pipe(&e));
        assert!(!is_broken_pipe(&SdrError::Resource("x".into())));
    }
}
