//! Integration tests: open → configure → tune → stream → close against FakeBackend.
//!
//! These drive the public API only, the way an application would, and check
//! both the returned values and the backend calls that were made.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sdrtune_lib::SdrError;
use sdrtune_lib::backend::mock::{FakeBackend, FakeUnit};
use sdrtune_lib::config::Config;
use sdrtune_lib::context::TunerContext;
use sdrtune_lib::driver::Driver;
use sdrtune_lib::models::TunerType;
use sdrtune_lib::properties::PropertyValue;
use sdrtune_lib::protocol::*;
use sdrtune_lib::registry::DriverRegistry;
use sdrtune_lib::stream::StreamMode;
use sdrtune_lib::tuner::TunerConfiguration;

/// Helper: registry with one fake RTL-SDR driver.
fn setup(units: Vec<FakeUnit>) -> (Arc<FakeBackend>, DriverRegistry) {
    let fake = Arc::new(FakeBackend::with_units(units));
    let mut registry = DriverRegistry::new();
    registry.register(Driver::new(RTLSDR_DRIVER_ID, fake.clone()));
    (fake, registry)
}

fn open_first(registry: &DriverRegistry) -> TunerConfiguration {
    registry
        .driver(RTLSDR_DRIVER_ID)
        .unwrap()
        .device(0)
        .unwrap()
        .configure()
        .unwrap()
}

fn bool_prop(key: &str, on: bool) -> HashMap<String, PropertyValue> {
    HashMap::from([(key.to_string(), PropertyValue::Bool(on))])
}

// ── Full scenario ──

#[test]
fn open_set_lowest_gain_tune_and_read_zero_backend() {
    let (fake, registry) = setup(vec![FakeUnit::new("00000001")]);
    let mut tuner = open_first(&registry);

    let gains = tuner.supported_gains().unwrap();
    tuner.set_gain(gains[0]).unwrap();

    let mut stream = tuner.tune();
    assert_eq!(stream.read_sync(1024).unwrap(), None);
    stream.close().unwrap();
    drop(stream);

    assert!(!tuner.device().is_open());
    assert_eq!(fake.call_count("close"), 1);
}

#[test]
fn capture_real_bytes_sync() {
    let (fake, registry) = setup(vec![FakeUnit::new("00000001")]);
    fake.state().sample_data = (1..=200u8).collect();
    let mut tuner = open_first(&registry);
    tuner.set_center_frequency(1_090_000_000).unwrap();
    tuner.set_sample_rate(2_000_000).unwrap();

    let mut stream = tuner.tune();
    let block = stream.read_sync(512).unwrap().unwrap();
    assert_eq!(block.len(), 200);
    assert_eq!(block[0], 1);
    assert_eq!(stream.mode(), StreamMode::Synchronous);
}

// ── Lifecycle ──

#[test]
fn close_then_parameter_ops_are_state_errors() {
    let (_, registry) = setup(vec![FakeUnit::new("A")]);
    let mut tuner = open_first(&registry);
    tuner.close().unwrap();

    assert!(matches!(tuner.set_sample_rate(2_048_000), Err(SdrError::State(_))));
    assert!(matches!(tuner.set_gain_mode(true), Err(SdrError::State(_))));
    assert!(matches!(tuner.set_agc_mode(true), Err(SdrError::State(_))));
    assert!(matches!(tuner.center_frequency(), Err(SdrError::State(_))));
    assert!(matches!(
        tuner.set_extra_properties(&bool_prop(PROPERTY_TUNER_OFFSET, true)),
        Err(SdrError::State(_))
    ));
    // Double close never fails.
    tuner.close().unwrap();
    tuner.close().unwrap();
}

#[test]
fn device_reopens_after_close() {
    let (fake, registry) = setup(vec![FakeUnit::new("A")]);
    let mut tuner = open_first(&registry);
    tuner.close().unwrap();
    tuner.device_mut().open().unwrap();
    tuner.set_center_frequency(433_920_000).unwrap();
    assert_eq!(fake.call_count("open"), 2);
}

#[test]
fn two_devices_are_independent() {
    let (fake, registry) = setup(vec![FakeUnit::new("A"), FakeUnit::new("B")]);
    let driver = registry.driver(RTLSDR_DRIVER_ID).unwrap();
    let mut a = driver.device(0).unwrap().configure().unwrap();
    let b = driver.device(1).unwrap().configure().unwrap();
    a.close().unwrap();
    assert!(b.device().is_open());
    drop(b);
    assert!(fake.state().open_handles.is_empty());
}

// ── Validation ──

#[test]
fn unsupported_gain_leaves_previous_gain() {
    let (_, registry) = setup(vec![FakeUnit::new("A")]);
    let mut tuner = open_first(&registry);
    tuner.set_gain(254).unwrap();

    let err = tuner.set_gain(255).unwrap_err();
    assert!(matches!(err, SdrError::Validation(_)));
    assert!(err.is_retryable());
    assert_eq!(tuner.settings().gain, Some(254));
    assert_eq!(tuner.gain().unwrap(), 254);
}

#[test]
fn gain_table_is_queried_on_every_set_gain() {
    let (fake, registry) = setup(vec![FakeUnit::new("A")]);
    let mut tuner = open_first(&registry);
    tuner.set_gain(9).unwrap();
    fake.state().gains = vec![-10, 15, 40];
    assert!(tuner.set_gain(9).is_err());
    tuner.set_gain(-10).unwrap();
    assert_eq!(fake.call_count("get_tuner_gains"), 3);
}

#[test]
fn center_frequency_echo() {
    let (_, registry) = setup(vec![FakeUnit::new("A")]);
    let mut tuner = open_first(&registry);
    for f in [24_000_000u64, 145_800_000, 1_766_000_000] {
        tuner.set_center_frequency(f).unwrap();
        assert_eq!(tuner.center_frequency().unwrap(), f);
    }
}

#[test]
fn read_sync_zero_makes_no_backend_call() {
    let (fake, registry) = setup(vec![FakeUnit::new("A")]);
    let mut tuner = open_first(&registry);
    let mut stream = tuner.tune();
    let before = fake.calls();
    assert!(matches!(stream.read_sync(0), Err(SdrError::Validation(_))));
    assert_eq!(fake.calls(), before);
}

// ── Extra properties ──

#[test]
fn dithering_on_e4000_is_unsupported() {
    let (fake, registry) = setup(vec![FakeUnit::new("A")]);
    fake.set_tuner_type(TUNER_TYPE_E4000);
    let mut tuner = open_first(&registry);
    assert_eq!(tuner.tuner_type().unwrap(), TunerType::E4000);

    let err = tuner
        .set_extra_properties(&bool_prop(PROPERTY_TUNER_DITHERING, true))
        .unwrap_err();
    assert!(matches!(err, SdrError::Unsupported(_)));
    assert!(err.to_string().contains("R820T"));
}

#[test]
fn offset_tuning_conflict_is_not_resource() {
    let (fake, registry) = setup(vec![FakeUnit::new("A")]);
    let mut tuner = open_first(&registry);
    fake.fail("set_offset_tuning", STATUS_OFFSET_TUNING_CONFLICT);

    let err = tuner
        .set_extra_properties(&bool_prop(PROPERTY_TUNER_OFFSET, true))
        .unwrap_err();
    assert!(matches!(err, SdrError::Conflict(_)), "got {err}");
    assert!(!tuner.settings().offset_tuning_enabled);
}

#[test]
fn offset_tuning_after_disabling_direct_sampling() {
    let (fake, registry) = setup(vec![FakeUnit::new("A")]);
    fake.set_tuner_type(TUNER_TYPE_FC0013);
    let mut tuner = open_first(&registry);
    tuner.set_direct_sampling(true).unwrap();
    let props = bool_prop(PROPERTY_TUNER_OFFSET, true);
    assert!(matches!(
        tuner.set_extra_properties(&props),
        Err(SdrError::Conflict(_))
    ));
    tuner.set_direct_sampling(false).unwrap();
    tuner.set_extra_properties(&props).unwrap();
    assert!(tuner.settings().offset_tuning_enabled);
}

// ── Streams ──

#[test]
fn each_new_stream_resets_buffer() {
    let (fake, registry) = setup(vec![FakeUnit::new("A")]);
    let mut tuner = open_first(&registry);
    for _ in 0..3 {
        let mut stream = tuner.tune();
        stream.read_sync(512).unwrap();
    }
    assert_eq!(fake.call_count("reset_buffer"), 3);
    assert!(tuner.device().is_open());
}

#[test]
fn async_stream_delivers_on_worker_thread() {
    let (fake, registry) = setup(vec![FakeUnit::new("A")]);
    fake.state().async_buffers = vec![vec![0x7f; 512], vec![0x80; 512]];
    let mut tuner = open_first(&registry);

    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    let main_thread = std::thread::current().id();

    let mut stream = tuner.tune();
    stream
        .read_async(move |buf| {
            assert_ne!(std::thread::current().id(), main_thread);
            sink.lock().unwrap().push(buf.len());
        })
        .unwrap();
    while stream.is_streaming() {
        std::thread::sleep(Duration::from_millis(1));
    }
    stream.close().unwrap();
    drop(stream);

    assert_eq!(*received.lock().unwrap(), vec![512, 512]);
    assert!(fake.call_count("cancel_async") <= 1);
    assert!(!tuner.device().is_open());
}

#[test]
fn async_loop_failure_is_logged_not_panicked() {
    let (fake, registry) = setup(vec![FakeUnit::new("A")]);
    fake.fail("read_async", -4);
    let mut tuner = open_first(&registry);
    let mut stream = tuner.tune();
    stream.read_async(|_| {}).unwrap();
    stream.close().unwrap();
}

#[test]
fn dropping_async_stream_stops_loop_and_keeps_device() {
    let (_, registry) = setup(vec![FakeUnit::new("A")]);
    let mut tuner = open_first(&registry);
    {
        let mut stream = tuner.tune();
        stream.read_async(|_| {}).unwrap();
    }
    assert!(tuner.device().is_open());
    let mut stream = tuner.tune();
    assert_eq!(stream.mode(), StreamMode::Unset);
    assert_eq!(stream.read_sync(16).unwrap(), None);
}

// ── Config-driven resolution ──

#[test]
fn context_applies_config() {
    let (fake, registry) = setup(vec![FakeUnit::new("A"), FakeUnit::new("B")]);
    let config = Config {
        device_serial: "b".into(),
        center_frequency_hz: 162_000_000,
        sample_rate_hz: 1_024_000,
        automatic_gain: false,
        gain: Some(328),
        ..Config::default()
    };
    let ctx = TunerContext::resolve(&registry, &config).unwrap();
    assert_eq!(ctx.tuner.device().index(), 1);
    assert_eq!(ctx.tuner.settings().gain, Some(328));
    let state = fake.state();
    assert_eq!(state.center_freq, 162_000_000);
    assert_eq!(state.sample_rate, 1_024_000);
    assert!(state.manual_gain);
}

#[test]
fn describe_after_configuration() {
    let (_, registry) = setup(vec![FakeUnit::new("A")]);
    let ctx = TunerContext::resolve(&registry, &Config::default()).unwrap();
    let summary = ctx.tuner.describe().unwrap();
    assert_eq!(summary.center_frequency_hz, 100_000_000);
    assert_eq!(summary.sample_rate_hz, 2_048_000);
    assert_eq!(summary.supported_gains.first(), Some(&0));
    assert_eq!(summary.supported_gains.last(), Some(&496));
}
