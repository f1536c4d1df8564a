//! sdrtune: hardware abstraction for RTL2832U-based SDR tuners.
//!
//! Discover a device through a [`registry::DriverRegistry`], open it into a
//! [`tuner::TunerConfiguration`], validate and apply tuning parameters, then
//! pull raw sample bytes from a [`stream::SampleStream`].

pub mod backend;
pub mod capture;
pub mod config;
pub mod context;
pub mod device;
pub mod driver;
pub mod error;
pub mod models;
pub mod padding;
pub mod properties;
pub mod protocol;
pub mod reconnect;
pub mod registry;
pub mod rtlsdr;
pub mod stream;
pub mod tuner;

pub use error::SdrError;
