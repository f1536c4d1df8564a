//! Reconnection with exponential backoff after device failures.
//!
//! The library never retries a [`SdrError::Resource`](crate::SdrError) on
//! its own. Long-running callers (the `capture` command) use this state
//! machine to space out reopen attempts after a device drops off the bus.

use std::time::{Duration, Instant};

use crate::config::Config;
use crate::context::open_configured;
use crate::driver::Driver;
use crate::tuner::TunerConfiguration;

/// Backoff parameters.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Factor applied to the delay after each failure.
    pub multiplier: f64,
    /// Give up after this many consecutive failures. `None` = never.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(15),
            multiplier: 2.0,
            max_attempts: None,
        }
    }
}

/// Retry timing state.
#[derive(Debug)]
pub struct ReconnectState {
    config: ReconnectConfig,
    current_delay: Duration,
    last_attempt: Option<Instant>,
    consecutive_failures: u32,
}

impl ReconnectState {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            current_delay: config.initial_delay,
            config,
            last_attempt: None,
            consecutive_failures: 0,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ReconnectConfig::default())
    }

    /// No attempt yet, or the backoff delay has elapsed since the last one.
    pub fn should_attempt(&self) -> bool {
        if self.exhausted() {
            return false;
        }
        self.last_attempt
            .is_none_or(|last| last.elapsed() >= self.current_delay)
    }

    /// `max_attempts` consecutive failures have been recorded.
    pub fn exhausted(&self) -> bool {
        self.config
            .max_attempts
            .is_some_and(|max| self.consecutive_failures >= max)
    }

    /// Time left before [`should_attempt`](Self::should_attempt) turns true.
    pub fn remaining(&self) -> Duration {
        match self.last_attempt {
            None => Duration::ZERO,
            Some(last) => self.current_delay.saturating_sub(last.elapsed()),
        }
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        self.last_attempt = Some(Instant::now());
        let next = self.current_delay.as_secs_f64() * self.config.multiplier;
        self.current_delay = Duration::from_secs_f64(next).min(self.config.max_delay);
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.current_delay = self.config.initial_delay;
        self.last_attempt = None;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }
}

/// Reopen and reconfigure the configured device, respecting backoff timing.
///
/// Returns `None` without touching the backend while the backoff timer is
/// running, and `None` after a failed attempt (logged with the next delay).
pub fn try_reopen(
    state: &mut ReconnectState,
    driver: &Driver,
    config: &Config,
) -> Option<TunerConfiguration> {
    if !state.should_attempt() {
        return None;
    }
    match open_configured(driver, config) {
        Ok(tuner) => {
            if state.consecutive_failures() > 0 {
                log::info!(
                    "Reconnected to device {} after {} failed attempt(s)",
                    tuner.device().info().label(),
                    state.consecutive_failures()
                );
            }
            state.record_success();
            Some(tuner)
        }
        Err(e) => {
            state.record_failure();
            log::warn!(
                "reconnect failed: {e} (attempt {}, retry in {:.1}s)",
                state.consecutive_failures(),
                state.current_delay().as_secs_f64()
            );
            None
        }
    }
}
