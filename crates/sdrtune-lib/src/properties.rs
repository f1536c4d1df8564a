//! Extra tuner properties: string-keyed settings with typed validators.
//!
//! Each known key has a fixed value shape and its own backend call and
//! status mapping. [`TunerConfiguration::set_extra_properties`] checks the
//! shape of every recognized entry before touching the backend, then applies
//! them in registry order. Unknown keys are ignored.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::error::{Result, SdrError};
use crate::protocol::*;
use crate::tuner::TunerConfiguration;

/// Value of an extra property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl PropertyValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(b) => write!(f, "{b}"),
            PropertyValue::Int(i) => write!(f, "{i}"),
            PropertyValue::Text(s) => write!(f, "\"{s}\""),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}

impl From<i64> for PropertyValue {
    fn from(i: i64) -> Self {
        PropertyValue::Int(i)
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::Text(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::Text(s)
    }
}

/// One recognized key.
pub struct KnownProperty {
    pub key: &'static str,
    pub description: &'static str,
    apply: fn(&mut TunerConfiguration, bool) -> Result<()>,
}

/// Recognized keys, in application order.
pub static KNOWN_PROPERTIES: [KnownProperty; 2] = [
    KnownProperty {
        key: PROPERTY_TUNER_OFFSET,
        description: "Offset tuning (bool). Not available with direct sampling or on R82xx tuners.",
        apply: apply_offset_tuning,
    },
    KnownProperty {
        key: PROPERTY_TUNER_DITHERING,
        description: "PLL dithering (bool). R820T only.",
        apply: apply_dithering,
    },
];

pub fn known_property(key: &str) -> Option<&'static KnownProperty> {
    KNOWN_PROPERTIES.iter().find(|p| p.key == key)
}

fn apply_offset_tuning(tuner: &mut TunerConfiguration, on: bool) -> Result<()> {
    let h = tuner.handle(PROPERTY_TUNER_OFFSET)?;
    let index = tuner.device.index();
    let status = tuner.device.backend().set_offset_tuning(h, on);
    let msg = |why: &str| format!("{PROPERTY_TUNER_OFFSET}: device {index}: {why} (status {status})");
    match status {
        s if s >= 0 => {
            tuner.settings.offset_tuning_enabled = on;
            Ok(())
        }
        STATUS_OFFSET_TUNING_CONFLICT => Err(SdrError::Conflict(msg(
            "offset tuning is unavailable while direct sampling is enabled",
        ))),
        STATUS_OFFSET_TUNING_UNSUPPORTED => Err(SdrError::Unsupported(msg(
            "tuner cannot offset-tune",
        ))),
        STATUS_INVALID_HANDLE => Err(SdrError::State(msg("no valid device handle"))),
        _ => Err(SdrError::Resource(msg("backend failure"))),
    }
}

fn apply_dithering(tuner: &mut TunerConfiguration, on: bool) -> Result<()> {
    let index = tuner.device.index();
    let tuner_type = tuner.tuner_type()?;
    if !tuner_type.model().is_some_and(|m| m.supports_dithering) {
        return Err(SdrError::Unsupported(format!(
            "{PROPERTY_TUNER_DITHERING}: device {index} has a {tuner_type} tuner; dithering requires R820T"
        )));
    }
    let h = tuner.handle(PROPERTY_TUNER_DITHERING)?;
    let status = tuner.device.backend().set_dithering(h, on);
    let msg = |why: &str| format!("{PROPERTY_TUNER_DITHERING}: device {index}: {why} (status {status})");
    match status {
        0 => Ok(()),
        STATUS_DITHERING_REFUSED => Err(SdrError::Unsupported(msg("tuner refused dithering change"))),
        STATUS_INVALID_HANDLE => Err(SdrError::State(msg("no valid device handle"))),
        s if s < 0 => Err(SdrError::Resource(msg("backend failure"))),
        _ => Err(SdrError::Resource(msg("unexpected status"))),
    }
}

impl TunerConfiguration {
    /// Apply extra properties.
    ///
    /// Every recognized key is shape-checked first; a wrong shape fails with
    /// [`SdrError::Validation`] before any backend call. Recognized keys are
    /// then applied in registry order and the first failure stops the rest.
    /// Accepted values are recorded in [`TunerSettings::extra_properties`](crate::tuner::TunerSettings).
    pub fn set_extra_properties(&mut self, properties: &HashMap<String, PropertyValue>) -> Result<()> {
        self.handle("set_extra_properties")?;
        for (key, value) in properties {
            match known_property(key) {
                Some(_) if value.as_bool().is_none() => {
                    return Err(SdrError::Validation(format!(
                        "set_extra_properties: {key} expects a bool, got {value}"
                    )));
                }
                Some(_) => {}
                None => log::debug!("Ignoring unknown tuner property {key}"),
            }
        }
        for known in &KNOWN_PROPERTIES {
            let Some(on) = properties.get(known.key).and_then(PropertyValue::as_bool) else {
                continue;
            };
            (known.apply)(self, on)?;
            self.settings
                .extra_properties
                .insert(known.key.to_string(), PropertyValue::Bool(on));
        }
        Ok(())
    }
}
