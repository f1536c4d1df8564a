//! Tuner models: chip identification and per-family capabilities.
//!
//! The backend reports the tuner chip as a small integer code. Unknown
//! codes map to [`TunerType::Unknown`], which has no profile; callers
//! should treat that as "no capability information".

use std::fmt;

use serde::Serialize;

use crate::protocol::*;

/// Tuner chip family behind the RTL2832U.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TunerType {
    Unknown,
    E4000,
    FC0012,
    FC0013,
    FC2580,
    R820T,
    R828D,
}

impl TunerType {
    pub fn from_code(code: i32) -> Self {
        match code {
            TUNER_TYPE_E4000 => TunerType::E4000,
            TUNER_TYPE_FC0012 => TunerType::FC0012,
            TUNER_TYPE_FC0013 => TunerType::FC0013,
            TUNER_TYPE_FC2580 => TunerType::FC2580,
            TUNER_TYPE_R820T => TunerType::R820T,
            TUNER_TYPE_R828D => TunerType::R828D,
            _ => TunerType::Unknown,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            TunerType::Unknown => TUNER_TYPE_UNKNOWN,
            TunerType::E4000 => TUNER_TYPE_E4000,
            TunerType::FC0012 => TUNER_TYPE_FC0012,
            TunerType::FC0013 => TUNER_TYPE_FC0013,
            TunerType::FC2580 => TUNER_TYPE_FC2580,
            TunerType::R820T => TUNER_TYPE_R820T,
            TunerType::R828D => TUNER_TYPE_R828D,
        }
    }

    /// Capability profile, `None` for [`TunerType::Unknown`].
    pub fn model(self) -> Option<&'static TunerModel> {
        TUNER_MODELS.iter().find(|m| m.tuner == self)
    }
}

impl fmt::Display for TunerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TunerType::Unknown => "Unknown",
            TunerType::E4000 => "E4000",
            TunerType::FC0012 => "FC0012",
            TunerType::FC0013 => "FC0013",
            TunerType::FC2580 => "FC2580",
            TunerType::R820T => "R820T",
            TunerType::R828D => "R828D",
        };
        f.write_str(name)
    }
}

/// Capability profile for one tuner family.
#[derive(Debug, Serialize)]
pub struct TunerModel {
    pub tuner: TunerType,
    pub vendor: &'static str,
    /// Nominal tuning range in Hz. Individual units may reach further.
    pub min_frequency_hz: u64,
    pub max_frequency_hz: u64,
    /// PLL dithering can be switched off (R820T only).
    pub supports_dithering: bool,
    /// Offset tuning is rejected by R82xx tuners, which already use a low IF.
    pub supports_offset_tuning: bool,
}

impl TunerModel {
    pub fn covers(&self, hz: u64) -> bool {
        (self.min_frequency_hz..=self.max_frequency_hz).contains(&hz)
    }
}

static TUNER_MODELS: [TunerModel; 6] = [
    TunerModel {
        tuner: TunerType::E4000,
        vendor: "Elonics",
        min_frequency_hz: 52_000_000,
        max_frequency_hz: 2_200_000_000,
        supports_dithering: false,
        supports_offset_tuning: true,
    },
    TunerModel {
        tuner: TunerType::FC0012,
        vendor: "Fitipower",
        min_frequency_hz: 22_000_000,
        max_frequency_hz: 948_600_000,
        supports_dithering: false,
        supports_offset_tuning: true,
    },
    TunerModel {
        tuner: TunerType::FC0013,
        vendor: "Fitipower",
        min_frequency_hz: 22_000_000,
        max_frequency_hz: 1_100_000_000,
        supports_dithering: false,
        supports_offset_tuning: true,
    },
    TunerModel {
        tuner: TunerType::FC2580,
        vendor: "FCI",
        min_frequency_hz: 146_000_000,
        max_frequency_hz: 924_000_000,
        supports_dithering: false,
        supports_offset_tuning: true,
    },
    TunerModel {
        tuner: TunerType::R820T,
        vendor: "Rafael Micro",
        min_frequency_hz: 24_000_000,
        max_frequency_hz: 1_766_000_000,
        supports_dithering: true,
        supports_offset_tuning: false,
    },
    TunerModel {
        tuner: TunerType::R828D,
        vendor: "Rafael Micro",
        min_frequency_hz: 24_000_000,
        max_frequency_hz: 1_766_000_000,
        supports_dithering: false,
        supports_offset_tuning: false,
    },
];
