use serde::{Deserialize, Serialize};

use crate::calibration::DEFAULT_MAX_GRAMS_PER_COUNT;
use crate::sampling::Pacing;

/// Wiring and rating of one load cell. Fixed once the scale is built.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct DeviceConfig {
    /// DOUT pin number, for reports only.
    pub data_pin: u8,
    /// PD_SCK pin number, for reports only.
    pub clock_pin: u8,
    /// Rated capacity. Bounds the reference weight to `[max/10, max]`.
    pub max_load_grams: i32,
    /// Largest accepted calibration slope, in grams per count.
    pub max_grams_per_count: f64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            data_pin: 3,
            clock_pin: 2,
            max_load_grams: 1000,
            max_grams_per_count: DEFAULT_MAX_GRAMS_PER_COUNT,
        }
    }
}

impl DeviceConfig {
    /// Smallest accepted reference weight.
    pub const fn min_reference_grams(&self) -> i32 {
        self.max_load_grams / 10
    }
}

/// Knobs of the command console: how many samples each command averages,
/// how reads are spaced and where the calibration record lives.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct ConsoleSettings {
    pub zero_samples: u8,
    pub calibrate_samples: u8,
    pub raw_samples: u8,
    pub weight_samples: u8,
    pub pacing: Pacing,
    /// Byte offset of the calibration record in storage.
    pub record_offset: usize,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            zero_samples: 32,
            calibrate_samples: 16,
            raw_samples: 16,
            weight_samples: 8,
            pacing: Pacing::BackToBack,
            record_offset: 0,
        }
    }
}
