//! Hardware-independent core library for the HX711 load-cell scale
//!
//! This crate contains all platform-agnostic logic: the bit-banged HX711
//! protocol driver, block averaging, the two-point calibration engine, the
//! persisted calibration record and the single-key command console.
//!
//! It is `#![no_std]` so it compiles on both embedded targets and desktop
//! hosts (for the simulator and tests). Hardware access goes through the
//! `embedded-hal` 1.0 digital and delay traits.

#![no_std]

#[cfg(test)]
extern crate std;

pub mod calibration;
pub mod config;
pub mod console;
pub mod device;
pub mod error;
pub mod hx711;
pub mod record;
pub mod sampling;
pub mod scale;
pub mod shared;

#[cfg(test)]
pub(crate) mod testing;

pub use calibration::{Calibration, LinearFit};
pub use config::{ConsoleSettings, DeviceConfig};
pub use console::{Command, Console};
pub use device::{ChannelGain, LoadCellAdc};
pub use error::Error;
pub use hx711::{Hx711, ReadyWait};
pub use record::{PersistedCalibration, RecordStorage};
pub use sampling::Pacing;
pub use scale::Scale;
pub use shared::SharedDevice;
