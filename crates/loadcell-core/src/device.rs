//! Channel/gain selection and the device seam used by everything above the
//! protocol driver.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Input channel and amplifier gain for the *next* conversion.
///
/// The HX711 is programmed by the number of extra SCK pulses sent after the
/// 24 data bits, so a new selection only shows up one read later.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChannelGain {
    /// No selection pulses, the chip keeps its current mode.
    None = 0,
    /// Channel A, gain 128.
    #[default]
    ChannelA128 = 1,
    /// Channel B, gain 32.
    ChannelB32 = 2,
    /// Channel A, gain 64.
    ChannelA64 = 3,
}

impl ChannelGain {
    /// Extra clock pulses appended after the 24 data bits.
    pub const fn pulses(self) -> u8 {
        self as u8
    }

    /// Byte stored in the calibration record.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Inverse of [`ChannelGain::code`]; unknown codes yield `None`.
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::ChannelA128),
            2 => Some(Self::ChannelB32),
            3 => Some(Self::ChannelA64),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::None => "no channel selection",
            Self::ChannelA128 => "channel A with gain 128",
            Self::ChannelB32 => "channel B with gain 32",
            Self::ChannelA64 => "channel A with gain 64",
        }
    }
}

/// A load-cell ADC as seen by the sampling layer, the calibration facade and
/// the console.
///
/// [`crate::Hx711`] is the real implementation; tests substitute scripted
/// devices.
pub trait LoadCellAdc {
    /// Wait for a conversion and return one sign-extended raw code.
    fn read_raw(&mut self) -> Result<i32, Error>;

    /// Block for `us` microseconds between reads.
    fn pause_us(&mut self, us: u32);

    /// Put the analog front-end to sleep.
    fn power_down(&mut self) -> Result<(), Error>;

    /// Return to normal operation. Settling time is the caller's problem.
    fn power_up(&mut self) -> Result<(), Error>;

    fn set_channel_gain(&mut self, channel_gain: ChannelGain);

    fn channel_gain(&self) -> ChannelGain;
}
