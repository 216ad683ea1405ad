//! Bit-banged HX711 24-bit load-cell ADC driver.
//!
//! The chip signals a finished conversion by pulling DOUT low. The host then
//! clocks 24 bits out MSB-first on PD_SCK and appends 1-3 extra pulses that
//! select channel and gain for the *following* conversion. Holding PD_SCK
//! high for more than 60 µs powers the chip down.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use log::{debug, error, info, trace};
use serde::{Deserialize, Serialize};

use crate::device::{ChannelGain, LoadCellAdc};
use crate::error::Error;

/// High and low phase of every SCK pulse. The datasheet minimum is 0.2 µs,
/// and the whole high phase must stay well below the 60 µs power-down limit.
const PULSE_HOLD_US: u32 = 2;

/// SCK high time used by [`Hx711::reset`], comfortably above 60 µs.
const RESET_HOLD_US: u32 = 100;

/// At 10 SPS a conversion takes 100 ms, so one second is ten missed
/// conversions.
pub const DEFAULT_READY_TIMEOUT_US: u32 = 1_000_000;
pub const DEFAULT_READY_POLL_US: u32 = 50;

/// How long to wait for DOUT to go low before reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadyWait {
    /// Spin on DOUT forever. Blocks the caller indefinitely if the chip is
    /// unpowered, disconnected or powered down.
    Forever,
    /// Poll every `poll_us` and give up with [`Error::NotResponding`] after
    /// `timeout_us`.
    Timeout { timeout_us: u32, poll_us: u32 },
}

impl Default for ReadyWait {
    fn default() -> Self {
        Self::Timeout {
            timeout_us: DEFAULT_READY_TIMEOUT_US,
            poll_us: DEFAULT_READY_POLL_US,
        }
    }
}

/// Convert three big-endian bytes of 24-bit two's complement into an `i32`.
///
/// The most significant byte carries the sign; reinterpreting it as `i8`
/// and widening does the sign extension.
pub const fn assemble_sample(bytes: [u8; 3]) -> i32 {
    ((bytes[0] as i8 as i32) << 16) | ((bytes[1] as i32) << 8) | bytes[2] as i32
}

/// An HX711 on two GPIO lines. Owns both pins for its whole lifetime, no
/// other code may touch them between the 24 data bits and the mode pulses.
pub struct Hx711<SCK, DT, D> {
    sck: SCK,
    dt: DT,
    delay: D,
    channel_gain: ChannelGain,
    ready_wait: ReadyWait,
}

impl<SCK, DT, D> Hx711<SCK, DT, D>
where
    SCK: OutputPin,
    DT: InputPin,
    D: DelayNs,
{
    /// Wrap the pins. SCK must already idle low; call [`Hx711::reset`] to
    /// force a clean start.
    pub fn new(sck: SCK, dt: DT, delay: D) -> Self {
        Self {
            sck,
            dt,
            delay,
            channel_gain: ChannelGain::default(),
            ready_wait: ReadyWait::default(),
        }
    }

    pub fn with_ready_wait(mut self, ready_wait: ReadyWait) -> Self {
        self.ready_wait = ready_wait;
        self
    }

    pub fn ready_wait(&self) -> ReadyWait {
        self.ready_wait
    }

    pub fn set_ready_wait(&mut self, ready_wait: ReadyWait) {
        self.ready_wait = ready_wait;
    }

    /// Power-cycle the chip: SCK high for 100 µs, then low. The chip wakes
    /// up in channel A / gain 128.
    pub fn reset(&mut self) -> Result<(), Error> {
        self.sck.set_high().map_err(Error::pin)?;
        self.delay.delay_us(RESET_HOLD_US);
        self.sck.set_low().map_err(Error::pin)?;
        self.channel_gain = ChannelGain::ChannelA128;
        info!("HX711 reset, {}", self.channel_gain.label());
        Ok(())
    }

    /// True when DOUT is low and a conversion can be clocked out.
    pub fn is_ready(&mut self) -> Result<bool, Error> {
        self.dt.is_low().map_err(Error::pin)
    }

    /// Give the pins and the delay back.
    pub fn release(self) -> (SCK, DT, D) {
        (self.sck, self.dt, self.delay)
    }

    fn wait_ready(&mut self) -> Result<(), Error> {
        match self.ready_wait {
            ReadyWait::Forever => {
                while !self.dt.is_low().map_err(Error::pin)? {
                    core::hint::spin_loop();
                }
            }
            ReadyWait::Timeout {
                timeout_us,
                poll_us,
            } => {
                let poll_us = poll_us.max(1);
                let mut waited_us: u32 = 0;
                while self.dt.is_high().map_err(Error::pin)? {
                    if waited_us >= timeout_us {
                        error!("HX711 DOUT still high after {} us", waited_us);
                        return Err(Error::NotResponding);
                    }
                    self.delay.delay_us(poll_us);
                    waited_us = waited_us.saturating_add(poll_us);
                }
            }
        }
        Ok(())
    }

    /// One SCK pulse, sampling DOUT while the clock is high.
    fn clock_bit(&mut self) -> Result<bool, Error> {
        self.sck.set_high().map_err(Error::pin)?;
        self.delay.delay_us(PULSE_HOLD_US);
        let bit = self.dt.is_high().map_err(Error::pin)?;
        self.sck.set_low().map_err(Error::pin)?;
        self.delay.delay_us(PULSE_HOLD_US);
        Ok(bit)
    }

    /// One SCK pulse that leaves DOUT alone, used for the mode pulses.
    fn pulse(&mut self) -> Result<(), Error> {
        self.sck.set_high().map_err(Error::pin)?;
        self.delay.delay_us(PULSE_HOLD_US);
        self.sck.set_low().map_err(Error::pin)?;
        self.delay.delay_us(PULSE_HOLD_US);
        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8, Error> {
        let mut value = 0u8;
        for _ in 0..8 {
            // msb first
            value = (value << 1) | u8::from(self.clock_bit()?);
        }
        Ok(value)
    }

    /// Clock out one conversion and program the next one.
    ///
    /// Runs in a critical section: an interrupt stretching a high phase past
    /// 60 µs would power the chip down mid-read and every remaining bit would
    /// read back as 1.
    fn read_frame(&mut self) -> Result<[u8; 3], Error> {
        critical_section::with(|_| {
            let mut bytes = [0u8; 3];
            for byte in bytes.iter_mut() {
                *byte = self.read_byte()?;
            }
            for _ in 0..self.channel_gain.pulses() {
                self.pulse()?;
            }
            Ok(bytes)
        })
    }
}

impl<SCK, DT, D> LoadCellAdc for Hx711<SCK, DT, D>
where
    SCK: OutputPin,
    DT: InputPin,
    D: DelayNs,
{
    fn read_raw(&mut self) -> Result<i32, Error> {
        self.wait_ready()?;
        let bytes = self.read_frame()?;
        let value = assemble_sample(bytes);
        trace!("HX711 frame {:02x?} -> {}", bytes, value);
        Ok(value)
    }

    fn pause_us(&mut self, us: u32) {
        self.delay.delay_us(us);
    }

    /// SCK low then high, and left high. The chip sleeps once the high level
    /// has lasted 60 µs; no delay is inserted here.
    fn power_down(&mut self) -> Result<(), Error> {
        self.sck.set_low().map_err(Error::pin)?;
        self.sck.set_high().map_err(Error::pin)?;
        info!("HX711 power down");
        Ok(())
    }

    fn power_up(&mut self) -> Result<(), Error> {
        self.sck.set_low().map_err(Error::pin)?;
        info!("HX711 normal mode");
        Ok(())
    }

    fn set_channel_gain(&mut self, channel_gain: ChannelGain) {
        debug!("HX711 next conversion: {}", channel_gain.label());
        self.channel_gain = channel_gain;
    }

    fn channel_gain(&self) -> ChannelGain {
        self.channel_gain
    }
}
