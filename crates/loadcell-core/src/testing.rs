//! Test doubles shared by the unit tests.

use std::collections::VecDeque;
use std::vec::Vec;

use crate::device::{ChannelGain, LoadCellAdc};
use crate::error::Error;
use crate::record::RecordStorage;

/// Replays a fixed list of raw codes; reads past the end fail like an
/// unresponsive chip.
pub struct ScriptedAdc {
    samples: VecDeque<i32>,
    reads: usize,
    paused_us: u64,
    powered_down: bool,
    channel_gain: ChannelGain,
}

impl ScriptedAdc {
    pub fn new(samples: &[i32]) -> Self {
        Self {
            samples: samples.iter().copied().collect(),
            reads: 0,
            paused_us: 0,
            powered_down: false,
            channel_gain: ChannelGain::default(),
        }
    }

    /// Queue `count` more reads of `code`.
    pub fn push(&mut self, code: i32, count: usize) {
        self.samples.extend(core::iter::repeat_n(code, count));
    }

    pub fn reads(&self) -> usize {
        self.reads
    }

    pub fn paused_us(&self) -> u64 {
        self.paused_us
    }

    pub fn powered_down(&self) -> bool {
        self.powered_down
    }
}

impl LoadCellAdc for ScriptedAdc {
    fn read_raw(&mut self) -> Result<i32, Error> {
        if self.powered_down {
            return Err(Error::NotResponding);
        }
        let sample = self.samples.pop_front().ok_or(Error::NotResponding)?;
        self.reads += 1;
        Ok(sample)
    }

    fn pause_us(&mut self, us: u32) {
        self.paused_us += u64::from(us);
    }

    fn power_down(&mut self) -> Result<(), Error> {
        self.powered_down = true;
        Ok(())
    }

    fn power_up(&mut self) -> Result<(), Error> {
        self.powered_down = false;
        Ok(())
    }

    fn set_channel_gain(&mut self, channel_gain: ChannelGain) {
        self.channel_gain = channel_gain;
    }

    fn channel_gain(&self) -> ChannelGain {
        self.channel_gain
    }
}

/// RAM-backed EEPROM, erased to 0xFF like a fresh part.
pub struct MemoryEeprom {
    pub bytes: Vec<u8>,
    pub fail: bool,
}

impl MemoryEeprom {
    pub fn new(size: usize) -> Self {
        Self {
            bytes: std::vec![0xFF; size],
            fail: false,
        }
    }
}

#[derive(Debug)]
pub struct MemoryEepromError;

impl RecordStorage for MemoryEeprom {
    type Error = MemoryEepromError;

    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), Self::Error> {
        if self.fail {
            return Err(MemoryEepromError);
        }
        let src = self
            .bytes
            .get(offset..offset + buf.len())
            .ok_or(MemoryEepromError)?;
        buf.copy_from_slice(src);
        Ok(())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), Self::Error> {
        if self.fail {
            return Err(MemoryEepromError);
        }
        let dst = self
            .bytes
            .get_mut(offset..offset + data.len())
            .ok_or(MemoryEepromError)?;
        dst.copy_from_slice(data);
        Ok(())
    }
}
