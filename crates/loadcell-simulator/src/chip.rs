//! A simulated HX711 behind `embedded-hal` pins.
//!
//! All three handles share one chip model running on a virtual nanosecond
//! clock. Delays advance the clock and so does every pin access, so the
//! driver sees realistic conversion times and power-down behaviour without
//! any wall-clock waiting.

use std::cell::RefCell;
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};
use log::debug;

/// 10 samples per second.
const CONVERSION_PERIOD_NS: u64 = 100_000_000;
/// Output settling after power-up or reset: four conversions at 10 SPS.
const SETTLING_NS: u64 = 4 * CONVERSION_PERIOD_NS;
/// PD_SCK high for this long powers the chip down.
const POWER_DOWN_NS: u64 = 60_000;
/// Cost of touching a pin.
const PIN_ACCESS_NS: u64 = 100;

const CODE_MIN: i32 = -0x80_0000;
const CODE_MAX: i32 = 0x7F_FFFF;

/// Electrical model of the load cell and the unused channel B input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellModel {
    /// Code with nothing on the cell, channel A gain 128.
    pub offset: i32,
    /// Counts per gram at channel A gain 128.
    pub counts_per_gram: f64,
    /// Peak noise in counts, uniformly distributed.
    pub noise: i32,
    /// Code seen on channel B.
    pub channel_b_code: i32,
}

impl Default for CellModel {
    fn default() -> Self {
        Self {
            offset: 84_000,
            counts_per_gram: 420.0,
            noise: 40,
            channel_b_code: 12_000,
        }
    }
}

/// Input and gain of the conversion in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    A128,
    B32,
    A64,
}

impl Mode {
    /// Mode programmed by a readout of `pulses` SCK pulses. 24 pulses keep
    /// the current mode.
    fn after_pulses(self, pulses: u32) -> Self {
        match pulses {
            0..=24 => self,
            25 => Self::A128,
            26 => Self::B32,
            _ => Self::A64,
        }
    }
}

struct Readout {
    word: u32,
    pulses: u32,
}

struct ChipState {
    now_ns: u64,
    model: CellModel,
    load_grams: f64,
    mode: Mode,
    sck_high: bool,
    sck_rise_ns: u64,
    sck_fall_ns: u64,
    /// Narrowest SCK high or low phase seen while clocking out data.
    shortest_phase_ns: Option<u64>,
    powered_down: bool,
    ready_at_ns: u64,
    readout: Option<Readout>,
    rng: u64,
}

impl ChipState {
    fn new(model: CellModel) -> Self {
        Self {
            now_ns: 0,
            model,
            load_grams: 0.0,
            mode: Mode::A128,
            sck_high: false,
            sck_rise_ns: 0,
            sck_fall_ns: 0,
            shortest_phase_ns: None,
            powered_down: false,
            ready_at_ns: SETTLING_NS,
            readout: None,
            rng: 0x2545_F491_4F6C_DD1D,
        }
    }

    fn advance(&mut self, ns: u64) {
        self.now_ns += ns;
        if self.sck_high && !self.powered_down && self.now_ns - self.sck_rise_ns >= POWER_DOWN_NS
        {
            debug!("Simulated HX711 powered down at {} ns", self.now_ns);
            self.powered_down = true;
            self.readout = None;
        }
    }

    fn next_noise(&mut self) -> i32 {
        if self.model.noise <= 0 {
            return 0;
        }
        // xorshift64
        self.rng ^= self.rng << 13;
        self.rng ^= self.rng >> 7;
        self.rng ^= self.rng << 17;
        let span = 2 * self.model.noise as u64 + 1;
        (self.rng % span) as i32 - self.model.noise
    }

    fn convert(&mut self) -> i32 {
        let code = match self.mode {
            Mode::A128 => self.model.offset as f64 + self.load_grams * self.model.counts_per_gram,
            Mode::A64 => {
                (self.model.offset as f64 + self.load_grams * self.model.counts_per_gram) / 2.0
            }
            Mode::B32 => self.model.channel_b_code as f64,
        };
        let code = code.round() as i64 + i64::from(self.next_noise());
        code.clamp(i64::from(CODE_MIN), i64::from(CODE_MAX)) as i32
    }

    fn record_phase(&mut self, ns: u64) {
        if self.readout.is_some() {
            self.shortest_phase_ns = Some(self.shortest_phase_ns.map_or(ns, |min| min.min(ns)));
        }
    }

    fn set_sck(&mut self, high: bool) {
        self.advance(PIN_ACCESS_NS);
        match (self.sck_high, high) {
            (false, true) => {
                self.sck_high = true;
                self.sck_rise_ns = self.now_ns;
                if self.powered_down {
                    return;
                }
                self.record_phase(self.now_ns - self.sck_fall_ns);
                match self.readout.as_mut() {
                    Some(readout) => readout.pulses += 1,
                    None if self.now_ns >= self.ready_at_ns => {
                        let code = self.convert();
                        self.readout = Some(Readout {
                            word: code as u32 & 0xFF_FFFF,
                            pulses: 1,
                        });
                    }
                    // Clocking before the conversion is done does nothing.
                    None => {}
                }
            }
            (true, false) => {
                self.sck_high = false;
                self.sck_fall_ns = self.now_ns;
                self.record_phase(self.now_ns - self.sck_rise_ns);
                if self.powered_down {
                    self.powered_down = false;
                    self.mode = Mode::A128;
                    self.ready_at_ns = self.now_ns + SETTLING_NS;
                    debug!("Simulated HX711 woke up at {} ns", self.now_ns);
                }
            }
            _ => {}
        }
    }

    /// DOUT level. Low means "conversion ready" between readouts and carries
    /// the data bits during one.
    fn dout_high(&mut self) -> bool {
        self.advance(PIN_ACCESS_NS);
        if self.powered_down {
            return true;
        }
        match &self.readout {
            Some(readout) if self.sck_high => match readout.pulses {
                1..=24 => (readout.word >> (24 - readout.pulses)) & 1 == 1,
                _ => true,
            },
            Some(readout) if readout.pulses >= 24 => {
                // Readout finished, the next conversion starts now.
                self.mode = self.mode.after_pulses(readout.pulses);
                self.readout = None;
                self.ready_at_ns = self.now_ns + CONVERSION_PERIOD_NS;
                true
            }
            Some(readout) => (readout.word >> (24 - readout.pulses)) & 1 == 1,
            None => self.now_ns < self.ready_at_ns,
        }
    }
}

/// Owner-side handle: hands out the pins and moves the simulated load.
#[derive(Clone)]
pub struct SimulatedHx711 {
    state: Rc<RefCell<ChipState>>,
}

impl SimulatedHx711 {
    pub fn new(model: CellModel) -> Self {
        Self {
            state: Rc::new(RefCell::new(ChipState::new(model))),
        }
    }

    /// PD_SCK, DOUT and a delay on the chip's virtual clock.
    pub fn pins(&self) -> (SimClock, SimData, SimDelay) {
        (
            SimClock(self.state.clone()),
            SimData(self.state.clone()),
            SimDelay(self.state.clone()),
        )
    }

    pub fn set_load(&self, grams: f64) {
        self.state.borrow_mut().load_grams = grams;
    }

    pub fn load(&self) -> f64 {
        self.state.borrow().load_grams
    }

    #[cfg(test)]
    pub fn mode(&self) -> Mode {
        self.state.borrow().mode
    }

    #[cfg(test)]
    pub fn is_powered_down(&self) -> bool {
        self.state.borrow().powered_down
    }

    /// Narrowest SCK phase of any readout so far.
    #[cfg(test)]
    pub fn shortest_sck_phase_ns(&self) -> Option<u64> {
        self.state.borrow().shortest_phase_ns
    }

    pub fn elapsed_ns(&self) -> u64 {
        self.state.borrow().now_ns
    }
}

pub struct SimClock(Rc<RefCell<ChipState>>);

impl ErrorType for SimClock {
    type Error = Infallible;
}

impl OutputPin for SimClock {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.borrow_mut().set_sck(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.borrow_mut().set_sck(true);
        Ok(())
    }
}

pub struct SimData(Rc<RefCell<ChipState>>);

impl ErrorType for SimData {
    type Error = Infallible;
}

impl InputPin for SimData {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.0.borrow_mut().dout_high())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.0.borrow_mut().dout_high())
    }
}

pub struct SimDelay(Rc<RefCell<ChipState>>);

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.0.borrow_mut().advance(u64::from(ns));
    }
}
