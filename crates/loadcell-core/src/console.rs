//! Single-key command console.
//!
//! Every key runs exactly one scale operation and answers with a short,
//! human readable line. Errors are reported in the reply and never leave
//! the console.

use core::fmt::{self, Write};

use log::{debug, warn};

use crate::config::ConsoleSettings;
use crate::device::{ChannelGain, LoadCellAdc};
use crate::error::Error;
use crate::record::{self, RecordStorage};
use crate::scale::Scale;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `r <grams>`. A missing or unparsable number is kept as `None` and
    /// rejected as out of range.
    ReferenceWeight(Option<i32>),
    Zero,
    Calibrate,
    RawValue,
    Weight,
    SelectChannelGain(ChannelGain),
    PowerDown,
    PowerUp,
    StoreCalibration,
    ShowStoredCalibration,
    LoadCalibration,
    ShowEquation,
    ShowMenu,
}

/// Key and help text of every command, in menu order.
pub const MENU: [(char, &str); 16] = [
    ('r', "[r] Enter reference weight [grams], e.g. r 500"),
    ('z', "[z] Set to 0 (Tare)"),
    ('c', "[c] Calibrate with reference weight"),
    ('g', "[g] Get raw sensor value"),
    ('w', "[w] Get weight [grams]"),
    ('a', "[a] Set channel A, gain 128"),
    ('A', "[A] Set channel A, gain 64"),
    ('b', "[b] Set channel B, gain 32"),
    ('n', "[n] No channel selection"),
    ('p', "[p] Power down"),
    ('u', "[u] Power up to normal mode"),
    ('S', "[S] Store calibration data"),
    ('s', "[s] Show stored calibration data"),
    ('l', "[l] Load stored calibration data"),
    ('e', "[e] Show equation"),
    ('m', "[m] Show menu"),
];

impl Command {
    /// Parse one input line: a key character, optionally followed by an
    /// argument. Unknown keys and empty lines give `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let mut chars = line.chars();
        let key = chars.next()?;
        let argument = chars.as_str().trim();

        let command = match key {
            'r' => Self::ReferenceWeight(argument.parse().ok()),
            'z' => Self::Zero,
            'c' => Self::Calibrate,
            'g' => Self::RawValue,
            'w' => Self::Weight,
            'a' => Self::SelectChannelGain(ChannelGain::ChannelA128),
            'A' => Self::SelectChannelGain(ChannelGain::ChannelA64),
            'b' => Self::SelectChannelGain(ChannelGain::ChannelB32),
            'n' => Self::SelectChannelGain(ChannelGain::None),
            'p' => Self::PowerDown,
            'u' => Self::PowerUp,
            'S' => Self::StoreCalibration,
            's' => Self::ShowStoredCalibration,
            'l' => Self::LoadCalibration,
            'e' => Self::ShowEquation,
            'm' => Self::ShowMenu,
            _ => return None,
        };
        Some(command)
    }
}

/// The scale, its calibration storage and the console settings, passed
/// around as one handle.
pub struct Console<A, S> {
    scale: Scale<A>,
    storage: S,
    settings: ConsoleSettings,
}

impl<A, S> Console<A, S>
where
    A: LoadCellAdc,
    S: RecordStorage,
{
    pub fn new(scale: Scale<A>, storage: S, settings: ConsoleSettings) -> Self {
        Self {
            scale: scale.with_pacing(settings.pacing),
            storage,
            settings,
        }
    }

    pub fn scale(&self) -> &Scale<A> {
        &self.scale
    }

    pub fn scale_mut(&mut self) -> &mut Scale<A> {
        &mut self.scale
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn settings(&self) -> &ConsoleSettings {
        &self.settings
    }

    /// Apply the stored calibration, if there is a valid one. Returns
    /// whether a record was applied.
    pub fn restore(&mut self) -> Result<bool, Error> {
        match record::load(&mut self.storage, self.settings.record_offset)? {
            Some(stored) => {
                self.scale.restore(&stored);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Parse and run one input line.
    pub fn handle_line<W: Write>(&mut self, line: &str, out: &mut W) -> fmt::Result {
        match Command::parse(line) {
            Some(command) => self.execute(command, out),
            None if line.trim().is_empty() => Ok(()),
            None => write!(out, "Unknown command '{}', press m for menu", line.trim()),
        }
    }

    /// Like [`Console::handle_line`], collecting the reply in a fixed-size
    /// string. Replies longer than `N` bytes are cut off.
    pub fn respond<const N: usize>(&mut self, line: &str) -> heapless::String<N> {
        let mut reply = heapless::String::new();
        if self.handle_line(line, &mut reply).is_err() {
            debug!("Reply truncated to {} bytes", N);
        }
        reply
    }

    pub fn execute<W: Write>(&mut self, command: Command, out: &mut W) -> fmt::Result {
        match self.run(command, out) {
            Ok(result) => result,
            Err(err) => {
                warn!("{:?} failed: {}", command, err);
                write!(out, "{}", err)
            }
        }
    }

    /// Outer `Result` carries scale errors, inner one the formatter's.
    fn run<W: Write>(&mut self, command: Command, out: &mut W) -> Result<fmt::Result, Error> {
        let settings = self.settings;
        let reply = match command {
            Command::ReferenceWeight(grams) => {
                let grams = grams.unwrap_or(record::UNSET_REFERENCE_WEIGHT);
                let grams = self.scale.set_reference_weight(grams)?;
                write!(out, "Reference weight set to {}", grams)
            }
            Command::Zero => {
                let code = self.scale.set_zero(settings.zero_samples)?;
                write!(out, "v0 = {}", code)
            }
            Command::Calibrate => {
                let fit = self.scale.calibrate(settings.calibrate_samples)?;
                write!(out, "Calibrated: {}", fit)
            }
            Command::RawValue => {
                let code = self.scale.raw_average(settings.raw_samples)?;
                write!(out, "{}", code)
            }
            Command::Weight => {
                let grams = self.scale.get_weight(settings.weight_samples)?;
                write!(out, "{:.1} g", grams)
            }
            Command::SelectChannelGain(channel_gain) => {
                self.scale.device_mut().set_channel_gain(channel_gain);
                write!(out, "Set {}", channel_gain.label())
            }
            Command::PowerDown => {
                self.scale.device_mut().power_down()?;
                write!(out, "Power down mode set")
            }
            Command::PowerUp => {
                self.scale.device_mut().power_up()?;
                write!(out, "Normal mode set")
            }
            Command::StoreCalibration => {
                let stored = self.scale.to_record();
                record::save(&mut self.storage, settings.record_offset, &stored)?;
                write!(out, "Calibration data stored")
            }
            Command::ShowStoredCalibration => {
                let raw = record::dump(&mut self.storage, settings.record_offset)?;
                write!(
                    out,
                    "initFlag = {}, wRef = {}, vRef = {}, v0 = {}, chn_gain = {}",
                    raw.marker,
                    raw.ref_weight_grams,
                    raw.ref_code,
                    raw.zero_code,
                    raw.channel_gain_code
                )
            }
            Command::LoadCalibration => {
                if self.restore()? {
                    write!(out, "Calibration data loaded")
                } else {
                    write!(out, "No calibration data stored")
                }
            }
            Command::ShowEquation => {
                let fit = self.scale.calibration().fit().ok_or(Error::NotCalibrated)?;
                write!(out, "{}", fit)
            }
            Command::ShowMenu => self.write_menu(out),
        };
        Ok(reply)
    }

    pub fn write_menu<W: Write>(&self, out: &mut W) -> fmt::Result {
        writeln!(out, "------------------")?;
        writeln!(
            out,
            " HX711 {} kg scale",
            self.scale.config().max_load_grams / 1000
        )?;
        writeln!(out, "------------------")?;
        for (_, text) in MENU {
            writeln!(out, "{}", text)?;
        }
        write!(out, "\nPress a key: ")
    }
}
