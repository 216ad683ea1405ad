//! Simulator configuration from environment variables and an optional JSON
//! settings file.
//!
//! | Variable                        | Meaning                              |
//! |---------------------------------|--------------------------------------|
//! | `LOADCELL_CONFIG`               | path of a JSON [`SettingsFile`]      |
//! | `LOADCELL_EEPROM`               | EEPROM image path                    |
//! | `LOADCELL_SIM_OFFSET`           | simulated zero-load code             |
//! | `LOADCELL_SIM_COUNTS_PER_GRAM`  | simulated sensitivity at gain 128    |
//! | `LOADCELL_SIM_NOISE`            | simulated peak noise in counts       |
//!
//! A `.env` file in the working directory is honoured as well.

use std::fmt::Display;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, anyhow};
use loadcell_core::{ConsoleSettings, DeviceConfig, ReadyWait};
use serde::{Deserialize, Serialize};

use crate::chip::CellModel;

pub const DEFAULT_EEPROM_PATH: &str = "loadcell-eeprom.bin";

/// Contents of the JSON settings file. Every section is optional.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct SettingsFile {
    pub device: DeviceConfig,
    pub console: ConsoleSettings,
    pub ready_wait: ReadyWait,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorConfig {
    pub settings: SettingsFile,
    pub eeprom_path: PathBuf,
    pub cell: CellModel,
}

impl SimulatorConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let settings = match lookup("LOADCELL_CONFIG") {
            Some(path) => {
                let text = fs::read_to_string(&path)
                    .with_context(|| format!("reading settings file {}", path))?;
                parse_settings(&text).with_context(|| format!("parsing settings file {}", path))?
            }
            None => SettingsFile::default(),
        };

        let defaults = CellModel::default();
        let cell = CellModel {
            offset: parse_var(&lookup, "LOADCELL_SIM_OFFSET", defaults.offset)?,
            counts_per_gram: parse_var(
                &lookup,
                "LOADCELL_SIM_COUNTS_PER_GRAM",
                defaults.counts_per_gram,
            )?,
            noise: parse_var(&lookup, "LOADCELL_SIM_NOISE", defaults.noise)?,
            ..defaults
        };

        Ok(Self {
            settings,
            eeprom_path: lookup("LOADCELL_EEPROM")
                .unwrap_or_else(|| DEFAULT_EEPROM_PATH.into())
                .into(),
            cell,
        })
    }
}

pub fn parse_settings(text: &str) -> anyhow::Result<SettingsFile> {
    let settings: SettingsFile = serde_json::from_str(text)?;
    if settings.device.max_load_grams <= 0 {
        return Err(anyhow!(
            "device.max_load_grams must be positive, got {}",
            settings.device.max_load_grams
        ));
    }
    let limit = settings.device.max_grams_per_count;
    if limit.is_nan() || limit <= 0.0 {
        return Err(anyhow!(
            "device.max_grams_per_count must be positive, got {}",
            settings.device.max_grams_per_count
        ));
    }
    Ok(settings)
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e| anyhow!("{}={:?}: {}", key, value, e)),
        None => Ok(default),
    }
}
