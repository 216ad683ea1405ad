//! Persisted calibration record.
//!
//! Binary format (little-endian, 14 bytes):
//! - marker: 1 byte (`MAGIC` once a save has completed)
//! - ref_weight_grams: 4 bytes (i32, `-1` when unset)
//! - zero_code: 4 bytes (i32, `0` when not captured)
//! - ref_code: 4 bytes (i32, `0` when not captured)
//! - channel_gain: 1 byte (pulse count 0..=3)

use log::{info, warn};

use crate::device::ChannelGain;
use crate::error::Error;

/// Validity marker written in front of a complete record.
pub const MAGIC: u8 = 42;

/// Stored in place of a missing reference weight.
pub const UNSET_REFERENCE_WEIGHT: i32 = -1;

const OFFSET_MARKER: usize = 0;
const OFFSET_REF_WEIGHT: usize = OFFSET_MARKER + 1;
const OFFSET_ZERO_CODE: usize = OFFSET_REF_WEIGHT + 4;
const OFFSET_REF_CODE: usize = OFFSET_ZERO_CODE + 4;
const OFFSET_CHANNEL_GAIN: usize = OFFSET_REF_CODE + 4;

/// Size of the record in bytes.
pub const RECORD_SIZE: usize = OFFSET_CHANNEL_GAIN + 1;

/// Byte-addressed non-volatile memory, EEPROM style.
pub trait RecordStorage {
    type Error: core::fmt::Debug;

    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), Self::Error>;

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), Self::Error>;
}

/// Calibration values as they live in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistedCalibration {
    pub ref_weight_grams: i32,
    pub zero_code: i32,
    pub ref_code: i32,
    pub channel_gain: ChannelGain,
}

/// The stored bytes decoded without any validation, for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawRecord {
    pub marker: u8,
    pub ref_weight_grams: i32,
    pub zero_code: i32,
    pub ref_code: i32,
    pub channel_gain_code: u8,
}

fn read_i32(bytes: &[u8; RECORD_SIZE], offset: usize) -> i32 {
    let mut field = [0u8; 4];
    field.copy_from_slice(&bytes[offset..offset + 4]);
    i32::from_le_bytes(field)
}

impl RawRecord {
    pub fn from_bytes(bytes: &[u8; RECORD_SIZE]) -> Self {
        Self {
            marker: bytes[OFFSET_MARKER],
            ref_weight_grams: read_i32(bytes, OFFSET_REF_WEIGHT),
            zero_code: read_i32(bytes, OFFSET_ZERO_CODE),
            ref_code: read_i32(bytes, OFFSET_REF_CODE),
            channel_gain_code: bytes[OFFSET_CHANNEL_GAIN],
        }
    }
}

impl PersistedCalibration {
    /// Serialize with the validity marker set.
    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut bytes = [0u8; RECORD_SIZE];
        bytes[OFFSET_MARKER] = MAGIC;
        bytes[OFFSET_REF_WEIGHT..OFFSET_ZERO_CODE]
            .copy_from_slice(&self.ref_weight_grams.to_le_bytes());
        bytes[OFFSET_ZERO_CODE..OFFSET_REF_CODE].copy_from_slice(&self.zero_code.to_le_bytes());
        bytes[OFFSET_REF_CODE..OFFSET_CHANNEL_GAIN].copy_from_slice(&self.ref_code.to_le_bytes());
        bytes[OFFSET_CHANNEL_GAIN] = self.channel_gain.code();
        bytes
    }

    /// Decode a stored record. `None` when the marker is missing or the
    /// channel/gain byte is not a known code.
    pub fn from_bytes(bytes: &[u8; RECORD_SIZE]) -> Option<Self> {
        let raw = RawRecord::from_bytes(bytes);
        if raw.marker != MAGIC {
            return None;
        }
        let Some(channel_gain) = ChannelGain::from_code(raw.channel_gain_code) else {
            warn!(
                "Stored record has unknown channel/gain code {}",
                raw.channel_gain_code
            );
            return None;
        };
        Some(Self {
            ref_weight_grams: raw.ref_weight_grams,
            zero_code: raw.zero_code,
            ref_code: raw.ref_code,
            channel_gain,
        })
    }
}

/// Write `record` at `offset`.
pub fn save<S: RecordStorage>(
    storage: &mut S,
    offset: usize,
    record: &PersistedCalibration,
) -> Result<(), Error> {
    storage.write(offset, &record.to_bytes()).map_err(|e| {
        warn!("Calibration record write failed: {:?}", e);
        Error::Storage
    })?;
    info!("Calibration record stored at offset {}", offset);
    Ok(())
}

/// Read the record at `offset`. An absent or corrupt record is `Ok(None)`;
/// only a failing storage device is an error.
pub fn load<S: RecordStorage>(
    storage: &mut S,
    offset: usize,
) -> Result<Option<PersistedCalibration>, Error> {
    let bytes = read_bytes(storage, offset)?;
    let record = PersistedCalibration::from_bytes(&bytes);
    if record.is_none() {
        info!("No valid calibration record at offset {}", offset);
    }
    Ok(record)
}

/// Read the stored fields whether or not the marker is valid.
pub fn dump<S: RecordStorage>(storage: &mut S, offset: usize) -> Result<RawRecord, Error> {
    read_bytes(storage, offset).map(|bytes| RawRecord::from_bytes(&bytes))
}

fn read_bytes<S: RecordStorage>(storage: &mut S, offset: usize) -> Result<[u8; RECORD_SIZE], Error> {
    let mut bytes = [0u8; RECORD_SIZE];
    storage.read(offset, &mut bytes).map_err(|e| {
        warn!("Calibration record read failed: {:?}", e);
        Error::Storage
    })?;
    Ok(bytes)
}
