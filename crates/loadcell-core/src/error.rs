use embedded_hal::digital::ErrorKind;
use thiserror_no_std::Error;

/// Everything that can go wrong between the pins and the console.
///
/// None of these are fatal: the console reports them and keeps running.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Reference weight outside `[max_load / 10, max_load]`.
    #[error("Value out of range, allowed: {min} .. {max} [grams]")]
    OutOfRange { value: i32, min: i32, max: i32 },
    #[error("First enter reference weight!")]
    MissingReferenceWeight,
    #[error("First set 0 (tare)")]
    MissingZero,
    /// Reference and zero codes are equal, the fit would divide by zero.
    #[error("Reference reading equals zero reading ({code}), load the reference weight")]
    DegenerateCalibration { code: i32 },
    /// The reference reading is so close to zero that the slope exceeds the
    /// configured limit; usually the weight was not on the cell.
    #[error("First Calibrate with Reference Weight (reading only {span} counts from zero)")]
    ImplausibleSlope { span: i32 },
    #[error("Scale is not calibrated")]
    NotCalibrated,
    /// DOUT stayed high for the whole ready timeout.
    #[error("HX711 not responding")]
    NotResponding,
    #[error("Sample count must be at least 1")]
    InvalidSampleCount,
    #[error("GPIO error: {0:?}")]
    Pin(ErrorKind),
    #[error("Calibration storage error")]
    Storage,
}

impl Error {
    /// Lift a HAL pin error into the crate error.
    pub fn pin<E: embedded_hal::digital::Error>(err: E) -> Self {
        Self::Pin(err.kind())
    }
}
