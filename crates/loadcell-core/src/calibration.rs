//! Two-point linear calibration.
//!
//! Two raw codes are captured: `zero` with no load and `ref` with a known
//! reference weight `w` on the cell. Any code `v` then converts to grams as
//!
//! ```text
//! weight = w * (v - zero) / (ref - zero)
//!        = slope * v + intercept
//! slope     = w / (ref - zero)
//! intercept = -w * zero / (ref - zero)
//! ```

use core::fmt;

use log::{debug, info, warn};

use crate::device::ChannelGain;
use crate::error::Error;
use crate::record::{PersistedCalibration, UNSET_REFERENCE_WEIGHT};

/// A load cell resolves far better than a gram per count, so a steeper
/// line means the reference weight was missing during calibration.
pub const DEFAULT_MAX_GRAMS_PER_COUNT: f64 = 1.0;

/// Slope and intercept of the code-to-grams line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearFit {
    /// Unrounded weight in grams.
    pub fn weight(&self, code: i32) -> f64 {
        self.slope * f64::from(code) + self.intercept
    }
}

impl fmt::Display for LinearFit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "weight = {:.9} * v {:+9.4}", self.slope, self.intercept)
    }
}

/// Round to one decimal, halves away from zero.
fn round_tenths(grams: f64) -> f64 {
    libm::round(grams * 10.0) / 10.0
}

/// Reference points and the line derived from them.
///
/// The fit is recomputed by every setter, so it never disagrees with the
/// three reference values.
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    max_load_grams: i32,
    zero_code: Option<i32>,
    ref_code: Option<i32>,
    ref_weight_grams: Option<i32>,
    fit: Option<LinearFit>,
    max_grams_per_count: f64,
}

impl Calibration {
    pub const fn new(max_load_grams: i32) -> Self {
        Self {
            max_load_grams,
            zero_code: None,
            ref_code: None,
            ref_weight_grams: None,
            fit: None,
            max_grams_per_count: DEFAULT_MAX_GRAMS_PER_COUNT,
        }
    }

    /// Override the slope limit checked by
    /// [`Calibration::set_reference_code`].
    pub const fn with_slope_limit(mut self, max_grams_per_count: f64) -> Self {
        self.max_grams_per_count = max_grams_per_count;
        self
    }

    pub const fn max_load_grams(&self) -> i32 {
        self.max_load_grams
    }

    pub const fn zero_code(&self) -> Option<i32> {
        self.zero_code
    }

    pub const fn ref_code(&self) -> Option<i32> {
        self.ref_code
    }

    pub const fn ref_weight_grams(&self) -> Option<i32> {
        self.ref_weight_grams
    }

    pub const fn fit(&self) -> Option<LinearFit> {
        self.fit
    }

    /// Accepted reference weights, inclusive.
    pub const fn reference_range(&self) -> (i32, i32) {
        (self.max_load_grams / 10, self.max_load_grams)
    }

    /// Record the weight that will sit on the cell during calibration.
    pub fn set_reference_weight(&mut self, grams: i32) -> Result<i32, Error> {
        let (min, max) = self.reference_range();
        if !(min..=max).contains(&grams) {
            return Err(Error::OutOfRange {
                value: grams,
                min,
                max,
            });
        }
        self.ref_weight_grams = Some(grams);
        self.calculate_coefficients();
        info!("Reference weight set to {} g", grams);
        Ok(grams)
    }

    /// Tare: `code` is the averaged reading with no load applied.
    pub fn set_zero_code(&mut self, code: i32) -> i32 {
        self.zero_code = Some(code);
        self.calculate_coefficients();
        info!("Zero code set to {}", code);
        code
    }

    /// Capture the reading with the reference weight applied and derive the
    /// line.
    ///
    /// Needs the reference weight and the zero code first. A reading equal
    /// to the zero code would divide by zero; one giving a slope steeper than
    /// the limit is taken as a missing weight. A rejected reading leaves the
    /// state untouched.
    pub fn set_reference_code(&mut self, code: i32) -> Result<LinearFit, Error> {
        self.check_ready_to_calibrate()?;
        let (Some(zero), Some(grams)) = (self.zero_code, self.ref_weight_grams) else {
            return Err(Error::NotCalibrated);
        };
        if zero == code {
            return Err(Error::DegenerateCalibration { code });
        }
        let span = code.saturating_sub(zero);
        if (f64::from(grams) / f64::from(span)).abs() > self.max_grams_per_count {
            warn!("Calibration rejected, {} g over {} counts", grams, span);
            return Err(Error::ImplausibleSlope { span });
        }
        self.ref_code = Some(code);
        let fit = self.calculate_coefficients().ok_or(Error::NotCalibrated)?;
        info!("Calibrated: {}", fit);
        Ok(fit)
    }

    /// Preconditions of [`Calibration::set_reference_code`], checked before
    /// any sampling so a refused calibration never touches the bus.
    pub fn check_ready_to_calibrate(&self) -> Result<(), Error> {
        if self.ref_weight_grams.is_none() {
            return Err(Error::MissingReferenceWeight);
        }
        if self.zero_code.is_none() {
            return Err(Error::MissingZero);
        }
        Ok(())
    }

    /// Derive slope and intercept from the current reference values. Leaves
    /// no fit when a value is missing or the two codes coincide.
    pub fn calculate_coefficients(&mut self) -> Option<LinearFit> {
        self.fit = match (self.zero_code, self.ref_code, self.ref_weight_grams) {
            (Some(zero), Some(reference), Some(grams)) if zero != reference => {
                let span = (i64::from(reference) - i64::from(zero)) as f64;
                let grams = f64::from(grams);
                Some(LinearFit {
                    slope: grams / span,
                    intercept: -grams * f64::from(zero) / span,
                })
            }
            _ => None,
        };
        debug!("Coefficients: {:?}", self.fit);
        self.fit
    }

    /// Convert a raw code to grams, rounded to one decimal.
    pub fn weight_from_code(&self, code: i32) -> Result<f64, Error> {
        let (Some(zero), Some(reference), Some(grams)) =
            (self.zero_code, self.ref_code, self.ref_weight_grams)
        else {
            return Err(Error::NotCalibrated);
        };
        if zero == reference {
            return Err(Error::DegenerateCalibration { code: reference });
        }

        let offset = (i64::from(code) - i64::from(zero)) as f64;
        let span = (i64::from(reference) - i64::from(zero)) as f64;
        Ok(round_tenths(f64::from(grams) * offset / span))
    }

    /// Apply a stored record. Out-of-range weights stay unset and zero codes
    /// count as never captured.
    pub fn restore(&mut self, record: &PersistedCalibration) {
        let (min, max) = self.reference_range();
        self.ref_weight_grams = if (min..=max).contains(&record.ref_weight_grams) {
            Some(record.ref_weight_grams)
        } else {
            if record.ref_weight_grams != UNSET_REFERENCE_WEIGHT {
                warn!(
                    "Stored reference weight {} g outside {} .. {} g, ignored",
                    record.ref_weight_grams, min, max
                );
            }
            None
        };
        self.zero_code = (record.zero_code != 0).then_some(record.zero_code);
        self.ref_code = (record.ref_code != 0).then_some(record.ref_code);
        self.calculate_coefficients();
        info!(
            "Calibration restored: wRef = {:?}, v0 = {:?}, vRef = {:?}",
            self.ref_weight_grams, self.zero_code, self.ref_code
        );
    }

    /// Snapshot for storage, with unset values written as their sentinels.
    ///
    /// A code of `0` doubles as "not captured", so a tare that really read
    /// exactly `0` does not survive [`Calibration::restore`]: the scale comes
    /// back without a zero and needs taring again.
    pub fn to_record(&self, channel_gain: ChannelGain) -> PersistedCalibration {
        PersistedCalibration {
            ref_weight_grams: self.ref_weight_grams.unwrap_or(UNSET_REFERENCE_WEIGHT),
            zero_code: self.zero_code.unwrap_or(0),
            ref_code: self.ref_code.unwrap_or(0),
            channel_gain,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::fmt::Write;
    use heapless::String;

    fn calibrated(zero: i32, reference: i32, grams: i32) -> Calibration {
        let mut cal = Calibration::new(1000);
        cal.set_reference_weight(grams).unwrap();
        cal.set_zero_code(zero);
        cal.set_reference_code(reference).unwrap();
        cal
    }

    #[test]
    fn test_worked_example() {
        let cal = calibrated(1000, 3000, 500);
        let fit = cal.fit().unwrap();

        assert_eq!(fit.slope, 0.25);
        assert_eq!(fit.intercept, -250.0);
        assert_eq!(cal.weight_from_code(2000), Ok(250.0));
    }

    #[test]
    fn test_reference_points_map_to_zero_and_reference_weight() {
        for (zero, reference, grams) in [
            (1000, 3000, 500),
            (-52_113, 410_932, 100),
            (8_000_000, -8_000_000, 1000),
            (12, 1013, 250),
        ] {
            let cal = calibrated(zero, reference, grams);
            assert_eq!(cal.weight_from_code(zero), Ok(0.0));
            assert_eq!(cal.weight_from_code(reference), Ok(f64::from(grams)));
        }
    }

    #[test]
    fn test_monotonic_with_span_sign() {
        let rising = calibrated(1000, 5000, 800);
        let falling = calibrated(5000, 1000, 800);

        let mut previous = (f64::MIN, f64::MAX);
        for code in (-20_000..20_000).step_by(97) {
            let up = rising.weight_from_code(code).unwrap();
            let down = falling.weight_from_code(code).unwrap();
            assert!(up >= previous.0);
            assert!(down <= previous.1);
            previous = (up, down);
        }
    }

    #[test]
    fn test_fit_agrees_with_direct_formula() {
        let cal = calibrated(-84_211, 301_977, 731);
        let fit = cal.fit().unwrap();
        for code in [-8_388_608, -84_211, 0, 1, 12_345, 301_977, 8_388_607] {
            let direct = cal.weight_from_code(code).unwrap();
            assert!((fit.weight(code) - direct).abs() <= 0.05 + 1e-9);
        }
    }

    #[test]
    fn test_rounds_half_away_from_zero() {
        let mut cal = Calibration::new(10);
        cal.set_reference_weight(1).unwrap();
        cal.set_zero_code(0);
        cal.set_reference_code(4).unwrap();

        assert_eq!(cal.weight_from_code(1), Ok(0.3));
        assert_eq!(cal.weight_from_code(-1), Ok(-0.3));
    }

    #[test]
    fn test_reference_weight_range() {
        let mut cal = Calibration::new(1000);
        assert_eq!(cal.set_reference_weight(100), Ok(100));
        assert_eq!(cal.set_reference_weight(1000), Ok(1000));
        assert_eq!(
            cal.set_reference_weight(99),
            Err(Error::OutOfRange {
                value: 99,
                min: 100,
                max: 1000
            })
        );
        assert!(matches!(
            cal.set_reference_weight(1001),
            Err(Error::OutOfRange { value: 1001, .. })
        ));
        assert_eq!(cal.ref_weight_grams(), Some(1000));
    }

    #[test]
    fn test_calibrate_requires_reference_weight_first() {
        let mut cal = Calibration::new(1000);
        cal.set_zero_code(1000);
        assert_eq!(
            cal.set_reference_code(3000),
            Err(Error::MissingReferenceWeight)
        );
        assert_eq!(cal.fit(), None);
        assert_eq!(cal.ref_code(), None);
    }

    #[test]
    fn test_calibrate_requires_zero_first() {
        let mut cal = Calibration::new(1000);
        cal.set_reference_weight(500).unwrap();
        assert_eq!(cal.set_reference_code(3000), Err(Error::MissingZero));
        assert_eq!(cal.fit(), None);
    }

    #[test]
    fn test_equal_codes_are_rejected() {
        let mut cal = calibrated(1000, 3000, 500);
        let before = cal.fit();

        assert_eq!(
            cal.set_reference_code(1000),
            Err(Error::DegenerateCalibration { code: 1000 })
        );
        assert_eq!(cal.fit(), before);
        assert_eq!(cal.ref_code(), Some(3000));
    }

    #[test]
    fn test_noise_sized_span_is_rejected() {
        let mut cal = calibrated(1000, 3000, 500);
        let before = cal.clone();

        assert_eq!(
            cal.set_reference_code(1003),
            Err(Error::ImplausibleSlope { span: 3 })
        );
        assert_eq!(
            cal.set_reference_code(997),
            Err(Error::ImplausibleSlope { span: -3 })
        );
        assert_eq!(cal, before);
    }

    #[test]
    fn test_slope_limit_is_inclusive_and_adjustable() {
        let mut cal = Calibration::new(1000);
        cal.set_reference_weight(500).unwrap();
        cal.set_zero_code(1000);
        assert_eq!(cal.set_reference_code(1500).unwrap().slope, 1.0);

        let mut coarse = Calibration::new(1000).with_slope_limit(200.0);
        coarse.set_reference_weight(500).unwrap();
        coarse.set_zero_code(1000);
        assert_eq!(coarse.set_reference_code(1003).map(|fit| fit.slope > 1.0), Ok(true));
        assert_eq!(coarse.weight_from_code(1003), Ok(500.0));
    }

    #[test]
    fn test_setters_keep_fit_consistent() {
        let mut cal = calibrated(1000, 3000, 500);

        cal.set_reference_weight(1000).unwrap();
        assert_eq!(cal.fit().unwrap().slope, 0.5);

        cal.set_zero_code(2000);
        let setter_fit = cal.fit();
        assert_eq!(cal.calculate_coefficients(), setter_fit);
        assert_eq!(cal.weight_from_code(3000), Ok(1000.0));

        // Re-taring onto the reference code leaves no usable line.
        cal.set_zero_code(3000);
        assert_eq!(cal.fit(), None);
        assert_eq!(
            cal.weight_from_code(3000),
            Err(Error::DegenerateCalibration { code: 3000 })
        );
    }

    #[test]
    fn test_weight_needs_calibration() {
        let mut cal = Calibration::new(1000);
        assert_eq!(cal.weight_from_code(5), Err(Error::NotCalibrated));
        cal.set_zero_code(5);
        assert_eq!(cal.weight_from_code(5), Err(Error::NotCalibrated));
    }

    #[test]
    fn test_equation_format() {
        let fit = calibrated(1000, 3000, 500).fit().unwrap();
        let mut out: String<64> = String::new();
        write!(out, "{}", fit).unwrap();
        assert_eq!(out.as_str(), "weight = 0.250000000 * v -250.0000");
    }

    #[test]
    fn test_record_round_trip_through_state() {
        let cal = calibrated(1000, 3000, 500);
        let record = cal.to_record(ChannelGain::ChannelA64);

        let mut restored = Calibration::new(1000);
        restored.restore(&record);
        assert_eq!(restored, cal);
    }

    #[test]
    fn test_restore_drops_invalid_fields() {
        let mut cal = Calibration::new(1000);
        cal.restore(&PersistedCalibration {
            ref_weight_grams: 5000,
            zero_code: 0,
            ref_code: 3000,
            channel_gain: ChannelGain::ChannelA128,
        });

        assert_eq!(cal.ref_weight_grams(), None);
        assert_eq!(cal.zero_code(), None);
        assert_eq!(cal.ref_code(), Some(3000));
        assert_eq!(cal.fit(), None);
    }

    #[test]
    fn test_zero_tare_code_is_lost_on_restore() {
        let cal = calibrated(0, 2000, 500);
        assert_eq!(cal.weight_from_code(1000), Ok(250.0));

        let mut restored = Calibration::new(1000);
        restored.restore(&cal.to_record(ChannelGain::ChannelA128));
        assert_eq!(restored.zero_code(), None);
        assert_eq!(restored.ref_code(), Some(2000));
        assert_eq!(restored.weight_from_code(1000), Err(Error::NotCalibrated));
    }

    #[test]
    fn test_unset_state_writes_sentinels() {
        let record = Calibration::new(1000).to_record(ChannelGain::ChannelA128);
        assert_eq!(record.ref_weight_grams, UNSET_REFERENCE_WEIGHT);
        assert_eq!(record.zero_code, 0);
        assert_eq!(record.ref_code, 0);
    }
}
