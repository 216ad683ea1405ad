use log::info;

use crate::calibration::{Calibration, LinearFit};
use crate::config::DeviceConfig;
use crate::device::LoadCellAdc;
use crate::error::Error;
use crate::record::PersistedCalibration;
use crate::sampling::{Pacing, average_sample};

/// A load cell: one ADC plus its calibration.
///
/// This is the device handle the console passes around; there is no global
/// scale instance.
pub struct Scale<A> {
    adc: A,
    config: DeviceConfig,
    calibration: Calibration,
    pacing: Pacing,
}

impl<A: LoadCellAdc> Scale<A> {
    pub fn new(adc: A, config: DeviceConfig) -> Self {
        Self {
            adc,
            calibration: Calibration::new(config.max_load_grams)
                .with_slope_limit(config.max_grams_per_count),
            config,
            pacing: Pacing::default(),
        }
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn device(&self) -> &A {
        &self.adc
    }

    pub fn device_mut(&mut self) -> &mut A {
        &mut self.adc
    }

    pub fn into_device(self) -> A {
        self.adc
    }

    /// Truncated mean of `count` raw readings.
    pub fn raw_average(&mut self, count: u8) -> Result<i32, Error> {
        average_sample(&mut self.adc, count, self.pacing)
    }

    /// Tare with nothing on the cell.
    pub fn set_zero(&mut self, count: u8) -> Result<i32, Error> {
        let code = self.raw_average(count)?;
        Ok(self.calibration.set_zero_code(code))
    }

    pub fn set_reference_weight(&mut self, grams: i32) -> Result<i32, Error> {
        self.calibration.set_reference_weight(grams)
    }

    /// Sample with the reference weight on the cell and derive the line.
    pub fn calibrate(&mut self, count: u8) -> Result<LinearFit, Error> {
        self.calibration.check_ready_to_calibrate()?;
        let code = self.raw_average(count)?;
        self.calibration.set_reference_code(code)
    }

    pub fn weight_from_code(&self, code: i32) -> Result<f64, Error> {
        self.calibration.weight_from_code(code)
    }

    /// Averaged reading in grams, one decimal.
    pub fn get_weight(&mut self, count: u8) -> Result<f64, Error> {
        if self.calibration.fit().is_none() {
            return Err(Error::NotCalibrated);
        }
        let code = self.raw_average(count)?;
        self.calibration.weight_from_code(code)
    }

    pub fn calculate_coefficients(&mut self) -> Option<LinearFit> {
        self.calibration.calculate_coefficients()
    }

    pub fn to_record(&self) -> PersistedCalibration {
        self.calibration.to_record(self.adc.channel_gain())
    }

    /// Apply a stored record, including the channel/gain selection.
    pub fn restore(&mut self, record: &PersistedCalibration) {
        self.calibration.restore(record);
        self.adc.set_channel_gain(record.channel_gain);
        info!("Restored {}", record.channel_gain.label());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::ChannelGain;
    use crate::testing::ScriptedAdc;

    fn scale(samples: &[i32]) -> Scale<ScriptedAdc> {
        Scale::new(ScriptedAdc::new(samples), DeviceConfig::default())
    }

    #[test]
    fn test_tare_calibrate_weigh() {
        let mut scale = scale(&[]);
        scale.device_mut().push(1000, 4);
        scale.device_mut().push(3000, 4);
        scale.device_mut().push(2000, 2);

        assert_eq!(scale.set_zero(4), Ok(1000));
        scale.set_reference_weight(500).unwrap();
        let fit = scale.calibrate(4).unwrap();
        assert_eq!(fit.slope, 0.25);
        assert_eq!(scale.get_weight(2), Ok(250.0));
    }

    #[test]
    fn test_refused_calibration_does_not_sample() {
        let mut scale = scale(&[3000, 3000]);
        scale.set_zero(1).unwrap();

        assert_eq!(scale.calibrate(1), Err(Error::MissingReferenceWeight));
        assert_eq!(scale.device().reads(), 1);
        assert_eq!(scale.calibration().fit(), None);
    }

    #[test]
    fn test_unloaded_calibration_is_degenerate() {
        let mut scale = scale(&[1000, 1000]);
        scale.set_zero(1).unwrap();
        scale.set_reference_weight(500).unwrap();

        assert_eq!(
            scale.calibrate(1),
            Err(Error::DegenerateCalibration { code: 1000 })
        );
        assert_eq!(scale.calibration().fit(), None);
    }

    #[test]
    fn test_slope_limit_comes_from_config() {
        let mut strict = scale(&[1000, 1002]);
        strict.set_zero(1).unwrap();
        strict.set_reference_weight(500).unwrap();
        assert_eq!(strict.calibrate(1), Err(Error::ImplausibleSlope { span: 2 }));
        assert_eq!(strict.calibration().fit(), None);

        let config = DeviceConfig {
            max_grams_per_count: 500.0,
            ..DeviceConfig::default()
        };
        let mut relaxed = Scale::new(ScriptedAdc::new(&[1000, 1002]), config);
        relaxed.set_zero(1).unwrap();
        relaxed.set_reference_weight(500).unwrap();
        assert_eq!(relaxed.calibrate(1).map(|fit| fit.slope), Ok(250.0));
    }

    #[test]
    fn test_weight_before_calibration_does_not_sample() {
        let mut scale = scale(&[1000]);
        assert_eq!(scale.get_weight(1), Err(Error::NotCalibrated));
        assert_eq!(scale.device().reads(), 0);
    }

    #[test]
    fn test_restore_selects_channel_gain() {
        let mut scale = scale(&[]);
        scale.restore(&PersistedCalibration {
            ref_weight_grams: 500,
            zero_code: 1000,
            ref_code: 3000,
            channel_gain: ChannelGain::ChannelA64,
        });

        assert_eq!(scale.device().channel_gain(), ChannelGain::ChannelA64);
        assert_eq!(scale.weight_from_code(2000), Ok(250.0));
        assert_eq!(scale.to_record().channel_gain, ChannelGain::ChannelA64);
    }

    #[test]
    fn test_pacing_applies_to_averages() {
        let mut scale = scale(&[1, 1, 1]).with_pacing(Pacing::FixedDelayUs(1000));
        scale.raw_average(3).unwrap();
        assert_eq!(scale.device().paused_us(), 2000);
    }
}
