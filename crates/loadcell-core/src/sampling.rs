use log::debug;
use serde::{Deserialize, Serialize};

use crate::device::LoadCellAdc;
use crate::error::Error;

/// Spacing between consecutive reads of one averaging block.
///
/// Every read still waits for DOUT on its own, so pacing only reduces bus
/// traffic; it is not needed for correctness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Pacing {
    #[default]
    BackToBack,
    FixedDelayUs(u32),
}

/// Read `count` raw samples and return their mean, truncated toward zero.
///
/// The sum is kept in `i64`, so even 255 full-scale samples cannot overflow.
pub fn average_sample<A: LoadCellAdc + ?Sized>(
    adc: &mut A,
    count: u8,
    pacing: Pacing,
) -> Result<i32, Error> {
    if count == 0 {
        return Err(Error::InvalidSampleCount);
    }

    let mut sum: i64 = 0;
    for i in 0..count {
        if i > 0 {
            if let Pacing::FixedDelayUs(us) = pacing {
                adc.pause_us(us);
            }
        }
        sum += i64::from(adc.read_raw()?);
    }

    // |mean| never exceeds the largest |sample|, so it fits in i32.
    let mean = (sum / i64::from(count)) as i32;
    debug!("Average of {} samples: {}", count, mean);
    Ok(mean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedAdc;

    #[test]
    fn test_average_of_scripted_sequence() {
        let mut adc = ScriptedAdc::new(&[100, 102, 101, 101]);
        assert_eq!(average_sample(&mut adc, 4, Pacing::BackToBack), Ok(101));
        assert_eq!(adc.reads(), 4);
    }

    #[test]
    fn test_average_truncates_toward_zero() {
        let mut adc = ScriptedAdc::new(&[1, 2]);
        assert_eq!(average_sample(&mut adc, 2, Pacing::BackToBack), Ok(1));

        let mut adc = ScriptedAdc::new(&[-1, -2]);
        assert_eq!(average_sample(&mut adc, 2, Pacing::BackToBack), Ok(-1));
    }

    #[test]
    fn test_average_reads_exactly_count_samples() {
        let mut adc = ScriptedAdc::new(&[10, 20, 30, 40, 50]);
        assert_eq!(average_sample(&mut adc, 3, Pacing::BackToBack), Ok(20));
        assert_eq!(adc.reads(), 3);
    }

    #[test]
    fn test_zero_count_is_rejected_without_reading() {
        let mut adc = ScriptedAdc::new(&[100]);
        assert_eq!(
            average_sample(&mut adc, 0, Pacing::BackToBack),
            Err(Error::InvalidSampleCount)
        );
        assert_eq!(adc.reads(), 0);
    }

    #[test]
    fn test_full_scale_sum_does_not_overflow() {
        let samples = [8_388_607; 255];
        let mut adc = ScriptedAdc::new(&samples);
        assert_eq!(average_sample(&mut adc, 255, Pacing::BackToBack), Ok(8_388_607));
    }

    #[test]
    fn test_fixed_delay_pauses_between_reads() {
        let mut adc = ScriptedAdc::new(&[5, 5, 5]);
        average_sample(&mut adc, 3, Pacing::FixedDelayUs(150)).unwrap();
        assert_eq!(adc.paused_us(), 300);
    }

    #[test]
    fn test_read_error_aborts_average() {
        let mut adc = ScriptedAdc::new(&[5]);
        assert_eq!(
            average_sample(&mut adc, 2, Pacing::BackToBack),
            Err(Error::NotResponding)
        );
    }
}
