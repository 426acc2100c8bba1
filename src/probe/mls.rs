//! Maximal-length sequence probe
//!
//! A Fibonacci linear-feedback shift register with a primitive feedback
//! polynomial visits every non-zero register state exactly once, giving a
//! ±1 sequence of period `2^order - 1` with a single sharp autocorrelation
//! peak. Repeating the period sharpens the correlation peak further.

use crate::config::MlsConfig;
use crate::error::CalibrationError;

use super::{apply_fade, normalize_peak};

pub const MIN_MLS_ORDER: u32 = 2;
pub const MAX_MLS_ORDER: u32 = 20;

/// Feedback taps (polynomial exponents) of a primitive polynomial per order
fn taps_for_order(order: u32) -> Option<&'static [u32]> {
    let taps: &'static [u32] = match order {
        2 => &[2, 1],
        3 => &[3, 2],
        4 => &[4, 3],
        5 => &[5, 3],
        6 => &[6, 5],
        7 => &[7, 6],
        8 => &[8, 6, 5, 4],
        9 => &[9, 5],
        10 => &[10, 7],
        11 => &[11, 9],
        12 => &[12, 11, 10, 4],
        13 => &[13, 12, 11, 8],
        14 => &[14, 13, 12, 2],
        15 => &[15, 14],
        16 => &[16, 15, 13, 4],
        17 => &[17, 14],
        18 => &[18, 11],
        19 => &[19, 18, 17, 14],
        20 => &[20, 17],
        _ => return None,
    };
    Some(taps)
}

/// Shift register producing one output bit per step
#[derive(Debug, Clone)]
pub struct Lfsr {
    state: u32,
    order: u32,
    taps: &'static [u32],
}

impl Lfsr {
    /// Create a register of `order` bits seeded with `seed`
    ///
    /// # Errors
    /// `InvalidParameter` if the order is outside 2..=20 or the seed is zero
    /// within `order` bits (a zero register never leaves the zero state).
    pub fn new(order: u32, seed: u32) -> Result<Self, CalibrationError> {
        let taps = taps_for_order(order).ok_or_else(|| {
            CalibrationError::invalid(
                "probe.mls.order",
                format!(
                    "must be within {}..={} (got {})",
                    MIN_MLS_ORDER, MAX_MLS_ORDER, order
                ),
            )
        })?;
        let state = seed & ((1u32 << order) - 1);
        if state == 0 {
            return Err(CalibrationError::invalid(
                "probe.mls.seed",
                format!("must be non-zero within {} bits (got {})", order, seed),
            ));
        }
        Ok(Self { state, order, taps })
    }

    pub fn state(&self) -> u32 {
        self.state
    }

    /// Emit the low bit and shift in the feedback bit
    #[inline]
    pub fn step(&mut self) -> bool {
        let out = self.state & 1 == 1;
        let feedback = self
            .taps
            .iter()
            .fold(0u32, |acc, &tap| acc ^ (self.state >> (self.order - tap)))
            & 1;
        self.state = (self.state >> 1) | (feedback << (self.order - 1));
        out
    }
}

/// One period of the ±1 sequence, `2^order - 1` values
pub fn sequence(order: u32, seed: u32) -> Result<Vec<f32>, CalibrationError> {
    let mut lfsr = Lfsr::new(order, seed)?;
    let period = (1usize << order) - 1;
    Ok((0..period)
        .map(|_| if lfsr.step() { 1.0 } else { -1.0 })
        .collect())
}

/// Generate the repeated, faded, peak-normalized MLS probe
pub fn generate(
    config: &MlsConfig,
    fade_samples: usize,
    amplitude: f32,
) -> Result<Vec<f32>, CalibrationError> {
    if config.repetitions == 0 {
        return Err(CalibrationError::invalid(
            "probe.mls.repetitions",
            "must be at least 1",
        ));
    }
    let period = sequence(config.order, config.seed)?;
    let mut samples = period.repeat(config.repetitions as usize);

    apply_fade(&mut samples, fade_samples);
    normalize_peak(&mut samples, amplitude);
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_period_for_every_order() {
        for order in MIN_MLS_ORDER..=MAX_MLS_ORDER {
            let mut lfsr = Lfsr::new(order, 1).unwrap();
            let start = lfsr.state();
            let mut steps = 0usize;
            loop {
                lfsr.step();
                steps += 1;
                if lfsr.state() == start {
                    break;
                }
            }
            assert_eq!(
                steps,
                (1usize << order) - 1,
                "order {} must cycle through every non-zero state",
                order
            );
        }
    }

    #[test]
    fn test_sequence_length_and_balance() {
        for order in [2u32, 5, 10, 12] {
            let seq = sequence(order, 0b1).unwrap();
            assert_eq!(seq.len(), (1usize << order) - 1);
            let ones = seq.iter().filter(|&&v| v > 0.0).count();
            assert_eq!(ones, 1usize << (order - 1), "MLS has one more +1 than -1");
        }
    }

    #[test]
    fn test_repeated_sequence_is_periodic() {
        let config = MlsConfig {
            order: 7,
            repetitions: 3,
            seed: 0b101,
        };
        let period = (1usize << config.order) - 1;
        let raw = sequence(config.order, config.seed).unwrap();
        let repeated = raw.repeat(config.repetitions as usize);
        for i in period..repeated.len() {
            assert_eq!(repeated[i], repeated[i - period]);
        }

        // The faded probe keeps the period away from its edges
        let probe = generate(&config, 4, 1.0).unwrap();
        assert_eq!(probe.len(), period * 3);
        for i in period..(2 * period) {
            assert_eq!(probe[i], raw[i - period]);
        }
    }

    #[test]
    fn test_sharp_autocorrelation_peak() {
        let seq = sequence(8, 1).unwrap();
        let n = seq.len();
        for shift in 1..n {
            let circular: f32 = (0..n).map(|i| seq[i] * seq[(i + shift) % n]).sum();
            assert_eq!(circular, -1.0, "off-peak circular autocorrelation is -1");
        }
    }

    #[test]
    fn test_invalid_order_and_seed() {
        assert!(Lfsr::new(1, 1).is_err());
        assert!(Lfsr::new(21, 1).is_err());
        assert!(Lfsr::new(4, 0).is_err());
        assert!(Lfsr::new(4, 0b1_0000).is_err());
        assert!(Lfsr::new(4, 0b1_0001).is_ok());
    }

    #[test]
    fn test_different_seeds_are_rotations() {
        let a = sequence(6, 1).unwrap();
        let b = sequence(6, 0b10_1101).unwrap();
        let n = a.len();
        let is_rotation = (0..n).any(|shift| (0..n).all(|i| a[(i + shift) % n] == b[i]));
        assert!(is_rotation, "every seed yields a rotation of the same sequence");
    }
}
