// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

//! R-2R ladder DAC model.
//!
//! The SID drives its filter cutoff through an 11-bit R-2R ladder. On the
//! 6581 the resistors are mismatched (2R/R ~ 2.20) and bit 0 lacks its
//! termination, which bends the cutoff curve; the 8580 ladder is matched
//! and terminated. The filter uses [`build_dac_table`] to turn FC register
//! values into a normalized control voltage.

use alloc::vec::Vec;

use super::ChipModel;

/// Open circuit of the missing termination resistor.
const R_INFINITY: f64 = 1e6;

impl ChipModel {
    /// Output of a bit whose switch is off, relative to its on level.
    const fn leakage(self) -> f64 {
        match self {
            Self::Mos6581 => 0.0075,
            Self::Mos8580 => 0.0035,
        }
    }

    const fn r2r_ratio(self) -> f64 {
        match self {
            Self::Mos6581 => 2.20,
            Self::Mos8580 => 2.00,
        }
    }
}

const fn parallel(r1: f64, r2: f64) -> f64 {
    (r1 * r2) / (r1 + r2)
}

/// Voltage at the ladder output when only `set_bit` is driven.
fn bit_voltage(set_bit: usize, bits: usize, r2: f64, terminated: bool) -> f64 {
    let r = 1.0;
    let mut vn = 1.0;
    let mut rn = if terminated { r2 } else { R_INFINITY };

    // Thevenin equivalent of everything below the driven bit.
    for _ in 0..set_bit {
        rn = if rn == R_INFINITY {
            r + r2
        } else {
            r + parallel(r2, rn)
        };
    }
    if rn == R_INFINITY {
        rn = r2;
    } else {
        let rn_par = parallel(r2, rn);
        vn *= rn_par / r2;
        rn = rn_par;
    }

    // Divide down through the remaining rungs.
    for _ in (set_bit + 1)..bits {
        rn += r;
        let i = vn / rn;
        rn = parallel(r2, rn);
        vn = rn * i;
    }
    vn
}

/// Normalized per-bit weights; they sum to 1.0.
fn ladder_weights(bits: usize, chip_model: ChipModel) -> Vec<f64> {
    let r2 = chip_model.r2r_ratio();
    let terminated = chip_model == ChipModel::Mos8580;
    let mut weights: Vec<f64> = (0..bits)
        .map(|bit| bit_voltage(bit, bits, r2, terminated))
        .collect();
    let total: f64 = weights.iter().sum();
    for w in &mut weights {
        *w /= total;
    }
    weights
}

/// Builds the DAC transfer table for all `1 << bits` inputs.
pub fn build_dac_table(bits: usize, chip_model: ChipModel) -> Vec<f32> {
    let weights = ladder_weights(bits, chip_model);
    let leakage = chip_model.leakage();
    (0..1usize << bits)
        .map(|input| {
            weights
                .iter()
                .enumerate()
                .map(|(i, &w)| if input & (1 << i) != 0 { w } else { w * leakage })
                .sum::<f64>() as f32
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn cutoff_dac_6581_reference_points() {
        let table = build_dac_table(11, ChipModel::Mos6581);
        assert_abs_diff_eq!(table[0], 0.007500, epsilon = 1e-4);
        assert_abs_diff_eq!(table[16], 0.016573, epsilon = 1e-4);
        assert_abs_diff_eq!(table[256], 0.135356, epsilon = 1e-4);
        assert_abs_diff_eq!(table[1024], 0.488073, epsilon = 1e-4);
        assert_abs_diff_eq!(table[2047], 1.000000, epsilon = 1e-4);
    }

    #[test]
    fn cutoff_dac_8580_reference_points() {
        let table = build_dac_table(11, ChipModel::Mos8580);
        assert_abs_diff_eq!(table[0], 0.003500, epsilon = 1e-4);
        assert_abs_diff_eq!(table[64], 0.034656, epsilon = 1e-4);
        assert_abs_diff_eq!(table[512], 0.252747, epsilon = 1e-4);
        assert_abs_diff_eq!(table[2047], 1.000000, epsilon = 1e-4);
    }

    /// Missing termination makes the 6581 ladder drop at each power of two.
    #[test]
    fn ladder_6581_is_non_monotonic() {
        let table = build_dac_table(8, ChipModel::Mos6581);
        assert!(table[127] > table[128]);
        let table = build_dac_table(8, ChipModel::Mos8580);
        assert!(table.windows(2).all(|w| w[1] > w[0]));
    }
}
