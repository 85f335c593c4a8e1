// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use super::ChipModel;

/// Maximum mixer DC output level; to be removed if the external
/// filter is turned off: ((wave DC + voice DC)*voices + mixer DC)*volume
/// See voice.rs and filter.rs for an explanation of the values.
const MIXER_DC_6581: i32 = ((((0x800 - 0x380) + 0x800) * 0xff * 3 - 0xfff * 0xff / 18) >> 7) * 0x0f;

// The C64 audio output stage: a 10kOhm/1000pF low-pass (~15.9kHz)
// followed by a 10kOhm/10uF DC blocker (~1.6Hz).
const TAU_LP: f64 = 10e3 * 1000e-12;
const TAU_HP: f64 = 10e3 * 10e-6;

/// Internal precision of the integrator states.
const STATE_SHIFT: u32 = 11;

/// Largest step for which the delta recurrence stays stable.
const MAX_DELTA: u32 = 8;

/// One RC stage as a first-order recurrence `y += (x - y) * k`.
#[derive(Clone, Copy)]
struct OnePole {
    /// Fixed-point `k = dt / (dt + tau)`.
    coeff: i32,
    /// Fraction bits of `coeff`.
    bits: u32,
}

impl OnePole {
    fn new(tau: f64, clock_freq: f64, bits: u32) -> Self {
        let dt = 1.0 / clock_freq;
        let alpha = dt / (dt + tau);
        OnePole {
            coeff: (alpha * (1u32 << bits) as f64 + 0.5) as i32,
            bits,
        }
    }

    /// Change of the state toward `target` over `cycles` cycles.
    #[inline]
    const fn delta(&self, state: i32, target: i64, cycles: i64) -> i32 {
        ((self.coeff as i64 * cycles * (target - state as i64)) >> self.bits) as i32
    }
}

/// C64 audio output stage filter.
///
/// The state saturates rather than wraps: three voices at full volume
/// exceed 24 bits before the internal shift.
#[derive(Clone, Copy)]
pub struct ExternalFilter {
    // Configuration
    enabled: bool,
    mixer_dc: i32,
    lowpass: OnePole,
    highpass: OnePole,
    // Runtime State
    vlp: i32,
    vhp: i32,
}

impl ExternalFilter {
    /// Create an external filter for the selected chip at the PAL clock.
    pub fn new(chip_model: ChipModel) -> Self {
        let mut filter = Self {
            enabled: true,
            mixer_dc: 0,
            lowpass: OnePole::new(TAU_LP, crate::clock::PAL as f64, 7),
            highpass: OnePole::new(TAU_HP, crate::clock::PAL as f64, 17),
            vlp: 0,
            vhp: 0,
        };
        filter.set_chip_model(chip_model);
        filter
    }

    /// Select the DC level removed while bypassed.
    pub const fn set_chip_model(&mut self, chip_model: ChipModel) {
        self.mixer_dc = match chip_model {
            ChipModel::Mos6581 => MIXER_DC_6581,
            ChipModel::Mos8580 => 0,
        };
    }

    /// Enable or disable the external audio filter stage.
    pub const fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Recalculate both stages for another chip clock.
    pub fn set_clock_frequency(&mut self, frequency: f64) {
        self.lowpass = OnePole::new(TAU_LP, frequency, 7);
        self.highpass = OnePole::new(TAU_HP, frequency, 17);
    }

    #[inline]
    fn bypass(&mut self, vi: i32) {
        self.vlp = ((vi as i64 - self.mixer_dc as i64) << STATE_SHIFT) as i32;
        self.vhp = 0;
    }

    /// Clock the filter for one cycle.
    #[inline]
    pub fn clock(&mut self, vi: i32) {
        self.clock_delta(1, vi);
    }

    /// Clock the filter for multiple cycles with constant input.
    #[inline]
    pub fn clock_delta(&mut self, mut delta: u32, vi: i32) {
        if !self.enabled {
            self.bypass(vi);
            return;
        }
        let target = (vi as i64) << STATE_SHIFT;
        while delta != 0 {
            let step = delta.min(MAX_DELTA);
            let dvlp = self.lowpass.delta(self.vlp, target, step as i64);
            let dvhp = self.highpass.delta(self.vhp, self.vlp as i64, step as i64);
            self.vlp = self.vlp.saturating_add(dvlp);
            self.vhp = self.vhp.saturating_add(dvhp);
            delta -= step;
        }
    }

    /// Filtered output: low-pass minus the tracked DC.
    #[inline]
    pub const fn output(&self) -> i32 {
        ((self.vlp as i64 - self.vhp as i64) >> STATE_SHIFT) as i32
    }

    /// Reset integrator state to zero.
    pub const fn reset(&mut self) {
        self.vlp = 0;
        self.vhp = 0;
    }
}
