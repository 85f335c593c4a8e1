// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

#![allow(clippy::cast_lossless)]

use alloc::vec::Vec;
use core::f64;

use super::dac::build_dac_table;
use super::ChipModel;

const MIXER_DC: i32 = (-0xfff * 0xff / 18) >> 7;

/// Minimum Q factor (~1/√2, critically damped)
const Q_MIN: f64 = 0.707;

/// Maximum cutoff frequency for 1-cycle filter stability (Hz)
const F0_MAX_1CYCLE: f64 = 16000.0;

/// Maximum cutoff frequency for delta-cycle filter stability (Hz)
const F0_MAX_DELTA: f64 = 4000.0;

/// Fixed-point multiplier for 1MHz clock (2^20 / 1_000_000)
const FIXP_SCALE: f64 = 1.048_576;

/// 6581 cutoff range: the DAC output maps exponentially onto this span.
const F0_MIN_6581: f64 = 220.0;
const F0_MAX_6581: f64 = 18000.0;

/// 8580 cutoff is linear in FC up to this frequency.
const F0_MAX_8580: u32 = 12500;

/// Routes voices into or around the filter based on the filt register.
///
/// Returns `(filtered_input, non_filtered_output)`.
/// The 16-case match is expanded for performance (avoids bit testing overhead).
#[inline]
pub const fn route_voices(filt: u8, v1: i32, v2: i32, v3: i32, ext: i32) -> (i32, i32) {
    match filt {
        0x0 => (0, v1 + v2 + v3 + ext),
        0x1 => (v1, v2 + v3 + ext),
        0x2 => (v2, v1 + v3 + ext),
        0x3 => (v1 + v2, v3 + ext),
        0x4 => (v3, v1 + v2 + ext),
        0x5 => (v1 + v3, v2 + ext),
        0x6 => (v2 + v3, v1 + ext),
        0x7 => (v1 + v2 + v3, ext),
        0x8 => (ext, v1 + v2 + v3),
        0x9 => (v1 + ext, v2 + v3),
        0xa => (v2 + ext, v1 + v3),
        0xb => (v1 + v2 + ext, v3),
        0xc => (v3 + ext, v1 + v2),
        0xd => (v1 + v3 + ext, v2),
        0xe => (v2 + v3 + ext, v1),
        0xf => (v1 + v2 + v3 + ext, 0),
        _ => (0, v1 + v2 + v3 + ext),
    }
}

/// Mixes filter outputs based on the hp_bp_lp mode register.
///
/// Combines highpass, bandpass, and lowpass outputs according to
/// which filter modes are enabled (bits 0-2 of MODE_VOL register).
#[inline]
pub const fn mix_filter_output(vhp: i32, vbp: i32, vlp: i32, hp_bp_lp: u8) -> i32 {
    match hp_bp_lp {
        0x0 => 0,
        0x1 => vlp,
        0x2 => vbp,
        0x3 => vlp + vbp,
        0x4 => vhp,
        0x5 => vlp + vhp,
        0x6 => vbp + vhp,
        0x7 => vlp + vbp + vhp,
        _ => 0,
    }
}

/// The SID filter is modeled with a two-integrator-loop biquadratic filter,
/// which has been confirmed by Bob Yannes to be the actual circuit used in
/// the SID chip.
///
/// Measurements show that excellent emulation of the SID filter is achieved,
/// except when high resonance is combined with high sustain levels.
/// In this case the SID op-amps are performing less than ideally and are
/// causing some peculiar behavior of the SID filter. This however seems to
/// have more effect on the overall amplitude than on the color of the sound.
///
/// The theory for the filter circuit can be found in "Microelectric Circuits"
/// by Adel S. Sedra and Kenneth C. Smith.
/// The circuit is modeled based on the explanation found there except that
/// an additional inverter is used in the feedback from the bandpass output,
/// allowing the summer op-amp to operate in single-ended mode. This yields
/// inverted filter outputs with levels independent of Q, which corresponds with
/// the results obtained from a real SID.
///
/// We have been able to model the summer and the two integrators of the circuit
/// to form components of an IIR filter.
/// Vhp is the output of the summer, Vbp is the output of the first integrator,
/// and Vlp is the output of the second integrator in the filter circuit.
///
/// According to Bob Yannes, the active stages of the SID filter are not really
/// op-amps. Rather, simple NMOS inverters are used. By biasing an inverter
/// into its region of quasi-linear operation using a feedback resistor from
/// input to output, a MOS inverter can be made to act like an op-amp for
/// small signals centered around the switching threshold.
#[derive(Clone)]
pub struct Filter {
    // Configuration
    chip_model: ChipModel,
    enabled: bool,
    fc: u16,
    filt: u8,
    res: u8,
    /// Shifts the 6581 cutoff curve; positive values raise the cutoff.
    dac_bias: f64,
    /// Voices (bits 0-2) and EXT-IN (bit 3) fed to the mixer, upper bits set.
    voice_mask: u8,
    // Mode
    voice3_off: bool,
    hp_bp_lp: u8,
    vol: u8,
    // Runtime State
    /// External audio input, aligned to the 20-bit voice range.
    pub ext_in: i32,
    /// Highpass integrator state.
    pub vhp: i32,
    /// Bandpass integrator state.
    pub vbp: i32,
    /// Lowpass integrator state.
    pub vlp: i32,
    /// Non-filtered mixer output (pre-filter DC offset removed).
    pub vnf: i32,
    // Cutoff Freq/Res
    mixer_dc: i32,
    q_1024_div: i32,
    w0: i32,
    w0_ceil_1: i32,
    w0_ceil_dt: i32,
    // Cutoff Freq Table, Hz per FC value
    f0: Vec<u16>,
}

/// Cutoff frequency for every 11-bit FC value.
fn build_f0_table(chip_model: ChipModel, dac_bias: f64) -> Vec<u16> {
    match chip_model {
        ChipModel::Mos6581 => {
            let ratio = F0_MAX_6581 / F0_MIN_6581;
            build_dac_table(11, chip_model)
                .into_iter()
                .map(|v| {
                    let x = (v as f64 + dac_bias / 5.0).clamp(0.0, 1.0);
                    (F0_MIN_6581 * libm::pow(ratio, x) + 0.5) as u16
                })
                .collect()
        }
        ChipModel::Mos8580 => (0..2048u32).map(|fc| (fc * F0_MAX_8580 / 2047) as u16).collect(),
    }
}

impl Filter {
    /// Create a filter for the given chip model.
    pub fn new(chip_model: ChipModel) -> Self {
        let mut filter = Self {
            chip_model,
            enabled: true,
            fc: 0,
            filt: 0,
            res: 0,
            dac_bias: 0.0,
            voice_mask: 0xff,
            voice3_off: false,
            hp_bp_lp: 0,
            vol: 0,
            ext_in: 0,
            vhp: 0,
            vbp: 0,
            vlp: 0,
            vnf: 0,
            mixer_dc: MIXER_DC,
            q_1024_div: 0,
            w0: 0,
            w0_ceil_1: 0,
            w0_ceil_dt: 0,
            f0: Vec::new(),
        };
        filter.set_chip_model(chip_model);
        filter.set_q();
        filter
    }

    /// Switch the cutoff curve and DC level to another chip model.
    pub fn set_chip_model(&mut self, chip_model: ChipModel) {
        self.chip_model = chip_model;
        self.mixer_dc = match chip_model {
            ChipModel::Mos6581 => MIXER_DC,
            ChipModel::Mos8580 => 0,
        };
        self.f0 = build_f0_table(chip_model, self.dac_bias);
        self.set_w0();
    }

    /// Shift the 6581 cutoff curve to match a particular chip.
    pub fn adjust_filter_bias(&mut self, dac_bias: f64) {
        self.dac_bias = dac_bias;
        if self.chip_model == ChipModel::Mos6581 {
            self.f0 = build_f0_table(self.chip_model, dac_bias);
            self.set_w0();
        }
    }

    /// Current 6581 cutoff bias.
    pub const fn get_filter_bias(&self) -> f64 {
        self.dac_bias
    }

    /// Enable or disable the filter (bypasses when disabled).
    pub const fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Select which voices (bits 0-2) and EXT-IN (bit 3) reach the mixer.
    pub const fn set_voice_mask(&mut self, mask: u8) {
        self.voice_mask = 0xf0 | (mask & 0x0f);
    }

    /// Voice mask as stored (upper nibble always set).
    pub const fn get_voice_mask(&self) -> u8 {
        self.voice_mask
    }

    /// Feed an external audio sample (16-bit range).
    pub const fn input(&mut self, sample: i16) {
        // Voice outputs are 20 bits.
        self.ext_in = (sample as i32) << 4;
    }

    /// Cutoff frequency in Hz selected by the FC registers.
    pub fn cutoff_frequency(&self) -> u16 {
        self.f0[self.fc as usize]
    }

    fn set_q(&mut self) {
        // Q is controlled linearly by res. Q has approximate range [Q_MIN, 1.7].
        // As resonance is increased, the filter must be clocked more often to keep
        // stable.

        // The coefficient 1024 is dispensed of later by right-shifting 10 times
        // (2 ^ 10 = 1024).
        self.q_1024_div = (1024.0 / (Q_MIN + 1.0 * self.res as f64 / 15.0)) as i32;
    }

    fn set_w0(&mut self) {
        let freq = self.f0[self.fc as usize] as f64;

        // Multiply with FIXP_SCALE to facilitate division by 1_000_000 by right-
        // shifting 20 times (2 ^ 20 = 1048576).
        self.w0 = (2.0 * f64::consts::PI * freq * FIXP_SCALE) as i32;

        // Limit f0 to keep 1-cycle filter stable.
        let w0_max_1 = (2.0 * f64::consts::PI * F0_MAX_1CYCLE * FIXP_SCALE) as i32;
        self.w0_ceil_1 = self.w0.min(w0_max_1);

        // Limit f0 to keep delta-cycle filter stable.
        let w0_max_dt = (2.0 * f64::consts::PI * F0_MAX_DELTA * FIXP_SCALE) as i32;
        self.w0_ceil_dt = self.w0.min(w0_max_dt);
    }

    /// Scale 20-bit voice levels to 13 bits, apply the voice mask and
    /// voice3off, and route them. Returns `None` when bypassed.
    #[inline]
    fn mix_inputs(&mut self, voice1: i32, voice2: i32, voice3: i32) -> Option<i32> {
        let mask = self.voice_mask;
        let gate = |bit: u8, v: i32| if mask & bit != 0 { v >> 7 } else { 0 };
        let voice1 = gate(0x01, voice1);
        let voice2 = gate(0x02, voice2);
        // NB! Voice 3 is not silenced by voice3off if it is routed through
        // the filter.
        let voice3 = if self.voice3_off && self.filt & 0x04 == 0 {
            0
        } else {
            gate(0x04, voice3)
        };
        let ext_in = gate(0x08, self.ext_in);

        // This is handy for testing.
        if !self.enabled {
            self.vnf = voice1 + voice2 + voice3 + ext_in;
            self.vhp = 0;
            self.vbp = 0;
            self.vlp = 0;
            return None;
        }

        let (vi, vnf) = route_voices(self.filt, voice1, voice2, voice3, ext_in);
        self.vnf = vnf;
        Some(vi)
    }

    /// Clock the filter for one cycle.
    #[inline]
    pub fn clock(&mut self, voice1: i32, voice2: i32, voice3: i32) {
        let Some(vi) = self.mix_inputs(voice1, voice2, voice3) else {
            return;
        };

        // delta_t = 1 is converted to seconds given a 1MHz clock by dividing
        // with 1 000 000.

        // Calculate filter outputs.
        // Vhp = Vbp/Q - Vlp - Vi;
        // dVbp = -w0*Vhp*dt;
        // dVlp = -w0*Vbp*dt;
        let dvbp = (self.w0_ceil_1 * self.vhp) >> 20;
        let dvlp = (self.w0_ceil_1 * self.vbp) >> 20;
        self.vbp -= dvbp;
        self.vlp -= dvlp;
        self.vhp = ((self.vbp * self.q_1024_div) >> 10) - self.vlp - vi;
    }

    /// Clock the filter for `delta` cycles with constant inputs.
    #[inline]
    pub fn clock_delta(&mut self, mut delta: u32, voice1: i32, voice2: i32, voice3: i32) {
        let Some(vi) = self.mix_inputs(voice1, voice2, voice3) else {
            return;
        };

        // Maximum delta cycles for the filter to work satisfactorily under current
        // cutoff frequency and resonance constraints is approximately 8.
        let mut delta_flt = 8;

        while delta != 0 {
            if delta < delta_flt {
                delta_flt = delta;
            }
            // delta_t is converted to seconds given a 1MHz clock by dividing
            // with 1 000 000. This is done in two operations to avoid integer
            // multiplication overflow.
            let w0_delta_t = (self.w0_ceil_dt * delta_flt as i32) >> 6;
            let dvbp = (w0_delta_t * self.vhp) >> 14;
            let dvlp = (w0_delta_t * self.vbp) >> 14;
            self.vbp -= dvbp;
            self.vlp -= dvlp;
            self.vhp = ((self.vbp * self.q_1024_div) >> 10) - self.vlp - vi;

            delta -= delta_flt;
        }
    }

    /// Mixer output scaled by the master volume.
    #[inline]
    pub fn output(&self) -> i32 {
        if !self.enabled {
            (self.vnf + self.mixer_dc) * self.vol as i32
        } else {
            let vf = mix_filter_output(self.vhp, self.vbp, self.vlp, self.hp_bp_lp);
            (self.vnf + vf + self.mixer_dc) * self.vol as i32
        }
    }

    /// Reset registers and integrators; chip model, bias and mask are kept.
    pub fn reset(&mut self) {
        self.fc = 0;
        self.filt = 0;
        self.res = 0;
        self.voice3_off = false;
        self.hp_bp_lp = 0;
        self.vol = 0;
        self.ext_in = 0;
        self.vhp = 0;
        self.vbp = 0;
        self.vlp = 0;
        self.vnf = 0;
        self.set_w0();
        self.set_q();
    }

    // -- Register access

    /// FC_HI register.
    pub const fn get_fc_hi(&self) -> u8 {
        (self.fc >> 3) as u8
    }

    /// FC_LO register (3 bits).
    pub const fn get_fc_lo(&self) -> u8 {
        (self.fc & 0x007) as u8
    }

    /// MODE_VOL register.
    pub const fn get_mode_vol(&self) -> u8 {
        let value = if self.voice3_off { 0x80 } else { 0 };
        value | (self.hp_bp_lp << 4) | (self.vol & 0x0f)
    }

    /// RES_FILT register.
    pub const fn get_res_filt(&self) -> u8 {
        (self.res << 4) | (self.filt & 0x0f)
    }

    /// Write FC_HI.
    pub fn set_fc_hi(&mut self, value: u8) {
        self.fc = ((value as u16) << 3) & 0x7f8 | self.fc & 0x007;
        self.set_w0();
    }

    /// Write FC_LO.
    pub fn set_fc_lo(&mut self, value: u8) {
        self.fc = self.fc & 0x7f8 | (value as u16) & 0x007;
        self.set_w0();
    }

    /// Write MODE_VOL.
    pub const fn set_mode_vol(&mut self, value: u8) {
        self.voice3_off = value & 0x80 != 0;
        self.hp_bp_lp = (value >> 4) & 0x07;
        self.vol = value & 0x0f;
    }

    /// Write RES_FILT.
    pub fn set_res_filt(&mut self, value: u8) {
        self.res = (value >> 4) & 0x0f;
        self.filt = value & 0x0f;
        self.set_q();
    }
}
