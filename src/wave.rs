// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

#![allow(clippy::cast_lossless)]

use bit_field::BitField;

use super::ChipModel;

const ACC_MASK: u32 = 0x00ff_ffff;
const ACC_MSB: u32 = 0x0080_0000;
const ACC_BIT19: u32 = 0x0008_0000;
const SHIFT_MASK: u32 = 0x007f_ffff;

/// Bits of the noise LFSR that drive the waveform output bits 11..4.
const NOISE_TAPS: u32 = 0x0014_4a25;

/// A generator together with the generator it resets on MSB rising
/// (`sync_dest`) and the generator that resets it (`sync_source`).
///
/// The three SID voices form a fixed ring: voice 1 is synced by voice 3,
/// voice 2 by voice 1 and voice 3 by voice 2.
pub struct Syncable<T> {
    /// Generator being operated on.
    pub main: T,
    /// Generator that `main` hard-syncs.
    pub sync_dest: T,
    /// Generator that hard-syncs `main` and ring-modulates it.
    pub sync_source: T,
}

/// SID oscillator and waveform selector.
///
/// A 24 bit accumulator is the basis for waveform generation. FREQ is added
/// to the lower 16 bits of the accumulator each cycle. The accumulator is
/// set to zero when TEST is set, and starts counting when TEST is cleared.
/// The noise waveform is taken from intermediate bits of a 23 bit shift
/// register. This register is clocked by bit 19 of the accumulator, two
/// cycles after the bit goes high.
#[derive(Clone, Copy)]
pub struct WaveformGenerator {
    // Configuration
    chip_model: ChipModel,
    frequency: u16,
    pulse_width: u16,
    // Control
    waveform: u8,
    ring_mod: bool,
    sync: bool,
    test: bool,
    ring_msb_mask: u32,
    no_noise: u16,
    no_pulse: u16,
    // Runtime State
    /// 24-bit phase accumulator.
    pub acc: u32,
    /// 23-bit noise LFSR.
    pub shift: u32,
    pub(crate) shift_register_reset: i32,
    pub(crate) shift_pipeline: u8,
    pub(crate) pulse_output: u16,
    noise_output: u16,
    no_noise_or_noise_output: u16,
    pub(crate) waveform_output: u16,
    pub(crate) floating_output_ttl: i32,
    msb_rising: bool,
}

impl WaveformGenerator {
    /// Create a generator in its power-on state.
    pub fn new(chip_model: ChipModel) -> Self {
        let mut wave = WaveformGenerator {
            chip_model,
            frequency: 0,
            pulse_width: 0,
            waveform: 0,
            ring_mod: false,
            sync: false,
            test: false,
            ring_msb_mask: 0,
            no_noise: 0x0fff,
            no_pulse: 0x0fff,
            acc: 0,
            shift: 0,
            shift_register_reset: 0,
            shift_pipeline: 0,
            pulse_output: 0x0fff,
            noise_output: 0,
            no_noise_or_noise_output: 0,
            waveform_output: 0,
            floating_output_ttl: 0,
            msb_rising: false,
        };
        wave.reset();
        wave
    }

    /// Change the chip model; register state is kept.
    pub fn set_chip_model(&mut self, chip_model: ChipModel) {
        self.chip_model = chip_model;
    }

    /// Cycles the shift register needs with TEST held before it resets.
    const fn shift_reset_cycles(&self) -> i32 {
        match self.chip_model {
            ChipModel::Mos6581 => 35_000,
            ChipModel::Mos8580 => 2_519_864,
        }
    }

    /// Cycles the DAC keeps its last level after the waveform is cleared.
    const fn floating_output_cycles(&self) -> i32 {
        match self.chip_model {
            ChipModel::Mos6581 => 200_000,
            ChipModel::Mos8580 => 5_000_000,
        }
    }

    // -- Register access

    /// Accumulator value.
    pub const fn get_acc(&self) -> u32 {
        self.acc
    }

    /// Overwrite the accumulator (masked to 24 bits).
    pub const fn set_acc(&mut self, value: u32) {
        self.acc = value & ACC_MASK;
    }

    /// Noise shift register value.
    pub const fn get_shift(&self) -> u32 {
        self.shift
    }

    /// Overwrite the noise shift register (masked to 23 bits).
    pub fn set_shift(&mut self, value: u32) {
        self.shift = value & SHIFT_MASK;
        self.set_noise_output();
    }

    /// Oscillator control bits (waveform, test, ring, sync) as written.
    pub fn get_control(&self) -> u8 {
        let mut value = self.waveform << 4;
        value.set_bit(3, self.test);
        value.set_bit(2, self.ring_mod);
        value.set_bit(1, self.sync);
        value
    }

    /// FREQ_LO register.
    pub const fn get_frequency_lo(&self) -> u8 {
        (self.frequency & 0x00ff) as u8
    }

    /// FREQ_HI register.
    pub const fn get_frequency_hi(&self) -> u8 {
        (self.frequency >> 8) as u8
    }

    /// PW_LO register.
    pub const fn get_pulse_width_lo(&self) -> u8 {
        (self.pulse_width & 0x00ff) as u8
    }

    /// PW_HI register (4 bits).
    pub const fn get_pulse_width_hi(&self) -> u8 {
        (self.pulse_width >> 8) as u8
    }

    /// Whether this oscillator is hard-synced by its sync source.
    pub const fn get_sync(&self) -> bool {
        self.sync
    }

    /// Selected waveform nibble.
    pub const fn get_waveform(&self) -> u8 {
        self.waveform
    }

    /// TEST bit.
    pub const fn get_test(&self) -> bool {
        self.test
    }

    /// 16-bit oscillator frequency.
    pub const fn get_frequency(&self) -> u16 {
        self.frequency
    }

    /// True when the accumulator MSB rose on the last clocked cycle.
    pub const fn is_msb_rising(&self) -> bool {
        self.msb_rising
    }

    /// Write FREQ_LO.
    pub const fn set_frequency_lo(&mut self, value: u8) {
        self.frequency = (self.frequency & 0xff00) | value as u16;
    }

    /// Write FREQ_HI.
    pub const fn set_frequency_hi(&mut self, value: u8) {
        self.frequency = ((value as u16) << 8) | (self.frequency & 0x00ff);
    }

    /// Write PW_LO.
    pub const fn set_pulse_width_lo(&mut self, value: u8) {
        self.pulse_width = (self.pulse_width & 0x0f00) | value as u16;
    }

    /// Write PW_HI (upper 4 bits are ignored).
    pub const fn set_pulse_width_hi(&mut self, value: u8) {
        self.pulse_width = (((value & 0x0f) as u16) << 8) | (self.pulse_width & 0x00ff);
    }

    /// Write the oscillator bits of CONTROL_REG.
    ///
    /// The waveform output itself is refreshed by the owner through
    /// [`Syncable::set_waveform_output`], which knows the ring source.
    pub fn set_control(&mut self, value: u8) {
        let waveform_prev = self.waveform;
        let test_prev = self.test;
        self.waveform = (value >> 4) & 0x0f;
        self.test = value.get_bit(3);
        self.ring_mod = value.get_bit(2);
        self.sync = value.get_bit(1);

        // Ring modulation replaces the triangle MSB only when sawtooth is off.
        let ring = value as u32;
        self.ring_msb_mask = ((!ring >> 5) & (ring >> 2) & 1) << 23;

        self.no_noise = if self.waveform & 0x8 != 0 { 0x000 } else { 0xfff };
        self.no_noise_or_noise_output = self.no_noise | self.noise_output;
        self.no_pulse = if self.waveform & 0x4 != 0 { 0x000 } else { 0xfff };

        if !test_prev && self.test {
            self.acc = 0;
            self.shift_pipeline = 0;
            self.shift_register_reset = self.shift_reset_cycles();
            self.pulse_output = 0xfff;
        } else if test_prev && !self.test {
            // Falling TEST completes the second phase of a shift:
            // bit0 = (bit22 | test) ^ bit17 = !bit17.
            let bit0 = (!self.shift >> 17) & 0x1;
            self.shift = ((self.shift << 1) | bit0) & SHIFT_MASK;
            self.set_noise_output();
        }

        if self.waveform == 0 && waveform_prev != 0 {
            self.floating_output_ttl = self.floating_output_cycles();
        }
    }

    // -- Clocking

    /// Advance one cycle.
    #[inline]
    pub fn clock(&mut self) {
        if self.test {
            if self.shift_register_reset != 0 {
                self.shift_register_reset -= 1;
                if self.shift_register_reset == 0 {
                    self.reset_shift_register();
                }
            }
            // TEST holds the pulse comparator high.
            self.pulse_output = 0xfff;
            return;
        }
        let acc_next = (self.acc + self.frequency as u32) & ACC_MASK;
        let bits_set = !self.acc & acc_next;
        self.acc = acc_next;
        self.msb_rising = bits_set & ACC_MSB != 0;
        if bits_set & ACC_BIT19 != 0 {
            // Shift happens two cycles after bit 19 goes high.
            self.shift_pipeline = 2;
        } else if self.shift_pipeline != 0 {
            self.shift_pipeline -= 1;
            if self.shift_pipeline == 0 {
                self.clock_shift_register();
            }
        }
        self.pulse_output = self.pulse_level();
    }

    /// Advance `delta` cycles.
    ///
    /// The end state equals `delta` calls to [`clock`](Self::clock), except
    /// that combined noise waveforms do not write back into the shift
    /// register on the skipped intermediate cycles.
    pub fn clock_delta(&mut self, mut delta: u32) {
        while delta != 0 && !self.test && self.shift_pipeline != 0 {
            self.clock();
            delta -= 1;
        }
        if delta == 0 {
            return;
        }
        if self.test {
            if self.shift_register_reset != 0 {
                if delta as i64 >= self.shift_register_reset as i64 {
                    self.reset_shift_register();
                } else {
                    self.shift_register_reset -= delta as i32;
                }
            }
            self.pulse_output = 0xfff;
            return;
        }

        // All but the last cycle in closed form. Bit 19 rises at least 16
        // cycles apart, so at most one rise can still be in the pipeline.
        let burst = (delta - 1) as u64;
        if burst != 0 {
            let start = self.acc as u64;
            let freq = self.frequency as u64;
            let rises = |cycles: u64| bit19_rises(start, start + cycles * freq);
            let shifts = if burst >= 2 { rises(burst - 2) } else { 0 };
            for _ in 0..shifts {
                self.clock_shift_register();
            }
            self.shift_pipeline = if rises(burst) != rises(burst - 1) {
                2
            } else if burst >= 2 && rises(burst - 1) != rises(burst - 2) {
                1
            } else {
                0
            };
            self.acc = ((start + burst * freq) & ACC_MASK as u64) as u32;
        }
        self.clock();
    }

    #[inline]
    const fn pulse_level(&self) -> u16 {
        if (self.acc >> 12) >= self.pulse_width as u32 {
            0x0fff
        } else {
            0x0000
        }
    }

    // -- Noise

    fn reset_shift_register(&mut self) {
        self.shift = SHIFT_MASK;
        self.shift_register_reset = 0;
        self.set_noise_output();
    }

    fn clock_shift_register(&mut self) {
        // bit0 = (bit22 | test) ^ bit17
        let bit0 = ((self.shift >> 22) ^ (self.shift >> 17)) & 0x1;
        self.shift = ((self.shift << 1) | bit0) & SHIFT_MASK;
        self.set_noise_output();
    }

    fn set_noise_output(&mut self) {
        let s = self.shift;
        self.noise_output = (((s & 0x10_0000) >> 9)
            | ((s & 0x04_0000) >> 8)
            | ((s & 0x00_4000) >> 5)
            | ((s & 0x00_0800) >> 3)
            | ((s & 0x00_0200) >> 2)
            | ((s & 0x00_0020) << 1)
            | ((s & 0x00_0004) << 3)
            | ((s & 0x00_0001) << 4)) as u16;
        self.no_noise_or_noise_output = self.no_noise | self.noise_output;
    }

    /// Combined waveforms pull down the shift register bits feeding the
    /// noise output.
    fn write_shift_register(&mut self) {
        let w = self.waveform_output as u32;
        self.shift &= !NOISE_TAPS
            | ((w & 0x800) << 9)
            | ((w & 0x400) << 8)
            | ((w & 0x200) << 5)
            | ((w & 0x100) << 3)
            | ((w & 0x080) << 2)
            | ((w & 0x040) >> 1)
            | ((w & 0x020) >> 3)
            | ((w & 0x010) >> 4);
        self.noise_output &= self.waveform_output;
        self.no_noise_or_noise_output = self.no_noise | self.noise_output;
    }

    // -- Output

    /// Recompute the 12-bit waveform output; `ring_source_acc` is the
    /// accumulator of the sync source, used for ring modulation.
    pub fn set_waveform_output(&mut self, ring_source_acc: u32) {
        self.update_output(ring_source_acc, 1);
    }

    /// [`set_waveform_output`](Self::set_waveform_output) after `delta` cycles.
    pub fn set_waveform_output_delta(&mut self, delta: u32, ring_source_acc: u32) {
        self.update_output(ring_source_acc, delta);
    }

    fn update_output(&mut self, ring_source_acc: u32, delta: u32) {
        if self.waveform != 0 {
            let ix = ((self.acc ^ (!ring_source_acc & self.ring_msb_mask)) >> 12) as u16;
            let triangle = ((ix ^ if ix & 0x800 != 0 { 0xfff } else { 0 }) << 1) & 0xfff;
            let sawtooth = (self.acc >> 12) as u16;
            let base = match self.waveform & 0x3 {
                0x1 => triangle,
                0x2 => sawtooth,
                0x3 => triangle & sawtooth,
                _ => 0xfff,
            };
            self.waveform_output =
                base & (self.no_pulse | self.pulse_output) & self.no_noise_or_noise_output;
            if self.waveform > 0x8 && !self.test && self.shift_pipeline != 1 {
                self.write_shift_register();
            }
        } else if self.floating_output_ttl != 0 {
            self.floating_output_ttl -= delta.min(i32::MAX as u32) as i32;
            if self.floating_output_ttl <= 0 {
                self.floating_output_ttl = 0;
                self.waveform_output = 0;
            }
        }
    }

    /// 12-bit waveform output.
    #[inline]
    pub const fn output(&self) -> u16 {
        self.waveform_output
    }

    /// OSC3 register view: upper 8 bits of the output.
    pub const fn read_osc(&self) -> u8 {
        (self.waveform_output >> 4) as u8
    }

    /// Reset to the power-on state.
    pub fn reset(&mut self) {
        self.acc = 0;
        self.frequency = 0;
        self.pulse_width = 0;
        self.msb_rising = false;
        self.waveform = 0;
        self.test = false;
        self.ring_mod = false;
        self.sync = false;
        self.ring_msb_mask = 0;
        self.no_noise = 0x0fff;
        self.no_pulse = 0x0fff;
        self.pulse_output = 0x0fff;
        self.reset_shift_register();
        self.shift_pipeline = 0;
        self.waveform_output = 0;
        self.floating_output_ttl = 0;
    }
}

/// Number of 0 -> 1 transitions of accumulator bit 19 while counting
/// (unwrapped) from `from` to `to`.
fn bit19_rises(from: u64, to: u64) -> u64 {
    // Bit 19 rises when passing an odd multiple of 2^19.
    let edges = |x: u64| (x + ACC_BIT19 as u64) >> 20;
    edges(to) - edges(from)
}

impl Syncable<&'_ mut WaveformGenerator> {
    /// Hard sync: reset the destination when our MSB rose, unless the
    /// destination is itself resetting us in the same cycle.
    pub fn synchronize(&mut self) {
        if self.main.msb_rising
            && self.sync_dest.sync
            && !(self.main.sync && self.sync_source.msb_rising)
        {
            self.sync_dest.acc = 0;
        }
    }

    /// Recompute the waveform output using the ring source.
    pub fn set_waveform_output(&mut self) {
        let ring = self.sync_source.acc;
        self.main.set_waveform_output(ring);
    }

    /// Recompute the waveform output after `delta` cycles.
    pub fn set_waveform_output_delta(&mut self, delta: u32) {
        let ring = self.sync_source.acc;
        self.main.set_waveform_output_delta(delta, ring);
    }
}

impl Syncable<&'_ WaveformGenerator> {
    /// Cycles until the main oscillator's MSB next rises, if it can sync
    /// its destination at all.
    pub fn cycles_to_msb_rise(&self) -> Option<u32> {
        if !self.sync_dest.sync || self.main.frequency == 0 || self.main.test {
            return None;
        }
        let acc = self.main.acc;
        let freq = self.main.frequency as u32;
        let target = if acc & ACC_MSB != 0 { 0x0100_0000 } else { ACC_MSB };
        let distance = target - acc;
        Some(distance.div_ceil(freq))
    }
}
