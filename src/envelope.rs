// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

#![allow(clippy::cast_lossless)]

use bit_field::BitField;

const RATE_COUNTER_MASK: u16 = 0x7fff;
const RATE_COUNTER_MSB_MASK: u16 = 0x8000;

// Rate counter periods are calculated from the Envelope Rates table in
// the Programmer's Reference Guide. The rate counter period is the number of
// cycles between each increment of the envelope counter.
// The rates have been verified by sampling ENV3.
//
// The rate counter is a 16 bit register which is incremented each cycle.
// When the counter reaches a specific comparison value, the envelope counter
// is incremented (attack) or decremented (decay/release) and the
// counter is zeroed.
//
// NB! Sampling ENV3 shows that the calculated values are not exact.
// It may seem like most calculated values have been rounded (.5 is rounded
// down) and 1 has beed added to the result. A possible explanation for this
// is that the SID designers have used the calculated values directly
// as rate counter comparison values, not considering a one cycle delay to
// zero the counter. This would yield an actual period of comparison value + 1.
//
// The time of the first envelope count can not be exactly controlled, except
// possibly by resetting the chip. Because of this we cannot do cycle exact
// sampling and must devise another method to calculate the rate counter
// periods.
//
// The exact rate counter periods can be determined e.g. by counting the number
// of cycles from envelope level 1 to envelope level 129, and dividing the
// number of cycles by 128. CIA1 timer A and B in linked mode can perform
// the cycle count. This is the method used to find the rates below.
//
// To avoid the ADSR delay bug, sampling of ENV3 should be done using
// sustain = release = 0. This ensures that the attack state will not lower
// the current rate counter period.
//
// The ENV3 sampling code below yields a maximum timing error of 14 cycles.
//     lda #$01
// l1: cmp $d41c
//     bne l1
//     ...
//     lda #$ff
// l2: cmp $d41c
//     bne l2
//
// This yields a maximum error for the calculated rate period of 14/128 cycles.
// The described method is thus sufficient for exact calculation of the rate
// periods.
//
const RATE_COUNTER_PERIOD: [u16; 16] = [
    9,     // 2ms*1.0MHz/256 = 7.81
    32,    // 8ms*1.0MHz/256 = 31.25
    63,    // 16ms*1.0MHz/256 = 62.50
    95,    // 24ms*1.0MHz/256 = 93.75
    149,   // 38ms*1.0MHz/256 = 148.44
    220,   // 56ms*1.0MHz/256 = 218.75
    267,   // 68ms*1.0MHz/256 = 265.63
    313,   // 80ms*1.0MHz/256 = 312.50
    392,   // 100ms*1.0MHz/256 = 390.63
    977,   // 250ms*1.0MHz/256 = 976.56
    1954,  // 500ms*1.0MHz/256 = 1953.13
    3126,  // 800ms*1.0MHz/256 = 3125.00
    3907,  // 1 s*1.0MHz/256 =  3906.25
    11720, // 3 s*1.0MHz/256 = 11718.75
    19532, // 5 s*1.0MHz/256 = 19531.25
    31251, // 8 s*1.0MHz/256 = 31250.00
];

/// From the sustain levels it follows that both the low and high 4 bits of the
/// envelope counter are compared to the 4-bit sustain value.
/// This has been verified by sampling ENV3.
const SUSTAIN_LEVEL: [u8; 16] = [
    0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff,
];

/// Envelope generator state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// Attack phase ramping up toward 0xff.
    Attack,
    /// Decay toward sustain, then hold.
    DecaySustain,
    /// Release toward zero after gate off.
    Release,
}

impl State {
    /// Snapshot encoding: 1 attack, 2 decay/sustain, 0 release.
    pub const fn to_byte(self) -> u8 {
        match self {
            State::Attack => 1,
            State::DecaySustain => 2,
            State::Release => 0,
        }
    }

    /// Inverse of [`to_byte`](Self::to_byte); unknown values mean release.
    pub const fn from_byte(value: u8) -> Self {
        match value {
            1 => State::Attack,
            2 => State::DecaySustain,
            _ => State::Release,
        }
    }
}

/// SID ADSR envelope generator.
///
/// A 15 bit counter implements envelope rates by dividing the clock to the
/// envelope counter by the currently selected rate period. Another counter
/// implements exponential decay, with periods 1, 2, 4, 8, 16, 30 at envelope
/// values 255, 93, 54, 26, 14, 6 respectively.
///
/// Decrements of the envelope counter take effect one cycle after the rate
/// counter fires (`envelope_pipeline`); attack increments are immediate.
#[derive(Clone, Copy)]
pub struct EnvelopeGenerator {
    // Configuration
    attack: u8,
    decay: u8,
    sustain: u8,
    release: u8,
    // Control
    gate: bool,
    // Runtime State
    /// Current ADSR phase.
    pub state: State,
    /// Current envelope output level (0-255).
    pub envelope_counter: u8,
    /// Exponential step counter.
    pub exponential_counter: u16,
    /// Exponential counter period.
    pub exponential_counter_period: u16,
    /// Counter frozen at zero until the next attack.
    pub hold_zero: bool,
    /// A decrement of `envelope_counter` is due on the next cycle.
    pub envelope_pipeline: bool,
    /// Linear rate counter.
    pub rate_counter: u16,
    /// Linear rate counter period.
    pub rate_counter_period: u16,
}

impl Default for EnvelopeGenerator {
    fn default() -> Self {
        let mut envelope = Self {
            attack: 0,
            decay: 0,
            sustain: 0,
            release: 0,
            gate: false,
            state: State::Release,
            envelope_counter: 0,
            exponential_counter: 0,
            exponential_counter_period: 0,
            hold_zero: false,
            envelope_pipeline: false,
            rate_counter: 0,
            rate_counter_period: 0,
        };
        envelope.reset();
        envelope
    }
}

impl EnvelopeGenerator {
    /// Packed attack/decay nibble register.
    pub const fn get_attack_decay(&self) -> u8 {
        self.attack << 4 | self.decay
    }

    /// Control register exposing gate bit.
    pub fn get_control(&self) -> u8 {
        let mut value = 0u8;
        value.set_bit(0, self.gate);
        value
    }

    /// Packed sustain/release nibble register.
    pub const fn get_sustain_release(&self) -> u8 {
        self.sustain << 4 | self.release
    }

    /// Write attack/decay register.
    pub const fn set_attack_decay(&mut self, value: u8) {
        self.attack = (value >> 4) & 0x0f;
        self.decay = value & 0x0f;
        match self.state {
            State::Attack => self.rate_counter_period = RATE_COUNTER_PERIOD[self.attack as usize],
            State::DecaySustain => {
                self.rate_counter_period = RATE_COUNTER_PERIOD[self.decay as usize]
            }
            State::Release => {}
        }
    }

    /// Write control register (gate).
    pub fn set_control(&mut self, value: u8) {
        let gate = value.get_bit(0);
        if !self.gate && gate {
            // Gate bit on: Start attack, decay, sustain.
            self.state = State::Attack;
            self.rate_counter_period = RATE_COUNTER_PERIOD[self.attack as usize];
            // Switching to attack state unlocks the zero freeze and
            // cancels a pending decrement.
            self.hold_zero = false;
            self.envelope_pipeline = false;
        } else if self.gate && !gate {
            // Gate bit off: Start release.
            self.state = State::Release;
            self.rate_counter_period = RATE_COUNTER_PERIOD[self.release as usize];
        }
        self.gate = gate;
    }

    /// Write sustain/release register.
    pub fn set_sustain_release(&mut self, value: u8) {
        self.sustain = (value >> 4) & 0x0f;
        self.release = value & 0x0f;
        if self.state == State::Release {
            self.rate_counter_period = RATE_COUNTER_PERIOD[self.release as usize];
        }
    }

    /// Rate counter fired: advance the exponential counter and step the
    /// envelope when it fires too.
    #[inline]
    fn rate_step(&mut self) {
        // The exponential counter is bypassed in attack.
        if self.state != State::Attack {
            self.exponential_counter += 1;
            if self.exponential_counter != self.exponential_counter_period {
                return;
            }
        }
        self.exponential_counter = 0;
        if self.hold_zero {
            return;
        }
        match self.state {
            State::Attack => {
                // 0xff -> 0x00 is reachable via a release -> attack flip
                // and freezes the counter at zero.
                self.envelope_counter = self.envelope_counter.wrapping_add(1);
                if self.envelope_counter == 0xff {
                    self.state = State::DecaySustain;
                    self.rate_counter_period = RATE_COUNTER_PERIOD[self.decay as usize];
                }
                self.update_exponential_period();
            }
            State::DecaySustain => {
                if self.envelope_counter != SUSTAIN_LEVEL[self.sustain as usize] {
                    self.envelope_pipeline = true;
                }
            }
            State::Release => {
                // 0x00 -> 0xff is reachable via an attack -> release flip.
                self.envelope_pipeline = true;
            }
        }
    }

    /// Update exponential counter period based on envelope counter value.
    /// Period increases as counter decreases, modeling RC discharge curve.
    #[inline]
    const fn update_exponential_period(&mut self) {
        match self.envelope_counter {
            0xff => self.exponential_counter_period = 1,
            0x5d => self.exponential_counter_period = 2,
            0x36 => self.exponential_counter_period = 4,
            0x1a => self.exponential_counter_period = 8,
            0x0e => self.exponential_counter_period = 16,
            0x06 => self.exponential_counter_period = 30,
            0x00 => {
                self.exponential_counter_period = 1;
                // Counter frozen at zero until gate cycles off→on.
                self.hold_zero = true;
            }
            _ => {}
        }
    }

    #[inline]
    /// Clock the envelope generator by one SID cycle.
    pub fn clock(&mut self) {
        if self.envelope_pipeline {
            self.envelope_counter = self.envelope_counter.wrapping_sub(1);
            self.envelope_pipeline = false;
            self.update_exponential_period();
        }

        // ADSR delay bug: if rate_counter_period is set below rate_counter,
        // counter wraps at 2^15 before envelope can step.
        self.rate_counter += 1;
        if self.rate_counter & RATE_COUNTER_MSB_MASK != 0 {
            self.rate_counter += 1;
            self.rate_counter &= RATE_COUNTER_MASK;
        }
        if self.rate_counter != self.rate_counter_period {
            return;
        }
        self.rate_counter = 0;
        self.rate_step();
    }

    /// Clock the envelope by `delta` cycles, with the same end state as
    /// `delta` calls to [`clock`](Self::clock).
    pub fn clock_delta(&mut self, mut delta: u32) {
        if self.envelope_pipeline && delta != 0 {
            self.clock();
            delta -= 1;
        }
        while delta != 0 {
            // Cycles until the next rate counter match; the counter skips
            // zero when it wraps, so a full turn is 0x7fff cycles.
            let mut rate_step =
                self.rate_counter_period as i32 - self.rate_counter as i32;
            if rate_step <= 0 {
                rate_step += RATE_COUNTER_MASK as i32;
            }
            if (delta as i64) < rate_step as i64 {
                let mut counter = self.rate_counter as u32 + delta;
                if counter > RATE_COUNTER_MASK as u32 {
                    counter -= RATE_COUNTER_MASK as u32;
                }
                self.rate_counter = counter as u16;
                return;
            }
            delta -= rate_step as u32;
            self.rate_counter = 0;
            self.rate_step();
            if self.envelope_pipeline && delta != 0 {
                self.clock();
                delta -= 1;
            }
        }
    }

    #[inline]
    /// Current envelope output level (0-255).
    pub const fn output(&self) -> u8 {
        self.envelope_counter
    }

    /// ENV3 register view.
    pub const fn read_env(&self) -> u8 {
        self.envelope_counter
    }

    /// Reset to initial state (Release, counter frozen at zero).
    pub const fn reset(&mut self) {
        self.attack = 0;
        self.decay = 0;
        self.sustain = 0;
        self.release = 0;
        self.gate = false;
        self.state = State::Release;
        self.envelope_counter = 0;
        self.exponential_counter = 0;
        self.exponential_counter_period = 1;
        self.hold_zero = true;
        self.envelope_pipeline = false;
        self.rate_counter = 0;
        self.rate_counter_period = RATE_COUNTER_PERIOD[self.release as usize];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gated(attack_decay: u8, sustain_release: u8) -> EnvelopeGenerator {
        let mut gen = EnvelopeGenerator::default();
        gen.set_attack_decay(attack_decay);
        gen.set_sustain_release(sustain_release);
        gen.set_control(0x01);
        gen
    }

    fn assert_same(a: &EnvelopeGenerator, b: &EnvelopeGenerator) {
        assert_eq!(a.envelope_counter, b.envelope_counter);
        assert_eq!(a.rate_counter, b.rate_counter);
        assert_eq!(a.exponential_counter, b.exponential_counter);
        assert_eq!(a.exponential_counter_period, b.exponential_counter_period);
        assert_eq!(a.envelope_pipeline, b.envelope_pipeline);
        assert_eq!(a.hold_zero, b.hold_zero);
        assert_eq!(a.state, b.state);
    }

    #[test]
    fn burst_matches_single_steps_through_adsr() {
        let mut single = gated(0x11, 0x81);
        let mut burst = single;
        for &(delta, gate) in &[(5000u32, 1u8), (1u32, 1), (70_000, 0), (3, 1), (123_457, 0)] {
            for _ in 0..delta {
                single.clock();
            }
            burst.clock_delta(delta);
            assert_same(&single, &burst);
            single.set_control(gate);
            burst.set_control(gate);
        }
    }

    #[test]
    fn burst_handles_rate_counter_wrap() {
        let mut single = gated(0x70, 0x00);
        single.rate_counter = 300;
        single.set_attack_decay(0x00);
        let mut burst = single;
        for _ in 0..0x8000 {
            single.clock();
        }
        burst.clock_delta(0x8000);
        assert_same(&single, &burst);
    }

    #[test]
    fn release_decrement_lags_one_cycle() {
        let mut gen = gated(0x00, 0x00);
        while gen.read_env() != 0xff {
            gen.clock();
        }
        gen.set_control(0x00);
        while !gen.envelope_pipeline {
            gen.clock();
        }
        assert_eq!(gen.read_env(), 0xff);
        gen.clock();
        assert_eq!(gen.read_env(), 0xfe);
    }

    #[test]
    fn state_byte_encoding() {
        for state in [State::Attack, State::DecaySustain, State::Release] {
            assert_eq!(State::from_byte(state.to_byte()), state);
        }
        assert_eq!(State::from_byte(7), State::Release);
    }
}
