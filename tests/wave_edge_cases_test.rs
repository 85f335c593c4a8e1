// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

// Oscillator, noise LFSR and waveform DAC behavior of a single voice.

use sidpack::wave::{Syncable, WaveformGenerator};
use sidpack::ChipModel;

fn new_wave() -> WaveformGenerator {
    let mut gen = WaveformGenerator::new(ChipModel::Mos6581);
    gen.reset();
    gen
}

/// Clock `n` cycles and refresh the output each cycle with no ring source.
fn clock_n(gen: &mut WaveformGenerator, n: u32) {
    for _ in 0..n {
        gen.clock();
        gen.set_waveform_output(0);
    }
}

/// LFSR powers up with all 23 bits set.
#[test]
fn shift_register_init_value() {
    let gen = new_wave();
    assert_eq!(gen.get_shift(), 0x007f_ffff);
}

/// Noise output bits 11-4 come from LFSR bits 20,18,14,11,9,5,2,0.
#[test]
fn noise_output() {
    let mut gen = new_wave();
    gen.set_control(0x80);
    gen.set_shift(0x0010_0000);
    gen.set_waveform_output(0);
    assert_eq!(gen.output(), 0x800);
    gen.set_shift(0x0000_0001);
    gen.set_waveform_output(0);
    assert_eq!(gen.output(), 0x010);
    gen.set_shift(0x007f_ffff);
    gen.set_waveform_output(0);
    assert_eq!(gen.output(), 0xff0);
}

/// TEST held long enough refills the LFSR; releasing TEST shifts in !bit17.
#[test]
fn test_bit_resets_register_after_delay() {
    let mut gen = new_wave();
    gen.set_shift(0);
    gen.set_control(0x08);
    for _ in 0..34_999 {
        gen.clock();
    }
    assert_eq!(gen.get_shift(), 0, "LFSR still holds its value");
    gen.clock();
    assert_eq!(gen.get_shift(), 0x007f_ffff);

    gen.set_control(0x00);
    assert_eq!(gen.get_shift(), 0x007f_fffe);
}

/// 8580 needs far longer with TEST held before the LFSR resets.
#[test]
fn test_bit_reset_delay_8580() {
    let mut gen = WaveformGenerator::new(ChipModel::Mos8580);
    gen.set_shift(0);
    gen.set_control(0x08);
    gen.clock_delta(2_519_863);
    assert_eq!(gen.get_shift(), 0);
    gen.clock_delta(1);
    assert_eq!(gen.get_shift(), 0x007f_ffff);
}

/// TEST bit clears accumulator for oscillator sync tricks.
#[test]
fn test_bit_clears_accumulator() {
    let mut gen = new_wave();
    gen.set_frequency_lo(0xff);
    gen.set_frequency_hi(0xff);
    clock_n(&mut gen, 100);

    assert!(gen.get_acc() != 0);

    gen.set_control(0x08);
    assert_eq!(gen.get_acc(), 0);
    gen.clock();
    assert_eq!(gen.get_acc(), 0, "accumulator is held while TEST is set");
}

/// Accumulator increments by frequency value each clock cycle.
#[test]
fn accumulator_increment() {
    let mut gen = new_wave();
    gen.set_frequency_lo(0x01);
    gen.set_frequency_hi(0x00);

    gen.clock();
    assert_eq!(gen.get_acc(), 1);
    gen.clock();
    assert_eq!(gen.get_acc(), 2);

    gen.set_frequency_lo(0x00);
    gen.set_frequency_hi(0x01); // freq = 256
    let before = gen.get_acc();
    gen.clock();
    assert_eq!(gen.get_acc(), before + 256);
}

/// 24-bit accumulator wraps at 0x1000000.
#[test]
fn accumulator_wrap() {
    let mut gen = new_wave();
    gen.set_acc(0x00ff_fffe);
    gen.set_frequency_lo(0x10);
    gen.clock();

    assert_eq!(gen.get_acc(), 0x00_000e);
}

/// LFSR clocks two cycles after accumulator bit 19 goes high.
#[test]
fn shift_register_clock_on_bit19() {
    let mut gen = new_wave();
    let initial = gen.get_shift();

    gen.set_acc(0x0007_fff0);
    gen.set_frequency_lo(0x20);
    gen.clock(); // bit 19 set

    assert_eq!(gen.get_shift(), initial, "no shift on the rising cycle");
    gen.clock();
    assert_eq!(gen.get_shift(), initial, "no shift one cycle later");
    gen.clock();
    // bit0 = bit22 ^ bit17 = 0
    assert_eq!(gen.get_shift(), 0x007f_fffe);
}

/// Sync bit enables hard sync from another oscillator.
#[test]
fn sync_bit() {
    let mut gen = new_wave();
    assert!(!gen.get_sync());

    gen.set_control(0x02);
    assert!(gen.get_sync());

    gen.set_control(0x00);
    assert!(!gen.get_sync());
}

/// MSB rising edge detection triggers sync to other oscillators.
#[test]
fn msb_rising() {
    let mut gen = new_wave();
    gen.set_acc(0x007f_fff0);
    gen.set_frequency_lo(0x20);
    gen.clock();

    assert!(gen.is_msb_rising(), "Should detect bit 23 transition 0->1");

    gen.clock();
    assert!(!gen.is_msb_rising(), "Flag clears after one cycle");
}

/// Rising MSB resets a synced destination.
#[test]
fn hard_sync_resets_destination() {
    let mut main = new_wave();
    let mut dest = new_wave();
    let mut source = new_wave();
    main.set_acc(0x007f_fff0);
    main.set_frequency_lo(0x20);
    dest.set_control(0x02);
    dest.set_acc(0x0012_3456);

    main.clock();
    let mut sync = Syncable {
        main: &mut main,
        sync_dest: &mut dest,
        sync_source: &mut source,
    };
    sync.synchronize();
    assert_eq!(dest.get_acc(), 0);
}

/// Without the sync bit on the destination nothing happens.
#[test]
fn hard_sync_requires_sync_bit() {
    let mut main = new_wave();
    let mut dest = new_wave();
    let mut source = new_wave();
    main.set_acc(0x007f_fff0);
    main.set_frequency_lo(0x20);
    dest.set_acc(0x0012_3456);

    main.clock();
    Syncable {
        main: &mut main,
        sync_dest: &mut dest,
        sync_source: &mut source,
    }
    .synchronize();
    assert_eq!(dest.get_acc(), 0x0012_3456);
}

#[test]
fn cycles_to_msb_rise() {
    let mut main = new_wave();
    main.set_frequency_hi(0x01);
    let mut dest = new_wave();
    let source = new_wave();
    let unsynced = Syncable {
        main: &main,
        sync_dest: &dest,
        sync_source: &source,
    };
    assert_eq!(unsynced.cycles_to_msb_rise(), None);

    dest.set_control(0x02);
    let synced = Syncable {
        main: &main,
        sync_dest: &dest,
        sync_source: &source,
    };
    assert_eq!(synced.cycles_to_msb_rise(), Some(0x8000));

    main.set_control(0x08);
    let testing = Syncable {
        main: &main,
        sync_dest: &dest,
        sync_source: &source,
    };
    assert_eq!(testing.cycles_to_msb_rise(), None);
}

/// Verify each waveform type produces expected output characteristics.
macro_rules! test_waveform {
    ($name:ident, $waveform:expr, $expected:expr) => {
        #[test]
        fn $name() {
            let mut gen = new_wave();
            gen.set_frequency_hi(0x10);
            gen.set_pulse_width_hi(0x08);
            gen.set_control($waveform << 4);
            clock_n(&mut gen, 100);

            // acc = 100 * 0x1000 = 0x64000
            assert_eq!(gen.output(), $expected, "waveform {}", $waveform);
        }
    };
}

test_waveform!(waveform_triangle, 1, 0x0c8);
test_waveform!(waveform_sawtooth, 2, 0x064);
test_waveform!(waveform_saw_triangle, 3, 0x0c8 & 0x064);
test_waveform!(waveform_pulse_low, 4, 0x000);
test_waveform!(waveform_pulse_saw, 6, 0x000);

/// Pulse is high once the upper 12 accumulator bits reach the pulse width.
#[test]
fn pulse_width_comparator() {
    let mut gen = new_wave();
    gen.set_pulse_width_lo(0x40);
    gen.set_control(0x40);
    gen.set_acc(0x0003_f000);
    gen.clock();
    gen.set_waveform_output(0);
    assert_eq!(gen.output(), 0x000);

    gen.set_acc(0x0004_0000);
    gen.clock();
    gen.set_waveform_output(0);
    assert_eq!(gen.output(), 0xfff);
}

/// Ring modulation inverts the triangle when the source MSB is clear.
#[test]
fn ring_modulation() {
    let mut gen = new_wave();
    gen.set_control(0x14);
    gen.set_waveform_output(0);
    assert_eq!(gen.output(), 0xffe);
    gen.set_waveform_output(0x0080_0000);
    assert_eq!(gen.output(), 0x000);

    // Sawtooth disables ring modulation of the triangle.
    gen.set_control(0x34);
    gen.set_waveform_output(0);
    assert_eq!(gen.output(), 0x000);
}

/// OSC3 is the upper 8 bits of the waveform output.
#[test]
fn read_osc_upper_bits() {
    let mut gen = new_wave();
    gen.set_control(0x20);
    gen.set_acc(0x00ab_c000);
    gen.set_waveform_output(0);
    assert_eq!(gen.read_osc(), 0xab);
}

// --- Floating DAC Output Tests ---

/// When waveform is set to 0, the last output value is held (floating DAC).
#[test]
fn floating_dac_holds_last_value() {
    let mut gen = new_wave();
    gen.set_frequency_hi(0x10);
    gen.set_control(0x20); // sawtooth
    clock_n(&mut gen, 1000);

    let last_output = gen.output();
    assert_eq!(last_output, 0x3e8);

    gen.set_control(0x00);
    clock_n(&mut gen, 1);

    assert_eq!(gen.output(), last_output, "Floating DAC should hold last value");
}

/// The held level drops to zero when the 6581 TTL of 200000 cycles runs out.
#[test]
fn floating_dac_expires() {
    let mut gen = new_wave();
    gen.set_frequency_hi(0x10);
    gen.set_control(0x20);
    clock_n(&mut gen, 1000);
    let last_output = gen.output();

    gen.set_control(0x00);
    clock_n(&mut gen, 199_999);
    assert_eq!(gen.output(), last_output);
    clock_n(&mut gen, 1);
    assert_eq!(gen.output(), 0);
}

/// Burst updates age the floating output by the whole delta.
#[test]
fn floating_dac_expires_in_bursts() {
    let mut gen = new_wave();
    gen.set_frequency_hi(0x10);
    gen.set_control(0x20);
    clock_n(&mut gen, 1000);

    gen.set_control(0x00);
    gen.set_waveform_output_delta(150_000, 0);
    assert_ne!(gen.output(), 0);
    gen.set_waveform_output_delta(50_000, 0);
    assert_eq!(gen.output(), 0);
}

/// 8580 holds the floating level far longer than the 6581.
#[test]
fn floating_dac_8580_longer_ttl() {
    let mut gen_6581 = WaveformGenerator::new(ChipModel::Mos6581);
    let mut gen_8580 = WaveformGenerator::new(ChipModel::Mos8580);

    for gen in [&mut gen_6581, &mut gen_8580] {
        gen.set_frequency_hi(0x10);
        gen.set_control(0x20); // sawtooth
        clock_n(gen, 1000);
        gen.set_control(0x00);
        gen.set_waveform_output_delta(300_000, 0);
    }

    assert_eq!(gen_6581.output(), 0, "6581 level expired");
    assert_eq!(gen_8580.output(), 0x3e8, "8580 still holds its level");
}

// --- Noise Write-back Tests ---

/// Combined waveforms with noise pull down the LFSR taps feeding the output.
#[test]
fn noise_write_back() {
    let mut gen = new_wave();
    gen.set_control(0x90); // noise + triangle
    gen.set_waveform_output(0);

    // Triangle is 0 at acc = 0, clearing every noise tap.
    assert_eq!(gen.output(), 0);
    assert_eq!(gen.get_shift(), 0x007f_ffff & !0x0014_4a25);

    // Pure noise now reads the cleared taps.
    gen.set_control(0x80);
    gen.set_waveform_output(0);
    assert_eq!(gen.output(), 0);
}

/// No write-back while TEST is held.
#[test]
fn no_noise_write_back_in_test_mode() {
    let mut gen = new_wave();
    gen.set_control(0x98);
    gen.set_waveform_output(0);
    assert_eq!(gen.get_shift(), 0x007f_ffff);
}
