// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

// C64 output stage:
// Low-pass: R=10kOhm, C=1000pF (cutoff ~15.9kHz)
// High-pass: R=10kOhm, C=10uF (cutoff ~1.6Hz)

use sidpack::external_filter::ExternalFilter;
use sidpack::{clock, ChipModel};

/// Single-cycle filter response follows first-order IIR curve
#[test]
fn clock() {
    let mut ext_filter = ExternalFilter::new(ChipModel::Mos6581);
    let mut outputs = Vec::new();
    let mut vi = -1000;
    while vi <= 1000 {
        ext_filter.clock(vi);
        outputs.push(ext_filter.output());
        vi += 50;
    }

    assert_eq!(outputs.len(), 41);

    // One cycle of the low-pass moves about a tenth of the way.
    assert!(outputs[0] < 0, "Should track negative input");
    assert!(outputs[0] > -200, "LP smoothing limits initial response");

    let mid_idx = outputs.len() / 2;
    assert!(outputs[mid_idx] < outputs[0], "Should lag the rising input");
    assert!(outputs[outputs.len() - 1] > outputs[mid_idx]);
}

/// Multi-cycle filter response with constant input settles toward input value
#[test]
fn clock_delta() {
    let mut ext_filter = ExternalFilter::new(ChipModel::Mos6581);
    let mut outputs = Vec::new();
    let mut vi = -1000;
    while vi <= 1000 {
        ext_filter.clock_delta(100, vi);
        outputs.push(ext_filter.output());
        vi += 50;
    }

    assert_eq!(outputs.len(), 41);

    assert!(outputs[0] < -900, "Should settle close to input: got {}", outputs[0]);
    assert!(outputs[0] > -1100, "Should not overshoot: got {}", outputs[0]);

    let mid_idx = outputs.len() / 2;
    assert!(
        outputs[mid_idx].abs() < 100,
        "Mid should be near zero: got {}",
        outputs[mid_idx]
    );

    let last = outputs[outputs.len() - 1];
    assert!(last > 900, "Should settle close to input: got {}", last);
}

/// The high-pass removes a constant level after many time constants.
#[test]
fn dc_is_removed() {
    let mut ext_filter = ExternalFilter::new(ChipModel::Mos8580);
    ext_filter.clock_delta(100, 10_000);
    assert!(ext_filter.output() > 9_000);
    ext_filter.clock_delta(2_000_000, 10_000);
    assert!(
        ext_filter.output().abs() < 10,
        "DC should decay: got {}",
        ext_filter.output()
    );
}

/// Bypassed, the 8580 passes the input through unchanged.
#[test]
fn bypass_8580() {
    let mut ext_filter = ExternalFilter::new(ChipModel::Mos8580);
    ext_filter.set_enabled(false);
    ext_filter.clock(1234);
    assert_eq!(ext_filter.output(), 1234);
    ext_filter.clock_delta(50, -4321);
    assert_eq!(ext_filter.output(), -4321);
}

/// Bypassed, the 6581 still removes the mixer DC level.
#[test]
fn bypass_6581_removes_mixer_dc() {
    let mut ext_filter = ExternalFilter::new(ChipModel::Mos6581);
    ext_filter.set_enabled(false);
    ext_filter.clock(0);
    let dc = -ext_filter.output();
    assert!(dc > 0);
    ext_filter.clock(dc);
    assert_eq!(ext_filter.output(), 0);

    ext_filter.set_chip_model(ChipModel::Mos8580);
    ext_filter.clock(dc);
    assert_eq!(ext_filter.output(), dc);
}

/// A faster clock means a smaller step per cycle.
#[test]
fn clock_frequency_scales_response() {
    let mut pal = ExternalFilter::new(ChipModel::Mos8580);
    let mut fast = ExternalFilter::new(ChipModel::Mos8580);
    fast.set_clock_frequency(4.0 * clock::PAL as f64);
    pal.clock(10_000);
    fast.clock(10_000);
    assert!(fast.output() < pal.output());
    assert!(fast.output() > 0);
}

#[test]
fn reset_clears_state() {
    let mut ext_filter = ExternalFilter::new(ChipModel::Mos6581);
    ext_filter.clock_delta(1000, 5000);
    assert_ne!(ext_filter.output(), 0);
    ext_filter.reset();
    assert_eq!(ext_filter.output(), 0);
}
