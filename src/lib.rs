// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

#![no_std]
#![warn(missing_docs)]
//! Cycle-accurate SID (MOS6581/8580) emulation core and the plus4emu
//! LZ77 + statistical compressor.
//!
//! ## Feature flags
//! - `std` (default): compresses 128 KiB windows in parallel with rayon and
//!   implements `std::error::Error` for [`Error`].
//! - `cli`: builds the `p4compress` command line front-end.

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

/// Statistical and LZ77 compression in the plus4emu formats.
pub mod compress;
pub mod dac;
/// Envelope generator modeling SID ADSR behavior.
pub mod envelope;
mod error;
/// External C64 audio output filter.
pub mod external_filter;
/// Internal SID multimode filter implementation.
pub mod filter;
/// Paddle inputs of the POTX/POTY registers.
pub mod potentiometer;
mod sid;
mod snapshot;
/// Voice primitives (waveform + envelope).
pub mod voice;
/// Oscillator waveform generator primitives and sync helpers.
pub mod wave;

/// SID chip model selection.
///
/// The MOS 6581 was the original SID chip used in early C64s, featuring
/// a distinctive filter with analog imperfections. The MOS 8580 was a
/// later revision with a cleaner, more linear filter response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ChipModel {
    /// Original SID chip (1982) with characteristic analog filter quirks.
    #[default]
    Mos6581,
    /// Revised SID chip (1987) with cleaner, more linear filter.
    Mos8580,
}

/// Clock frequency constants for common C64 configurations.
pub mod clock {
    /// PAL C64 clock frequency (~985 kHz).
    pub const PAL: u32 = 985_248;
    /// NTSC C64 clock frequency (~1.02 MHz).
    pub const NTSC: u32 = 1_022_727;
}

pub use self::error::{DataError, Error, Result, SnapshotError};
pub use self::sid::{reg, Sid, SidConfig, State};
