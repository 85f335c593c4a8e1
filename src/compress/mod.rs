// This file is part of sidpack, derived from the plus4emu compression library.
// Copyright (c) 2007-2017 Istvan Varga <istvanv@users.sourceforge.net>. All rights reserved.
// Originally licensed under the GPLv2 or later.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

//! Two formats are supported:
//!
//! - M2: LZ77 with slotted prefix codes, a custom checksum byte and
//!   literal bytes kept byte aligned. [`compress`] and [`decompress`].
//! - ZLib: a zlib stream with Deflate blocks. [`zlib::compress`] and
//!   [`inflate::decompress`].
//!
//! Both compressors parse optimally: every block is parsed backwards with
//! the code sizes measured on the previous pass until the output stops
//! changing.

use alloc::vec;
use alloc::vec::Vec;

use bit_field::BitField;
use log::debug;

mod decoder;
pub mod encode_table;
pub mod huffman;
pub mod inflate;
mod m2;
mod radix_tree;
pub mod search_table;
pub mod zlib;

pub use self::decoder::decompress;
use self::m2::{Compressor, MAX_REPEAT_DIST};
use crate::error::Result;

/// Output format of [`compress_with`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Method {
    /// plus4emu M2 format.
    #[default]
    M2,
    /// zlib wrapped Deflate.
    ZLib,
}

/// Compressor settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompressConfig {
    /// Output format.
    pub method: Method,
    /// Compress M2 windows on the rayon thread pool. Ignored without the
    /// `std` feature.
    pub parallel: bool,
}

impl Default for CompressConfig {
    fn default() -> Self {
        CompressConfig {
            method: Method::M2,
            parallel: cfg!(feature = "std"),
        }
    }
}

/// Compress `data` in the M2 format.
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    compress_with(data, &CompressConfig::default())
}

/// Compress `data` with the given settings.
pub fn compress_with(data: &[u8], config: &CompressConfig) -> Result<Vec<u8>> {
    match config.method {
        Method::M2 => compress_m2(data, config.parallel),
        Method::ZLib => zlib::compress(data),
    }
}

/// One step of the M2 checksum, run over the stream from the last byte to
/// the first.
#[inline]
pub(crate) fn checksum_step(crc: u8, b: u8) -> u8 {
    (crc ^ b).rotate_left(1).wrapping_add(0xac)
}

fn compress_window(index: usize, window: &[u8], n_windows: usize) -> Result<Vec<u32>> {
    let mut compressor = Compressor::new()?;
    let mut words = Vec::new();
    compressor.compress_window(&mut words, window, index + 1 == n_windows, true)?;
    Ok(words)
}

fn compress_m2(data: &[u8], parallel: bool) -> Result<Vec<u8>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    let windows: Vec<&[u8]> = data.chunks(MAX_REPEAT_DIST).collect();
    let n_windows = windows.len();
    debug!("compressing {} bytes in {} windows", data.len(), n_windows);

    #[cfg(feature = "std")]
    let streams: Vec<Vec<u32>> = if parallel {
        use rayon::prelude::*;
        windows
            .par_iter()
            .enumerate()
            .map(|(i, window)| compress_window(i, window, n_windows))
            .collect::<Result<Vec<_>>>()?
    } else {
        windows
            .iter()
            .enumerate()
            .map(|(i, window)| compress_window(i, window, n_windows))
            .collect::<Result<Vec<_>>>()?
    };
    #[cfg(not(feature = "std"))]
    let streams: Vec<Vec<u32>> = {
        let _ = parallel;
        windows
            .iter()
            .enumerate()
            .map(|(i, window)| compress_window(i, window, n_windows))
            .collect::<Result<Vec<_>>>()?
    };

    let mut packer = BitPacker::new();
    for word in streams.iter().flatten() {
        packer.write(*word);
    }
    Ok(packer.finish())
}

/// Packs code words MSB first. A literal byte that arrives while a bit
/// byte is partly filled is written after a reserved slot that receives
/// the bit byte once it is complete.
struct BitPacker {
    out: Vec<u8>,
    /// Pending bits below a leading 1 marker.
    shift_reg: u8,
    saved_pos: Option<usize>,
}

impl BitPacker {
    fn new() -> Self {
        BitPacker {
            // Checksum slot.
            out: vec![0],
            shift_reg: 0x01,
            saved_pos: None,
        }
    }

    fn store_shift_reg(&mut self) {
        match self.saved_pos.take() {
            Some(pos) => self.out[pos] = self.shift_reg,
            None => self.out.push(self.shift_reg),
        }
        self.shift_reg = 0x01;
    }

    fn write(&mut self, word: u32) {
        if word.get_bit(31) {
            if self.shift_reg != 0x01 && self.saved_pos.is_none() {
                self.saved_pos = Some(self.out.len());
                self.out.push(0);
            }
            let n_bytes = ((word & 0x7f00_0000) + 0x0700_0000) >> 27;
            for k in (0..n_bytes).rev() {
                self.out.push((word >> (k * 8)) as u8);
            }
            return;
        }
        let n_bits = (word >> 24) as usize;
        for k in (0..n_bits).rev() {
            let full = self.shift_reg.get_bit(7);
            self.shift_reg = (self.shift_reg << 1) | word.get_bit(k) as u8;
            if full {
                self.store_shift_reg();
            }
        }
    }

    fn finish(mut self) -> Vec<u8> {
        if self.shift_reg != 0x01 {
            while !self.shift_reg.get_bit(7) {
                self.shift_reg <<= 1;
            }
            self.shift_reg <<= 1;
            self.store_shift_reg();
        }
        let crc = self.out[1..].iter().rev().fold(0xff, |crc, &b| checksum_step(crc, b));
        self.out[0] = ((0x180 - 0xac) >> 1) as u8 ^ crc;
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packer_reserves_slot_for_partial_bit_byte() {
        let mut packer = BitPacker::new();
        packer.write(0x0200_0002); // 10
        packer.write(m2::literal_word(0xaa));
        packer.write(0x0600_003f); // 111111
        packer.write(0x0100_0001); // 1
        let out = packer.finish();
        assert_eq!(&out[1..], [0xbf, 0xaa, 0x80]);
    }

    #[test]
    fn packed_stream_checksums_to_0x80() {
        let out = compress(b"checksum").unwrap();
        assert_eq!(out.iter().rev().fold(0xff, |crc, &b| checksum_step(crc, b)), 0x80);
    }

    #[test]
    fn empty_input_gives_empty_stream() {
        assert!(compress(&[]).unwrap().is_empty());
        assert!(decompress(&[]).unwrap().is_empty());
    }
}
