// This file is part of sidpack, derived from the plus4emu compression library.
// Copyright (c) 2007-2017 Istvan Varga <istvanv@users.sourceforge.net>. All rights reserved.
// Originally licensed under the GPLv2 or later.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

//! zlib stream compressor.
//!
//! Every 32 KiB block is parsed optimally several times; the first pass
//! uses the fixed Deflate codes, later passes dynamic codes built from the
//! symbol counts of the pass before. The smallest output wins, and a
//! block that does not shrink is stored.

use alloc::vec;
use alloc::vec::Vec;

use bit_field::BitField;
use log::{debug, trace};

use super::huffman::HuffmanEncoder;
use super::search_table::LzSearchTable;
use crate::error::Result;

const MIN_MATCH_LEN: usize = 3;
const MAX_MATCH_LEN: usize = 258;
const MAX_MATCH_DIST: usize = 32768;
const BLOCK_SIZE: usize = 32768;
const MAX_PASSES: usize = 40;
const MAX_CODE_LEN: usize = 15;
const MAX_CODE_LEN_CODE_LEN: usize = 7;
const UNUSED_SYMBOL_SIZE: usize = 16383;

const LIT_SYMBOLS: usize = 288;
const DIST_SYMBOLS: usize = 32;
const END_OF_BLOCK: usize = 256;

/// Order in which the code length code lengths are sent.
pub(crate) const CODE_LENGTH_ORDER: [u8; 19] = [16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15];

/// Code lengths of the fixed literal/length and distance codes.
pub(crate) fn fixed_code_lengths() -> [u8; LIT_SYMBOLS + DIST_SYMBOLS] {
    let mut lengths = [5; LIT_SYMBOLS + DIST_SYMBOLS];
    for (i, len) in lengths[..LIT_SYMBOLS].iter_mut().enumerate() {
        *len = match i {
            0..=143 => 8,
            144..=255 => 9,
            256..=279 => 7,
            _ => 8,
        };
    }
    lengths
}

/// Adler-32 of `data` continued from `sum`.
pub(crate) fn adler32(sum: u32, data: &[u8]) -> u32 {
    const BASE: u32 = 65521;
    let (mut a, mut b) = (sum & 0xffff, sum >> 16);
    for &byte in data {
        a = (a + byte as u32) % BASE;
        b = (b + a) % BASE;
    }
    a | (b << 16)
}

/// Deflate symbol and extra bits word (`bits << 24 | value`) for a match
/// length or distance.
#[derive(Clone, Copy, Default)]
struct SymbolCode {
    symbol: u16,
    extra: u32,
}

impl SymbolCode {
    #[inline]
    fn extra_bits(self) -> usize {
        (self.extra >> 24) as usize
    }
}

fn length_codes() -> Vec<SymbolCode> {
    let mut codes = vec![SymbolCode::default(); MAX_MATCH_LEN + 1];
    for (len, code) in codes.iter_mut().enumerate().take(MAX_MATCH_LEN).skip(MIN_MATCH_LEN) {
        let value = (len - 3) as u32;
        *code = if value < 8 {
            SymbolCode {
                symbol: 0x101 + value as u16,
                extra: 0,
            }
        } else {
            let mut bits = 0;
            let mut symbol = 0x105;
            loop {
                symbol += 4;
                bits += 1;
                if value < (8 << bits) {
                    break;
                }
            }
            SymbolCode {
                symbol: symbol + ((value >> bits) & 3) as u16,
                extra: (value & ((1 << bits) - 1)) | (bits << 24),
            }
        };
    }
    codes[MAX_MATCH_LEN] = SymbolCode {
        symbol: 0x11d,
        extra: 0,
    };
    codes
}

fn distance_codes() -> Vec<SymbolCode> {
    let mut codes = vec![SymbolCode::default(); MAX_MATCH_DIST + 1];
    for (d, code) in codes.iter_mut().enumerate().skip(1) {
        let value = (d - 1) as u32;
        *code = if value < 4 {
            SymbolCode {
                symbol: value as u16,
                extra: 0,
            }
        } else {
            let mut bits = 0;
            let mut symbol = 2;
            loop {
                symbol += 2;
                bits += 1;
                if value < (4 << bits) {
                    break;
                }
            }
            SymbolCode {
                symbol: symbol + ((value >> bits) & 1) as u16,
                extra: (value & ((1 << bits) - 1)) | (bits << 24),
            }
        };
    }
    codes
}

struct Compressor {
    length_codes: Vec<SymbolCode>,
    distance_codes: Vec<SymbolCode>,
    lit_encoder: HuffmanEncoder,
    dist_encoder: HuffmanEncoder,
    code_len_encoder: HuffmanEncoder,
    lit_counts: [u32; LIT_SYMBOLS],
    dist_counts: [u32; DIST_SYMBOLS],
    lit_table: [u32; LIT_SYMBOLS],
    dist_table: [u32; DIST_SYMBOLS],
    /// Code sizes of the current pass, distances at `LIT_SYMBOLS..`.
    symbol_bits: [usize; LIT_SYMBOLS + DIST_SYMBOLS],
    search_table: LzSearchTable,
    adler: u32,
}

impl Compressor {
    fn new() -> Result<Self> {
        Ok(Compressor {
            length_codes: length_codes(),
            distance_codes: distance_codes(),
            lit_encoder: HuffmanEncoder::new(LIT_SYMBOLS, 257),
            dist_encoder: HuffmanEncoder::new(DIST_SYMBOLS, 1),
            code_len_encoder: HuffmanEncoder::new(19, 4),
            lit_counts: [0; LIT_SYMBOLS],
            dist_counts: [0; DIST_SYMBOLS],
            lit_table: [0; LIT_SYMBOLS],
            dist_table: [0; DIST_SYMBOLS],
            symbol_bits: [UNUSED_SYMBOL_SIZE; LIT_SYMBOLS + DIST_SYMBOLS],
            search_table: LzSearchTable::new(
                MIN_MATCH_LEN,
                MAX_MATCH_LEN,
                MAX_MATCH_LEN,
                MAX_MATCH_DIST,
                MAX_MATCH_DIST,
                MAX_MATCH_DIST,
            )?,
            adler: 1,
        })
    }

    /// Build the codes for the next pass from the counts of the last one
    /// (or the fixed codes) and write the block header.
    fn calculate_huffman_encoding(&mut self, out: &mut Vec<u32>, fixed: bool) -> Result<()> {
        if fixed {
            let lengths = fixed_code_lengths();
            self.lit_encoder.update_tables(true, MAX_CODE_LEN, Some(&lengths[..LIT_SYMBOLS]))?;
            self.dist_encoder.update_tables(true, MAX_CODE_LEN, Some(&lengths[LIT_SYMBOLS..]))?;
        } else {
            for (encoder, counts) in [
                (&mut self.lit_encoder, &self.lit_counts[..]),
                (&mut self.dist_encoder, &self.dist_counts[..]),
            ] {
                encoder.clear();
                for (c, &n) in counts.iter().enumerate() {
                    for _ in 0..n {
                        encoder.add_symbol(c);
                    }
                }
                encoder.update_tables(true, MAX_CODE_LEN, None)?;
            }
        }
        let (lit_bits, dist_bits) = self.symbol_bits.split_at_mut(LIT_SYMBOLS);
        for (encoder, table, bits) in [
            (&self.lit_encoder, &mut self.lit_table[..], lit_bits),
            (&self.dist_encoder, &mut self.dist_table[..], dist_bits),
        ] {
            for c in 0..table.len() {
                let size = encoder.symbol_size(c);
                if size <= MAX_CODE_LEN {
                    table[c] = encoder.encode_symbol(c)?;
                    bits[c] = size;
                } else {
                    table[c] = 0;
                    bits[c] = UNUSED_SYMBOL_SIZE;
                }
            }
        }
        self.lit_counts.fill(0);
        self.dist_counts.fill(0);
        if fixed {
            // Fixed codes: BTYPE 01.
            out.push(0x0300_0002);
            return Ok(());
        }

        let lit_cnt = self.lit_encoder.symbol_range_used();
        let dist_cnt = self.dist_encoder.symbol_range_used();
        let lengths: Vec<u8> = self.lit_table[..lit_cnt]
            .iter()
            .chain(&self.dist_table[..dist_cnt])
            .map(|&code| (code >> 24) as u8)
            .collect();

        // Code length statistics, with runs of zeros (17, 18) and repeats
        // of the previous length (16).
        self.code_len_encoder.clear();
        let mut i = 0;
        let mut prev = None;
        while i < lengths.len() {
            let run = code_length_run(&lengths, i, prev);
            prev = Some(lengths[i]);
            if run < 3 {
                self.code_len_encoder.add_symbol(lengths[i] as usize);
                i += 1;
            } else {
                self.code_len_encoder.add_symbol(run_symbol(lengths[i], run) as usize);
                i += run;
            }
        }
        self.code_len_encoder.update_tables(true, MAX_CODE_LEN_CODE_LEN, None)?;

        let mut code_cnt = 4;
        for (k, &sym) in CODE_LENGTH_ORDER.iter().enumerate() {
            if self.code_len_encoder.symbol_size(sym as usize) <= MAX_CODE_LEN_CODE_LEN {
                code_cnt = code_cnt.max(k + 1);
            }
        }
        // BTYPE 10, HLIT, HDIST, HCLEN.
        out.push(
            0x1100_0004
                | ((lit_cnt - 257) << 3) as u32
                | ((dist_cnt - 1) << 8) as u32
                | ((code_cnt - 4) << 13) as u32,
        );
        for &sym in &CODE_LENGTH_ORDER[..code_cnt] {
            let len = self.code_len_encoder.symbol_size(sym as usize);
            let len = if len <= MAX_CODE_LEN_CODE_LEN { len as u32 } else { 0 };
            out.push(0x0300_0000 | len);
        }

        let mut i = 0;
        let mut prev = None;
        while i < lengths.len() {
            let len = lengths[i];
            let run = code_length_run(&lengths, i, prev);
            prev = Some(len);
            if run >= 3 {
                let sym = run_symbol(len, run);
                let extra_bits: u32 = match sym {
                    16 => 2,
                    17 => 3,
                    _ => 7,
                };
                let sym_len = self.code_len_encoder.symbol_size(sym as usize);
                // Only when the run code is not longer than the plain codes.
                if sym_len + extra_bits as usize <= self.code_len_encoder.symbol_size(len as usize) * run {
                    let base = if sym == 18 { 11 } else { 3 };
                    let code = self.code_len_encoder.encode_symbol(sym as usize)?;
                    out.push((code + (extra_bits << 24)) | (((run - base) as u32) << sym_len));
                    i += run;
                    continue;
                }
            }
            out.push(self.code_len_encoder.encode_symbol(len as usize)?);
            i += 1;
        }
        Ok(())
    }

    /// Append the code of a literal/length symbol; false if it has none.
    #[inline]
    fn encode_lit(&mut self, out: &mut Vec<u32>, c: usize) -> bool {
        self.lit_counts[c] += 1;
        out.push(self.lit_table[c]);
        self.lit_table[c] != 0
    }

    #[inline]
    fn encode_dist(&mut self, out: &mut Vec<u32>, c: usize) -> bool {
        self.dist_counts[c] += 1;
        out.push(self.dist_table[c]);
        self.dist_table[c] != 0
    }

    fn write_match_code(&mut self, out: &mut Vec<u32>, d: usize, n: usize) -> bool {
        let length = self.length_codes[n];
        let mut valid = self.encode_lit(out, length.symbol as usize);
        if length.extra_bits() > 0 {
            out.push(length.extra);
        }
        let distance = self.distance_codes[d];
        valid &= self.encode_dist(out, distance.symbol as usize);
        if distance.extra_bits() > 0 {
            out.push(distance.extra);
        }
        valid
    }

    /// Backward optimal parse of `data[offs..offs + n_bytes]` with the
    /// current code sizes; returns `(distance, length)` per position,
    /// distance 0 for literals.
    fn optimize_matches(&self, data: &[u8], offs: usize, n_bytes: usize) -> Vec<(u32, u16)> {
        let mut length_bits = vec![0x7fff; MAX_MATCH_LEN + 1];
        for (len, bits) in length_bits.iter_mut().enumerate().skip(MIN_MATCH_LEN) {
            let code = self.length_codes[len];
            *bits = self.symbol_bits[code.symbol as usize] + code.extra_bits();
        }
        let mut match_table = vec![(0u32, 1u16); n_bytes];
        let mut bit_count = vec![0usize; n_bytes + 1];
        for i in (0..n_bytes).rev() {
            let mut best_size = self.symbol_bits[data[offs + i] as usize] + bit_count[i + 1];
            let mut best = (0u32, 1u16);
            let max_len = n_bytes - i;
            let words = self.search_table.matches(offs + i);
            for &word in words.iter().take_while(|&&w| (w & 0x3ff) as usize >= MIN_MATCH_LEN) {
                let d = (word >> 10) as usize;
                let distance = self.distance_codes[d];
                let offs_bits = self.symbol_bits[LIT_SYMBOLS + distance.symbol as usize] + distance.extra_bits();
                let mut len = ((word & 0x3ff) as usize).min(max_len);
                while len >= MIN_MATCH_LEN {
                    let n_bits = length_bits[len] + offs_bits + bit_count[i + len];
                    if n_bits <= best_size {
                        best_size = n_bits;
                        best = (d as u32, len as u16);
                    }
                    len -= 1;
                }
            }
            match_table[i] = best;
            bit_count[i] = best_size;
        }
        match_table
    }

    /// Encode one pass of the block after its header. Returns false if a
    /// symbol without a code was needed.
    fn encode_block(&mut self, out: &mut Vec<u32>, data: &[u8], offs: usize, n_bytes: usize) -> bool {
        let match_table = self.optimize_matches(data, offs, n_bytes);
        let mut valid = true;
        let mut i = 0;
        while i < n_bytes {
            let (d, len) = match_table[i];
            if d > 0 {
                valid &= self.write_match_code(out, d as usize, len as usize);
                i += len as usize;
            } else {
                valid &= self.encode_lit(out, data[offs + i] as usize);
                i += 1;
            }
        }
        valid &= self.encode_lit(out, END_OF_BLOCK);
        valid
    }

    fn compress_block(&mut self, out: &mut Vec<u32>, data: &[u8], offs: usize, n_bytes: usize, is_last: bool) -> Result<()> {
        let mut hashes: Vec<u64> = Vec::new();
        let mut best: Vec<u32> = Vec::new();
        let mut best_size = usize::MAX;
        let mut tmp = Vec::new();
        for pass in 0..MAX_PASSES {
            tmp.clear();
            self.calculate_huffman_encoding(&mut tmp, pass == 0)?;
            let valid = self.encode_block(&mut tmp, data, offs, n_bytes);
            let mut size = 0;
            let mut h: u64 = 1;
            for &w in &tmp {
                size += ((w >> 24) & 0x1f) as usize;
                h ^= w as u64;
                h = (h as u32 as u64) * 0xc2b0_c3cc;
                h = (h ^ (h >> 32)) & 0xffff_ffff;
            }
            h |= (size as u64) << 32;
            trace!("pass {}: {} bits{}", pass, size, if valid { "" } else { " (unusable)" });
            if valid && size < best_size {
                best_size = size;
                best.clone_from(&tmp);
            }
            if hashes.contains(&h) {
                break;
            }
            hashes.push(h);
        }

        let block = &data[offs..offs + n_bytes];
        let stored_size = n_bytes * 8 + 39;
        let stored = best_size >= stored_size;
        if stored {
            // BTYPE 00, then LEN and NLEN byte aligned.
            let len = n_bytes as u16;
            best.clear();
            best.push(0x0300_0000);
            best.extend(
                [len as u8, (len >> 8) as u8, !len as u8, (!len >> 8) as u8]
                    .iter()
                    .chain(block)
                    .map(|&b| 0x8800_0000 | b as u32),
            );
        }
        best[0] |= is_last as u32;
        debug!(
            "deflate block of {} bytes: {} bits, {}",
            n_bytes,
            best_size.min(stored_size),
            if stored { "stored" } else { "compressed" }
        );
        self.adler = adler32(self.adler, block);
        out.extend_from_slice(&best);
        Ok(())
    }
}

/// Length of the run starting at `i` that a run code could cover: zeros,
/// or repeats of the previous length.
fn code_length_run(lengths: &[u8], i: usize, prev: Option<u8>) -> usize {
    let (value, max_run) = match lengths[i] {
        0 => (0, 138),
        _ => match prev {
            Some(p) if p != 0 => (p, 6),
            _ => return 0,
        },
    };
    lengths[i..].iter().take(max_run).take_while(|&&len| len == value).count()
}

fn run_symbol(len: u8, run: usize) -> u8 {
    match (len, run) {
        (0, 11..) => 18,
        (0, _) => 17,
        _ => 16,
    }
}

/// LSB-first bit packer; literal words are written byte aligned.
struct BitPacker {
    out: Vec<u8>,
    acc: u8,
    n_bits: usize,
}

impl BitPacker {
    fn align(&mut self) {
        if self.n_bits != 0 {
            self.out.push(self.acc);
            self.acc = 0;
            self.n_bits = 0;
        }
    }

    fn write(&mut self, word: u32) {
        if word.get_bit(31) {
            self.align();
            self.out.push(word as u8);
            return;
        }
        for k in 0..(word >> 24) as usize {
            self.acc.set_bit(self.n_bits, word.get_bit(k));
            self.n_bits += 1;
            if self.n_bits == 8 {
                self.align();
            }
        }
    }
}

/// Compress `data` into a zlib stream.
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    // CINFO 7 (32 KiB window), CM 8, FLEVEL 3, FCHECK.
    let mut header: u16 = (7 << 12) | 0x08c0;
    while header % 31 != 0 {
        header += 1;
    }
    let mut packer = BitPacker {
        out: header.to_be_bytes().to_vec(),
        acc: 0,
        n_bits: 0,
    };
    let mut adler = 1;
    if data.is_empty() {
        // A final fixed block holding only the end-of-block code.
        packer.write(0x0300_0003);
        packer.write(0x0700_0000);
    } else {
        let mut compressor = Compressor::new()?;
        compressor.search_table.find_matches(data, 0, data.len())?;
        let mut words = Vec::new();
        let mut offs = 0;
        while offs < data.len() {
            let n_bytes = BLOCK_SIZE.min(data.len() - offs);
            words.clear();
            compressor.compress_block(&mut words, data, offs, n_bytes, offs + n_bytes == data.len())?;
            for &w in &words {
                packer.write(w);
            }
            offs += n_bytes;
        }
        adler = compressor.adler;
    }
    packer.align();
    packer.out.extend_from_slice(&u32::to_be_bytes(adler));
    Ok(packer.out)
}
