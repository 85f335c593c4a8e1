// This file is part of sidpack, derived from the plus4emu compression library.
// Copyright (c) 2007-2017 Istvan Varga <istvanv@users.sourceforge.net>. All rights reserved.
// Originally licensed under the GPLv2 or later.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

//! M2 block compressor.
//!
//! Output is a stream of code words: bits 24..30 hold the bit count and
//! bits 0..23 the value, MSB first. Words with bit 31 set are literal
//! bytes that are stored byte aligned by the packer.

use alloc::vec;
use alloc::vec::Vec;

use log::{debug, trace};

use super::encode_table::{EncodeTable, PrefixCode};
use super::search_table::LzSearchTable;
use crate::error::Result;

pub(crate) const MIN_REPEAT_DIST: usize = 1;
/// Window size; no match reaches across a window boundary.
pub(crate) const MAX_REPEAT_DIST: usize = 131_072;
pub(crate) const MIN_REPEAT_LEN: usize = 1;
pub(crate) const MAX_REPEAT_LEN: usize = 128;
pub(crate) const LENGTH_MAX_VALUE: usize = 65_535;
pub(crate) const LENGTH_NUM_SLOTS: usize = 8;
pub(crate) const OFFS1_NUM_SLOTS: usize = 4;
pub(crate) const OFFS2_NUM_SLOTS: usize = 8;
pub(crate) const OFFS1_PREFIX_SIZE: usize = 2;
pub(crate) const OFFS2_PREFIX_SIZE: usize = 3;
pub(crate) const OFFS1_MAX_VALUE: usize = 4096;
pub(crate) const OFFS2_MAX_VALUE: usize = 16384;
pub(crate) const OFFS3_MAX_VALUE: usize = MAX_REPEAT_DIST;
pub(crate) const LITERAL_SEQUENCE_MIN_LENGTH: usize = 17;
/// Bytes per block inside a window.
pub(crate) const BLOCK_SIZE: usize = 65_536;

const LENGTH_PREFIX_SIZES: [usize; LENGTH_NUM_SLOTS] = [1, 2, 3, 4, 5, 6, 7, 8];
pub(crate) const OFFS3_SLOT_COUNTS: [usize; 4] = [4, 8, 16, 32];

const MAX_PASSES: usize = 40;
const HEADER_SIZE: usize = 18;
const SIZE_LIMIT: usize = 0x7fff_ffff;

/// Literal byte code word.
#[inline]
pub(crate) const fn literal_word(b: u8) -> u32 {
    0x8800_0000 | b as u32
}

#[derive(Clone, Copy, Default)]
struct LzMatch {
    /// Distance; 0 for literals.
    d: u32,
    /// Match length or literal count.
    len: u32,
}

/// One compressor instance owns the statistics of a single window.
pub(crate) struct Compressor {
    length_table: EncodeTable,
    offs1_table: EncodeTable,
    offs2_table: EncodeTable,
    offs3_table: EncodeTable,
    offs3_num_slots: usize,
    offs3_prefix_size: usize,
    search_table: Option<LzSearchTable>,
}

impl Compressor {
    pub fn new() -> Result<Self> {
        Ok(Compressor {
            length_table: EncodeTable::with_prefix(
                LENGTH_NUM_SLOTS,
                LENGTH_MAX_VALUE,
                PrefixCode::Variable(&LENGTH_PREFIX_SIZES),
            )?,
            offs1_table: EncodeTable::with_prefix(
                OFFS1_NUM_SLOTS,
                OFFS1_MAX_VALUE,
                PrefixCode::Fixed(OFFS1_PREFIX_SIZE),
            )?,
            offs2_table: EncodeTable::with_prefix(
                OFFS2_NUM_SLOTS,
                OFFS2_MAX_VALUE,
                PrefixCode::Fixed(OFFS2_PREFIX_SIZE),
            )?,
            offs3_table: EncodeTable::with_prefix(
                0,
                OFFS3_MAX_VALUE,
                PrefixCode::Range {
                    min: 2,
                    max: 5,
                    slot_counts: Some(&OFFS3_SLOT_COUNTS),
                },
            )?,
            offs3_num_slots: 4,
            offs3_prefix_size: 2,
            search_table: None,
        })
    }

    fn offs_table(&self, n: usize) -> (&EncodeTable, usize) {
        if n > 2 {
            (&self.offs3_table, self.offs3_prefix_size)
        } else if n > 1 {
            (&self.offs2_table, OFFS2_PREFIX_SIZE)
        } else {
            (&self.offs1_table, OFFS1_PREFIX_SIZE)
        }
    }

    fn write_repeat_code(&self, buf: &mut Vec<u32>, d: usize, n: usize) -> Result<()> {
        let (offs_table, offs_prefix_size) = self.offs_table(n);
        let n = n - MIN_REPEAT_LEN;
        let d = d - MIN_REPEAT_DIST;

        // Length: a 1 flag bit, `slot` ones and a terminating zero.
        let slot = self.length_table.symbol_slot_index(n)?;
        let slot_size = self.length_table.slot_size(slot);
        let prefix_bits = (slot + 2) as u32;
        let prefix = (1u32 << prefix_bits) - 2;
        if slot_size == 0 {
            buf.push((prefix_bits << 24) | prefix);
        } else {
            buf.push(((prefix_bits << 24) | (prefix << slot_size)) + self.length_table.encode_symbol(n)?);
        }

        let slot = offs_table.symbol_slot_index(d)? as u32;
        let slot_size = offs_table.slot_size(slot as usize);
        let prefix_bits = offs_prefix_size as u32;
        if slot_size == 0 {
            buf.push((prefix_bits << 24) | slot);
        } else {
            buf.push(((prefix_bits << 24) | (slot << slot_size)) + offs_table.encode_symbol(d)?);
        }
        Ok(())
    }

    #[inline]
    fn repeat_code_length(&self, d: usize, n: usize) -> usize {
        let bits = self.length_table.symbol_size(n - MIN_REPEAT_LEN) + 1;
        bits + self.offs_table(n).0.symbol_size(d - MIN_REPEAT_DIST)
    }

    /// First pass parse, costed with fixed estimates since no statistics
    /// exist yet.
    fn optimize_matches_no_stats(
        search: &LzSearchTable,
        match_table: &mut [LzMatch],
        bit_count: &mut [usize],
        offs: usize,
        n_bytes: usize,
    ) {
        // Length 1 costs 2 more bits beyond distance 16 and 64, length 2
        // beyond 1024.
        const MATCH_SIZE1: usize = 4;
        const MATCH_SIZE2: usize = 6;
        const MATCH_SIZE3: usize = 8;
        for i in (0..n_bytes).rev() {
            let mut best_size = SIZE_LIMIT;
            let mut best_len = 1;
            let mut best_offs = 0;
            let words = search.matches(offs + i);
            let mut len = (words[0] as usize).min(n_bytes - i);
            if len > MAX_REPEAT_LEN {
                if words[1] > 1024 {
                    best_size = bit_count[i + len] + MATCH_SIZE3;
                    best_offs = (words[1] >> 10) as usize;
                    best_len = len;
                    len = MAX_REPEAT_LEN;
                } else {
                    // Long run at distance 1.
                    match_table[i] = LzMatch { d: 1, len: len as u32 };
                    bit_count[i] = bit_count[i + len] + MATCH_SIZE3;
                    continue;
                }
            }
            let mut k = 1;
            while len > 0 {
                len = len.min(n_bytes - i);
                let d = (words[k] >> 10) as usize;
                k += 1;
                let next_len = (words[k] & 0x3ff) as usize;
                let nxt_len = if next_len >= MIN_REPEAT_LEN { next_len } else { MIN_REPEAT_LEN - 1 };
                'lengths: {
                    if len <= nxt_len {
                        break 'lengths;
                    }
                    if len >= 3 {
                        let min_len_m1 = nxt_len.max(2);
                        loop {
                            let n_bits = bit_count[i + len] + MATCH_SIZE3;
                            if n_bits <= best_size {
                                best_size = n_bits;
                                best_offs = d;
                                best_len = len;
                            }
                            len -= 1;
                            if len <= min_len_m1 {
                                break;
                            }
                        }
                        if nxt_len >= 2 {
                            break 'lengths;
                        }
                        len = 2;
                    }
                    if len == 2 {
                        if d <= OFFS2_MAX_VALUE {
                            let n_bits = bit_count[i + 2] + MATCH_SIZE2 + (((d > 1024) as usize) << 1);
                            if n_bits <= best_size {
                                best_size = n_bits;
                                best_offs = d;
                                best_len = 2;
                            }
                        }
                        if nxt_len >= 1 {
                            break 'lengths;
                        }
                    }
                    if d <= OFFS1_MAX_VALUE {
                        let n_bits = bit_count[i + 1]
                            + MATCH_SIZE1
                            + (((d > 16) as usize + (d > 64) as usize) << 1);
                        if n_bits <= best_size {
                            best_size = n_bits;
                            best_offs = d;
                            best_len = 1;
                        }
                    }
                }
                len = next_len;
            }
            if best_size >= bit_count[i + 1] + 8 {
                let n_bits = bit_count[i + 1] + 9;
                if n_bits <= best_size {
                    best_size = n_bits;
                    best_offs = 0;
                    best_len = 1;
                }
                let max_k = (LITERAL_SEQUENCE_MIN_LENGTH + 255).min(n_bytes - i);
                for k in LITERAL_SEQUENCE_MIN_LENGTH..=max_k {
                    let n_bits = bit_count[i + k] + k * 8 + LITERAL_SEQUENCE_MIN_LENGTH;
                    if n_bits > best_size + LITERAL_SEQUENCE_MIN_LENGTH {
                        break;
                    }
                    if n_bits <= best_size {
                        best_size = n_bits;
                        best_offs = 0;
                        best_len = k;
                    }
                }
            }
            match_table[i] = LzMatch {
                d: best_offs as u32,
                len: best_len as u32,
            };
            bit_count[i] = best_size;
        }
    }

    /// Optimal parse with the code sizes of the previous pass. Among equal
    /// sizes the parse with the smallest sum of distances wins, which
    /// keeps the offset statistics tight.
    fn optimize_matches(
        &self,
        search: &LzSearchTable,
        match_table: &mut [LzMatch],
        bit_count: &mut [usize],
        offs_sum: &mut [u32],
        offs: usize,
        n_bytes: usize,
    ) {
        let len1_bits = self.length_table.symbol_size(1 - MIN_REPEAT_LEN) + 1;
        let len2_bits = self.length_table.symbol_size(2 - MIN_REPEAT_LEN) + 1;
        let offs1_encoded = self.offs1_table.symbols_encoded();
        let offs2_encoded = self.offs2_table.symbols_encoded();
        for i in (0..n_bytes).rev() {
            let mut best_size = SIZE_LIMIT;
            let mut best_len = 1;
            let mut best_offs: u32 = 0;
            let mut best_offs_sum = u32::MAX;
            let words = search.matches(offs + i);
            let mut len = (words[0] as usize).min(n_bytes - i);
            if len > MAX_REPEAT_LEN {
                if words[1] > 1024 {
                    best_offs = words[1] >> 10;
                    best_len = len;
                    best_size = self.repeat_code_length(best_offs as usize, len) + bit_count[i + len];
                    best_offs_sum = offs_sum[i + len].wrapping_add(best_offs);
                    len = MAX_REPEAT_LEN;
                } else {
                    match_table[i] = LzMatch { d: 1, len: len as u32 };
                    bit_count[i] = bit_count[i + len] + self.repeat_code_length(1, len);
                    offs_sum[i] = offs_sum[i + len].wrapping_add(1);
                    continue;
                }
            }
            let mut k = 1;
            while len > 0 {
                len = len.min(n_bytes - i);
                let d = words[k] >> 10;
                let du = d as usize;
                let mut consider = |n_bits: usize, l: usize| {
                    let sum = offs_sum[i + l].wrapping_add(d);
                    if n_bits < best_size || (n_bits == best_size && sum <= best_offs_sum) {
                        best_size = n_bits;
                        best_offs = d;
                        best_len = l;
                        best_offs_sum = sum;
                    }
                };
                if len >= 3 {
                    // Flag bit and offset.
                    let base = self.offs3_table.symbol_size(du - MIN_REPEAT_DIST) + 1;
                    while len >= 3 {
                        let n_bits = self.length_table.symbol_size(len - MIN_REPEAT_LEN) + base + bit_count[i + len];
                        consider(n_bits, len);
                        len -= 1;
                    }
                }
                if len == 2 && du <= offs2_encoded {
                    let n_bits = len2_bits + self.offs2_table.symbol_size(du - MIN_REPEAT_DIST) + bit_count[i + 2];
                    consider(n_bits, 2);
                }
                if du <= offs1_encoded {
                    let n_bits = len1_bits + self.offs1_table.symbol_size(du - MIN_REPEAT_DIST) + bit_count[i + 1];
                    consider(n_bits, 1);
                }
                k += 1;
                len = (words[k] & 0x3ff) as usize;
            }
            if best_size >= bit_count[i + 1] + 8 {
                let n_bits = bit_count[i + 1] + 9;
                if n_bits < best_size || (n_bits == best_size && offs_sum[i + 1] <= best_offs_sum) {
                    best_size = n_bits;
                    best_offs = 0;
                    best_len = 1;
                    best_offs_sum = offs_sum[i + 1];
                }
                if i + LITERAL_SEQUENCE_MIN_LENGTH <= n_bytes
                    && bit_count[i + LITERAL_SEQUENCE_MIN_LENGTH] + LITERAL_SEQUENCE_MIN_LENGTH * 8 <= best_size
                {
                    let max_k = (LITERAL_SEQUENCE_MIN_LENGTH + 255).min(n_bytes - i);
                    for k in LITERAL_SEQUENCE_MIN_LENGTH..=max_k {
                        let n_bits = bit_count[i + k] + k * 8 + LITERAL_SEQUENCE_MIN_LENGTH;
                        if n_bits > best_size {
                            if n_bits > best_size + LITERAL_SEQUENCE_MIN_LENGTH {
                                break;
                            }
                            continue;
                        }
                        if n_bits == best_size
                            && offs_sum[i + k] > offs_sum[i + best_len].wrapping_add(best_offs)
                        {
                            continue;
                        }
                        best_size = n_bits;
                        best_offs = 0;
                        best_len = k;
                    }
                    best_offs_sum = offs_sum[i + best_len].wrapping_add(best_offs);
                }
            }
            match_table[i] = LzMatch {
                d: best_offs,
                len: best_len as u32,
            };
            bit_count[i] = best_size;
            offs_sum[i] = best_offs_sum;
        }
    }

    /// One optimisation pass over `buf[offs..offs + n_bytes]`. Returns the
    /// symbol count; the first pass only gathers statistics.
    fn compress_pass(
        &mut self,
        out: &mut Vec<u32>,
        buf: &[u8],
        offs: usize,
        n_bytes: usize,
        first_pass: bool,
        fast: bool,
    ) -> Result<usize> {
        out.clear();
        if !first_pass {
            self.offs1_table.update_tables(false)?;
            self.offs2_table.update_tables(false)?;
            self.offs3_table.update_tables(fast)?;
            self.offs3_num_slots = self.offs3_table.slot_count();
            self.offs3_prefix_size = self.offs3_table.slot_prefix_size(0);
        }

        let mut match_table = vec![LzMatch::default(); n_bytes];
        {
            let search = self
                .search_table
                .as_ref()
                .ok_or(crate::error::Error::Internal("search table not built"))?;
            let mut bit_count = vec![0usize; n_bytes + 1];
            if first_pass {
                Self::optimize_matches_no_stats(search, &mut match_table, &mut bit_count, offs, n_bytes);
            } else {
                let mut offs_sum = vec![0u32; n_bytes + 1];
                self.length_table.set_unencoded_symbol_size(LENGTH_NUM_SLOTS + 15);
                self.optimize_matches(search, &mut match_table, &mut bit_count, &mut offs_sum, offs, n_bytes);
            }
        }

        // Length statistics.
        self.length_table.set_unencoded_symbol_size(8192);
        let mut i = 0;
        while i < n_bytes {
            let m = match_table[i];
            if m.d > 0 {
                let prefix = if m.len > 1 { OFFS2_PREFIX_SIZE } else { OFFS1_PREFIX_SIZE };
                let cost = (m.len as usize * 9).saturating_sub(1 + prefix);
                self.length_table.add_symbol(m.len as usize - MIN_REPEAT_LEN, cost);
            }
            i += m.len as usize;
        }
        self.length_table.update_tables(false)?;

        // Offset statistics for the next pass.
        let mut i = 0;
        while i < n_bytes {
            let m = match_table[i];
            let len = m.len as usize;
            if m.d > 0 {
                let len_size = self.length_table.symbol_size(len - MIN_REPEAT_LEN);
                if len_size <= 64 {
                    let cost = (len * 9).saturating_sub(1 + len_size);
                    let d = m.d as usize - MIN_REPEAT_DIST;
                    if len > 2 {
                        self.offs3_table.add_symbol(d, cost);
                    } else if len > 1 {
                        self.offs2_table.add_symbol(d, cost);
                    } else {
                        self.offs1_table.add_symbol(d, cost);
                    }
                }
            }
            i += len;
        }
        if first_pass {
            return Ok(0);
        }

        // Encode tables.
        out.push(0x0200_0000 | (self.offs3_prefix_size as u32 - 2));
        let tables = [
            (&self.length_table, LENGTH_NUM_SLOTS),
            (&self.offs1_table, OFFS1_NUM_SLOTS),
            (&self.offs2_table, OFFS2_NUM_SLOTS),
            (&self.offs3_table, self.offs3_num_slots),
        ];
        for (table, n_slots) in tables {
            out.extend((0..n_slots).map(|slot| 0x0400_0000 | table.slot_size(slot) as u32));
        }

        let mut n_symbols = 0;
        let mut i = 0;
        while i < n_bytes {
            let mut m = match_table[i];
            if m.d > 0 {
                let len = m.len as usize;
                let mut n_bits = self.repeat_code_length(m.d as usize, len);
                if n_bits > 64 {
                    n_bits = SIZE_LIMIT;
                }
                if (len >= LITERAL_SEQUENCE_MIN_LENGTH && n_bits > LITERAL_SEQUENCE_MIN_LENGTH + len * 8)
                    || n_bits >= len * 9
                {
                    m.d = 0;
                }
            }
            if m.d > 0 {
                self.write_repeat_code(out, m.d as usize, m.len as usize)?;
                i += m.len as usize;
                n_symbols += 1;
                continue;
            }
            let mut remaining = m.len as usize;
            while remaining >= LITERAL_SEQUENCE_MIN_LENGTH {
                let len = remaining.min(LITERAL_SEQUENCE_MIN_LENGTH + 255);
                // Flag bit and eight ones, then the run length.
                let bits = (LENGTH_NUM_SLOTS + 1) as u32;
                out.push((bits << 24) | ((1 << bits) - 1));
                out.push(0x0800_0000 | (len - LITERAL_SEQUENCE_MIN_LENGTH) as u32);
                out.extend(buf[offs + i..offs + i + len].iter().map(|&b| literal_word(b)));
                i += len;
                remaining -= len;
                n_symbols += 1;
            }
            for _ in 0..remaining {
                out.push(0x0100_0000);
                out.push(literal_word(buf[offs + i]));
                i += 1;
                n_symbols += 1;
            }
        }
        Ok(n_symbols)
    }

    /// Compress `window[offs..offs + n_bytes]` into `out`, falling back to
    /// a stored block when that is not smaller.
    fn compress_block(
        &mut self,
        out: &mut Vec<u32>,
        window: &[u8],
        offs: usize,
        n_bytes: usize,
        is_last: bool,
        fast: bool,
    ) -> Result<()> {
        out.clear();
        self.length_table.clear();
        self.offs1_table.clear();
        self.offs2_table.clear();
        self.offs3_table.clear();

        let mut hashes: Vec<u64> = Vec::new();
        let mut tmp = Vec::new();
        let mut best_size = SIZE_LIMIT;
        let mut n_symbols = 0;
        let mut passes = 0;
        for pass in 0..MAX_PASSES {
            let symbols = self.compress_pass(&mut tmp, window, offs, n_bytes, pass == 0, fast)?;
            passes = pass + 1;
            if pass == 0 {
                continue;
            }
            let mut compressed_size = HEADER_SIZE;
            let mut h: u64 = 1;
            for &w in &tmp {
                compressed_size += ((w & 0x7f00_0000) >> 24) as usize;
                h ^= w as u64;
                h = (h as u32 as u64) * 0xc2b0_c3cc;
                h = (h ^ (h >> 32)) & 0xffff_ffff;
            }
            h |= (compressed_size as u64) << 32;
            trace!("pass {}: {} bits, {} symbols", pass, compressed_size, symbols);
            if compressed_size < best_size {
                n_symbols = symbols;
                best_size = compressed_size;
                out.clear();
                out.extend_from_slice(&[0; 3]);
                out.extend_from_slice(&tmp);
            }
            // The same output twice means the parse has converged.
            if hashes.contains(&h) {
                break;
            }
            hashes.push(h);
        }

        let uncompressed_size = HEADER_SIZE + n_bytes * 8;
        let stored = best_size >= uncompressed_size;
        if stored {
            out.clear();
            out.push(0x1000_0000 | (n_bytes - 1) as u32);
            out.push(0x0100_0000 | is_last as u32);
            out.push(0x0100_0000);
            out.extend(window[offs..offs + n_bytes].iter().map(|&b| literal_word(b)));
        } else {
            out[0] = 0x1000_0000 | (n_symbols - 1) as u32;
            out[1] = 0x0100_0000 | is_last as u32;
            out[2] = 0x0100_0001;
        }
        debug!(
            "block of {} bytes: {} passes, {} bits, {}",
            n_bytes,
            passes,
            best_size.min(uncompressed_size),
            if stored { "stored" } else { "compressed" }
        );
        Ok(())
    }

    fn build_search_table(&mut self, window: &[u8]) -> Result<()> {
        let search = match self.search_table.as_mut() {
            Some(search) => search,
            None => self.search_table.insert(LzSearchTable::new(
                MIN_REPEAT_LEN,
                MAX_REPEAT_LEN,
                LENGTH_MAX_VALUE,
                OFFS1_MAX_VALUE,
                OFFS2_MAX_VALUE,
                MAX_REPEAT_DIST,
            )?),
        };
        search.find_matches(window, 0, window.len())
    }

    /// Compress one window, appending the code words of its blocks to
    /// `out`. `is_last` marks the window that ends the input.
    pub fn compress_window(&mut self, out: &mut Vec<u32>, window: &[u8], is_last: bool, fast: bool) -> Result<()> {
        if window.is_empty() {
            return Ok(());
        }
        self.build_search_table(window)?;

        let mut block = Vec::new();
        let mut offs = 0;
        while offs < window.len() {
            let n_bytes = BLOCK_SIZE.min(window.len() - offs);
            let last = is_last && offs + n_bytes >= window.len();
            self.compress_block(&mut block, window, offs, n_bytes, last, fast)?;
            out.extend_from_slice(&block);
            offs += n_bytes;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compress_words(data: &[u8]) -> Vec<u32> {
        let mut compressor = Compressor::new().unwrap();
        let mut out = Vec::new();
        compressor.compress_window(&mut out, data, true, true).unwrap();
        out
    }

    #[test]
    fn incompressible_block_is_stored() {
        let data = [0x12, 0x34];
        let words = compress_words(&data);
        assert_eq!(
            words,
            [0x1000_0001, 0x0100_0001, 0x0100_0000, literal_word(0x12), literal_word(0x34)]
        );
    }

    #[test]
    fn run_becomes_a_match() {
        let data = b"aaaaaaaaaaa";
        let mut compressor = Compressor::new().unwrap();
        compressor.build_search_table(data).unwrap();
        let mut words = Vec::new();
        compressor.compress_pass(&mut words, data, 0, data.len(), true, false).unwrap();
        let n_symbols = compressor.compress_pass(&mut words, data, 0, data.len(), false, false).unwrap();
        // One literal 'a', then a distance 1 match for the other ten.
        assert_eq!(n_symbols, 2);
        let literals: Vec<u32> = words.iter().copied().filter(|&w| w >= 0x8000_0000).collect();
        assert_eq!(literals, [literal_word(b'a')]);
    }

    #[test]
    fn short_block_is_stored_when_tables_cost_more() {
        // The table section alone outweighs the saving on 11 bytes.
        let words = compress_words(b"aaaaaaaaaaa");
        assert_eq!(words[2], 0x0100_0000);
        assert_eq!(words.len(), 3 + 11);
    }

    #[test]
    fn only_the_final_block_is_last() {
        let data: Vec<u8> = (0..BLOCK_SIZE + 100).map(|i| (i % 251) as u8).collect();
        let mut compressor = Compressor::new().unwrap();
        let mut out = Vec::new();
        compressor.compress_window(&mut out, &data, false, true).unwrap();
        assert_eq!(out[1], 0x0100_0000);
    }
}
