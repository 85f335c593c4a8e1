// This file is part of sidpack, derived from the plus4emu compression library.
// Copyright (c) 2007-2017 Istvan Varga <istvanv@users.sourceforge.net>. All rights reserved.
// Originally licensed under the GPLv2 or later.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

//! Length limited Huffman coding (package-merge).

use alloc::vec;
use alloc::vec::Vec;

use crate::error::{Error, Result};

const WEIGHT_MASK: u32 = 0xffff_fc00;

/// Tree node: weight in bits 10..31, symbol in bits 0..9.
#[derive(Clone, Copy, Default)]
struct Node {
    data: u32,
    /// Index + 1 of this node.
    buf_pos: u16,
    /// Index + 1 of the next node in the package (0 = none).
    next_pos: u16,
}

impl Node {
    const fn value(&self) -> usize {
        (self.data & 0x3ff) as usize
    }
}

/// Append package `b` to package `a`.
fn merge(nodes: &mut [Node], a: usize, b: usize) {
    nodes[a].data = nodes[a].data.wrapping_add(nodes[b].data & WEIGHT_MASK);
    let mut p = a;
    if nodes[a].next_pos != 0 {
        if nodes[b].next_pos == 0 {
            nodes[b].next_pos = nodes[a].next_pos;
        } else {
            while nodes[p].next_pos != 0 {
                p = nodes[p].next_pos as usize - 1;
            }
        }
    }
    nodes[p].next_pos = nodes[b].buf_pos;
}

/// Builds canonical prefix codes of bounded length from symbol counts.
///
/// Encoded entries are `length << 24 | code`; zero marks an unused symbol.
#[derive(Clone)]
pub struct HuffmanEncoder {
    min_symbols: usize,
    symbol_range_used: usize,
    symbol_counts: Vec<u32>,
    encode_table: Vec<u32>,
}

impl HuffmanEncoder {
    /// Encoder for symbols `0..max_symbols`; at least `min_symbols` are
    /// always reported as used.
    pub fn new(max_symbols: usize, min_symbols: usize) -> Self {
        HuffmanEncoder {
            min_symbols,
            symbol_range_used: min_symbols,
            symbol_counts: vec![0; max_symbols],
            encode_table: vec![0; max_symbols],
        }
    }

    /// Count one occurrence of `c`.
    #[inline]
    pub fn add_symbol(&mut self, c: usize) {
        self.symbol_counts[c] += 1;
    }

    /// Code word of `c`, an error if it has no code.
    #[inline]
    pub fn encode_symbol(&self, c: usize) -> Result<u32> {
        match self.encode_table[c] {
            0 => Err(Error::Internal("encoding symbol without a Huffman code")),
            code => Ok(code),
        }
    }

    /// Code length of `c`, or 0x3fff if it has no code.
    #[inline]
    pub fn symbol_size(&self, c: usize) -> usize {
        match self.encode_table[c] {
            0 => 0x3fff,
            code => ((code >> 24) & 0x7f) as usize,
        }
    }

    /// One past the highest symbol with a code, at least the minimum.
    pub const fn symbol_range_used(&self) -> usize {
        self.symbol_range_used
    }

    /// Build the code table and reset the counts.
    ///
    /// With `preset` the code lengths are taken from it instead of the
    /// counts. Reversed codes are for LSB-first bit streams.
    pub fn update_tables(
        &mut self,
        reverse_bits: bool,
        max_code_len: usize,
        preset: Option<&[u8]>,
    ) -> Result<()> {
        self.symbol_range_used = 0;
        if let Some(lengths) = preset {
            for (i, entry) in self.encode_table.iter_mut().enumerate() {
                self.symbol_counts[i] = 0;
                *entry = 0;
                if lengths[i] != 0 {
                    *entry = (lengths[i] as u32) << 24;
                    self.symbol_range_used = i + 1;
                }
            }
        } else {
            self.encode_table.fill(0);
            let mut n = 0;
            for (i, &count) in self.symbol_counts.iter().enumerate() {
                if count > 0 {
                    self.symbol_range_used = i + 1;
                    n += 1;
                }
            }
            if n <= 2 {
                // One bit is enough.
                let mut code = 0;
                for i in 0..self.symbol_range_used {
                    if self.symbol_counts[i] > 0 {
                        self.symbol_counts[i] = 0;
                        self.encode_table[i] = 0x0100_0000 | code;
                        code += 1;
                    }
                }
            } else {
                self.build_code_lengths(n, max_code_len);
            }
        }

        // Convert code lengths to canonical codes.
        let mut size_counts = [0u32; 20];
        let mut size_codes = [0u32; 20];
        for &entry in &self.encode_table[..self.symbol_range_used] {
            let len = (entry >> 24) as usize;
            if len > max_code_len {
                return Err(Error::Internal("Huffman code length out of range"));
            }
            size_counts[len] += 1;
        }
        size_counts[0] = 0;
        for i in 1..=max_code_len {
            size_codes[i] = (size_codes[i - 1] + size_counts[i - 1]) << 1;
        }
        for entry in &mut self.encode_table[..self.symbol_range_used] {
            if *entry != 0 {
                let len = (*entry >> 24) as usize;
                let mut code = size_codes[len];
                size_codes[len] += 1;
                if reverse_bits {
                    code = (code as u16).reverse_bits() as u32 >> (16 - len);
                }
                *entry |= code;
            }
        }
        self.symbol_range_used = self.symbol_range_used.max(self.min_symbols);
        Ok(())
    }

    /// Package-merge over the `n` used symbols; leaves code lengths in the
    /// top byte of the encode table.
    fn build_code_lengths(&mut self, n: usize, max_code_len: usize) {
        let buf1 = n;
        let buf2 = 2 * n;
        let mut alloc = 4 * n;
        let mut nodes = vec![Node::default(); 4 * n + n * max_code_len];

        let mut j = 0;
        for i in 0..self.symbol_range_used {
            if self.symbol_counts[i] > 0 {
                nodes[j].data = (self.symbol_counts[i] << 10) | i as u32;
                self.symbol_counts[i] = 0;
                j += 1;
            }
        }
        // Stable on equal weights.
        nodes[..n].sort_by_key(|node| node.data & WEIGHT_MASK);
        for (i, node) in nodes[..n].iter_mut().enumerate() {
            node.buf_pos = (i + 1) as u16;
        }

        let mut buf1_size = 0;
        for _ in 0..max_code_len {
            // Merge leaves and packages; leaves win ties.
            let (mut j, mut k, mut l) = (0, 0, 0);
            while j < n || k < buf1_size {
                let take_package = k < buf1_size
                    && (j >= n || nodes[buf1 + k].data & WEIGHT_MASK < nodes[j].data & WEIGHT_MASK);
                if take_package {
                    nodes[buf2 + l] = nodes[buf1 + k];
                    k += 1;
                } else {
                    nodes[alloc] = nodes[j];
                    nodes[alloc].buf_pos = (alloc + 1) as u16;
                    nodes[buf2 + l] = nodes[alloc];
                    alloc += 1;
                    j += 1;
                }
                l += 1;
            }
            buf1_size = l >> 1;
            // Package pairs.
            for j in 0..buf1_size {
                let k = buf2 + (j << 1);
                let l = k + 1;
                merge(&mut nodes, k, l);
                let (a, b) = (nodes[k], nodes[l]);
                nodes[a.buf_pos as usize - 1] = a;
                nodes[b.buf_pos as usize - 1] = b;
                nodes[buf1 + j] = a;
            }
        }

        for i in 0..buf1_size {
            let mut p = nodes[buf1 + i];
            loop {
                self.encode_table[p.value()] += 0x0100_0000;
                if p.next_pos == 0 {
                    break;
                }
                p = nodes[p.next_pos as usize - 1];
            }
        }
    }

    /// Reset counts and codes.
    pub fn clear(&mut self) {
        self.symbol_range_used = self.min_symbols;
        self.symbol_counts.fill(0);
        self.encode_table.fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(counts: &[(usize, u32)], max_len: usize) -> HuffmanEncoder {
        let mut enc = HuffmanEncoder::new(32, 1);
        for &(sym, count) in counts {
            for _ in 0..count {
                enc.add_symbol(sym);
            }
        }
        enc.update_tables(false, max_len, None).unwrap();
        enc
    }

    /// `(code, length)` of every symbol with a code, checked to form a
    /// prefix code within `max_len` bits.
    fn prefix_code(enc: &HuffmanEncoder, max_len: usize) -> Vec<(usize, u32, usize)> {
        let codes: Vec<(usize, u32, usize)> = (0..32)
            .filter(|&c| enc.symbol_size(c) != 0x3fff)
            .map(|c| (c, enc.encode_symbol(c).unwrap() & 0xffff, enc.symbol_size(c)))
            .collect();
        let kraft: f64 = codes.iter().map(|&(_, _, len)| 1.0 / (1u32 << len) as f64).sum();
        assert!(kraft <= 1.0 + 1e-9, "kraft sum {}", kraft);
        for (i, &(_, ca, la)) in codes.iter().enumerate() {
            assert!((1..=max_len).contains(&la));
            for &(_, cb, lb) in &codes[i + 1..] {
                let l = la.min(lb);
                assert_ne!(ca >> (la - l), cb >> (lb - l));
            }
        }
        codes
    }

    #[test]
    fn codes_form_a_prefix_code() {
        let enc = build(&[(0, 40), (1, 20), (2, 10), (3, 5), (4, 3), (5, 1), (9, 1)], 15);
        let codes = prefix_code(&enc, 15);
        assert_eq!(codes.len(), 7);
        let kraft: f64 = codes.iter().map(|&(_, _, len)| 1.0 / (1u32 << len) as f64).sum();
        approx::assert_abs_diff_eq!(kraft, 1.0);
        assert_eq!(enc.symbol_size(0), 1);
    }

    /// Random distributions and length limits: every counted symbol gets a
    /// code, and a bit stream of codes decodes back to the symbols.
    #[test]
    fn random_distributions_decode() {
        use alloc::collections::BTreeMap;

        let mut seed: u32 = 0x1234_5679;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            seed
        };
        for round in 0..200 {
            let max_len = [5, 6, 8, 11, 15][round % 5];
            let mut counts = Vec::new();
            for sym in 0..32 {
                if next() % 3 != 0 || (counts.len() < 3 && sym >= 29) {
                    let r = next();
                    counts.push((sym, 1 + r % (1 << (r >> 24) % 11)));
                }
            }
            let enc = build(&counts, max_len);
            let codes = prefix_code(&enc, max_len);
            assert_eq!(codes.len(), counts.len(), "round {}", round);

            let decoder: BTreeMap<(usize, u32), usize> =
                codes.iter().map(|&(sym, code, len)| ((len, code), sym)).collect();
            let message: Vec<usize> = (0..64).map(|k| counts[(k * 7 + round) % counts.len()].0).collect();
            let mut bits = Vec::new();
            for &sym in &message {
                let code = enc.encode_symbol(sym).unwrap();
                let len = enc.symbol_size(sym);
                bits.extend((0..len).rev().map(|k| (code >> k) & 1));
            }
            let mut decoded = Vec::new();
            let (mut code, mut len) = (0u32, 0usize);
            for bit in bits {
                code = (code << 1) | bit;
                len += 1;
                if let Some(&sym) = decoder.get(&(len, code)) {
                    decoded.push(sym);
                    code = 0;
                    len = 0;
                }
            }
            assert_eq!(len, 0);
            assert_eq!(decoded, message, "round {}", round);
        }
    }

    #[test]
    fn length_limit_is_honored() {
        let counts: Vec<(usize, u32)> = (0..12).map(|i| (i, 1 << i)).collect();
        let enc = build(&counts, 5);
        assert!((0..12).all(|c| enc.symbol_size(c) <= 5));
    }

    #[test]
    fn two_symbols_get_one_bit_each() {
        let enc = build(&[(3, 7), (8, 1)], 15);
        assert_eq!(enc.encode_symbol(3), Ok(0x0100_0000));
        assert_eq!(enc.encode_symbol(8), Ok(0x0100_0001));
        assert_eq!(enc.symbol_range_used(), 9);
        assert!(enc.encode_symbol(4).is_err());
    }

    #[test]
    fn preset_lengths_are_reversed() {
        let mut enc = HuffmanEncoder::new(4, 0);
        enc.update_tables(true, 15, Some(&[1, 2, 3, 3])).unwrap();
        assert_eq!(enc.encode_symbol(0), Ok(0x0100_0000));
        assert_eq!(enc.encode_symbol(1), Ok(0x0200_0001));
        assert_eq!(enc.encode_symbol(2), Ok(0x0300_0003));
        assert_eq!(enc.encode_symbol(3), Ok(0x0300_0007));
    }
}
