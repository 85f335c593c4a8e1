// This file is part of sidpack, derived from the plus4emu compression library.
// Copyright (c) 2007-2017 Istvan Varga <istvanv@users.sourceforge.net>. All rights reserved.
// Originally licensed under the GPLv2 or later.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

//! Slotted prefix + extra bits statistical coder.
//!
//! A value is coded as the prefix of the slot containing it followed by
//! `slot_bits` bits of offset within the slot. With a 2 bit prefix and
//! slots of (2, 3, 4, 5) bits:
//!
//! ```text
//! 00b  2 bits  0..=3
//! 01b  3 bits  4..=11
//! 10b  4 bits  12..=27
//! 11b  5 bits  28..=59
//! ```

use alloc::vec;
use alloc::vec::Vec;

use crate::error::{Error, Result};

/// Cost charged for a symbol the table cannot encode.
pub const DEFAULT_UNENCODED_COST: usize = 16384;

const MAX_SLOT_BITS: usize = 15;
const SIZE_LIMIT: usize = 0x7fff_ffff;

/// Prefix layout of an [`EncodeTable`].
#[derive(Clone, Copy, Debug)]
pub enum PrefixCode<'a> {
    /// Fixed prefix of this many bits.
    Fixed(usize),
    /// Variable length prefix, one size per slot.
    Variable(&'a [usize]),
    /// Try every fixed prefix size in `min..=max` and keep the cheapest.
    /// `slot_counts[k]` limits the slots for size `min + k`; the default is
    /// every prefix value.
    Range {
        /// Smallest prefix size.
        min: usize,
        /// Largest prefix size.
        max: usize,
        /// Slot count per prefix size.
        slot_counts: Option<&'a [usize]>,
    },
}

/// Statistics and slot layout for one value range.
#[derive(Clone, Debug)]
pub struct EncodeTable {
    n_slots: usize,
    n_symbols: usize,
    n_symbols_used: usize,
    n_symbols_encoded: usize,
    total_slot_weight: usize,
    unused_symbol_size: usize,
    min_prefix_size: usize,
    max_prefix_size: usize,
    prefix_only_symbol_cnt: usize,
    prefix_slot_cnt: Vec<usize>,
    slot_prefix_size: Vec<usize>,
    slot_weight: Vec<usize>,
    slot_bits: Vec<usize>,
    slot_base_symbol: Vec<u32>,
    /// Per symbol counts; prefix sums while optimizing.
    symbol_cnt: Vec<usize>,
    unencoded_cost: Vec<usize>,
    symbol_slot_num: Vec<u8>,
    symbol_size: Vec<u8>,
}

impl EncodeTable {
    /// Table with `n_slots` slots and a 4 bit fixed prefix.
    pub fn new(n_slots: usize, n_symbols: usize) -> Result<Self> {
        Self::with_prefix(n_slots, n_symbols, PrefixCode::Fixed(4))
    }

    /// Table for values `0..n_symbols` with the given prefix layout.
    pub fn with_prefix(n_slots: usize, n_symbols: usize, prefix: PrefixCode<'_>) -> Result<Self> {
        if n_symbols < 1 {
            return Err(Error::Internal("EncodeTable: no symbols"));
        }
        let (min_prefix, max_prefix, slot_counts) = match prefix {
            PrefixCode::Fixed(n) => (n, n, None),
            PrefixCode::Variable(_) => (0, 0, None),
            PrefixCode::Range { min, max, .. } if max <= min => (min, min, None),
            PrefixCode::Range { min, max, slot_counts } => (min, max, slot_counts),
        };
        let prefix_slot_cnt = (min_prefix..=max_prefix)
            .enumerate()
            .map(|(k, size)| match slot_counts {
                Some(counts) => counts[k],
                None if max_prefix > min_prefix => 1 << size,
                None => n_slots,
            })
            .collect();
        let mut table = EncodeTable {
            n_slots,
            n_symbols,
            n_symbols_used: n_symbols,
            n_symbols_encoded: n_symbols,
            total_slot_weight: 0,
            unused_symbol_size: 8192,
            min_prefix_size: min_prefix,
            max_prefix_size: max_prefix,
            prefix_only_symbol_cnt: 0,
            prefix_slot_cnt,
            slot_prefix_size: Vec::new(),
            slot_weight: Vec::new(),
            slot_bits: Vec::new(),
            slot_base_symbol: Vec::new(),
            symbol_cnt: vec![0; n_symbols + 1],
            unencoded_cost: vec![0; n_symbols + 1],
            symbol_slot_num: vec![0; n_symbols],
            symbol_size: vec![0; n_symbols],
        };
        if let PrefixCode::Variable(sizes) = prefix {
            if n_slots < 1 || sizes.len() < n_slots {
                return Err(Error::Internal("EncodeTable: no slots"));
            }
            let sizes = &sizes[..n_slots];
            let longest = sizes.iter().copied().max().unwrap_or(0);
            table.slot_prefix_size = sizes.to_vec();
            table.slot_weight = sizes.iter().map(|&p| 1 << (longest - p)).collect();
            table.slot_bits = vec![0; n_slots];
            table.slot_base_symbol = vec![0; n_slots];
            table.total_slot_weight = table.slot_weight.iter().sum();
        } else {
            table.set_prefix_size(min_prefix)?;
        }
        table.clear();
        Ok(table)
    }

    fn set_prefix_size(&mut self, n: usize) -> Result<()> {
        if n < 1 {
            return Err(Error::Internal("EncodeTable: prefix size < 1"));
        }
        if n < self.min_prefix_size || n > self.max_prefix_size {
            return Err(Error::Internal("EncodeTable: prefix size out of range"));
        }
        self.n_slots = self.prefix_slot_cnt[n - self.min_prefix_size];
        if self.n_slots < 1 {
            return Err(Error::Internal("EncodeTable: no slots"));
        }
        self.slot_prefix_size = vec![n; self.n_slots];
        self.slot_weight = vec![1; self.n_slots];
        self.slot_bits.resize(self.n_slots, 0);
        self.slot_base_symbol.resize(self.n_slots, 0);
        self.total_slot_weight = self.n_slots;
        Ok(())
    }

    // -- Statistics

    /// Count one occurrence of `n`; `unencoded_cost` is charged if the
    /// final table leaves `n` out.
    #[inline]
    pub fn add_symbol(&mut self, n: usize, unencoded_cost: usize) {
        self.symbol_cnt[n] += 1;
        self.unencoded_cost[n] += unencoded_cost;
        if n >= self.n_symbols_used {
            self.n_symbols_used = n + 1;
        }
    }

    /// Count a symbol that occupies a reserved prefix.
    #[inline]
    pub fn add_prefix_only_symbol(&mut self) {
        self.prefix_only_symbol_cnt += 1;
    }

    /// Size reported for values outside the table.
    #[inline]
    pub fn set_unencoded_symbol_size(&mut self, n: usize) {
        self.unused_symbol_size = n;
    }

    /// Number of values the current layout can encode.
    #[inline]
    pub const fn symbols_encoded(&self) -> usize {
        self.n_symbols_encoded
    }

    /// Coded size of `n` in bits.
    #[inline]
    pub fn symbol_size(&self, n: usize) -> usize {
        if n >= self.n_symbols_encoded {
            return self.unused_symbol_size;
        }
        self.symbol_size[n] as usize
    }

    /// Slot containing `n`.
    #[inline]
    pub fn symbol_slot_index(&self, n: usize) -> Result<usize> {
        if n >= self.n_symbols_encoded {
            return Err(Error::Internal("encoding value outside the table"));
        }
        Ok(self.symbol_slot_num[n] as usize)
    }

    /// Extra bits for `n` as `slot_bits << 24 | offset_in_slot`.
    #[inline]
    pub fn encode_symbol(&self, n: usize) -> Result<u32> {
        let slot = self.symbol_slot_index(n)?;
        Ok(((self.slot_bits[slot] as u32) << 24) | (n as u32 - self.slot_base_symbol[slot]))
    }

    /// Number of slots in the current layout.
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slot_bits.len()
    }

    /// Prefix length of slot `n` in bits.
    #[inline]
    pub fn slot_prefix_size(&self, n: usize) -> usize {
        self.slot_prefix_size[n]
    }

    /// Extra bits carried by slot `n`.
    #[inline]
    pub fn slot_size(&self, n: usize) -> usize {
        self.slot_bits[n]
    }

    // -- Optimization

    fn encoded_size(&self) -> usize {
        self.encoded_size_from(0, 0, 0)
    }

    /// Encoded size of the counted symbols, reusing the cost of the slots
    /// before `first_slot`.
    fn encoded_size_from(&self, first_slot: usize, first_symbol: usize, base_size: usize) -> usize {
        let used = self.n_symbols_used;
        let mut total = base_size;
        let mut p = first_symbol;
        for i in first_slot..self.n_slots {
            let symbol_cnt = self.symbol_cnt[p];
            p += 1 << self.slot_bits[i];
            let symbol_size = self.slot_prefix_size[i] + self.slot_bits[i];
            if p >= used {
                return total + (self.symbol_cnt[used] - symbol_cnt) * symbol_size;
            }
            total += (self.symbol_cnt[p] - symbol_cnt) * symbol_size;
        }
        // Symbols past the last slot.
        total + (self.unencoded_cost[used] - self.unencoded_cost[p])
    }

    /// First symbol and cost of the slots before `first_slot`, or `None`
    /// if they already cover every used symbol.
    fn leading_slots_cost(&self, first_slot: usize) -> Option<(usize, usize)> {
        let mut first_symbol = 0;
        let mut base_size = 0;
        for j in 0..first_slot {
            let symbol_cnt = self.symbol_cnt[first_symbol];
            first_symbol += 1 << self.slot_bits[j];
            if first_symbol >= self.n_symbols_used {
                return None;
            }
            base_size += (self.symbol_cnt[first_symbol] - symbol_cnt)
                * (self.slot_prefix_size[j] + self.slot_bits[j]);
        }
        Some((first_symbol, base_size))
    }

    /// Heuristic search: proportional fit, hill climbing, then pair swaps
    /// and a three slot neighbourhood search.
    fn optimize_slot_bits_fast(&mut self) -> Result<usize> {
        let n_slots = self.n_slots;
        let used = self.n_symbols_used;
        let mut total_symbol_cnt = self.symbol_cnt[used];
        let mut slot_weight_sum = self.total_slot_weight;
        let mut slot_end = 0;
        for i in 0..n_slots {
            let slot_begin = slot_end;
            if total_symbol_cnt < 1 {
                self.slot_bits[i] = 0;
                continue;
            }
            if i + 1 < n_slots {
                let mut best_size = 0;
                let mut best_diff = SIZE_LIMIT as i64;
                for j in 0..=MAX_SLOT_BITS {
                    slot_end = (slot_begin + (1 << j)).min(used);
                    if slot_end + ((n_slots - (i + 1)) << 15) < used {
                        continue;
                    }
                    let cnt = (self.symbol_cnt[slot_end] - self.symbol_cnt[slot_begin]) as u64;
                    let share = (cnt * 0x0100_0000 / total_symbol_cnt as u64) as i64;
                    let weight = (self.slot_weight[i] as u64 * 0x0100_0000 / slot_weight_sum as u64) as i64;
                    let d = (share - weight).abs();
                    if d < best_diff || (share == 0 && d == best_diff) {
                        best_size = j;
                        best_diff = d;
                    }
                }
                self.slot_bits[i] = best_size;
            } else {
                // Last slot takes everything left.
                let mut j = 0;
                loop {
                    slot_end = (slot_begin + (1 << j)).min(used);
                    if self.symbol_cnt[slot_end] - self.symbol_cnt[slot_begin] >= total_symbol_cnt {
                        self.slot_bits[i] = j;
                        break;
                    }
                    if j >= MAX_SLOT_BITS {
                        return Err(Error::Internal("EncodeTable: symbols do not fit the slots"));
                    }
                    j += 1;
                }
            }
            slot_end = (slot_begin + (1 << self.slot_bits[i])).min(used);
            total_symbol_cnt -= self.symbol_cnt[slot_end] - self.symbol_cnt[slot_begin];
            slot_weight_sum -= self.slot_weight[i];
        }

        let mut best_size = self.encoded_size();
        for round in 0..4 {
            let grow = round & 1 == 0;
            loop {
                let mut best_slot = None;
                for i in 0..n_slots {
                    let bits = self.slot_bits[i];
                    if (grow && bits >= MAX_SLOT_BITS) || (!grow && bits < 1) {
                        continue;
                    }
                    self.slot_bits[i] = if grow { bits + 1 } else { bits - 1 };
                    let new_size = self.encoded_size();
                    self.slot_bits[i] = bits;
                    if new_size < best_size {
                        best_size = new_size;
                        best_slot = Some(i);
                    }
                }
                let Some(i) = best_slot else { break };
                if grow {
                    self.slot_bits[i] += 1;
                } else {
                    self.slot_bits[i] -= 1;
                }
            }
        }

        let mut best_bits = self.slot_bits.clone();
        loop {
            let mut done = true;
            // Swap pairs of slot sizes.
            for i in 0..n_slots.saturating_sub(1) {
                let Some((first_symbol, base_size)) = self.leading_slots_cost(i) else {
                    continue;
                };
                for j in i + 1..n_slots {
                    if best_bits[i] == best_bits[j] {
                        continue;
                    }
                    self.slot_bits[i] = best_bits[j];
                    self.slot_bits[j] = best_bits[i];
                    let new_size = self.encoded_size_from(i, first_symbol, base_size);
                    if new_size < best_size {
                        best_size = new_size;
                        done = false;
                        best_bits[i] = self.slot_bits[i];
                        best_bits[j] = self.slot_bits[j];
                    } else {
                        self.slot_bits[i] = best_bits[i];
                        self.slot_bits[j] = best_bits[j];
                    }
                }
            }
            // Nudge three neighbouring slots by -1..=1.
            for i in (0..n_slots).rev() {
                let first_slot = i.saturating_sub(2);
                let Some((first_symbol, base_size)) = self.leading_slots_cost(first_slot) else {
                    continue;
                };
                let nudge = |bits: usize, offs: i32| {
                    let v = bits as i32 + offs;
                    (0..=MAX_SLOT_BITS as i32).contains(&v).then_some(v as usize)
                };
                let mut best_offsets = [0i32; 3];
                for offs2 in if i >= 2 { -1 } else { 1 }..=1 {
                    if i >= 2 {
                        let Some(v) = nudge(best_bits[i - 2], offs2) else { continue };
                        self.slot_bits[i - 2] = v;
                    }
                    for offs1 in if i >= 1 { -1 } else { 1 }..=1 {
                        if i >= 1 {
                            let Some(v) = nudge(best_bits[i - 1], offs1) else { continue };
                            self.slot_bits[i - 1] = v;
                        }
                        for offs0 in -1..=1 {
                            let Some(v) = nudge(best_bits[i], offs0) else { continue };
                            self.slot_bits[i] = v;
                            let new_size = self.encoded_size_from(first_slot, first_symbol, base_size);
                            if new_size < best_size {
                                best_size = new_size;
                                done = false;
                                best_offsets = [offs0, offs1, offs2];
                            }
                        }
                    }
                }
                for (k, &offs) in best_offsets.iter().enumerate() {
                    if i >= k {
                        let v = (best_bits[i - k] as i32 + offs) as usize;
                        self.slot_bits[i - k] = v;
                        best_bits[i - k] = v;
                    }
                }
            }
            if done {
                break;
            }
        }

        // Shrink slots while that costs nothing.
        for i in (0..n_slots).rev() {
            while self.slot_bits[i] >= 1 {
                self.slot_bits[i] -= 1;
                let new_size = self.encoded_size();
                if new_size > best_size {
                    self.slot_bits[i] += 1;
                    break;
                }
                best_size = new_size;
            }
        }
        Ok(best_size)
    }

    /// Exact search: dynamic programming over (slot, first symbol).
    fn optimize_slot_bits(&mut self) -> usize {
        self.slot_bits.fill(0);
        let used = self.n_symbols_used;
        if used < 1 {
            return 0;
        }
        let n_slots = self.n_slots;
        // Two slots share a byte, one per nibble.
        let mut slot_bits_buffer = vec![0u8; ((n_slots + 1) >> 1) * used];
        let mut encoded_size: Vec<usize> = (0..=used)
            .map(|i| self.unencoded_cost[used] - self.unencoded_cost[i])
            .collect();
        // Slot sizes below this cannot change the cost at a given start.
        let mut min_slot_size = vec![0usize; used];
        for (i, min_size) in min_slot_size.iter_mut().enumerate() {
            let mut j = 0;
            let mut next_end = i + 2;
            while j < MAX_SLOT_BITS && next_end < used {
                if self.symbol_cnt[next_end] != self.symbol_cnt[i] {
                    break;
                }
                next_end = next_end * 2 - i;
                j += 1;
            }
            *min_size = j;
        }

        for slot_num in (0..n_slots.min(used)).rev() {
            let mut max_slot_size = 0;
            while (1 << max_slot_size) < used && max_slot_size < MAX_SLOT_BITS {
                max_slot_size += 1;
            }
            let mut max_pos = used - ((1 << max_slot_size) >> 1);
            while slot_num >= max_pos {
                max_slot_size -= 1;
                max_pos = used - ((used - max_pos) >> 1);
            }
            let end_pos = ((slot_num << 15) + 1).min(used);
            max_pos = max_pos.min(end_pos);
            let mut i = slot_num;
            loop {
                if i >= max_pos {
                    if i >= end_pos {
                        break;
                    }
                    max_slot_size -= 1;
                    max_pos = used - ((used - max_pos) >> 1);
                }
                // A start at i needs at least popcount(i) earlier slots.
                if i.count_ones() as usize > slot_num {
                    i += 1;
                    continue;
                }
                let base_cnt = self.symbol_cnt[i];
                let mut slot_end = i + (1 << min_slot_size[i]);
                let max_symbol_size = self.slot_prefix_size[slot_num] + max_slot_size;
                let mut best_size = SIZE_LIMIT;
                let mut best_slot_size = 0;
                if let Some(span) = max_slot_size.checked_sub(min_slot_size[i]) {
                    for k in (1..=span.min(MAX_SLOT_BITS)).rev() {
                        let end = slot_end.min(used);
                        let n_bits = (self.symbol_cnt[end] - base_cnt) * (max_symbol_size - k)
                            + encoded_size[end];
                        slot_end = slot_end * 2 - i;
                        if n_bits < best_size {
                            best_size = n_bits;
                            best_slot_size = k;
                        }
                    }
                    let end = slot_end.min(used);
                    let n_bits = (self.symbol_cnt[end] - base_cnt) * max_symbol_size + encoded_size[end];
                    if n_bits < best_size {
                        best_size = n_bits;
                        best_slot_size = 0;
                    }
                }
                slot_bits_buffer[(slot_num >> 1) * used + i] |=
                    ((max_slot_size - best_slot_size) << ((slot_num & 1) << 2)) as u8;
                encoded_size[i] = best_size;
                i += 1;
            }
        }

        let mut slot_begin = 0;
        for i in 0..n_slots {
            self.slot_bits[i] =
                ((slot_bits_buffer[(i >> 1) * used + slot_begin] >> ((i & 1) << 2)) & 0x0f) as usize;
            slot_begin += 1 << self.slot_bits[i];
            if slot_begin >= used {
                break;
            }
        }
        for i in (0..n_slots).rev() {
            while self.slot_bits[i] >= 1 {
                self.slot_bits[i] -= 1;
                if self.encoded_size() != encoded_size[0] {
                    self.slot_bits[i] += 1;
                    break;
                }
            }
        }
        encoded_size[0]
    }

    /// Pick the slot layout for the counted symbols and reset the counts.
    ///
    /// `fast` trades compression for speed. On failure the table is
    /// cleared.
    pub fn update_tables(&mut self, fast: bool) -> Result<()> {
        let result = self.try_update_tables(fast);
        if result.is_err() {
            self.clear();
        }
        result
    }

    fn try_update_tables(&mut self, fast: bool) -> Result<()> {
        let used = self.n_symbols_used;
        let mut total_cnt = 0;
        let mut total_cost = 0;
        for i in 0..used {
            let cnt = self.symbol_cnt[i];
            self.symbol_cnt[i] = total_cnt;
            total_cnt += cnt;
            let cost = self.unencoded_cost[i];
            self.unencoded_cost[i] = total_cost;
            total_cost += cost;
        }
        self.symbol_cnt[used] = total_cnt;
        self.unencoded_cost[used] = total_cost;

        let ranged = self.max_prefix_size > self.min_prefix_size;
        let mut best: Option<(usize, usize, Vec<usize>)> = None;
        for prefix_size in self.min_prefix_size..=self.max_prefix_size {
            if ranged {
                self.set_prefix_size(prefix_size)?;
            }
            if used > (0x8000 << prefix_size) && prefix_size > 0 {
                if prefix_size >= self.max_prefix_size {
                    return Err(Error::Internal("EncodeTable: too many symbols"));
                }
                continue;
            }
            let mut size = if fast {
                self.optimize_slot_bits_fast()?
            } else {
                self.optimize_slot_bits()
            };
            if ranged {
                size += self.n_slots * 4 + self.prefix_only_symbol_cnt * prefix_size;
            }
            if best.as_ref().map_or(size < SIZE_LIMIT, |(best_size, ..)| size < *best_size) {
                best = Some((size, prefix_size, self.slot_bits.clone()));
            }
        }
        let Some((_, best_prefix_size, best_bits)) = best else {
            return Err(Error::Internal("EncodeTable: no usable layout"));
        };
        if ranged {
            self.set_prefix_size(best_prefix_size)?;
        }
        self.slot_bits.copy_from_slice(&best_bits);

        let mut base = 0usize;
        for i in 0..self.n_slots {
            self.slot_base_symbol[i] = base as u32;
            let prev = base;
            base = (prev + (1 << self.slot_bits[i])).min(self.n_symbols);
            let size = (self.slot_prefix_size[i] + self.slot_bits[i]) as u8;
            self.symbol_slot_num[prev..base].fill(i as u8);
            self.symbol_size[prev..base].fill(size);
        }
        self.symbol_cnt[..=used].fill(0);
        self.unencoded_cost[..=used].fill(0);
        self.n_symbols_used = 0;
        self.n_symbols_encoded = base;
        self.prefix_only_symbol_cnt = 0;
        Ok(())
    }

    /// Forget the statistics and the layout.
    pub fn clear(&mut self) {
        self.slot_bits.fill(0);
        self.slot_base_symbol.fill(0);
        let end = self.n_symbols_used.max(self.n_symbols_encoded);
        self.symbol_cnt[..=end].fill(0);
        self.unencoded_cost[..=end].fill(0);
        self.symbol_slot_num[..end].fill(0);
        self.symbol_size[..end].fill(1);
        self.n_symbols_used = 0;
        self.n_symbols_encoded = 0;
        self.prefix_only_symbol_cnt = 0;
    }
}
