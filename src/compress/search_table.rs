// This file is part of sidpack, derived from the plus4emu compression library.
// Copyright (c) 2007-2017 Istvan Varga <istvanv@users.sourceforge.net>. All rights reserved.
// Originally licensed under the GPLv2 or later.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

//! Match finder: a radix tree for short matches and a suffix array for
//! long ones.

use alloc::vec;
use alloc::vec::Vec;

use super::radix_tree::RadixTree;
use crate::error::{Error, Result};

/// Matches up to this length come from the radix tree.
const TREE_MAX_LEN: usize = 15;

/// Common prefix length of `buf[a..]` and `buf[b..]`, at most `l`.
#[inline]
fn common_prefix(buf: &[u8], a: usize, b: usize, l: usize) -> usize {
    buf[a..a + l]
        .iter()
        .zip(&buf[b..b + l])
        .take_while(|(x, y)| x == y)
        .count()
}

/// Merge sort of suffix start positions. Suffixes compare on at most
/// `max_len` bytes; equal ones keep buffer order. `runs[p - base]` is the
/// length of the run of equal bytes starting at `p`.
fn sort_suffixes(
    sa: &mut [u32],
    tmp: &mut [u32],
    buf: &[u8],
    max_len: usize,
    runs: &[u16],
    base: usize,
) {
    let n = sa.len();
    let mid = n >> 1;
    if mid > 1 {
        sort_suffixes(&mut sa[..mid], tmp, buf, max_len, runs, base);
    }
    if n - mid > 1 {
        sort_suffixes(&mut sa[mid..], tmp, buf, max_len, runs, base);
    }
    let (mut p1, mut p2) = (0, mid);
    for slot in tmp[..n].iter_mut() {
        *slot = if p1 >= mid {
            p2 += 1;
            sa[p2 - 1]
        } else if p2 >= n {
            p1 += 1;
            sa[p1 - 1]
        } else {
            let pos1 = sa[p1] as usize;
            let pos2 = sa[p2] as usize;
            let l = (buf.len() - pos1.max(pos2)).min(max_len);
            let ord = if buf[pos1] == buf[pos2] {
                let skip = runs[pos1 - base].min(runs[pos2 - base]) as usize;
                if l > skip {
                    buf[pos1 + skip..pos1 + l].cmp(&buf[pos2 + skip..pos2 + l])
                } else {
                    core::cmp::Ordering::Equal
                }
            } else {
                buf[pos1].cmp(&buf[pos2])
            };
            if ord.is_lt() || (ord.is_eq() && pos1 < pos2) {
                p1 += 1;
                sa[p1 - 1]
            } else {
                p2 += 1;
                sa[p2 - 1]
            }
        };
    }
    sa.copy_from_slice(&tmp[..n]);
}

/// All useful matches for every position of a buffer.
///
/// For each position the matches are listed longest first, each packed as
/// `length | distance << 10` and terminated by zero. When lengths above
/// 1023 are allowed, the first match is stored as two words: the length,
/// then `distance << 10`.
#[derive(Clone)]
pub struct LzSearchTable {
    match_table: Vec<u32>,
    match_table_buf: Vec<u32>,
    tree: RadixTree,
    min_length: usize,
    max_length: usize,
    length_max_value: usize,
    max_offs1: u32,
    max_offs2: u32,
    max_offs: u32,
}

impl LzSearchTable {
    /// * `min_length` / `max_length`: match lengths searched exhaustively
    ///   (`max_length` at most 1023).
    /// * `length_max_value`: longest length the encoder supports.
    /// * `max_offs1` / `max_offs2`: distance limits for lengths 1 and 2.
    /// * `max_offs`: distance limit for all matches (at most 0x3fffff).
    pub fn new(
        min_length: usize,
        max_length: usize,
        length_max_value: usize,
        max_offs1: usize,
        max_offs2: usize,
        max_offs: usize,
    ) -> Result<Self> {
        if min_length < 1
            || min_length > max_length
            || max_length > 1023
            || length_max_value < max_length
            || max_offs < 1
            || max_offs > 0x003f_ffff
            || (min_length < 3 && max_offs2 < 1)
            || (min_length < 2 && (max_offs1 < 1 || max_offs1 > max_offs2))
        {
            return Err(Error::Internal("invalid match length or offset range"));
        }
        let clamp = |offs: usize| if offs > 1 { offs.min(max_offs) as u32 } else { 1 };
        Ok(LzSearchTable {
            match_table: Vec::new(),
            match_table_buf: Vec::new(),
            tree: RadixTree::default(),
            min_length,
            max_length,
            length_max_value,
            max_offs1: clamp(max_offs1),
            max_offs2: clamp(max_offs2),
            max_offs: max_offs as u32,
        })
    }

    /// Match list for position `pos` (relative to the searched range).
    #[inline]
    pub fn matches(&self, pos: usize) -> &[u32] {
        &self.match_table_buf[self.match_table[pos] as usize..]
    }

    /// Store the matches collected in `offs_table` for `pos`, keeping only
    /// those closer than every longer one, and reset the table.
    fn add_matches(&mut self, pos: usize, offs_table: &mut [u32], max_len: usize) {
        self.match_table[pos] = 0;
        let mut prv_dist = self.max_offs;
        let mut first = true;
        for k in (self.min_length..=max_len).rev() {
            let d = offs_table[k];
            offs_table[k] = self.max_offs;
            if d >= prv_dist {
                continue;
            }
            prv_dist = d;
            if k < 3 && d >= if k == 1 { self.max_offs1 } else { self.max_offs2 } {
                continue;
            }
            let mut l = k as u32;
            if first {
                first = false;
                self.match_table[pos] = self.match_table_buf.len() as u32;
                if self.length_max_value > 1023 {
                    self.match_table_buf.push(l);
                    l = 0;
                }
            }
            self.match_table_buf.push(l | ((d + 1) << 10));
            if d == 0 {
                break;
            }
        }
        if !first {
            self.match_table_buf.push(0);
        }
    }

    /// Find the matches for `buf[offs..offs + n_bytes]`. Up to `max_offs`
    /// bytes before `offs` are searched as well; positions are reported
    /// relative to `offs`.
    pub fn find_matches(&mut self, buf: &[u8], offs: usize, n_bytes: usize) -> Result<()> {
        if n_bytes < 1 || ((offs | n_bytes | (offs + n_bytes)) & !0x7fff_ffff) != 0 {
            return Err(Error::Internal("invalid search buffer size"));
        }
        let buf = &buf[..offs + n_bytes];
        let buf_size = buf.len();
        let max_length = self.max_length;
        let max_offs = self.max_offs as usize;
        let tree_max_len = max_length.min(TREE_MAX_LEN);

        self.match_table.clear();
        self.match_table.resize(n_bytes, u32::MAX);
        self.match_table_buf.clear();
        self.match_table_buf.push(0);

        let mut offs_table = vec![self.max_offs; max_length + 1];
        // Distance 1 (RLE) matches.
        let mut rle_length = vec![0u16; n_bytes + 1];
        for i in (1..n_bytes).rev() {
            if buf[offs + i] == buf[offs + i - 1] {
                let l = rle_length[i + 1];
                rle_length[i] = l + (l < max_length as u16) as u16;
            }
        }

        let mut suffix_array: Vec<u32> = Vec::new();
        let mut inv_suffix_array: Vec<u32> = Vec::new();
        let mut prv_match_len: Vec<u16> = Vec::new();
        let mut start_pos = offs;
        while start_pos < buf_size {
            let window_start = start_pos.saturating_sub(max_offs);
            let mut end_pos = start_pos + max_offs;
            if end_pos > buf_size || n_bytes <= max_offs * 2 {
                end_pos = buf_size;
            }
            let n = end_pos - window_start;

            // Byte run lengths, used to speed up the suffix sort.
            prv_match_len.clear();
            prv_match_len.resize(n + 1, 1);
            for i in (0..n - 1).rev() {
                if buf[window_start + i] == buf[window_start + i + 1] {
                    let l = prv_match_len[i + 1];
                    prv_match_len[i] = l + (l < max_length as u16) as u16;
                }
            }
            suffix_array.clear();
            suffix_array.extend((window_start..end_pos).map(|p| p as u32));
            inv_suffix_array.clear();
            inv_suffix_array.resize(n, 0);
            if n > 1 {
                sort_suffixes(
                    &mut suffix_array,
                    &mut inv_suffix_array,
                    buf,
                    max_length,
                    &prv_match_len,
                    window_start,
                );
            }
            for (i, &p) in suffix_array.iter().enumerate() {
                inv_suffix_array[p as usize - window_start] = i as u32;
            }
            // prv_match_len[k]: common prefix of suffixes k - 1 and k, if
            // longer than the tree handles.
            prv_match_len[0] = 0;
            for i in 1..n {
                let p1 = suffix_array[i - 1] as usize;
                let p2 = suffix_array[i] as usize;
                let max_len = (buf_size - p1.max(p2)).min(max_length);
                let min_len = tree_max_len + 1;
                prv_match_len[i] = 0;
                if max_len >= min_len && buf[p1..p1 + min_len] == buf[p2..p2 + min_len] {
                    let rest = common_prefix(buf, p1 + min_len, p2 + min_len, max_len - min_len);
                    prv_match_len[i] = (min_len + rest) as u16;
                }
            }
            prv_match_len[n] = 0;

            for i in window_start..start_pos {
                let max_len = (buf_size - i).min(tree_max_len);
                self.tree.add_string(buf, i, max_len);
            }
            for i in start_pos..end_pos {
                let mut max_len = (buf_size - i).min(tree_max_len);
                let rle_len = rle_length[i - offs] as usize;
                let mut tree_len = 0;
                if rle_len < max_len {
                    tree_len = self.tree.find_matches(&mut offs_table, buf, i, max_len, max_offs);
                }
                if rle_len > tree_len {
                    tree_len = rle_len;
                    offs_table[rle_len] = 0;
                }
                self.tree.add_string(buf, i, max_len);
                if tree_len < tree_max_len {
                    // The tree found everything.
                    self.add_matches(i - offs, &mut offs_table, tree_len);
                    continue;
                }
                max_len = tree_len;

                let rank = inv_suffix_array[i - window_start] as usize;
                let mut match_len = prv_match_len[rank] as usize;
                if rank > 0 && match_len >= max_length {
                    // Maximum length matches are sorted by position, so the
                    // previous suffix is the nearest; if it overlaps the
                    // current position nothing else can be closer.
                    let back = (i as u32).wrapping_sub(suffix_array[rank - 1]) as usize;
                    if back < match_len && back <= max_offs {
                        max_len = match_len;
                        offs_table[match_len] = (back - 1) as u32;
                    }
                }
                let min_len = (max_len + 1).max(tree_max_len + 1);
                // Scan the suffixes sorted before this one.
                if match_len >= min_len {
                    max_len = max_len.max(match_len);
                    let mut d = self.max_offs;
                    let mut ndx = rank;
                    loop {
                        ndx -= 1;
                        d = d.min((i as u32).wrapping_sub(suffix_array[ndx] + 1));
                        if (prv_match_len[ndx] as usize) < match_len {
                            offs_table[match_len] = offs_table[match_len].min(d);
                            match_len = prv_match_len[ndx] as usize;
                            if match_len < min_len {
                                break;
                            }
                        }
                    }
                }
                // And the ones sorted after it.
                match_len = prv_match_len[rank + 1] as usize;
                if match_len >= min_len {
                    max_len = max_len.max(match_len);
                    let mut d = offs_table[match_len];
                    let mut ndx = rank;
                    loop {
                        ndx += 1;
                        d = d.min((i as u32).wrapping_sub(suffix_array[ndx] + 1));
                        if (prv_match_len[ndx + 1] as usize) < match_len {
                            offs_table[match_len] = offs_table[match_len].min(d);
                            match_len = prv_match_len[ndx + 1] as usize;
                            if match_len < min_len {
                                break;
                            }
                        }
                    }
                }
                self.add_matches(i - offs, &mut offs_table, max_len);
            }
            self.tree.clear();
            start_pos = end_pos;
        }

        // Extend maximum length matches that continue at the next position.
        let length_max_value = self.length_max_value;
        if length_max_value <= max_length || n_bytes < 2 {
            return Ok(());
        }
        let len_mask: u32 = if length_max_value < 1024 { 0x3ff } else { u32::MAX };
        let dist_offs = (length_max_value >= 1024) as usize;
        for i in (0..n_bytes - 1).rev() {
            let m0 = self.match_table[i] as usize;
            let m1 = self.match_table[i + 1] as usize;
            let w0 = self.match_table_buf[m0];
            let w1 = self.match_table_buf[m1];
            if (w0 & len_mask) as usize >= max_length
                && (w1 & len_mask) as usize >= max_length
                && ((self.match_table_buf[m0 + dist_offs] ^ self.match_table_buf[m1 + dist_offs])
                    & 0xffff_fc00)
                    == 0
            {
                self.match_table_buf[m0] = if ((w1 & len_mask) as usize) < length_max_value {
                    w1 + 1
                } else {
                    w1
                };
            }
        }
        Ok(())
    }
}
