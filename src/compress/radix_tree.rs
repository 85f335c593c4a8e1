// This file is part of sidpack, derived from the plus4emu compression library.
// Copyright (c) 2007-2017 Istvan Varga <istvanv@users.sourceforge.net>. All rights reserved.
// Originally licensed under the GPLv2 or later.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use alloc::vec;
use alloc::vec::Vec;

/// Index of the root node.
const ROOT: usize = 4;

/// Compressed trie of recent strings, used to find short matches.
///
/// Nodes live in one flat buffer as `[length, position, children]`, where
/// `length` is the sub-string length at the node, `position` the start of
/// the most recent full sequence and `children` the index of a table for
/// the top 2 bits of the next byte. A chain of four such tables leads to
/// the child node. The first four entries are always zero, so following a
/// missing child ends at index 0.
#[derive(Clone)]
pub struct RadixTree {
    buf: Vec<u32>,
    pos: usize,
}

impl Default for RadixTree {
    fn default() -> Self {
        RadixTree {
            buf: vec![0; 7],
            pos: ROOT,
        }
    }
}

/// Length of the common prefix of `buf[a..a + la]` and `buf[b..b + lb]`.
#[inline]
fn compare_strings(buf: &[u8], a: usize, la: usize, b: usize, lb: usize) -> usize {
    let l = la.min(lb).min(buf.len() - a).min(buf.len() - b);
    buf[a..a + l]
        .iter()
        .zip(&buf[b..b + l])
        .take_while(|(x, y)| x == y)
        .count()
}

impl RadixTree {
    #[inline]
    fn next_node(&self, c: u8) -> usize {
        let mut next = self.buf[self.pos + 2] as usize;
        for shift in [6, 4, 2, 0] {
            next = self.buf[next + ((c >> shift) & 3) as usize] as usize;
        }
        next
    }

    /// Add the child for byte `c` below the current node and move to it.
    fn alloc_node(&mut self, c: u8) {
        let mut next = self.buf[self.pos + 2] as usize;
        let mut n_bits: i32 = 6;
        let mut size = self.buf.len();
        if next != 0 {
            loop {
                let entry = self.buf[next + ((c >> n_bits) & 3) as usize] as usize;
                if entry == 0 {
                    break;
                }
                next = entry;
                n_bits -= 2;
            }
        } else {
            next = size;
            size += 4;
            self.buf[self.pos + 2] = next as u32;
        }
        let mut table = size;
        size += 3 + (n_bits as usize) * 2;
        self.buf.resize(size, 0);
        while n_bits >= 0 {
            self.buf[next + ((c >> n_bits) & 3) as usize] = table as u32;
            next = table;
            table += 4;
            n_bits -= 2;
        }
        self.pos = next;
    }

    /// Record the smallest distance - 1 for each match length found at
    /// `pos` into `offs[length]`; returns the longest length.
    ///
    /// Only the distance at the end of each tree edge is written. Call
    /// this before [`add_string`](Self::add_string) for the same position.
    pub fn find_matches(
        &mut self,
        offs: &mut [u32],
        buf: &[u8],
        pos: usize,
        max_len: usize,
        max_distance: usize,
    ) -> usize {
        self.pos = ROOT;
        if self.buf[ROOT] == 0 {
            self.pos = self.next_node(buf[pos]);
            if self.pos == 0 {
                return 0;
            }
        } else if buf[pos] != buf[self.buf[ROOT + 1] as usize] {
            return 0;
        }
        let mut len = 0;
        loop {
            let match_pos = self.buf[self.pos + 1] as usize;
            let d = pos - match_pos;
            if d > max_distance {
                return len;
            }
            loop {
                let node_len = self.buf[self.pos] as usize;
                let l = compare_strings(buf, pos + len, max_len - len, match_pos + len, node_len);
                len += l;
                if l < node_len || len >= max_len {
                    self.pos = 0;
                    if l == 0 {
                        return len;
                    }
                    break;
                }
                self.pos = self.next_node(buf[pos + len]);
                if self.pos == 0 || self.buf[self.pos + 1] as usize != match_pos {
                    break;
                }
            }
            offs[len] = (d - 1) as u32;
            if self.pos == 0 {
                return len;
            }
        }
    }

    /// Insert `buf[pos..pos + len]`.
    pub fn add_string(&mut self, buf: &[u8], pos: usize, len: usize) {
        self.pos = ROOT;
        if self.buf[ROOT] == 0 {
            let c = buf[pos];
            let next = self.next_node(c);
            if next == 0 {
                // Empty tree or new leaf below the root.
                if self.buf[ROOT + 2] != 0 {
                    self.alloc_node(c);
                }
                self.set_node(len, pos);
                self.buf[self.pos + 2] = 0;
                return;
            }
            self.pos = next;
        }
        let mut n = 0;
        while n < len {
            if self.buf[self.pos] == 1 && buf[pos + n] == buf[self.buf[self.pos + 1] as usize + n] {
                // Single byte edges.
                loop {
                    self.buf[self.pos + 1] = pos as u32;
                    n += 1;
                    if n >= len {
                        return;
                    }
                    let next = self.next_node(buf[pos + n]);
                    if next == 0 {
                        self.alloc_node(buf[pos + n]);
                        self.set_node(len - n, pos);
                        return;
                    }
                    self.pos = next;
                    if self.buf[self.pos] != 1 {
                        break;
                    }
                }
            }
            let node_len = self.buf[self.pos] as usize;
            let node_pos = self.buf[self.pos + 1] as usize;
            let l = compare_strings(buf, pos + n, len - n, node_pos + n, node_len);
            n += l;
            if l >= node_len {
                // Full match, the node now ends at the newest string.
                self.buf[self.pos + 1] = pos as u32;
                if n >= len {
                    break;
                }
                let c = buf[pos + n];
                let next = self.next_node(c);
                if next != 0 {
                    self.pos = next;
                    continue;
                }
                self.alloc_node(c);
                if self.buf[self.pos] == 0 {
                    self.set_node(len - n, pos);
                    break;
                }
            } else {
                // Partial match: split the edge.
                let split = self.pos;
                let children = self.buf[split + 2];
                self.buf[split + 2] = 0;
                self.alloc_node(buf[node_pos + n]);
                self.buf[self.pos] = (node_len - l) as u32;
                self.buf[self.pos + 1] = node_pos as u32;
                self.buf[self.pos + 2] = children;
                self.buf[split] = l as u32;
                self.buf[split + 1] = pos as u32;
                if n < len {
                    self.pos = split;
                    self.alloc_node(buf[pos + n]);
                    self.set_node(len - n, pos);
                }
                break;
            }
        }
    }

    #[inline]
    fn set_node(&mut self, len: usize, pos: usize) {
        self.buf[self.pos] = len as u32;
        self.buf[self.pos + 1] = pos as u32;
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.buf.resize(7, 0);
        self.pos = ROOT;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_over(data: &[u8], upto: usize, max_len: usize) -> RadixTree {
        let mut tree = RadixTree::default();
        for pos in 0..upto {
            tree.add_string(data, pos, max_len.min(data.len() - pos));
        }
        tree
    }

    #[test]
    fn finds_repeated_prefix() {
        let data = b"abcdXabcdYabcZ";
        let mut tree = tree_over(data, 10, 15);
        let mut offs = [u32::MAX; 16];
        let len = tree.find_matches(&mut offs, data, 10, 4, usize::MAX);
        assert_eq!(len, 3);
        // "abc" last seen 5 bytes back.
        assert_eq!(offs[3], 4);
    }

    #[test]
    fn missing_first_byte_finds_nothing() {
        let data = b"aaaab";
        let mut tree = tree_over(data, 4, 15);
        let mut offs = [u32::MAX; 16];
        assert_eq!(tree.find_matches(&mut offs, data, 4, 1, usize::MAX), 0);
    }

    #[test]
    fn reported_matches_are_real() {
        let data: Vec<u8> = (0..400u32).map(|i| ((i * 7) % 13 + (i / 50) % 3) as u8).collect();
        let mut tree = RadixTree::default();
        for pos in 0..data.len() {
            let max_len = 15.min(data.len() - pos);
            let mut offs = [u32::MAX; 16];
            let len = tree.find_matches(&mut offs, &data, pos, max_len, 1000);
            for (l, &o) in offs.iter().enumerate().take(len + 1).skip(1) {
                if o != u32::MAX {
                    let src = pos - o as usize - 1;
                    assert_eq!(data[src..src + l], data[pos..pos + l]);
                }
            }
            tree.add_string(&data, pos, max_len);
        }
    }
}
