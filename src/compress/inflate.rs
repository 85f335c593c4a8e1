// This file is part of sidpack, derived from the plus4emu compression library.
// Copyright (c) 2007-2017 Istvan Varga <istvanv@users.sourceforge.net>. All rights reserved.
// Originally licensed under the GPLv2 or later.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

//! zlib stream decoder.
//!
//! Besides standard Deflate, two extra length codes are understood: 0x11e
//! is a 2 byte match and 0x11f a 2 byte match at the previous distance.
//! Distance codes 30 and 31 reach up to 65536 bytes back.

use alloc::vec::Vec;

use super::zlib::{adler32, fixed_code_lengths, CODE_LENGTH_ORDER};
use crate::error::{DataError, Result};

/// Largest output accepted.
const MAX_DATA_SIZE: usize = 0x0400_0000;
const MAX_CODE_LEN: usize = 15;

struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    shift_reg: u8,
    bits_left: u8,
}

impl<'a> BitReader<'a> {
    fn byte(&mut self) -> Result<u8> {
        let b = *self.data.get(self.pos).ok_or(DataError::Truncated)?;
        self.pos += 1;
        Ok(b)
    }

    fn bit(&mut self) -> Result<u32> {
        if self.bits_left == 0 {
            self.shift_reg = self.byte()?;
            self.bits_left = 8;
        }
        let b = (self.shift_reg & 1) as u32;
        self.shift_reg >>= 1;
        self.bits_left -= 1;
        Ok(b)
    }

    /// `n` bits, least significant first.
    fn bits(&mut self, n: u32) -> Result<u32> {
        let mut value = 0;
        for k in 0..n {
            value |= self.bit()? << k;
        }
        Ok(value)
    }

    /// Drop the rest of the current byte.
    fn align(&mut self) {
        self.bits_left = 0;
    }
}

/// Canonical Huffman decoder: symbol count per code length and the
/// symbols sorted by code.
struct Huffman {
    counts: [u16; MAX_CODE_LEN + 1],
    symbols: Vec<u16>,
}

impl Huffman {
    fn new(lengths: &[u8]) -> Self {
        let mut counts = [0u16; MAX_CODE_LEN + 1];
        for &len in lengths {
            counts[len as usize] += 1;
        }
        counts[0] = 0;
        let mut offsets = [0u16; MAX_CODE_LEN + 2];
        for len in 1..=MAX_CODE_LEN {
            offsets[len + 1] = offsets[len] + counts[len];
        }
        let mut symbols = alloc::vec![0u16; offsets[MAX_CODE_LEN + 1] as usize];
        for (symbol, &len) in lengths.iter().enumerate() {
            if len != 0 {
                symbols[offsets[len as usize] as usize] = symbol as u16;
                offsets[len as usize] += 1;
            }
        }
        Huffman { counts, symbols }
    }

    fn decode(&self, reader: &mut BitReader<'_>) -> Result<usize> {
        let mut code: i32 = 0;
        let mut first: i32 = 0;
        let mut index: i32 = 0;
        for len in 1..=MAX_CODE_LEN {
            code |= reader.bit()? as i32;
            let count = self.counts[len] as i32;
            if code - first < count {
                return Ok(self.symbols[(index + code - first) as usize] as usize);
            }
            index += count;
            first = (first + count) << 1;
            code <<= 1;
        }
        Err(DataError::InvalidCode.into())
    }
}

/// Literal/length and distance decoders of a Huffman block.
fn read_tables(reader: &mut BitReader<'_>, block_type: u32) -> Result<(Huffman, Huffman)> {
    if block_type == 1 {
        let lengths = fixed_code_lengths();
        return Ok((Huffman::new(&lengths[..288]), Huffman::new(&lengths[288..])));
    }
    let lit_cnt = reader.bits(5)? as usize + 257;
    let dist_cnt = reader.bits(5)? as usize + 1;
    let code_cnt = reader.bits(4)? as usize + 4;
    let mut code_lengths = [0u8; 19];
    for &sym in &CODE_LENGTH_ORDER[..code_cnt] {
        code_lengths[sym as usize] = reader.bits(3)? as u8;
    }
    let code_len_decoder = Huffman::new(&code_lengths);

    // Literal/length lengths at 0..288, distance lengths at 288..320.
    let mut lengths = [0u8; 320];
    let mut run = 0;
    let mut run_value = 0;
    let mut i = 0;
    while i < 288 + dist_cnt {
        if i == lit_cnt {
            i = 288;
        }
        if run > 0 {
            lengths[i] = run_value;
            run -= 1;
            i += 1;
            continue;
        }
        match code_len_decoder.decode(reader)? {
            c @ 0..=15 => {
                run_value = c as u8;
            }
            16 => {
                if i == 0 {
                    return Err(DataError::InvalidCode.into());
                }
                run = reader.bits(2)? + 2;
            }
            17 => {
                run = reader.bits(3)? + 2;
                run_value = 0;
            }
            _ => {
                run = reader.bits(7)? + 10;
                run_value = 0;
            }
        }
        lengths[i] = run_value;
        i += 1;
    }
    if run > 0 || lengths[256] == 0 {
        return Err(DataError::InvalidCode.into());
    }
    Ok((Huffman::new(&lengths[..288]), Huffman::new(&lengths[288..])))
}

fn push_checked(out: &mut Vec<u8>, b: u8) -> Result<()> {
    if out.len() >= MAX_DATA_SIZE {
        return Err(DataError::Corrupt.into());
    }
    out.push(b);
    Ok(())
}

/// Decode one block, returning its final block flag.
fn inflate_block(reader: &mut BitReader<'_>, out: &mut Vec<u8>) -> Result<bool> {
    let is_last = reader.bit()? != 0;
    let block_type = reader.bits(2)?;
    match block_type {
        0 => {
            reader.align();
            let size = reader.bits(32)?;
            let len = size & 0xffff;
            if size >> 16 != (!len & 0xffff) {
                return Err(DataError::Corrupt.into());
            }
            for _ in 0..len {
                let b = reader.byte()?;
                push_checked(out, b)?;
            }
            reader.align();
            return Ok(is_last);
        }
        3 => return Err(DataError::Corrupt.into()),
        _ => {}
    }

    let (lit_decoder, dist_decoder) = read_tables(reader, block_type)?;
    let mut prev_distance = 0;
    loop {
        let c = lit_decoder.decode(reader)?;
        if c < 0x100 {
            push_checked(out, c as u8)?;
            continue;
        }
        if c == 0x100 {
            return Ok(is_last);
        }
        let code = (c - 0x100) as u32;
        let len = match code {
            1..=8 => code,
            9..=28 => {
                let n_bits = (code - 5) >> 2;
                (((((code - 1) & 3) | 4) << n_bits) | reader.bits(n_bits)?) + 1
            }
            29 => 256,
            _ => 0,
        } as usize
            + 2;
        let d = if c == 0x11f {
            prev_distance
        } else {
            let c = dist_decoder.decode(reader)? as u32;
            if c < 4 {
                c as usize + 1
            } else {
                let n_bits = (c - 2) >> 1;
                (((((c & 1) | 2) << n_bits) | reader.bits(n_bits)?) + 1) as usize
            }
        };
        if d == 0 || d > out.len() {
            return Err(DataError::InvalidOffset.into());
        }
        if out.len() + len > MAX_DATA_SIZE {
            return Err(DataError::Corrupt.into());
        }
        prev_distance = d;
        let start = out.len() - d;
        for k in 0..len {
            out.push(out[start + k]);
        }
    }
}

/// Decode a zlib stream.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    if data.is_empty() {
        return Ok(out);
    }
    let mut reader = BitReader {
        data,
        pos: 0,
        shift_reg: 0,
        bits_left: 0,
    };
    let header = u16::from_be_bytes([reader.byte()?, reader.byte()?]);
    // CINFO at most 7, CM 8, FCHECK.
    if header >= 0x9000 || header & 0x0f00 != 0x0800 || header % 31 != 0 {
        return Err(DataError::Corrupt.into());
    }
    while !inflate_block(&mut reader, &mut out)? {}
    reader.align();
    let sum = u32::from_be_bytes([reader.byte()?, reader.byte()?, reader.byte()?, reader.byte()?]);
    if adler32(1, &out) != sum {
        return Err(DataError::Checksum.into());
    }
    if reader.pos != data.len() {
        return Err(DataError::Corrupt.into());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_reference_fixed_block() {
        // zlib.compress(b"hello hello hello")
        let data = [
            0x78, 0x9c, 0xcb, 0x48, 0xcd, 0xc9, 0xc9, 0x57, 0xc8, 0x40, 0x90, 0x00, 0x3a, 0x2e, 0x06, 0x7d,
        ];
        assert_eq!(decompress(&data).unwrap(), b"hello hello hello");
    }

    #[test]
    fn decodes_stored_block() {
        let data = [0x78, 0x01, 0x01, 0x02, 0x00, 0xfd, 0xff, b'o', b'k', 0x01, 0x4b, 0x00, 0xdb];
        assert_eq!(decompress(&data).unwrap(), b"ok");
    }

    #[test]
    fn rejects_bad_header_and_checksum() {
        assert_eq!(decompress(&[0x78, 0x00, 0x03, 0x00]), Err(DataError::Corrupt.into()));
        assert_eq!(
            decompress(&[0x78, 0xda, 0x03, 0x00, 0x00, 0x00, 0x00, 0x02]),
            Err(DataError::Checksum.into())
        );
    }

    #[test]
    fn accepts_short_match_at_previous_distance() {
        // Fixed block: 'a', 'b', 0x11e + distance code 1 (d = 2),
        // 0x11f, end of block.
        let mut bits: Vec<(u32, u32)> = Vec::new();
        let code = |sym: u32| -> (u32, u32) {
            // Fixed code, MSB first.
            match sym {
                0..=143 => (0x30 + sym, 8),
                256..=279 => (sym - 256, 7),
                _ => (0xc0 + sym - 280, 8),
            }
        };
        bits.push((1, 1));
        bits.push((1, 2));
        let push_code = |bits: &mut Vec<(u32, u32)>, (value, len): (u32, u32)| {
            // Huffman codes go out MSB first.
            for k in (0..len).rev() {
                bits.push(((value >> k) & 1, 1));
            }
        };
        push_code(&mut bits, code(b'a' as u32));
        push_code(&mut bits, code(b'b' as u32));
        push_code(&mut bits, code(0x11e));
        push_code(&mut bits, (1, 5));
        push_code(&mut bits, code(0x11f));
        push_code(&mut bits, code(0x100));

        let mut stream = alloc::vec![0x78, 0x9c];
        let (mut acc, mut n) = (0u32, 0);
        for (value, len) in bits {
            acc |= value << n;
            n += len;
            while n >= 8 {
                stream.push(acc as u8);
                acc >>= 8;
                n -= 8;
            }
        }
        if n > 0 {
            stream.push(acc as u8);
        }
        stream.extend_from_slice(&adler32(1, b"ababab").to_be_bytes());
        assert_eq!(decompress(&stream).unwrap(), b"ababab");
    }
}
