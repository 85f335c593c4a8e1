// This file is part of sidpack, derived from the plus4emu compression library.
// Copyright (c) 2007-2017 Istvan Varga <istvanv@users.sourceforge.net>. All rights reserved.
// Originally licensed under the GPLv2 or later.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

//! M2 stream decoder.

use alloc::vec::Vec;

use super::checksum_step;
use super::m2::{
    LENGTH_NUM_SLOTS, LITERAL_SEQUENCE_MIN_LENGTH, MIN_REPEAT_DIST, MIN_REPEAT_LEN, OFFS1_NUM_SLOTS,
    OFFS1_PREFIX_SIZE, OFFS2_NUM_SLOTS, OFFS2_PREFIX_SIZE,
};
use crate::error::{DataError, Result};

/// Largest output accepted.
const MAX_DATA_SIZE: usize = 0x0400_0000;

/// Bits are read MSB first from a shift register byte that is fetched
/// when the previous one runs empty; literal bytes are read in between.
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

    fn bit(&mut self) -> Result<bool> {
        if self.bits_left == 0 {
            self.shift_reg = self.byte()?;
            self.bits_left = 8;
        }
        let b = self.shift_reg & 0x80 != 0;
        self.shift_reg <<= 1;
        self.bits_left -= 1;
        Ok(b)
    }

    fn bits(&mut self, n: usize) -> Result<u32> {
        let mut value = 0;
        for _ in 0..n {
            value = (value << 1) | self.bit()? as u32;
        }
        Ok(value)
    }
}

/// Slot widths of one table as sent in the block header.
struct SlotTable {
    bits: Vec<u8>,
    base: Vec<u32>,
}

impl SlotTable {
    fn read(reader: &mut BitReader<'_>, n_slots: usize) -> Result<Self> {
        let mut bits = Vec::with_capacity(n_slots);
        let mut base = Vec::with_capacity(n_slots);
        let mut next = 0u32;
        for _ in 0..n_slots {
            let n = reader.bits(4)? as u8;
            bits.push(n);
            base.push(next);
            next += 1 << n;
        }
        Ok(SlotTable { bits, base })
    }

    fn decode(&self, reader: &mut BitReader<'_>, slot: usize) -> Result<usize> {
        let extra = reader.bits(self.bits[slot] as usize)?;
        Ok((self.base[slot] + extra) as usize)
    }
}

fn decode_block(reader: &mut BitReader<'_>, out: &mut Vec<u8>) -> Result<bool> {
    let count = reader.bits(16)? as usize + 1;
    let is_last = reader.bit()?;
    if !reader.bit()? {
        for _ in 0..count {
            out.push(reader.byte()?);
        }
        return Ok(is_last);
    }

    let offs3_prefix_size = reader.bits(2)? as usize + 2;
    let length_table = SlotTable::read(reader, LENGTH_NUM_SLOTS)?;
    let offs1_table = SlotTable::read(reader, OFFS1_NUM_SLOTS)?;
    let offs2_table = SlotTable::read(reader, OFFS2_NUM_SLOTS)?;
    let offs3_table = SlotTable::read(reader, 1 << offs3_prefix_size)?;

    for _ in 0..count {
        if out.len() > MAX_DATA_SIZE {
            return Err(DataError::Corrupt.into());
        }
        if !reader.bit()? {
            out.push(reader.byte()?);
            continue;
        }
        let mut slot = 0;
        while slot < LENGTH_NUM_SLOTS && reader.bit()? {
            slot += 1;
        }
        if slot == LENGTH_NUM_SLOTS {
            let len = reader.bits(8)? as usize + LITERAL_SEQUENCE_MIN_LENGTH;
            for _ in 0..len {
                out.push(reader.byte()?);
            }
            continue;
        }
        let len = length_table.decode(reader, slot)? + MIN_REPEAT_LEN;
        let (table, prefix_size) = match len {
            1 => (&offs1_table, OFFS1_PREFIX_SIZE),
            2 => (&offs2_table, OFFS2_PREFIX_SIZE),
            _ => (&offs3_table, offs3_prefix_size),
        };
        let slot = reader.bits(prefix_size)? as usize;
        let d = table.decode(reader, slot)? + MIN_REPEAT_DIST;
        if d > out.len() {
            return Err(DataError::InvalidOffset.into());
        }
        let start = out.len() - d;
        // Overlapping copies repeat the last `d` bytes.
        for k in 0..len {
            out.push(out[start + k]);
        }
    }
    Ok(is_last)
}

/// Decode an M2 stream produced by [`compress`](super::compress).
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    if data.is_empty() {
        return Ok(out);
    }
    if data.iter().rev().fold(0xff, |crc, &b| checksum_step(crc, b)) != 0x80 {
        return Err(DataError::Checksum.into());
    }
    let mut reader = BitReader {
        data,
        pos: 1,
        shift_reg: 0,
        bits_left: 0,
    };
    while !decode_block(&mut reader, &mut out)? {}
    if reader.pos != data.len() {
        return Err(DataError::Corrupt.into());
    }
    Ok(out)
}
