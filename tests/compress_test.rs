// This file is part of sidpack, derived from the plus4emu compression library.
// Copyright (c) 2007-2017 Istvan Varga <istvanv@users.sourceforge.net>. All rights reserved.
// Originally licensed under the GPLv2 or later.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use sidpack::compress::{self, inflate, zlib, CompressConfig, Method};
use sidpack::{DataError, Error};

/// xorshift32 bytes.
fn noise(len: usize, mut seed: u32) -> Vec<u8> {
    (0..len)
        .map(|_| {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            (seed >> 24) as u8
        })
        .collect()
}

/// Text-like data: words from a small vocabulary with some noise.
fn text(len: usize) -> Vec<u8> {
    const WORDS: [&str; 12] = [
        "the ", "sid ", "chip ", "filter ", "voice ", "envelope ", "of ", "and ", "pulse ",
        "noise ", "sawtooth ", "triangle ",
    ];
    let picks = noise(len, 0x1234_5678);
    let mut out = Vec::with_capacity(len + 16);
    let mut k = 0;
    while out.len() < len {
        let p = picks[k % picks.len()] as usize;
        out.extend_from_slice(WORDS[p % WORDS.len()].as_bytes());
        if p % 17 == 0 {
            out.push(p as u8);
        }
        k += 1;
    }
    out.truncate(len);
    out
}

/// Register dump style data: long runs and repeated records.
fn records(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| match (i / 64) % 4 {
            0 => 0,
            1 => (i % 7) as u8,
            2 => (i / 512) as u8,
            _ => 0xff,
        })
        .collect()
}

fn m2_round_trip(data: &[u8]) -> Vec<u8> {
    let packed = compress::compress(data).unwrap();
    assert_eq!(compress::decompress(&packed).unwrap(), data);
    packed
}

fn zlib_round_trip(data: &[u8]) -> Vec<u8> {
    let packed = zlib::compress(data).unwrap();
    assert_eq!(inflate::decompress(&packed).unwrap(), data);
    let mut decoded = Vec::new();
    ZlibDecoder::new(&packed[..]).read_to_end(&mut decoded).unwrap();
    assert_eq!(decoded, data, "stream must be standard zlib");
    packed
}

// -- M2

#[test]
fn m2_empty_input() {
    assert!(m2_round_trip(&[]).is_empty());
}

#[test]
fn m2_single_byte() {
    let packed = m2_round_trip(&[0x42]);
    // Checksum, header and the stored byte.
    assert_eq!(packed.len(), 5);
}

#[test]
fn m2_short_run() {
    m2_round_trip(b"aaaaaaaaaaa");
}

#[test]
fn m2_text() {
    let data = text(20_000);
    let packed = m2_round_trip(&data);
    assert!(packed.len() < data.len() / 2, "{} bytes", packed.len());
}

#[test]
fn m2_long_runs() {
    let data = vec![0u8; 65_536];
    let packed = m2_round_trip(&data);
    assert!(packed.len() < data.len() / 32, "{} bytes", packed.len());
}

#[test]
fn m2_noise_is_stored() {
    let data = noise(5_000, 1);
    let packed = m2_round_trip(&data);
    assert!(packed.len() <= data.len() + 4);
}

#[test]
fn m2_mixed_noise_and_repeats() {
    let mut data = noise(3_000, 7);
    let head = data[..1_500].to_vec();
    data.extend_from_slice(&head);
    data.extend_from_slice(&records(4_000));
    data.extend_from_slice(&head[..300]);
    m2_round_trip(&data);
}

/// Input spanning several windows and blocks.
#[test]
fn m2_multiple_windows() {
    let mut data = records(140_000);
    data.extend_from_slice(&text(10_000));
    m2_round_trip(&data);
}

#[test]
fn m2_parallel_matches_sequential() {
    let mut data = text(100_000);
    data.extend_from_slice(&records(80_000));
    let parallel = compress::compress_with(
        &data,
        &CompressConfig {
            method: Method::M2,
            parallel: true,
        },
    )
    .unwrap();
    let sequential = compress::compress_with(
        &data,
        &CompressConfig {
            method: Method::M2,
            parallel: false,
        },
    )
    .unwrap();
    assert_eq!(parallel, sequential);
    assert_eq!(compress::decompress(&parallel).unwrap(), data);
}

#[test]
fn m2_corrupt_byte_fails_checksum() {
    let data = text(2_000);
    let mut packed = compress::compress(&data).unwrap();
    let mid = packed.len() / 2;
    packed[mid] ^= 0x10;
    assert_eq!(
        compress::decompress(&packed),
        Err(Error::Data(DataError::Checksum))
    );
}

#[test]
fn m2_truncated_stream_is_rejected() {
    let data = text(2_000);
    let packed = compress::compress(&data).unwrap();
    assert!(compress::decompress(&packed[..packed.len() - 1]).is_err());
    assert!(compress::decompress(&packed[..1]).is_err());
}

// -- ZLib

#[test]
fn zlib_empty_input() {
    zlib_round_trip(&[]);
}

#[test]
fn zlib_single_byte() {
    zlib_round_trip(&[0x42]);
}

#[test]
fn zlib_short_run() {
    zlib_round_trip(b"aaaaaaaaaaa");
}

#[test]
fn zlib_text() {
    let data = text(20_000);
    let packed = zlib_round_trip(&data);
    assert!(packed.len() < data.len() / 2, "{} bytes", packed.len());
}

#[test]
fn zlib_noise_is_stored() {
    let data = noise(5_000, 3);
    let packed = zlib_round_trip(&data);
    // Header, block header, LEN/NLEN and Adler-32.
    assert_eq!(packed.len(), data.len() + 2 + 1 + 4 + 4);
}

/// More than one 32 KiB block, with matches reaching into the previous one.
#[test]
fn zlib_multiple_blocks() {
    let mut data = records(50_000);
    data.extend_from_slice(&text(30_000));
    data.extend_from_slice(&records(20_000));
    zlib_round_trip(&data);
}

#[test]
fn zlib_method_selects_zlib() {
    let data = text(3_000);
    let config = CompressConfig {
        method: Method::ZLib,
        ..CompressConfig::default()
    };
    assert_eq!(
        compress::compress_with(&data, &config).unwrap(),
        zlib::compress(&data).unwrap()
    );
}

#[test]
fn inflate_reads_standard_streams() {
    let data = text(50_000);
    for level in [Compression::none(), Compression::fast(), Compression::best()] {
        let mut encoder = ZlibEncoder::new(Vec::new(), level);
        encoder.write_all(&data).unwrap();
        let packed = encoder.finish().unwrap();
        assert_eq!(inflate::decompress(&packed).unwrap(), data);
    }
}

#[test]
fn zlib_bad_adler_is_rejected() {
    let data = text(1_000);
    let mut packed = zlib::compress(&data).unwrap();
    let last = packed.len() - 1;
    packed[last] ^= 0x01;
    assert_eq!(
        inflate::decompress(&packed),
        Err(Error::Data(DataError::Checksum))
    );
}

#[test]
fn zlib_bad_header_is_rejected() {
    let mut packed = zlib::compress(b"header").unwrap();
    packed[0] = 0x79;
    assert_eq!(
        inflate::decompress(&packed),
        Err(Error::Data(DataError::Corrupt))
    );
}

#[test]
fn zlib_truncated_stream_is_rejected() {
    let data = text(1_000);
    let packed = zlib::compress(&data).unwrap();
    assert_eq!(
        inflate::decompress(&packed[..packed.len() - 2]),
        Err(Error::Data(DataError::Truncated))
    );
}

#[test]
fn default_config() {
    let config = CompressConfig::default();
    assert_eq!(config.method, Method::M2);
    assert!(config.parallel);
}
