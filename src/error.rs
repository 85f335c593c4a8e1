// This file is part of resid-rs.
// Copyright (c) 2017-2019 Sebastian Jastrzebski <sebby2k@gmail.com>. All rights reserved.
// Portions (c) 2004 Dag Lem <resid@nimrod.no>
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors raised by snapshot loading, the compressors and the decoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum Error {
    /// SID snapshot could not be restored.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    /// Compressed input is corrupt or truncated.
    #[error(transparent)]
    Data(#[from] DataError),
    /// Caller contract violation inside the statistical coders.
    #[error("internal error: {0}")]
    Internal(&'static str),
}

/// SID snapshot format errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SnapshotError {
    /// Version tag outside 0x01000000..=0x01000001.
    #[error("incompatible SID snapshot format (version {0:#010x})")]
    UnsupportedVersion(u32),
    /// Snapshot ended before all fields were read.
    #[error("unexpected end of SID snapshot data")]
    UnexpectedEnd,
    /// Bytes left over after the last field.
    #[error("trailing garbage at end of SID snapshot data")]
    TrailingData,
}

/// Compressed stream errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DataError {
    /// Stream ended in the middle of a block.
    #[error("unexpected end of compressed data")]
    Truncated,
    /// Checksum byte or Adler-32 trailer mismatch.
    #[error("checksum error in compressed data")]
    Checksum,
    /// Back-reference points before the start of the output.
    #[error("invalid match offset in compressed data")]
    InvalidOffset,
    /// Undecodable prefix code or code length table.
    #[error("invalid code in compressed data")]
    InvalidCode,
    /// Any other structural problem (bad header, leftover input).
    #[error("error in compressed data")]
    Corrupt,
}
