// This file is part of sidpack, derived from the plus4emu compression library.
// Copyright (c) 2007-2017 Istvan Varga <istvanv@users.sourceforge.net>. All rights reserved.
// Originally licensed under the GPLv2 or later.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use sidpack::compress::{self, inflate, CompressConfig, Method};

/// Compress or extract files in the plus4emu M2 and ZLib formats
#[derive(Parser)]
#[command(
    name = "p4compress",
    version = env!("CARGO_PKG_VERSION"),
    long_about = None
)]
struct Args {
    /// Extract instead of compress
    #[arg(short = 'x', long = "extract")]
    extract: bool,

    /// Use the ZLib format instead of M2
    #[arg(short = 'z', long = "zlib")]
    zlib: bool,

    /// Skip this many bytes at the start of the input
    #[arg(long, default_value_t = 0)]
    skip: usize,

    /// Process at most this many bytes of the input
    #[arg(long)]
    length: Option<usize>,

    /// Compress windows one after the other on the calling thread
    #[arg(long, default_value_t = false)]
    sequential: bool,

    #[arg(value_name = "INPUT")]
    input: PathBuf,

    #[arg(value_name = "OUTPUT")]
    output: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let data = fs::read(&args.input)
        .with_context(|| format!("error reading input file {}", args.input.display()))?;
    if args.skip > data.len() {
        bail!("--skip {} is past the end of {} byte input", args.skip, data.len());
    }
    let data = &data[args.skip..];
    let data = match args.length {
        Some(n) => &data[..n.min(data.len())],
        None => data,
    };

    let method = if args.zlib { Method::ZLib } else { Method::M2 };
    let result = if args.extract {
        match method {
            Method::M2 => compress::decompress(data),
            Method::ZLib => inflate::decompress(data),
        }
    } else {
        let config = CompressConfig {
            method,
            parallel: !args.sequential,
        };
        compress::compress_with(data, &config)
    };
    let result = result.with_context(|| format!("error processing {}", args.input.display()))?;
    info!("{:?}: {} bytes -> {} bytes", method, data.len(), result.len());

    fs::write(&args.output, &result)
        .with_context(|| format!("error writing output file {}", args.output.display()))?;
    Ok(())
}
