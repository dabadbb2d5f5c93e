//! Prepare pre-compressed inputs for the DOCA decompression measurements.
//!
//! The input is cut into chunks no larger than a DOCA job. Only the first chunk's
//! compressed form is kept, repeated once per chunk, so that every job the engine sees
//! decompresses the same way.

use clap::clap_app;

use flate2::{write::DeflateEncoder, Compression};

use log::info;

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::util::validator;

pub const DEFAULT_LEVEL: u32 = 2;
pub const DEFAULT_CHUNK_SIZE: usize = 2 * 1024 * 1024;

pub fn cli_options() -> clap::App<'static, 'static> {
    clap_app! { prep_compressed =>
        (about: "Compress a file chunk by chunk into raw DEFLATE and LZ4 inputs for the \
                 DOCA decompress engine.")
        (@setting ArgRequiredElseHelp)
        (@setting DisableVersion)
        (@arg FILE: +required +takes_value
         "The file to compress.")
        (@arg LEVEL: --level +takes_value {validator::is::<u32>}
         "DEFLATE compression level (default: 2).")
        (@arg CHUNK_SIZE: --chunk_size +takes_value {validator::is::<usize>}
         "Largest chunk in bytes (default: 2 MiB).")
        (@arg OUTPUT_DIR: --output_dir +takes_value
         "Where to write the compressed files (default: .).")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Prepared {
    pub total_original: usize,
    pub chunks: usize,
    pub first_deflate_len: usize,
    pub first_lz4_len: usize,
    pub deflate_file: PathBuf,
    pub lz4_file: PathBuf,
}

fn deflate_raw(chunk: &[u8], level: u32) -> Result<Vec<u8>, failure::Error> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(level));
    encoder.write_all(chunk)?;
    Ok(encoder.finish()?)
}

fn lz4_block(chunk: &[u8]) -> Result<Vec<u8>, failure::Error> {
    let block = lz4_flex::block::compress(chunk);
    let back = lz4_flex::block::decompress(&block, chunk.len())
        .map_err(|err| failure::format_err!("lz4 round trip failed: {}", err))?;
    if back != chunk {
        failure::bail!("lz4 round trip mismatch");
    }
    Ok(block)
}

/// Read up to `buf.len()` bytes, stopping short only at end of file.
fn read_chunk<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, failure::Error> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

pub fn prepare(
    input: &Path,
    output_dir: &Path,
    level: u32,
    chunk_size: usize,
) -> Result<Prepared, failure::Error> {
    if chunk_size == 0 {
        failure::bail!("chunk size must be positive");
    }

    let mut reader = std::io::BufReader::new(std::fs::File::open(input)?);
    let mut buf = vec![0u8; chunk_size];
    let mut total_original = 0;
    let mut chunks = 0;
    let mut first: Option<(Vec<u8>, Vec<u8>)> = None;

    loop {
        let n = read_chunk(&mut reader, &mut buf)?;
        if n == 0 {
            break;
        }
        chunks += 1;
        total_original += n;

        let chunk = &buf[..n];
        let deflated = deflate_raw(chunk, level)?;
        let lz4 = lz4_block(chunk)?;
        if first.is_none() {
            first = Some((deflated, lz4));
        }
    }

    let (deflated, lz4) = match first {
        Some(first) => first,
        None => failure::bail!("{} is empty", input.display()),
    };

    let deflate_file = output_dir.join(format!("compressed-{}-{}.deflate", chunks, deflated.len()));
    let lz4_file = output_dir.join(format!("compressed-{}-{}.lz4", chunks, lz4.len()));
    for (path, data) in &[(&deflate_file, &deflated), (&lz4_file, &lz4)] {
        let mut out = std::io::BufWriter::new(std::fs::File::create(path)?);
        for _ in 0..chunks {
            out.write_all(data)?;
        }
        out.flush()?;
    }

    Ok(Prepared {
        total_original,
        chunks,
        first_deflate_len: deflated.len(),
        first_lz4_len: lz4.len(),
        deflate_file,
        lz4_file,
    })
}

pub fn run(sub_m: &clap::ArgMatches<'_>) -> Result<(), failure::Error> {
    let input = Path::new(sub_m.value_of("FILE").unwrap());
    let level = sub_m
        .value_of("LEVEL")
        .map_or(DEFAULT_LEVEL, |s| s.parse().unwrap());
    let chunk_size = sub_m
        .value_of("CHUNK_SIZE")
        .map_or(DEFAULT_CHUNK_SIZE, |s| s.parse().unwrap());
    let output_dir = Path::new(sub_m.value_of("OUTPUT_DIR").unwrap_or("."));

    let prepared = prepare(input, output_dir, level, chunk_size)?;
    info!(
        "Wrote {} and {}",
        prepared.deflate_file.display(),
        prepared.lz4_file.display()
    );
    println!(
        "{} {} {} {}",
        prepared.total_original, prepared.chunks, prepared.first_deflate_len, prepared.first_lz4_len
    );
    Ok(())
}
