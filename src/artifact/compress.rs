use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

const COMPRESSION_LEVEL: i32 = 3;

pub const COMPRESSED_EXTENSION: &str = ".zst";

/// Streams `path` through a zstd encoder; the source is never read whole.
pub fn compress_file(path: &Path) -> Result<Vec<u8>> {
    let source = File::open(path)
        .with_context(|| format!("Failed to open {} for compression", path.display()))?;
    let mut reader = BufReader::new(source);

    let mut encoder = zstd::stream::Encoder::new(Vec::new(), COMPRESSION_LEVEL)
        .context("Failed to create zstd encoder")?;
    io::copy(&mut reader, &mut encoder)
        .with_context(|| format!("Failed to compress {}", path.display()))?;
    encoder.finish().context("Failed to finish zstd stream")
}
