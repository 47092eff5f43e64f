use anyhow::{Context, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Environment variable the launcher uses to set the rank count.
pub const RANKS_ENV: &str = "PRLE_RANKS";

/// Extension appended to compressed files.
pub const COMPRESSED_EXTENSION: &str = ".rle";

/// Suffix for decompressed files whose input has no `.rle` extension.
pub const DECOMPRESSED_SUFFIX: &str = ".decompressed";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    /// Compress the input file (default)
    #[default]
    Compress,
    /// Decompress an RLE stream
    Decompress,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Execution {
    /// Single process, whole file in memory
    Sequential,
    /// One rank per chunk with boundary reconciliation (default)
    #[default]
    Parallel,
}

#[derive(Clone, Debug)]
pub struct CompressConfig {
    /// Input file
    pub input: PathBuf,
    /// Output RLE stream
    pub output: PathBuf,
    /// Sequential or parallel execution
    pub execution: Execution,
    /// Number of ranks for parallel execution (0 = from environment)
    pub ranks: usize,
}

impl Default for CompressConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            output: PathBuf::new(),
            execution: Execution::Parallel,
            ranks: 0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct DecompressConfig {
    /// Input RLE stream
    pub input: PathBuf,
    /// Output file
    pub output: PathBuf,
    /// Sequential or parallel execution
    pub execution: Execution,
    /// Number of ranks for parallel execution (0 = from environment)
    pub ranks: usize,
}

impl Default for DecompressConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            output: PathBuf::new(),
            execution: Execution::Parallel,
            ranks: 0,
        }
    }
}

/// Output path used when none is given.
///
/// Compression appends `.rle`. Decompression strips a trailing `.rle`, or
/// appends `.decompressed` when there is none.
pub fn default_output_path(input: &Path, mode: Mode) -> PathBuf {
    match mode {
        Mode::Compress => with_suffix(input, COMPRESSED_EXTENSION),
        Mode::Decompress => match input.to_str().and_then(|s| s.strip_suffix(COMPRESSED_EXTENSION)) {
            Some(stem) if !stem.is_empty() => PathBuf::from(stem),
            _ => with_suffix(input, DECOMPRESSED_SUFFIX),
        },
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Rank count for a parallel run.
///
/// A non-zero `requested` wins; otherwise `PRLE_RANKS` is used if set, and
/// the number of available CPUs if not.
pub fn resolve_ranks(requested: usize) -> Result<usize> {
    if requested > 0 {
        return Ok(requested);
    }
    match std::env::var(RANKS_ENV) {
        Ok(value) => parse_ranks(&value),
        Err(_) => Ok(num_cpus()),
    }
}

fn parse_ranks(value: &str) -> Result<usize> {
    let ranks: usize = value
        .trim()
        .parse()
        .with_context(|| format!("{} must be a positive integer, got {:?}", RANKS_ENV, value))?;
    if ranks == 0 {
        anyhow::bail!("{} must be at least 1", RANKS_ENV);
    }
    Ok(ranks)
}

pub fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_compress() {
        assert_eq!(default_output_path(Path::new("data/file.bin"), Mode::Compress), PathBuf::from("data/file.bin.rle"));
    }

    #[test]
    fn test_default_output_decompress() {
        assert_eq!(default_output_path(Path::new("file.bin.rle"), Mode::Decompress), PathBuf::from("file.bin"));
        assert_eq!(
            default_output_path(Path::new("file.bin"), Mode::Decompress),
            PathBuf::from("file.bin.decompressed")
        );
        // Only a trailing extension counts
        assert_eq!(
            default_output_path(Path::new("file.rle.bak"), Mode::Decompress),
            PathBuf::from("file.rle.bak.decompressed")
        );
    }

    #[test]
    fn test_parse_ranks() {
        assert_eq!(parse_ranks("4").unwrap(), 4);
        assert_eq!(parse_ranks(" 2\n").unwrap(), 2);
        assert!(parse_ranks("0").is_err());
        assert!(parse_ranks("many").is_err());
    }

    #[test]
    fn test_explicit_ranks_win() {
        assert_eq!(resolve_ranks(3).unwrap(), 3);
    }

    #[test]
    fn test_defaults() {
        let config = CompressConfig::default();
        assert_eq!(config.execution, Execution::Parallel);
        assert_eq!(config.ranks, 0);
        assert_eq!(Mode::default(), Mode::Compress);
    }
}
