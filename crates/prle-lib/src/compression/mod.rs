pub mod boundary;
pub mod collector;
mod parallel;
pub mod resync;
pub mod rle;
mod sequential;
pub mod token;

use crate::cli::{resolve_ranks, CompressConfig, DecompressConfig, Execution};
use crate::comm::{self, ROOT_RANK};
use anyhow::Result;
use std::path::Path;
use std::time::Instant;
use tracing::info;

pub use parallel::COMPRESS_LOOKAHEAD;
pub use token::{Token, FLAG_ESCAPE, FLAG_RUN, MAX_RUN, RUN_THRESHOLD};

/// Summary of one compression or decompression run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RunReport {
    pub input_bytes: u64,
    pub output_bytes: u64,
    /// Wall-clock time of the whole run, for reporting only.
    pub elapsed_secs: f64,
    /// Ranks used (1 for the sequential path).
    pub ranks: usize,
}

impl RunReport {
    /// Input size over output size; 0 when the output is empty.
    pub fn ratio(&self) -> f64 {
        if self.output_bytes == 0 {
            0.0
        } else {
            self.input_bytes as f64 / self.output_bytes as f64
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Compress,
    Decompress,
}

/// Compress `config.input` into `config.output`.
pub fn compress(config: &CompressConfig) -> Result<RunReport> {
    run(Direction::Compress, &config.input, &config.output, config.execution, config.ranks)
}

/// Decompress `config.input` into `config.output`.
pub fn decompress(config: &DecompressConfig) -> Result<RunReport> {
    run(Direction::Decompress, &config.input, &config.output, config.execution, config.ranks)
}

fn run(direction: Direction, input: &Path, output: &Path, execution: Execution, ranks: usize) -> Result<RunReport> {
    let start_time = Instant::now();

    let (input_bytes, output_bytes, ranks) = match execution {
        Execution::Sequential => {
            info!("Running {:?} sequentially", direction);
            let (input_bytes, output_bytes) = match direction {
                Direction::Compress => sequential::compress_file(input, output)?,
                Direction::Decompress => sequential::decompress_file(input, output)?,
            };
            (input_bytes, output_bytes, 1)
        }
        Execution::Parallel => {
            let ranks = resolve_ranks(ranks)?;
            info!("Running {:?} in parallel on {} rank(s)", direction, ranks);
            let results = comm::launch(ranks, |comm| match direction {
                Direction::Compress => parallel::compress_rank(&comm, input, output),
                Direction::Decompress => parallel::decompress_rank(&comm, input, output),
            });
            let summaries = comm::first_failure(results)?;
            let root = summaries[ROOT_RANK];
            (root.file_size, root.written, ranks)
        }
    };

    Ok(RunReport {
        input_bytes,
        output_bytes,
        elapsed_secs: start_time.elapsed().as_secs_f64(),
        ranks,
    })
}
