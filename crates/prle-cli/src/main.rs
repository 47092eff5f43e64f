use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use prle_lib::cli::{default_output_path, CompressConfig, DecompressConfig, Execution, Mode};

#[derive(Parser)]
#[command(name = "prle")]
#[command(author = "PRLE Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Parallel run-length compression", long_about = None)]
#[command(after_help = "The number of ranks is taken from PRLE_RANKS (default: number of CPUs).")]
struct Cli {
    /// Input file (the compressed file when decompressing)
    #[arg(value_name = "INPUT_FILE")]
    input: PathBuf,

    /// Compress the input file (default)
    #[arg(long, conflicts_with = "decompress")]
    compress: bool,

    /// Decompress the input file
    #[arg(long)]
    decompress: bool,

    /// Run on a single process
    #[arg(long = "secuencial", visible_alias = "sequential", conflicts_with = "parallel")]
    sequential: bool,

    /// Run across all ranks (default)
    #[arg(long)]
    parallel: bool,

    /// Output file [default: INPUT_FILE.rle, or INPUT_FILE without .rle when decompressing]
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
}

impl Cli {
    fn mode(&self) -> Mode {
        if self.decompress {
            Mode::Decompress
        } else {
            Mode::Compress
        }
    }

    fn execution(&self) -> Execution {
        if self.sequential {
            Execution::Sequential
        } else {
            Execution::Parallel
        }
    }

    fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| default_output_path(&self.input, self.mode()))
    }

    fn into_compress_config(self) -> CompressConfig {
        CompressConfig {
            output: self.output_path(),
            execution: self.execution(),
            input: self.input,
            ..CompressConfig::default()
        }
    }

    fn into_decompress_config(self) -> DecompressConfig {
        DecompressConfig {
            output: self.output_path(),
            execution: self.execution(),
            input: self.input,
            ..DecompressConfig::default()
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            // Missing input and bad flags: usage on stderr, exit 1
            let _ = e.print();
            std::process::exit(1);
        }
        Err(e) => {
            // --help / --version
            let _ = e.print();
            return Ok(());
        }
    };

    if std::env::var("PRLE_NO_BANNER").is_err() {
        eprintln!("PRLE v{} - Parallel run-length compression", env!("CARGO_PKG_VERSION"));
        eprintln!();
    }

    match cli.mode() {
        Mode::Compress => {
            info!("Starting compression...");
            let config = cli.into_compress_config();
            let report = prle_lib::compress(&config)?;
            info!(
                "Compressed {} -> {} bytes ({:.2}x) on {} rank(s) in {:.3}s",
                report.input_bytes,
                report.output_bytes,
                report.ratio(),
                report.ranks,
                report.elapsed_secs
            );
            info!("Compression complete: {:?}", config.output);
        }
        Mode::Decompress => {
            info!("Starting decompression...");
            let config = cli.into_decompress_config();
            let report = prle_lib::decompress(&config)?;
            info!(
                "Decompressed {} -> {} bytes on {} rank(s) in {:.3}s",
                report.input_bytes, report.output_bytes, report.ranks, report.elapsed_secs
            );
            info!("Decompression complete: {:?}", config.output);
        }
    }

    Ok(())
}
