//! minirel CLI: generate, inspect and transform block files.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use minirel_core::KeyMode;
use minirel_io::{dump, gen};
use minirel_operators::{eliminate_duplicates, hash_join, merge_join, sort};

#[derive(Parser)]
#[command(name = "minirel")]
#[command(
    about = "Buffer-constrained relational operators over block files",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a random block file
    Gen {
        /// Path of the file to create
        file: PathBuf,

        /// Number of blocks to generate
        #[arg(long)]
        blocks: u64,

        /// RNG seed, for reproducible files
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Print every valid record of a block file
    Dump {
        /// Path of the file to inspect
        file: PathBuf,
    },

    /// Sort a file with the external merge sort
    Sort {
        input: PathBuf,
        output: PathBuf,

        /// Sort key: id, num, text or num-text
        #[arg(long, default_value = "num")]
        key: KeyMode,

        /// Memory budget in blocks (minimum 3)
        #[arg(long, default_value_t = 16)]
        mem_blocks: usize,
    },

    /// Remove records with duplicate keys
    Distinct {
        input: PathBuf,
        output: PathBuf,

        /// Key: id, num, text or num-text
        #[arg(long, default_value = "num")]
        key: KeyMode,

        /// Memory budget in blocks (minimum 3)
        #[arg(long, default_value_t = 16)]
        mem_blocks: usize,
    },

    /// Join two files with the grace hash join
    HashJoin {
        left: PathBuf,
        right: PathBuf,
        output: PathBuf,

        /// Join key: id, num, text or num-text
        #[arg(long, default_value = "num")]
        key: KeyMode,

        /// Memory budget in blocks (minimum 3)
        #[arg(long, default_value_t = 16)]
        mem_blocks: usize,
    },

    /// Join two files with the sort-merge join
    MergeJoin {
        left: PathBuf,
        right: PathBuf,
        output: PathBuf,

        /// Join key: id, num, text or num-text
        #[arg(long, default_value = "num")]
        key: KeyMode,

        /// Memory budget in blocks (minimum 3)
        #[arg(long, default_value_t = 16)]
        mem_blocks: usize,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Gen { file, blocks, seed } => {
            gen::generate_file(&file, blocks, seed)?;
            println!("wrote {blocks} block(s) to {}", file.display());
        }
        Commands::Dump { file } => {
            let stdout = std::io::stdout();
            dump::dump(&file, &mut stdout.lock())?;
        }
        Commands::Sort {
            input,
            output,
            key,
            mem_blocks,
        } => {
            let stats = sort(&input, key, mem_blocks, &output)?;
            println!(
                "sorted segments: {}  passes: {}  block IOs: {}",
                stats.sorted_segments, stats.passes, stats.block_ios
            );
        }
        Commands::Distinct {
            input,
            output,
            key,
            mem_blocks,
        } => {
            let stats = eliminate_duplicates(&input, key, mem_blocks, &output)?;
            println!(
                "unique records: {}  block IOs: {}",
                stats.unique, stats.block_ios
            );
        }
        Commands::HashJoin {
            left,
            right,
            output,
            key,
            mem_blocks,
        } => {
            let stats = hash_join(&left, &right, key, mem_blocks, &output)?;
            println!("pairs: {}  block IOs: {}", stats.pairs, stats.block_ios);
        }
        Commands::MergeJoin {
            left,
            right,
            output,
            key,
            mem_blocks,
        } => {
            let stats = merge_join(&left, &right, key, mem_blocks, &output)?;
            println!("pairs: {}  block IOs: {}", stats.pairs, stats.block_ios);
        }
    }
    Ok(())
}
