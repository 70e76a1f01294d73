//! Bale CLI
//!
//! Command-line tools for Bale segment stores.
//!
//! # Commands
//!
//! - `segment` - Store files as archive segments
//! - `list` - List stored segments
//! - `inspect` - Show a segment and its section layout
//! - `verify` - Recompute segment commitments
//! - `cat` - Write the original bytes of a segment
//! - `pack` - Show how stored segments would be packed into pieces
//! - `header` - Show the empty archive header

mod commands;
mod error;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Bale segment store tools.
#[derive(Parser)]
#[command(name = "bale")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the segment store directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Output format
    #[arg(global = true, short, long, value_enum, default_value_t = Format::Text)]
    format: Format,

    #[command(subcommand)]
    command: Commands,
}

/// How results are printed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable text
    Text,
    /// Pretty-printed JSON
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Store files as archive segments ("-" reads stdin)
    Segment {
        /// Files to segment
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Bytes per archive section
        #[arg(long, default_value_t = commands::DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,

        /// Largest input accepted, in bytes
        #[arg(long)]
        max_segment_size: Option<u64>,
    },

    /// List stored segments
    List,

    /// Show a segment and its section layout
    Inspect {
        /// Segment CID
        cid: String,

        /// List every section
        #[arg(short, long)]
        sections: bool,
    },

    /// Recompute segment commitments (all segments if none given)
    Verify {
        /// Segment CIDs
        cids: Vec<String>,
    },

    /// Write the original bytes of a segment
    Cat {
        /// Segment CID
        cid: String,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show how stored segments would be packed into pieces
    Pack {
        /// Piece capacity in bytes (a power of two)
        #[arg(long, default_value_t = commands::DEFAULT_PIECE_CAPACITY)]
        capacity: u64,

        /// Maximum pieces to build
        #[arg(long, default_value_t = 1)]
        max_pieces: usize,
    },

    /// Show the empty archive header
    Header,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so `cat` output stays clean.
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let format = cli.format;
    match cli.command {
        Commands::Segment {
            files,
            chunk_size,
            max_segment_size,
        } => {
            let path = cli.path.ok_or("Store path required for segment")?;
            commands::segment::run(&path, &files, chunk_size, max_segment_size, format)?;
        }
        Commands::List => {
            let path = cli.path.ok_or("Store path required for list")?;
            commands::list::run(&path, format)?;
        }
        Commands::Inspect { cid, sections } => {
            let path = cli.path.ok_or("Store path required for inspect")?;
            commands::inspect::run(&path, &cid, sections, format)?;
        }
        Commands::Verify { cids } => {
            let path = cli.path.ok_or("Store path required for verify")?;
            commands::verify::run(&path, &cids, format)?;
        }
        Commands::Cat { cid, output } => {
            let path = cli.path.ok_or("Store path required for cat")?;
            commands::cat::run(&path, &cid, output.as_deref())?;
        }
        Commands::Pack {
            capacity,
            max_pieces,
        } => {
            let path = cli.path.ok_or("Store path required for pack")?;
            commands::pack::run(&path, capacity, max_pieces, format)?;
        }
        Commands::Header => {
            commands::header::run(format)?;
        }
        Commands::Version => {
            println!("Bale CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Archive format v{}", bale_codec::archive::ArchiveHeader::empty_v1().version);
        }
    }

    Ok(())
}
