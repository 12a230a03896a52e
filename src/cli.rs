use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bdforge")]
#[command(author, version, about = "Blu-ray main feature analysis and HDR-preserving encoding")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Locate the main feature of a disc (or a single file) and encode it
    Encode {
        /// Disc directory or media file
        #[arg(required = true)]
        input: PathBuf,

        /// Directory the encoded file is written to
        #[arg(required = true)]
        output: PathBuf,

        /// Print the compiled plan and ffmpeg command without encoding
        #[arg(long)]
        dry_run: bool,

        /// Replace an existing output file
        #[arg(long)]
        overwrite: bool,
    },

    /// Encode every disc directory and media file found in a directory
    Batch {
        /// Directory containing disc directories and media files
        #[arg(required = true)]
        input_dir: PathBuf,

        /// Directory the encoded files are written to
        #[arg(required = true)]
        output_dir: PathBuf,

        /// Print plans without encoding
        #[arg(long)]
        dry_run: bool,
    },

    /// Probe a media file and display information
    Probe {
        /// File to probe
        #[arg(required = true)]
        path: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that ffmpeg and ffprobe are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses the search path if not specified)
        config: Option<PathBuf>,
    },

    /// Write a configuration file populated with the defaults
    InitConfig {
        /// Where to write it
        #[arg(default_value = "bdforge.toml")]
        path: PathBuf,

        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },

    /// Display version information
    Version,
}
