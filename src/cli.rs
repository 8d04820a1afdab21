//! Command-line interface for acoustic-bridge
//!
//! Handles argument parsing and logging configuration.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::LevelFilter;

use acoustic_bridge::SampleFormat;

/// acoustic-bridge - send short messages through sound
#[derive(Parser, Debug)]
#[command(name = "acoustic-bridge")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Increase logging verbosity
    /// -v = info, -vv = debug, -vvv = trace
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Encode text into a WAV file
    Encode {
        text: String,

        #[arg(short, long, default_value = "message.wav")]
        output: PathBuf,

        /// Protocol id (see `protocols`); defaults to the configured protocol
        #[arg(short, long)]
        protocol: Option<i32>,

        #[arg(long)]
        volume: Option<i32>,

        #[arg(long)]
        sample_rate: Option<i32>,

        #[arg(long)]
        frame: Option<i32>,

        /// i16 or f32
        #[arg(long)]
        format: Option<SampleFormat>,
    },

    /// Decode messages from a WAV file, feeding it frame by frame
    Decode {
        input: PathBuf,

        #[arg(long)]
        frame: Option<i32>,
    },

    /// List the available protocols
    Protocols {
        #[arg(long)]
        json: bool,
    },
}

impl Args {
    /// Get the log level filter based on verbosity flags
    pub fn log_level(&self) -> LevelFilter {
        if self.quiet {
            LevelFilter::Error
        } else {
            match self.verbose {
                0 => LevelFilter::Warn,
                1 => LevelFilter::Info,
                2 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        }
    }
}

/// Initialize the logging system based on CLI arguments
pub fn init_logging(args: &Args) {
    let mut builder = env_logger::Builder::new();

    // Dependencies stay at warn
    builder.filter_level(LevelFilter::Warn);
    builder.filter_module("acoustic_bridge", args.log_level());

    builder.format_timestamp_millis().init();
}
