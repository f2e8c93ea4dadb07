//! Text profiles of instrumented program traces

#![deny(missing_docs)]

mod duration;
mod profile;
mod stdio;

use clap::Parser;
use std::{io, path::PathBuf};
use thiserror::Error;
use trace_tree::SerializationError;

/// Turn a recorded event trace into a profiler-like visualization
#[derive(Parser, Debug)]
#[clap(author, version, about)]
pub struct CliArgs {
    /// Maximal number of terminal columns to be used in the display
    #[clap(short = 'c', long = "cols", default_value = "200")]
    max_cols: u16,

    /// Self-profile display threshold, as a percentage of total duration
    #[clap(short, long, default_value = "0.5")]
    self_threshold: f32,

    /// Hierarchical profile display threshold, as a percentage of total duration
    #[clap(short = 't', long, default_value = "0.5")]
    hierarchical_threshold: f32,

    /// Maximal depth of the hierarchical profile, threads excluded
    #[clap(short = 'd', long)]
    max_depth: Option<usize>,

    /// Also export the reconstructed scopes as a Chrome trace at this path
    #[clap(long)]
    chrome: Option<PathBuf>,

    /// Trace file to be analyzed, as written by the trace-tree serializer
    input: PathBuf,
}

/// What can go wrong while producing a profile
#[derive(Error, Debug)]
pub enum ToolError {
    /// Failed to open the input trace
    #[error("failed to open {path:?} ({source})")]
    Open {
        /// Path that was requested
        path: PathBuf,

        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Failed to decode the input trace
    #[error("failed to read trace data: {0}")]
    Read(#[from] SerializationError),

    /// Failed to write the Chrome trace export
    #[error("failed to export Chrome trace to {path:?} ({source})")]
    Export {
        /// Path that was requested
        path: PathBuf,

        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Failed to write the profile to stdout
    #[error("failed to display profile ({0})")]
    Display(#[from] io::Error),
}

fn main() {
    env_logger::init();
    let args = CliArgs::parse();
    if let Err(e) = stdio::run(args) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
