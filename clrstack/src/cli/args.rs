//! CLI argument definitions

use clap::Parser;
use clrstack_common::{DEFAULT_MAX_FRAMES, DEFAULT_MAX_REPEATED_STACK_POINTER};
use std::path::PathBuf;

use crate::stack::WalkLimits;

#[derive(Parser, Debug)]
#[command(
    name = "clrstack",
    about = "Reconstruct managed thread stacks and stack roots from a process snapshot",
    after_help = "\
EXAMPLES:
    clrstack dump.json                         All threads
    clrstack dump.json --thread 4242           One thread
    clrstack dump.json --roots --export r.json Include stack roots, save a report"
)]
pub struct Args {
    /// Snapshot file to inspect
    #[arg(value_name = "SNAPSHOT")]
    pub snapshot: PathBuf,

    /// Only inspect these OS thread ids (repeatable)
    #[arg(short, long = "thread", value_name = "TID")]
    pub threads: Vec<u32>,

    /// Stop each stack walk after N frames
    #[arg(long, default_value_t = DEFAULT_MAX_FRAMES)]
    pub max_frames: usize,

    /// Stop a stack walk when one stack pointer repeats N times in a row
    #[arg(long, default_value_t = DEFAULT_MAX_REPEATED_STACK_POINTER)]
    pub max_repeats: usize,

    /// Scan each stack for object references
    #[arg(short, long)]
    pub roots: bool,

    /// Export a JSON report to file
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Suppress per-thread output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Walk limits requested on the command line
    #[must_use]
    pub fn walk_limits(&self) -> WalkLimits {
        WalkLimits::new(self.max_frames, self.max_repeats)
    }
}
