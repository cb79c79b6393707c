//! # clrstack - Main Entry Point
//!
//! Loads a process snapshot, reconstructs the stack of every selected thread
//! and prints it, optionally scanning for stack roots and exporting a JSON
//! report.

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::fs::File;
use std::io::BufWriter;

use clrstack::cli::Args;
use clrstack::display::{display_summary, display_thread};
use clrstack::domain::{OsThreadId, SnapshotError};
use clrstack::report::ReportExporter;
use clrstack::roots::scan_stack_roots;
use clrstack::runtime::DataReader;
use clrstack::snapshot::SnapshotRuntime;
use clrstack::thread::{ThreadFacade, ThreadInfo};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<SnapshotError>() {
        Some(SnapshotError::UnknownThread(_)) => EXIT_USAGE,
        _ => EXIT_ERROR,
    }
}

/// Threads to inspect: the `--thread` filter in the order given, or all of them.
fn select_threads(runtime: &SnapshotRuntime, filter: &[u32]) -> Result<Vec<ThreadInfo>> {
    if filter.is_empty() {
        return Ok(runtime.threads().collect());
    }

    let threads = filter
        .iter()
        .map(|&tid| runtime.thread(OsThreadId(tid)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(threads)
}

fn run() -> Result<()> {
    let args = Args::parse();
    let quiet = args.quiet;

    let runtime = SnapshotRuntime::load(&args.snapshot)?;
    let threads = select_threads(&runtime, &args.threads)?;
    let limits = args.walk_limits();

    if !quiet {
        println!("clrstack v{}", env!("CARGO_PKG_VERSION"));
        println!("snapshot: {}", args.snapshot.display());
        println!("threads: {}", threads.len());
    }
    info!("Walk limits: {limits:?}");

    let mut exporter = args.export.as_ref().map(|_| ReportExporter::new(runtime.pointer_size()));

    let mut thread_count = 0;
    let mut frame_count = 0;
    let mut root_count = 0;

    for info in threads {
        let thread = ThreadFacade::new(&runtime, info).with_limits(limits);
        let roots = args.roots.then(|| scan_stack_roots(&thread));

        if !quiet {
            display_thread(&thread, roots.as_deref());
        }

        thread_count += 1;
        frame_count += thread.stack_trace().len();
        root_count += roots.as_ref().map_or(0, Vec::len);

        if let Some(exporter) = exporter.as_mut() {
            exporter.add_thread(&thread, roots.as_deref().unwrap_or_default());
        }
    }

    if !quiet {
        display_summary(thread_count, frame_count, root_count);
    }

    if let (Some(exporter), Some(export_path)) = (exporter, args.export.as_ref()) {
        let file = File::create(export_path)
            .with_context(|| format!("Failed to create {}", export_path.display()))?;
        exporter.export(BufWriter::new(file)).context("Failed to export report")?;

        if !quiet {
            println!("saved: {}", export_path.display());
        }
    }

    Ok(())
}
