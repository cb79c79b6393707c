//! Terminal output for inspected threads

use crate::roots::RootRecord;
use crate::stack::format_frame;
use crate::thread::ThreadFacade;

/// Print a thread header, its stack, exception, locks and (optionally) roots
pub fn display_thread(thread: &ThreadFacade<'_>, roots: Option<&[RootRecord]>) {
    let managed = thread.managed_id().map_or_else(|| "-".to_string(), |id| id.to_string());
    println!("\nThread {} ({managed}) {}", thread.os_id(), thread.app_domain());

    let (base, limit) = (thread.stack_base(), thread.stack_limit());
    if base == 0 || limit == 0 {
        println!("   stack: <unknown bounds>");
    } else {
        println!("   stack: 0x{limit:016x} - 0x{base:016x}");
    }

    if let Some(exception) = thread.current_exception() {
        println!("   exception: {exception}");
    }

    let frames = thread.stack_trace();
    if frames.is_empty() {
        println!("   <no frames>");
    } else {
        for (i, frame) in frames.iter().enumerate() {
            println!("      {}", format_frame(i, frame));
        }
    }

    let blocking = thread.blocking_objects();
    if !blocking.is_empty() {
        println!("   blocking objects:");
        for object in blocking {
            println!("      {object}");
        }
    }

    if let Some(roots) = roots {
        println!("   roots: {}", roots.len());
        for root in roots {
            println!("      {root}");
        }
    }
}

/// Summary line printed after all threads
pub fn display_summary(threads: usize, frames: usize, roots: usize) {
    eprintln!("\ninspected: {threads} threads, {frames} frames, {roots} roots");
}
