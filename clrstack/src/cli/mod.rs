//! Command-line interface for clrstack
//!
//! This module contains CLI argument parsing and configuration

pub mod args;

pub use args::Args;
