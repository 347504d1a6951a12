//! Watch Harness Library
//!
//! Drives a watch-mode build/test process, checks its stdout line by line
//! against a scripted scenario and triggers rebuilds by writing files.
//! The binary entry point is in main.rs.

pub mod config;
pub mod error;
pub mod expect;
pub mod fixture;
pub mod junit;
pub mod line_reader;
pub mod process;
pub mod reporter;
pub mod runner;
pub mod signals;
