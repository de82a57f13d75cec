//! Command implementations for the Tally CLI.

pub mod config;
pub mod run;
