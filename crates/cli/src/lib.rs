//! `comfyctl` command-line library crate.
//!
//! Holds the subcommand definitions and handlers so they can be tested
//! without spawning the binary. The entrypoint lives in `main.rs`.

pub mod commands;
pub mod params;
