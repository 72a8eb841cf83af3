//! Command-line interface
//!
//! Argument definitions for the node binary; command execution lives in
//! `main.rs`.

pub mod commands;

pub use commands::{Command, Opt};
