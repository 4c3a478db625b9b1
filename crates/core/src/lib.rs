//! Core library for the container launcher
//!
//! This crate contains the shared logic behind every lifecycle phase:
//! configuration resolution, runtime argument composition, process
//! invocation with cooperative cancellation, step pipelines, exit status
//! mapping, logging, and error handling.

pub mod config;
pub mod container;
pub mod errors;
pub mod exit;
pub mod logging;
pub mod pipeline;
pub mod process;
pub mod runtime;
