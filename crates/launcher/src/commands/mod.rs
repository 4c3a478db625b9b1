//! Command implementations
//!
//! One module per lifecycle phase. Every phase takes a
//! [`shared::PhaseContext`] so the process invoker and configuration loader
//! can be swapped in tests.

pub mod bootstrap;
pub mod build;
pub mod cleanup;
pub mod configure;
pub mod destroy;
pub mod enter;
pub mod generate;
pub mod logs;
pub mod migrate;
pub mod rebuild;
pub mod restart;
pub mod run;
pub mod shared;
pub mod start;
pub mod stop;
