//! Core modules: workspace snapshots, caching, configuration and the
//! shared primitives the plugins build on.

pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod output;
pub mod process;
pub mod rpc;
pub mod time;
pub mod workspace;
