//! Core types: errors, configuration, run context and cancellation.

pub mod cancel;
pub mod config;
pub mod context;
pub mod errors;
pub mod paths;
