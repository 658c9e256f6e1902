//! Configuration module for partar
//!
//! CLI arguments and the resolved per-run settings.

mod settings;

pub use settings::*;
