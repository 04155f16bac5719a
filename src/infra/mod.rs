//! Infrastructure adapters: stylesheet assets and logging bootstrap.

pub mod assets;
pub mod error;
pub mod telemetry;
