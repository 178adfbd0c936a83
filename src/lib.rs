pub mod actors;
pub mod engine;
pub mod error;
pub mod io;
pub mod math;
pub mod metrics;
pub mod operations;
pub mod quality;
pub mod solver;
pub mod topology;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{MeshError, Result};
