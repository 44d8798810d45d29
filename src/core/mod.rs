pub mod config;
pub mod detection;
pub mod error;
pub mod ingest;
pub mod screenshot;
pub mod store;
pub mod video;

#[cfg(test)]
pub(crate) mod testing;

pub use config::IndexerConfig;
pub use error::{IndexerError, Result};
