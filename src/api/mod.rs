pub mod error;
pub mod indexer;
pub mod models;
pub mod search;
pub mod video;

pub use error::ApiError;
pub use indexer::VideoTextIndexer;
