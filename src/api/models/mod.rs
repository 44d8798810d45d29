pub mod video;

pub use video::{ProcessAccepted, ProcessRequest, SearchResponse, VideoListItem, VideoListResponse};
