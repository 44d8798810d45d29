use std::fs;

use log::debug;

use crate::api::error::ApiError;
use crate::api::indexer::VideoTextIndexer;
use crate::api::models::SearchResponse;
use crate::core::screenshot::is_safe_filename;

impl VideoTextIndexer {
    /// 子串搜索，大小写不敏感，最多 50 条
    pub fn search(&self, query: &str) -> Result<SearchResponse, ApiError> {
        if query.trim().is_empty() {
            return Err(ApiError::invalid_input("No query provided"));
        }
        let results = self.store.search(query)?;
        debug!("🔍 search {:?}: {} hits", query, results.len());
        Ok(SearchResponse { results })
    }

    /// 读取截图 PNG。文件名含 `..`、`/`、`\` 时直接拒绝，不触碰文件系统。
    pub fn screenshot(&self, filename: &str) -> Result<Vec<u8>, ApiError> {
        if !is_safe_filename(filename) {
            return Err(ApiError::invalid_input("Invalid filename"));
        }
        let path = self.config.screenshot_dir.join(filename);
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ApiError::not_found("Screenshot not found"))
            }
            Err(e) => Err(ApiError::internal(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::api::indexer::test_support::indexer;

    #[test]
    fn test_search_after_ingest() {
        let (_dir, _backend, indexer) = indexer(&[("CAM_01", "OCR-Video.mp4")], |_| {});
        indexer.start().unwrap().wait();

        let response = indexer.search("msi-27").unwrap();
        assert_eq!(response.results.len(), 1);
        let hit = &response.results[0];
        assert_eq!(hit.text, "MSI-270");
        assert_eq!(hit.timestamp, 9.0);
        assert_eq!(hit.camera_id, "CAM_01");
        assert_eq!(hit.source_video, "OCR-Video.mp4");

        let png = indexer.screenshot(hit.screenshot_filename.as_deref().unwrap()).unwrap();
        assert_eq!(&png[..4], &[0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn test_empty_query_is_client_error() {
        let (_dir, _backend, indexer) = indexer(&[], |_| {});
        let err = indexer.search("  ").unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.message, "No query provided");
    }

    #[test]
    fn test_screenshot_traversal_rejected() {
        let (dir, _backend, indexer) = indexer(&[], |_| {});
        std::fs::write(dir.path().join("secret.png"), b"secret").unwrap();

        for name in ["../etc/passwd", "../secret.png", "..", "a/b.png", "..\\secret.png"] {
            let err = indexer.screenshot(name).unwrap_err();
            assert_eq!(err.status_code(), 400, "{}", name);
        }
    }

    #[test]
    fn test_missing_screenshot_is_not_found() {
        let (_dir, _backend, indexer) = indexer(&[], |_| {});
        assert_eq!(indexer.screenshot("nope.png").unwrap_err().status_code(), 404);
    }
}
