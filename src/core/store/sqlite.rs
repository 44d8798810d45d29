use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use log::{info, warn};
use rusqlite::{params, Connection, OptionalExtension};

use crate::core::detection::filter::DetectionKey;
use crate::core::error::Result;
use crate::core::store::{
    ClearScope, DetectionRecord, DetectionStore, SearchResult, UpsertOutcome, MAX_SEARCH_RESULTS,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS detections (
    camera_id     TEXT NOT NULL,
    source_video  TEXT NOT NULL,
    text          TEXT NOT NULL,
    -- 按 Unicode 规则转小写的文本，搜索只比较这一列
    folded_text   TEXT NOT NULL,
    timestamp_key TEXT NOT NULL,
    timestamp     REAL NOT NULL,
    confidence    REAL NOT NULL,
    screenshot    TEXT,
    PRIMARY KEY (camera_id, source_video, text, timestamp_key)
);
CREATE INDEX IF NOT EXISTS idx_detections_source ON detections(source_video);
";

/// SQLite 实现。单连接，写入由复合主键 + INSERT OR IGNORE 保证幂等。
pub struct SqliteDetectionStore {
    conn: Mutex<Connection>,
    precision: u8,
}

impl SqliteDetectionStore {
    pub fn open(path: impl AsRef<Path>, precision: u8) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        // WAL 下读写互不阻塞
        conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;
        info!("🗄️ Detection store opened: {}", path.display());
        Self::init(conn, precision)
    }

    pub fn open_in_memory(precision: u8) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, precision)
    }

    fn init(conn: Connection, precision: u8) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            precision,
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // 持锁线程 panic 不影响连接本身
        self.conn.lock().unwrap_or_else(|poisoned| {
            warn!("⚠️ Detection store lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

/// SQLite 的 lower() 只处理 ASCII，大小写折叠放在 Rust 侧
fn fold_case(text: &str) -> String {
    text.to_lowercase()
}

impl DetectionStore for SqliteDetectionStore {
    fn upsert(&self, record: &DetectionRecord) -> Result<UpsertOutcome> {
        let key = record.key(self.precision);
        let changed = self.conn().execute(
            "INSERT OR IGNORE INTO detections
                (camera_id, source_video, text, folded_text, timestamp_key, timestamp, confidence, screenshot)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                key.camera_id,
                key.source_video,
                key.text,
                fold_case(&key.text),
                key.timestamp_key,
                record.timestamp,
                record.confidence as f64,
                record.screenshot,
            ],
        )?;
        Ok(if changed == 0 {
            UpsertOutcome::Duplicate
        } else {
            UpsertOutcome::Inserted
        })
    }

    fn contains(&self, key: &DetectionKey) -> Result<bool> {
        let found = self
            .conn()
            .query_row(
                "SELECT 1 FROM detections
                 WHERE camera_id = ?1 AND source_video = ?2 AND text = ?3 AND timestamp_key = ?4",
                params![key.camera_id, key.source_video, key.text, key.timestamp_key],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT text, timestamp, camera_id, source_video, confidence, screenshot
             FROM detections
             WHERE instr(folded_text, ?1) > 0
             ORDER BY text, timestamp, camera_id, source_video
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![fold_case(query), MAX_SEARCH_RESULTS as i64], |row| {
            Ok(SearchResult {
                text: row.get(0)?,
                timestamp: row.get(1)?,
                camera_id: row.get(2)?,
                source_video: row.get(3)?,
                confidence: row.get::<_, f64>(4)? as f32,
                screenshot_filename: row.get(5)?,
            })
        })?;
        let results = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(results)
    }

    fn clear(&self, scope: &ClearScope) -> Result<usize> {
        let removed = match scope {
            ClearScope::All => self.conn().execute("DELETE FROM detections", [])?,
            ClearScope::Video { source_video } => self.conn().execute(
                "DELETE FROM detections WHERE source_video = ?1",
                params![source_video],
            )?,
        };
        info!("🧹 Cleared {} detections ({:?})", removed, scope);
        Ok(removed)
    }

    fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM detections", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    fn key_precision(&self) -> u8 {
        self.precision
    }
}
