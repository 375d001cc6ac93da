//! SQLite 存储
//!
//! 单连接放在互斥锁后面，所有阻塞调用都挪到 `spawn_blocking`。

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;
use uuid::Uuid;

use crate::error::{AppResult, PersistenceError};
use crate::models::{Report, Score, TestStatus};
use crate::persistence::{PersistenceAdapter, TestRecord, INTERRUPTED_BY_RESTART};

const SCHEMA: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS tests (
    id          TEXT PRIMARY KEY,
    url         TEXT NOT NULL,
    status      TEXT NOT NULL,
    progress    INTEGER NOT NULL DEFAULT 0,
    message     TEXT NOT NULL DEFAULT '',
    error       TEXT,
    score_json  TEXT,
    duration_ms INTEGER,
    report_id   TEXT,
    report_json TEXT,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tests_status ON tests(status);
CREATE INDEX IF NOT EXISTS idx_tests_created_at ON tests(created_at);
"#;

const SELECT_COLUMNS: &str = "id, url, status, progress, message, error, score_json, \
     duration_ms, report_id, report_json, created_at, updated_at";

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// 打开（必要时创建）数据库文件并初始化表结构
    pub async fn open(path: &str) -> AppResult<Self> {
        let path = path.to_string();
        let conn = tokio::task::spawn_blocking(move || -> AppResult<Connection> {
            if let Some(parent) = Path::new(&path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let conn = Connection::open(&path)?;
            conn.execute_batch(SCHEMA)?;
            info!("📦 SQLite 数据库已就绪: {}", path);
            Ok(conn)
        })
        .await
        .map_err(|e| PersistenceError::Task(e.to_string()))??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 内存数据库（测试用）
    pub fn open_in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> AppResult<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            f(&conn)
        })
        .await
        .map_err(|e| PersistenceError::Task(e.to_string()))?
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn corrupt(id: &str, reason: impl ToString) -> PersistenceError {
    PersistenceError::CorruptRecord {
        id: id.to_string(),
        reason: reason.to_string(),
    }
}

/// 原始行，解码在拿到连接锁之外完成
struct RawRow {
    id: String,
    url: String,
    status: String,
    progress: i64,
    message: String,
    error: Option<String>,
    score_json: Option<String>,
    duration_ms: Option<i64>,
    report_id: Option<String>,
    report_json: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            url: row.get(1)?,
            status: row.get(2)?,
            progress: row.get(3)?,
            message: row.get(4)?,
            error: row.get(5)?,
            score_json: row.get(6)?,
            duration_ms: row.get(7)?,
            report_id: row.get(8)?,
            report_json: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    fn decode(self) -> Result<TestRecord, PersistenceError> {
        let id = &self.id;
        let test_id = Uuid::parse_str(id).map_err(|e| corrupt(id, e))?;
        let status = TestStatus::from_str(&self.status).map_err(|e| corrupt(id, e))?;
        let score: Option<Score> = self
            .score_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        let report: Option<Report> = self
            .report_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        let report_id = self
            .report_id
            .as_deref()
            .map(Uuid::parse_str)
            .transpose()
            .map_err(|e| corrupt(id, e))?;
        let parse_time = |raw: &str| {
            DateTime::parse_from_rfc3339(raw)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| corrupt(id, e))
        };
        Ok(TestRecord {
            test_id,
            url: self.url.clone(),
            status,
            progress: self.progress.clamp(0, 100) as u8,
            message: self.message.clone(),
            error: self.error.clone(),
            score,
            duration_ms: self.duration_ms.map(|d| d.max(0) as u64),
            report_id,
            report,
            created_at: parse_time(&self.created_at)?,
            updated_at: parse_time(&self.updated_at)?,
        })
    }
}

#[async_trait]
impl PersistenceAdapter for SqliteStore {
    async fn create_test(&self, id: Uuid, url: &str, status: TestStatus) -> AppResult<()> {
        let url = url.to_string();
        self.with_conn(move |conn| {
            let ts = now();
            conn.execute(
                "INSERT INTO tests (id, url, status, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
                params![id.to_string(), url, status.as_str(), ts],
            )?;
            Ok(())
        })
        .await
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: TestStatus,
        progress: u8,
        message: &str,
    ) -> AppResult<()> {
        let message = message.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE tests SET status = ?2, progress = ?3, message = ?4, updated_at = ?5 \
                 WHERE id = ?1 AND status NOT IN ('completed', 'failed')",
                params![id.to_string(), status.as_str(), progress, message, now()],
            )?;
            Ok(())
        })
        .await
    }

    async fn complete(
        &self,
        id: Uuid,
        status: TestStatus,
        score: &Score,
        duration_ms: u64,
        report_id: Uuid,
        report: &Report,
    ) -> AppResult<()> {
        let score_json = serde_json::to_string(score).map_err(PersistenceError::from)?;
        let report_json = serde_json::to_string(report).map_err(PersistenceError::from)?;
        let duration_ms = i64::try_from(duration_ms).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE tests SET status = ?2, progress = 100, message = 'Test completed', \
                 score_json = ?3, duration_ms = ?4, report_id = ?5, report_json = ?6, updated_at = ?7 \
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    status.as_str(),
                    score_json,
                    duration_ms,
                    report_id.to_string(),
                    report_json,
                    now()
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn fail(&self, id: Uuid, error: &str) -> AppResult<()> {
        let error = error.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE tests SET status = 'failed', message = ?2, error = ?2, updated_at = ?3 WHERE id = ?1",
                params![id.to_string(), error, now()],
            )?;
            Ok(())
        })
        .await
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<TestRecord>> {
        let raw = self
            .with_conn(move |conn| {
                let sql = format!("SELECT {} FROM tests WHERE id = ?1", SELECT_COLUMNS);
                let raw = conn
                    .query_row(&sql, params![id.to_string()], RawRow::from_row)
                    .optional()?;
                Ok(raw)
            })
            .await?;
        Ok(raw.map(RawRow::decode).transpose()?)
    }

    async fn list(
        &self,
        status: Option<TestStatus>,
        limit: usize,
        offset: usize,
    ) -> AppResult<Vec<TestRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        let rows = self
            .with_conn(move |conn| {
                let sql = format!(
                    "SELECT {} FROM tests WHERE (?1 IS NULL OR status = ?1) \
                     ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
                    SELECT_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(
                        params![status.map(|s| s.as_str()), limit, offset],
                        RawRow::from_row,
                    )?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        let records = rows
            .into_iter()
            .map(RawRow::decode)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    async fn recover_interrupted(&self) -> AppResult<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE tests SET status = 'failed', message = ?1, error = ?1, updated_at = ?2 \
                 WHERE status IN ('pending', 'running')",
                params![INTERRUPTED_BY_RESTART, now()],
            )?;
            Ok(changed)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RenderMode;

    fn report(test_id: Uuid) -> Report {
        Report {
            id: Uuid::new_v4(),
            test_id,
            url: "https://example.com/game".to_string(),
            score: score(),
            render_mode: RenderMode::Canvas,
            screenshots: vec![],
            console_logs: vec![],
            video: None,
            warnings: vec!["consent handling failed".to_string()],
            duration_ms: 4200,
            created_at: Utc::now(),
        }
    }

    fn score() -> Score {
        Score {
            playability: 72,
            passed: true,
            summary: "playable".to_string(),
            issues: vec![],
        }
    }

    #[tokio::test]
    async fn test_complete_round_trips_report() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = Uuid::new_v4();
        store.create_test(id, "https://example.com/game", TestStatus::Pending).await.unwrap();
        store.update_status(id, TestStatus::Running, 30, "Capturing initial screenshot").await.unwrap();

        let report = report(id);
        store
            .complete(id, TestStatus::Completed, &report.score, 4200, report.id, &report)
            .await
            .unwrap();

        let record = store.get(id).await.unwrap().unwrap();
        assert_eq!(record.status, TestStatus::Completed);
        assert_eq!(record.progress, 100);
        assert_eq!(record.report_id, Some(report.id));
        assert_eq!(record.report.as_ref(), Some(&report));
        assert_eq!(record.view().warnings, report.warnings);
    }

    #[tokio::test]
    async fn test_late_progress_keeps_final_status() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = Uuid::new_v4();
        store.create_test(id, "https://example.com/game", TestStatus::Pending).await.unwrap();
        store.fail(id, "test cancelled").await.unwrap();
        store
            .update_status(id, TestStatus::Running, 65, "Playing game and recording")
            .await
            .unwrap();

        let record = store.get(id).await.unwrap().unwrap();
        assert_eq!(record.status, TestStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("test cancelled"));
        assert_eq!(record.message, "test cancelled");
        assert_eq!(store.recover_interrupted().await.unwrap(), 0);
        assert_eq!(store.get(id).await.unwrap().unwrap().error.as_deref(), Some("test cancelled"));
    }

    #[tokio::test]
    async fn test_list_filters_and_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db").join("qa.db");
        let store = SqliteStore::open(path.to_str().unwrap()).await.unwrap();

        let running = Uuid::new_v4();
        let failed = Uuid::new_v4();
        store.create_test(running, "https://example.com/a", TestStatus::Pending).await.unwrap();
        store.update_status(running, TestStatus::Running, 20, "Navigating to game").await.unwrap();
        store.create_test(failed, "https://example.com/b", TestStatus::Pending).await.unwrap();
        store.fail(failed, "navigation failed").await.unwrap();

        let only_failed = store.list(Some(TestStatus::Failed), 50, 0).await.unwrap();
        assert_eq!(only_failed.len(), 1);
        assert_eq!(only_failed[0].test_id, failed);

        assert_eq!(store.recover_interrupted().await.unwrap(), 1);
        let record = store.get(running).await.unwrap().unwrap();
        assert_eq!(record.status, TestStatus::Failed);
        assert_eq!(record.error.as_deref(), Some(INTERRUPTED_BY_RESTART));
        assert_eq!(store.list(None, 50, 0).await.unwrap().len(), 2);
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
    }
}
