//! Document Catalog - rusqlite 기반 수집 문서 목록
//!
//! 인덱스 디렉토리 안의 `catalog.db`에 어떤 문서가 언제 수집되었는지 기록합니다.
//! 원문 전체는 저장하지 않습니다. 인덱스와 함께 매번 새로 만들어집니다.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags};

use crate::source::Document;

/// 카탈로그 파일 이름
pub const CATALOG_FILE: &str = "catalog.db";

// ============================================================================
// Types
// ============================================================================

/// 카탈로그 레코드
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub id: i64,
    pub topic: String,
    pub title: String,
    pub source: String,
    pub summary: String,
    /// 본문 길이 (문자 수)
    pub content_chars: usize,
    pub chunk_count: usize,
    pub ingested_at: DateTime<Utc>,
}

/// 카탈로그 통계
#[derive(Debug, Clone)]
pub struct CatalogStats {
    pub document_count: usize,
    pub chunk_count: usize,
    pub total_content_chars: usize,
    pub db_path: PathBuf,
}

// ============================================================================
// DocumentCatalog
// ============================================================================

/// 수집 문서 카탈로그
pub struct DocumentCatalog {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl DocumentCatalog {
    /// 카탈로그 열기 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create catalog directory")?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open SQLite database")?;

        let catalog = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        };

        catalog.initialize()?;
        Ok(catalog)
    }

    /// 인덱스 디렉토리 안의 카탈로그 열기
    pub fn open_in(index_dir: &Path) -> Result<Self> {
        Self::open(&index_dir.join(CATALOG_FILE))
    }

    /// 기존 카탈로그를 읽기 전용으로 열기
    ///
    /// 파일이 없으면 `Ok(None)`이며 아무것도 만들지 않습니다.
    pub fn open_existing(index_dir: &Path) -> Result<Option<Self>> {
        let path = index_dir.join(CATALOG_FILE);
        if !path.exists() {
            return Ok(None);
        }

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open SQLite database")?;

        Ok(Some(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path,
        }))
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                topic TEXT NOT NULL,
                title TEXT NOT NULL,
                source TEXT NOT NULL,
                summary TEXT NOT NULL,
                content_chars INTEGER NOT NULL,
                chunk_count INTEGER NOT NULL,
                ingested_at TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create documents table")?;

        tracing::debug!("Document catalog initialized at {:?}", self.db_path);
        Ok(())
    }

    /// 카탈로그 전체 교체
    ///
    /// 기존 레코드를 지우고 `documents`를 순서대로 기록합니다.
    /// `chunk_counts[i]`는 `documents[i]`의 청크 수입니다.
    pub fn replace_all(&self, documents: &[Document], chunk_counts: &[usize]) -> Result<usize> {
        if documents.len() != chunk_counts.len() {
            anyhow::bail!(
                "Got {} documents but {} chunk counts",
                documents.len(),
                chunk_counts.len()
            );
        }

        let mut conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        let tx = conn.transaction().context("Failed to begin transaction")?;
        let now = Utc::now().to_rfc3339();

        tx.execute("DELETE FROM documents", [])
            .context("Failed to clear catalog")?;

        for (doc, chunks) in documents.iter().zip(chunk_counts) {
            tx.execute(
                "INSERT INTO documents (topic, title, source, summary, content_chars, chunk_count, ingested_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    doc.topic,
                    doc.title,
                    doc.source,
                    doc.summary,
                    doc.content.chars().count() as i64,
                    *chunks as i64,
                    now
                ],
            )
            .context("Failed to insert catalog entry")?;
        }

        tx.commit().context("Failed to commit catalog")?;
        tracing::info!("Catalogued {} documents", documents.len());

        Ok(documents.len())
    }

    /// 수집 순서대로 목록 조회
    pub fn list(&self) -> Result<Vec<CatalogEntry>> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut stmt = conn.prepare(
            "SELECT id, topic, title, source, summary, content_chars, chunk_count, ingested_at
             FROM documents
             ORDER BY id",
        )?;

        let entries = stmt
            .query_map([], |row| {
                Ok(CatalogEntry {
                    id: row.get(0)?,
                    topic: row.get(1)?,
                    title: row.get(2)?,
                    source: row.get(3)?,
                    summary: row.get(4)?,
                    content_chars: row.get::<_, i64>(5)? as usize,
                    chunk_count: row.get::<_, i64>(6)? as usize,
                    ingested_at: parse_datetime(row.get::<_, String>(7)?),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read catalog")?;

        Ok(entries)
    }

    /// 카탈로그 통계
    pub fn stats(&self) -> Result<CatalogStats> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let (count, chunks, chars): (i64, i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(chunk_count), 0), COALESCE(SUM(content_chars), 0)
             FROM documents",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        Ok(CatalogStats {
            document_count: count as usize,
            chunk_count: chunks as usize,
            total_content_chars: chars as usize,
            db_path: self.db_path.clone(),
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// RFC3339 문자열을 DateTime<Utc>로 파싱
fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_catalog() -> (TempDir, DocumentCatalog) {
        let dir = TempDir::new().unwrap();
        let catalog = DocumentCatalog::open_in(dir.path()).unwrap();
        (dir, catalog)
    }

    fn document(topic: &str, content: &str) -> Document {
        Document {
            topic: topic.to_string(),
            title: topic.to_string(),
            source: format!("https://en.wikipedia.org/wiki/{}", topic),
            summary: content.split('.').next().unwrap_or_default().to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_replace_and_list() {
        let (_dir, catalog) = create_test_catalog();

        let docs = vec![
            document("NASA", "NASA is an agency. It was founded in 1958."),
            document("SpaceX", "SpaceX is a company."),
        ];
        catalog.replace_all(&docs, &[2, 1]).unwrap();

        let entries = catalog.list().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].topic, "NASA");
        assert_eq!(entries[0].chunk_count, 2);
        assert_eq!(entries[1].summary, "SpaceX is a company");
        assert_eq!(entries[1].content_chars, 20);
    }

    #[test]
    fn test_replace_discards_previous() {
        let (_dir, catalog) = create_test_catalog();

        catalog
            .replace_all(&[document("NASA", "a"), document("SpaceX", "b")], &[1, 1])
            .unwrap();
        catalog
            .replace_all(&[document("Mars exploration", "c")], &[1])
            .unwrap();

        let entries = catalog.list().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].topic, "Mars exploration");
    }

    #[test]
    fn test_mismatched_counts() {
        let (_dir, catalog) = create_test_catalog();
        assert!(catalog.replace_all(&[document("NASA", "a")], &[]).is_err());
    }

    #[test]
    fn test_stats() {
        let (_dir, catalog) = create_test_catalog();

        catalog
            .replace_all(&[document("NASA", "1234567890"), document("ISS", "12345")], &[3, 1])
            .unwrap();

        let stats = catalog.stats().unwrap();
        assert_eq!(stats.document_count, 2);
        assert_eq!(stats.chunk_count, 4);
        assert_eq!(stats.total_content_chars, 15);
    }

    #[test]
    fn test_open_existing_missing_creates_nothing() {
        let dir = TempDir::new().unwrap();

        assert!(DocumentCatalog::open_existing(dir.path()).unwrap().is_none());
        assert!(!dir.path().join(CATALOG_FILE).exists());
    }

    #[test]
    fn test_open_existing_is_read_only() {
        let (dir, catalog) = create_test_catalog();
        catalog.replace_all(&[document("NASA", "NASA")], &[1]).unwrap();
        drop(catalog);

        let catalog = DocumentCatalog::open_existing(dir.path()).unwrap().unwrap();
        assert_eq!(catalog.list().unwrap().len(), 1);
        assert_eq!(catalog.stats().unwrap().db_path, dir.path().join(CATALOG_FILE));
        assert!(catalog.replace_all(&[document("ISS", "ISS")], &[1]).is_err());
    }

    #[test]
    fn test_empty_stats() {
        let (_dir, catalog) = create_test_catalog();
        let stats = catalog.stats().unwrap();
        assert_eq!(stats.document_count, 0);
        assert_eq!(stats.chunk_count, 0);
    }
}
