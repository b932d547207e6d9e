//! LanceDB Vector Store - 인덱스 재구축 및 로드
//!
//! 인덱스 디렉토리 하나가 곧 인덱스입니다. 디렉토리가 없으면 "인덱스 없음"입니다.
//! 쓰기는 항상 디렉토리를 지우고 새로 만드는 전체 재구축입니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::table::Table;

use super::chunker::Chunk;
use super::vector::{SearchResult, VectorEntry, VectorStore};

/// 청크 테이블 이름
pub const TABLE_NAME: &str = "chunks";

/// 벡터 컬럼 이름
const VECTOR_COLUMN: &str = "vector";

// ============================================================================
// LanceVectorStore
// ============================================================================

/// LanceDB 벡터 저장소
pub struct LanceVectorStore {
    table: Table,
    dimension: usize,
}

impl LanceVectorStore {
    /// 인덱스 전체 재구축
    ///
    /// `path`에 기존 디렉토리가 있으면 삭제한 뒤 새 테이블을 만듭니다.
    /// 증분 업서트는 하지 않습니다.
    ///
    /// # Arguments
    /// * `path` - 인덱스 디렉토리
    /// * `entries` - 저장할 엔트리 (비어 있으면 에러)
    /// * `dimension` - 임베딩 차원
    pub async fn rebuild(path: &Path, entries: &[VectorEntry], dimension: usize) -> Result<Self> {
        let batch = Self::entries_to_batch(entries, dimension)?;

        if path.exists() {
            tracing::info!("Removing old index at {}", path.display());
            tokio::fs::remove_dir_all(path)
                .await
                .context("Failed to remove old index directory")?;
        }

        tokio::fs::create_dir_all(path)
            .await
            .context("Failed to create index directory")?;

        let db = Self::connect(path).await?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
        let table = db
            .create_table(TABLE_NAME, batches)
            .execute()
            .await
            .context("Failed to create table")?;

        tracing::info!(
            "Indexed {} chunks into {} (dimension: {})",
            entries.len(),
            path.display(),
            dimension
        );

        Ok(Self { table, dimension })
    }

    /// 기존 인덱스 열기
    ///
    /// 디렉토리가 없으면 `Ok(None)`, 있는데 청크 테이블이 없으면 에러입니다.
    pub async fn open_existing(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            tracing::debug!("No index at {}", path.display());
            return Ok(None);
        }

        let db = Self::connect(path).await?;

        let names = db
            .table_names()
            .execute()
            .await
            .context("Failed to list tables")?;
        if !names.iter().any(|n| n == TABLE_NAME) {
            anyhow::bail!(
                "{} exists but does not contain a valid index (missing '{}' table)",
                path.display(),
                TABLE_NAME
            );
        }

        let table = db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .context("Failed to open existing table")?;

        let schema = table.schema().await.context("Failed to read table schema")?;
        let dimension = match schema
            .field_with_name(VECTOR_COLUMN)
            .map(|f| f.data_type().clone())
        {
            Ok(DataType::FixedSizeList(_, size)) => size as usize,
            _ => anyhow::bail!("Index table has no '{}' vector column", VECTOR_COLUMN),
        };

        Ok(Some(Self { table, dimension }))
    }

    async fn connect(path: &Path) -> Result<Connection> {
        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

        lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")
    }

    /// 테이블 스키마
    fn create_schema(dimension: i32) -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("topic", DataType::Utf8, false),
            Field::new("title", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("start_index", DataType::Int64, false),
            Field::new("text", DataType::Utf8, false),
            Field::new(
                VECTOR_COLUMN,
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension,
                ),
                false,
            ),
        ])
    }

    /// 엔트리들을 Arrow RecordBatch로 변환
    fn entries_to_batch(entries: &[VectorEntry], dimension: usize) -> Result<RecordBatch> {
        if entries.is_empty() {
            anyhow::bail!("Cannot build an index from zero chunks");
        }

        if let Some(bad) = entries.iter().find(|e| e.embedding.len() != dimension) {
            anyhow::bail!(
                "Embedding for chunk {} has dimension {}, expected {}",
                bad.chunk.id,
                bad.embedding.len(),
                dimension
            );
        }

        let dim = i32::try_from(dimension).context("Embedding dimension too large")?;

        let ids: Vec<&str> = entries.iter().map(|e| e.chunk.id.as_str()).collect();
        let topics: Vec<&str> = entries.iter().map(|e| e.chunk.topic.as_str()).collect();
        let titles: Vec<&str> = entries.iter().map(|e| e.chunk.title.as_str()).collect();
        let sources: Vec<&str> = entries.iter().map(|e| e.chunk.source.as_str()).collect();
        let starts: Vec<i64> = entries.iter().map(|e| e.chunk.start_index as i64).collect();
        let texts: Vec<&str> = entries.iter().map(|e| e.chunk.text.as_str()).collect();

        let embeddings_flat: Vec<f32> = entries
            .iter()
            .flat_map(|e| e.embedding.iter().copied())
            .collect();

        let values = Float32Array::from(embeddings_flat);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings_list =
            FixedSizeListArray::try_new(field, dim, Arc::new(values) as Arc<dyn Array>, None)
                .context("Failed to create embedding array")?;

        let batch = RecordBatch::try_new(
            Arc::new(Self::create_schema(dim)),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(topics)),
                Arc::new(StringArray::from(titles)),
                Arc::new(StringArray::from(sources)),
                Arc::new(Int64Array::from(starts)),
                Arc::new(StringArray::from(texts)),
                Arc::new(embeddings_list),
            ],
        )
        .context("Failed to create RecordBatch")?;

        Ok(batch)
    }

    /// 검색 결과 배치를 `SearchResult`로 변환
    fn batch_to_results(batch: &RecordBatch) -> Result<Vec<SearchResult>> {
        let string_column = |name: &str| -> Result<&StringArray> {
            batch
                .column_by_name(name)
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .ok_or_else(|| anyhow::anyhow!("Missing {} column", name))
        };

        let ids = string_column("id")?;
        let topics = string_column("topic")?;
        let titles = string_column("title")?;
        let sources = string_column("source")?;
        let texts = string_column("text")?;

        let starts = batch
            .column_by_name("start_index")
            .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
            .ok_or_else(|| anyhow::anyhow!("Missing start_index column"))?;

        // _distance 컬럼 (LanceDB가 자동 추가)
        let distances = batch
            .column_by_name("_distance")
            .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
            .ok_or_else(|| anyhow::anyhow!("Missing _distance column"))?;

        let results = (0..batch.num_rows())
            .map(|i| SearchResult {
                chunk: Chunk {
                    id: ids.value(i).to_string(),
                    topic: topics.value(i).to_string(),
                    title: titles.value(i).to_string(),
                    source: sources.value(i).to_string(),
                    start_index: starts.value(i).max(0) as usize,
                    text: texts.value(i).to_string(),
                },
                distance: distances.value(i),
            })
            .collect();

        Ok(results)
    }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
        if query_embedding.len() != self.dimension {
            anyhow::bail!(
                "Query embedding has dimension {}, index expects {} (was the index built with another model?)",
                query_embedding.len(),
                self.dimension
            );
        }

        let stream = self
            .table
            .vector_search(query_embedding.to_vec())
            .context("Failed to create vector search")?
            .limit(limit)
            .execute()
            .await
            .context("Failed to execute vector search")?;

        let batches: Vec<RecordBatch> = stream.try_collect().await?;

        let mut results = Vec::with_capacity(limit);
        for batch in &batches {
            results.extend(Self::batch_to_results(batch)?);
        }

        Ok(results)
    }

    async fn count(&self) -> Result<usize> {
        self.table
            .count_rows(None)
            .await
            .context("Failed to count rows")
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::chunker::chunk_id;
    use tempfile::TempDir;

    const DIM: usize = 8;

    fn create_test_entry(source: &str, start_index: usize, axis: usize) -> VectorEntry {
        let mut embedding = vec![0.0; DIM];
        embedding[axis % DIM] = 1.0;
        VectorEntry {
            chunk: Chunk {
                id: chunk_id(source, start_index),
                topic: "NASA".to_string(),
                title: "NASA".to_string(),
                source: source.to_string(),
                start_index,
                text: format!("chunk {} of {}", start_index, source),
            },
            embedding,
        }
    }

    #[tokio::test]
    async fn test_open_missing_is_absent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("space_db");

        let store = LanceVectorStore::open_existing(&path).await.unwrap();
        assert!(store.is_none());
    }

    #[tokio::test]
    async fn test_open_directory_without_table_fails() {
        let temp_dir = TempDir::new().unwrap();
        let result = LanceVectorStore::open_existing(temp_dir.path()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_rebuild_and_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("space_db");

        let entries = vec![
            create_test_entry("a", 0, 0),
            create_test_entry("a", 800, 1),
            create_test_entry("b", 0, 2),
        ];
        let store = LanceVectorStore::rebuild(&path, &entries, DIM).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 3);

        let reopened = LanceVectorStore::open_existing(&path).await.unwrap().unwrap();
        assert_eq!(reopened.count().await.unwrap(), 3);
        assert_eq!(reopened.dimension(), DIM);
    }

    #[tokio::test]
    async fn test_rebuild_replaces_previous_index() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("space_db");

        let first: Vec<VectorEntry> = (0..5).map(|i| create_test_entry("old", i * 800, i)).collect();
        LanceVectorStore::rebuild(&path, &first, DIM).await.unwrap();

        let second = vec![create_test_entry("new", 0, 3), create_test_entry("new", 800, 4)];
        let store = LanceVectorStore::rebuild(&path, &second, DIM).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);

        let mut query = vec![0.0; DIM];
        query[0] = 1.0;
        let results = store.search(&query, 10).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.chunk.source == "new"));
    }

    #[tokio::test]
    async fn test_search_returns_nearest() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("space_db");

        let entries: Vec<VectorEntry> = (0..6).map(|i| create_test_entry("doc", i * 800, i)).collect();
        let store = LanceVectorStore::rebuild(&path, &entries, DIM).await.unwrap();

        let mut query = vec![0.0; DIM];
        query[2] = 1.0;
        let results = store.search(&query, 4).await.unwrap();

        assert_eq!(results.len(), 4);
        assert_eq!(results[0].chunk.start_index, 1600);
        assert_eq!(results[0].chunk.text, "chunk 1600 of doc");
        assert!(results[0].distance <= results[1].distance);
    }

    #[tokio::test]
    async fn test_search_dimension_mismatch() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("space_db");

        let store = LanceVectorStore::rebuild(&path, &[create_test_entry("a", 0, 0)], DIM)
            .await
            .unwrap();
        assert!(store.search(&[1.0, 0.0], 4).await.is_err());
    }

    #[tokio::test]
    async fn test_rebuild_empty_keeps_old_index() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("space_db");

        LanceVectorStore::rebuild(&path, &[create_test_entry("a", 0, 0)], DIM)
            .await
            .unwrap();
        assert!(LanceVectorStore::rebuild(&path, &[], DIM).await.is_err());

        let store = LanceVectorStore::open_existing(&path).await.unwrap().unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }
}
