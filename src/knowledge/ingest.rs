//! 수집 파이프라인 - 문서 수집 → 청킹 → 임베딩 → 인덱스 재구축
//!
//! 항상 빈 상태에서 다시 만듭니다. 이전 실행과의 차분은 계산하지 않습니다.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::embedding::EmbeddingProvider;
use crate::source::{fetch_documents, Document, DocumentSource};

use super::chunker::{split_documents, Chunk, ChunkConfig};
use super::lance::LanceVectorStore;
use super::store::DocumentCatalog;
use super::vector::{VectorEntry, VectorStore};

// ============================================================================
// Types
// ============================================================================

/// 진행 상황 이벤트 (CLI 출력용)
#[derive(Debug)]
pub enum IngestEvent<'a> {
    /// 토픽 수집 성공
    Loaded { topic: &'a str, title: &'a str },
    /// 토픽 수집 실패 (건너뜀)
    LoadFailed { topic: &'a str, error: &'a anyhow::Error },
    /// 수집 완료
    DocumentsLoaded(usize),
    /// 청킹 완료
    ChunksCreated(usize),
    /// 임베딩 시작
    Embedding { chunks: usize, model: &'a str },
    /// 인덱스 기록 시작
    Indexing(&'a Path),
}

/// 수집 결과 요약
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub documents: usize,
    pub failed_topics: Vec<String>,
    pub chunks: usize,
    pub indexed: usize,
    pub index_dir: PathBuf,
}

// ============================================================================
// IngestPipeline
// ============================================================================

/// 수집 파이프라인
pub struct IngestPipeline {
    source: Box<dyn DocumentSource>,
    embedder: Arc<dyn EmbeddingProvider>,
    chunk_config: ChunkConfig,
    index_dir: PathBuf,
}

impl IngestPipeline {
    /// # Arguments
    /// * `source` - 문서 소스
    /// * `embedder` - 임베딩 프로바이더 (질의 시에도 같은 모델 사용)
    /// * `chunk_config` - 검증된 청킹 설정
    /// * `index_dir` - 인덱스 디렉토리 (재구축 시 삭제됨)
    pub fn new(
        source: Box<dyn DocumentSource>,
        embedder: Arc<dyn EmbeddingProvider>,
        chunk_config: ChunkConfig,
        index_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source,
            embedder,
            chunk_config,
            index_dir: index_dir.into(),
        }
    }

    /// 전체 수집 실행
    ///
    /// 청크가 하나도 없으면 기존 인덱스를 건드리지 않고 실패합니다.
    pub async fn run(
        &self,
        topics: &[String],
        on_event: &mut dyn FnMut(IngestEvent<'_>),
    ) -> Result<IngestReport> {
        // 1. 문서 수집 (토픽별 실패는 건너뜀)
        let outcome = fetch_documents(self.source.as_ref(), topics).await;
        for doc in &outcome.documents {
            on_event(IngestEvent::Loaded {
                topic: &doc.topic,
                title: &doc.title,
            });
        }
        for (topic, error) in &outcome.failures {
            on_event(IngestEvent::LoadFailed { topic, error });
        }
        on_event(IngestEvent::DocumentsLoaded(outcome.documents.len()));

        // 2. 청킹
        let chunks = split_documents(&outcome.documents, &self.chunk_config);
        on_event(IngestEvent::ChunksCreated(chunks.len()));

        if chunks.is_empty() {
            anyhow::bail!(
                "No chunks to index ({} of {} topics failed); keeping the existing index untouched",
                outcome.failures.len(),
                topics.len()
            );
        }

        // 3. 임베딩
        on_event(IngestEvent::Embedding {
            chunks: chunks.len(),
            model: self.embedder.name(),
        });
        let entries = embed_chunks(self.embedder.as_ref(), chunks).await?;

        // 4. 인덱스 재구축 + 카탈로그
        on_event(IngestEvent::Indexing(&self.index_dir));
        let store = LanceVectorStore::rebuild(&self.index_dir, &entries, self.embedder.dimension())
            .await
            .context("Failed to write vector index")?;

        let chunk_counts = count_chunks_per_document(&outcome.documents, &entries);
        DocumentCatalog::open_in(&self.index_dir)?
            .replace_all(&outcome.documents, &chunk_counts)
            .context("Failed to write document catalog")?;

        let indexed = store.count().await?;

        Ok(IngestReport {
            documents: outcome.documents.len(),
            failed_topics: outcome.failures.into_iter().map(|(t, _)| t).collect(),
            chunks: entries.len(),
            indexed,
            index_dir: self.index_dir.clone(),
        })
    }
}

/// 청크 임베딩
async fn embed_chunks(embedder: &dyn EmbeddingProvider, chunks: Vec<Chunk>) -> Result<Vec<VectorEntry>> {
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let embeddings = embedder
        .embed_batch(&texts)
        .await
        .context("Failed to embed chunks")?;

    if embeddings.len() != chunks.len() {
        anyhow::bail!(
            "Embedder returned {} vectors for {} chunks",
            embeddings.len(),
            chunks.len()
        );
    }

    Ok(chunks
        .into_iter()
        .zip(embeddings)
        .map(|(chunk, embedding)| VectorEntry { chunk, embedding })
        .collect())
}

/// 문서별 청크 수 (문서 순서)
fn count_chunks_per_document(documents: &[Document], entries: &[VectorEntry]) -> Vec<usize> {
    documents
        .iter()
        .map(|doc| {
            entries
                .iter()
                .filter(|e| e.chunk.source == doc.source && e.chunk.topic == doc.topic)
                .count()
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
