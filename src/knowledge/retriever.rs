//! 검색기 - 질의 임베딩 후 최근접 k개 청크 반환
//!
//! 질의는 수집 때와 같은 임베딩 모델로 벡터화해야 합니다.
//! 거리 계산과 동점 처리는 벡터 저장소에 맡깁니다.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::embedding::EmbeddingProvider;

use super::vector::{SearchResult, VectorStore};

/// 유사도 검색기
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    k: usize,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>, k: usize) -> Self {
        Self { embedder, store, k }
    }

    /// 질의와 가장 가까운 k개 청크
    ///
    /// 관련성 하한은 없습니다. 인덱스가 작으면 무관한 청크가 나올 수 있습니다.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<SearchResult>> {
        let query_embedding = self
            .embedder
            .embed(query)
            .await
            .context("Failed to embed query")?;

        let results = self
            .store
            .search(&query_embedding, self.k)
            .await
            .context("Vector search failed")?;

        tracing::debug!(
            "Retrieved {} chunks for query ({} chars)",
            results.len(),
            query.chars().count()
        );

        Ok(results)
    }
}
