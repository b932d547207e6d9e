//! Vector Store - 벡터 검색 트레이트 및 타입
//!
//! 실제 저장/검색은 LanceDB에 위임합니다 (`lance.rs`).

use anyhow::Result;
use async_trait::async_trait;

use super::chunker::Chunk;

// ============================================================================
// Types
// ============================================================================

/// 인덱스 엔트리 (저장용)
#[derive(Debug, Clone)]
pub struct VectorEntry {
    pub chunk: Chunk,
    /// 임베딩 벡터
    pub embedding: Vec<f32>,
}

/// 검색 결과
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub chunk: Chunk,
    /// 벡터 저장소 기준 거리 (작을수록 가까움)
    pub distance: f32,
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// VectorStore 트레이트 (읽기 전용)
///
/// 질의 시점에는 인덱스를 읽기만 합니다. 쓰기는 전체 재구축으로만 일어납니다.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 가장 가까운 `limit`개 엔트리 (저장소의 거리 순서 그대로)
    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SearchResult>>;

    /// 엔트리 개수
    async fn count(&self) -> Result<usize>;

    /// 벡터 차원
    fn dimension(&self) -> usize;
}
