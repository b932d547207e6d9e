//! 질의 컨텍스트 - 프로세스당 한 번 만드는 공유 자원
//!
//! 임베딩 모델과 인덱스 핸들을 시작 시 한 번 로드하고 이후 읽기 전용으로 공유합니다.

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;

use crate::config::Settings;
use crate::embedding::EmbeddingProvider;
use crate::knowledge::{LanceVectorStore, Retriever, VectorStore};

/// 인덱스가 없을 때 사용자에게 보여주는 메시지
pub const MISSING_INDEX_MESSAGE: &str =
    "Vector Database not found! Please run `space-rag ingest` first to build the index.";

/// 인덱스가 있지만 쓸 수 없을 때의 안내
pub const UNUSABLE_INDEX_MESSAGE: &str =
    "Vector Database is unusable. Please re-run `space-rag ingest` to rebuild the index.";

/// 인덱스 로드 결과
pub enum LoadedIndex {
    Ready(QueryContext),
    /// 인덱스 디렉토리 없음
    Missing,
    /// 디렉토리는 있지만 테이블이 없거나 임베딩 차원이 다름
    Unusable(anyhow::Error),
}

/// 질의 파이프라인 공유 자원
#[derive(Clone)]
pub struct QueryContext {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    retrieval_k: usize,
}

impl QueryContext {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        retrieval_k: usize,
    ) -> Result<Self> {
        if embedder.dimension() != store.dimension() {
            anyhow::bail!(
                "Embedding model '{}' produces {}-dimensional vectors but the index holds {}; re-run ingestion",
                embedder.name(),
                embedder.dimension(),
                store.dimension()
            );
        }

        Ok(Self {
            embedder,
            store,
            retrieval_k,
        })
    }

    /// 설정된 위치에서 인덱스 로드
    ///
    /// 인덱스 디렉토리가 없으면 `Missing`이며 임베딩 모델도 로드하지 않습니다.
    /// 이 경우 검색을 시도하면 안 됩니다. 임베딩 모델 로드 실패만 `Err`입니다.
    pub async fn load<F, Fut>(settings: &Settings, connect_embedder: F) -> Result<LoadedIndex>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<dyn EmbeddingProvider>>>,
    {
        let store = match LanceVectorStore::open_existing(&settings.persist_dir).await {
            Ok(Some(store)) => store,
            Ok(None) => {
                tracing::warn!("Index not found at {}", settings.persist_dir.display());
                return Ok(LoadedIndex::Missing);
            }
            Err(e) => return Ok(LoadedIndex::Unusable(e)),
        };

        let embedder = connect_embedder().await?;
        Ok(match Self::new(embedder, Arc::new(store), settings.retrieval_k) {
            Ok(context) => LoadedIndex::Ready(context),
            Err(e) => LoadedIndex::Unusable(e),
        })
    }

    /// 검색기 생성
    pub fn retriever(&self) -> Retriever {
        Retriever::new(self.embedder.clone(), self.store.clone(), self.retrieval_k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{split_documents, ChunkConfig};
    use crate::testing::{document, HashEmbedding, MemoryVectorStore};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_absent_index_never_loads_embedder() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings {
            persist_dir: temp_dir.path().join("space_db"),
            ..Settings::default()
        };

        let mut connected = false;
        let loaded = QueryContext::load(&settings, || {
            connected = true;
            async { Ok::<_, anyhow::Error>(Arc::new(HashEmbedding::new(8)) as Arc<dyn EmbeddingProvider>) }
        })
        .await
        .unwrap();

        assert!(matches!(loaded, LoadedIndex::Missing));
        assert!(!connected);
        assert!(MISSING_INDEX_MESSAGE.starts_with("Vector Database not found"));
    }

    #[tokio::test]
    async fn test_load_existing_index() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings {
            persist_dir: temp_dir.path().join("space_db"),
            ..Settings::default()
        };

        let embedder = Arc::new(HashEmbedding::new(8));
        let chunks = split_documents(&[document("NASA", "NASA is an agency.")], &ChunkConfig::default());
        let vector = embedder.embed(&chunks[0].text).await.unwrap();
        let entries = vec![crate::knowledge::VectorEntry {
            chunk: chunks[0].clone(),
            embedding: vector,
        }];
        LanceVectorStore::rebuild(&settings.persist_dir, &entries, 8).await.unwrap();

        let shared: Arc<dyn EmbeddingProvider> = embedder.clone();
        let loaded = QueryContext::load(&settings, move || async move { Ok::<_, anyhow::Error>(shared) })
            .await
            .unwrap();
        let LoadedIndex::Ready(context) = loaded else {
            panic!("expected a usable index");
        };

        let results = context.retriever().retrieve("NASA agency").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.topic, "NASA");
    }

    #[tokio::test]
    async fn test_directory_without_table_is_unusable() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings {
            persist_dir: temp_dir.path().to_path_buf(),
            ..Settings::default()
        };

        let mut connected = false;
        let loaded = QueryContext::load(&settings, || {
            connected = true;
            async { Ok::<_, anyhow::Error>(Arc::new(HashEmbedding::new(8)) as Arc<dyn EmbeddingProvider>) }
        })
        .await
        .unwrap();

        assert!(matches!(loaded, LoadedIndex::Unusable(_)));
        assert!(!connected);
    }

    #[tokio::test]
    async fn test_embedder_failure_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings {
            persist_dir: temp_dir.path().join("space_db"),
            ..Settings::default()
        };

        let embedder = Arc::new(HashEmbedding::new(8));
        let chunks = split_documents(&[document("ISS", "The ISS orbits Earth.")], &ChunkConfig::default());
        let entries = vec![crate::knowledge::VectorEntry {
            embedding: embedder.embed(&chunks[0].text).await.unwrap(),
            chunk: chunks[0].clone(),
        }];
        LanceVectorStore::rebuild(&settings.persist_dir, &entries, 8).await.unwrap();

        let result = QueryContext::load(&settings, || async {
            Err::<Arc<dyn EmbeddingProvider>, _>(anyhow::anyhow!("Ollama is not running"))
        })
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let chunks = split_documents(&[document("NASA", "NASA")], &ChunkConfig::default());
        let store = Arc::new(MemoryVectorStore::from_chunks(&HashEmbedding::new(8), chunks).await);

        let result = QueryContext::new(Arc::new(HashEmbedding::new(16)), store, 4);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_retriever_uses_configured_k() {
        let embedder = Arc::new(HashEmbedding::new(8));
        let docs: Vec<_> = ["NASA", "SpaceX", "ISS", "Mars", "Moon"]
            .iter()
            .map(|t| document(t, t))
            .collect();
        let chunks = split_documents(&docs, &ChunkConfig::default());
        let store = Arc::new(MemoryVectorStore::from_chunks(embedder.as_ref(), chunks).await);

        let context = QueryContext::new(embedder, store, 3).unwrap();
        let results = context.retriever().retrieve("NASA").await.unwrap();
        assert_eq!(results.len(), 3);
    }
}
