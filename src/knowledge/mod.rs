//! Knowledge 모듈 - 청킹, 벡터 인덱스, 검색
//!
//! - Chunker: 고정 크기 + 오버랩 문자 단위 분할
//! - LanceDB: 벡터 인덱스 (항상 전체 재구축)
//! - Catalog: 수집 문서 목록 (SQLite)
//! - Ingest: 수집 파이프라인
//! - Retriever: 질의 → 최근접 k개 청크

mod chunker;
mod ingest;
mod lance;
mod retriever;
mod store;
mod vector;

// Re-exports
pub use chunker::{chunk_id, split_document, split_documents, Chunk, ChunkConfig};
pub use ingest::{IngestEvent, IngestPipeline, IngestReport};
pub use lance::{LanceVectorStore, TABLE_NAME};
pub use retriever::Retriever;
pub use store::{CatalogEntry, CatalogStats, DocumentCatalog, CATALOG_FILE};
pub use vector::{SearchResult, VectorEntry, VectorStore};
