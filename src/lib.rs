//! space-rag - 로컬 RAG 데모
//!
//! 우주 탐사 관련 위키백과 문서를 LanceDB에 인덱싱하고,
//! 로컬 Ollama 모델로 검색 기반 질의응답을 제공합니다.

pub mod chat;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod knowledge;
pub mod llm;
pub mod source;

#[cfg(test)]
mod testing;

// Re-exports
pub use chat::{ChatError, ChatSession, LoadedIndex, QueryContext, MISSING_INDEX_MESSAGE, REFUSAL};
pub use config::Settings;
pub use embedding::{EmbeddingProvider, OllamaEmbedding};
pub use knowledge::{
    Chunk, ChunkConfig, DocumentCatalog, IngestPipeline, IngestReport, LanceVectorStore,
    Retriever, SearchResult, VectorEntry, VectorStore,
};
pub use llm::{ChatModel, LanguageModel, OllamaChat};
pub use source::{Document, DocumentSource, WikipediaSource};
