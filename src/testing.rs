//! 테스트 더블 - 네트워크 없이 파이프라인을 검증하기 위한 구현체들

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::knowledge::{Chunk, SearchResult, VectorStore};
use crate::llm::LanguageModel;
use crate::source::{Document, DocumentSource};

/// 테스트용 문서
pub fn document(topic: &str, content: &str) -> Document {
    Document {
        topic: topic.to_string(),
        title: topic.to_string(),
        source: format!("https://en.wikipedia.org/wiki/{}", topic.replace(' ', "_")),
        summary: String::new(),
        content: content.to_string(),
    }
}

// ============================================================================
// HashEmbedding
// ============================================================================

/// 단어 해시 기반 결정적 임베딩 (bag of words, L2 정규화)
pub struct HashEmbedding {
    dimension: usize,
    calls: AtomicUsize,
}

impl HashEmbedding {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: AtomicUsize::new(0),
        }
    }

    /// 임베딩한 텍스트 개수
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// FNV-1a
fn fnv1a(word: &str) -> u64 {
    word.bytes().fold(0xcbf29ce484222325, |hash, b| {
        (hash ^ u64::from(b)).wrapping_mul(0x100000001b3)
    })
}

#[async_trait]
impl EmbeddingProvider for HashEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut vector = vec![0.0f32; self.dimension];
        for word in text.split_whitespace() {
            let word = word
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if !word.is_empty() {
                vector[(fnv1a(&word) % self.dimension as u64) as usize] += 1.0;
            }
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hash-embedding"
    }
}

// ============================================================================
// MemoryVectorStore
// ============================================================================

/// 메모리 벡터 저장소 (제곱 L2 거리, 전수 탐색)
pub struct MemoryVectorStore {
    entries: Vec<(Chunk, Vec<f32>)>,
    dimension: usize,
    searches: AtomicUsize,
}

impl MemoryVectorStore {
    pub async fn from_chunks(embedder: &dyn EmbeddingProvider, chunks: Vec<Chunk>) -> Self {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder
            .embed_batch(&texts)
            .await
            .expect("test embedding failed");

        Self {
            entries: chunks.into_iter().zip(vectors).collect(),
            dimension: embedder.dimension(),
            searches: AtomicUsize::new(0),
        }
    }

    /// 검색 호출 횟수
    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
        self.searches.fetch_add(1, Ordering::SeqCst);

        let mut results: Vec<SearchResult> = self
            .entries
            .iter()
            .map(|(chunk, vector)| SearchResult {
                chunk: chunk.clone(),
                distance: vector
                    .iter()
                    .zip(query_embedding)
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum(),
            })
            .collect();

        results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        results.truncate(limit);
        Ok(results)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.len())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// ============================================================================
// StaticSource
// ============================================================================

/// 고정 토픽 → 본문 문서 소스. 없는 토픽은 실패합니다.
pub struct StaticSource {
    pages: HashMap<String, String>,
    calls: AtomicUsize,
}

impl StaticSource {
    pub fn new(pages: &[(&str, &str)]) -> Self {
        Self {
            pages: pages
                .iter()
                .map(|(t, c)| (t.to_string(), c.to_string()))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentSource for StaticSource {
    async fn fetch(&self, topic: &str) -> Result<Document> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.pages.get(topic) {
            Some(content) => Ok(document(topic, content)),
            None => anyhow::bail!("No page matches '{}'", topic),
        }
    }

    fn name(&self) -> &str {
        "static"
    }
}

// ============================================================================
// Language models
// ============================================================================

/// 고정 응답을 토큰 단위로 흘려보내는 모델. 받은 프롬프트를 기록합니다.
pub struct ScriptedModel {
    reply: String,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("poisoned").clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(
        &self,
        prompt: &str,
        on_token: &mut (dyn for<'s> FnMut(&'s str) + Send),
    ) -> Result<String> {
        self.prompts.lock().expect("poisoned").push(prompt.to_string());
        for token in self.reply.split_inclusive(' ') {
            on_token(token);
        }
        Ok(self.reply.clone())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// 항상 실패하는 모델 (연결 끊김 흉내)
pub struct FailingModel;

#[async_trait]
impl LanguageModel for FailingModel {
    async fn generate(
        &self,
        _prompt: &str,
        _on_token: &mut (dyn for<'s> FnMut(&'s str) + Send),
    ) -> Result<String> {
        anyhow::bail!("connection refused")
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// 미리 준비한 NDJSON 줄을 실제 스트림 파서에 흘려보내는 모델
pub struct NdjsonModel {
    lines: Vec<String>,
}

impl NdjsonModel {
    pub fn new(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|l| format!("{}\n", l)).collect(),
        }
    }
}

#[async_trait]
impl LanguageModel for NdjsonModel {
    async fn generate(
        &self,
        _prompt: &str,
        on_token: &mut (dyn for<'s> FnMut(&'s str) + Send),
    ) -> Result<String> {
        let parts: Vec<std::io::Result<bytes::Bytes>> = self
            .lines
            .iter()
            .map(|l| Ok(bytes::Bytes::from(l.clone())))
            .collect();
        crate::llm::read_chat_stream(futures::stream::iter(parts), on_token).await
    }

    fn name(&self) -> &str {
        "ndjson"
    }
}
