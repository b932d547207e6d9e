//! Text Chunking Module
//!
//! 문서를 고정 크기의 겹치는 청크로 나눕니다.
//! 크기와 오프셋은 모두 바이트가 아닌 문자(char) 단위입니다.

use sha2::{Digest, Sha256};

use crate::config::{CHUNK_OVERLAP, CHUNK_SIZE};
use crate::source::Document;

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
///
/// `chunk_overlap < chunk_size` 조건은 생성 시 한 번만 검사합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            chunk_overlap: CHUNK_OVERLAP,
        }
    }
}

impl ChunkConfig {
    /// 설정 생성 (검증 포함)
    ///
    /// # Arguments
    /// * `chunk_size` - 최대 청크 크기 (문자 수, 1 이상)
    /// * `chunk_overlap` - 오버랩 (문자 수, `chunk_size` 미만)
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> anyhow::Result<Self> {
        if chunk_size == 0 {
            anyhow::bail!("Invalid chunk size: must be greater than 0");
        }
        if chunk_overlap >= chunk_size {
            anyhow::bail!(
                "Invalid chunk overlap: {} must be less than chunk size {}",
                chunk_overlap,
                chunk_size
            );
        }

        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// 윈도우 이동 폭
    fn step(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }
}

// ============================================================================
// Chunk
// ============================================================================

/// 문서의 연속된 부분 문자열
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// `(source, start_index)`에서 파생된 고정 ID
    pub id: String,
    pub topic: String,
    pub title: String,
    pub source: String,
    /// 원문 내 시작 위치 (문자 단위)
    pub start_index: usize,
    pub text: String,
}

impl Chunk {
    /// 문자 수
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// 청크 ID 생성 (SHA-256 hex)
pub fn chunk_id(source: &str, start_index: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(b"#");
    hasher.update(start_index.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// Splitting
// ============================================================================

/// 문서 목록 분할
///
/// 결과 순서: 문서 순서, 그 안에서 오프셋 순서.
pub fn split_documents(documents: &[Document], config: &ChunkConfig) -> Vec<Chunk> {
    documents
        .iter()
        .flat_map(|doc| split_document(doc, config))
        .collect()
}

/// 단일 문서 분할
///
/// `chunk_size` 이하의 문서는 정확히 한 개의 청크가 됩니다.
/// 빈 문서는 청크를 만들지 않습니다.
pub fn split_document(doc: &Document, config: &ChunkConfig) -> Vec<Chunk> {
    split_text(&doc.content, config)
        .into_iter()
        .map(|(start_index, text)| Chunk {
            id: chunk_id(&doc.source, start_index),
            topic: doc.topic.clone(),
            title: doc.title.clone(),
            source: doc.source.clone(),
            start_index,
            text: text.to_string(),
        })
        .collect()
}

/// 텍스트를 `(시작 문자 위치, 조각)` 목록으로 분할
fn split_text<'a>(text: &'a str, config: &ChunkConfig) -> Vec<(usize, &'a str)> {
    // 문자 인덱스 -> 바이트 오프셋 (끝 경계 포함)
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = boundaries.len() - 1;

    if char_count == 0 {
        return vec![];
    }

    let mut pieces = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + config.chunk_size).min(char_count);
        pieces.push((start, &text[boundaries[start]..boundaries[end]]));

        if end >= char_count {
            break;
        }

        start += config.step();
    }

    pieces
}

// ============================================================================
// Tests
// ============================================================================
