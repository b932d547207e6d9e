//! 임베딩 모듈 - Ollama API를 통한 텍스트 벡터화
//!
//! 청크와 질의를 같은 임베딩 공간으로 옮기는 모듈입니다.
//! 수집과 검색은 반드시 같은 모델을 사용해야 합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = OllamaEmbedding::connect(&base_url, "all-minilm").await?;
//! let embedding = embedder.embed("Hello, world!").await?;
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 고정 차원 벡터로 변환하는 인터페이스입니다.
/// 같은 텍스트와 같은 모델이면 항상 같은 벡터를 돌려줘야 합니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 모델 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Ollama Embedding
// ============================================================================

/// 요청당 최대 입력 개수
const BATCH_SIZE: usize = 32;

/// 모델 로드 확인용 프로브 문자열
const PROBE_TEXT: &str = "space exploration";

/// 첫 요청은 모델 로드 시간이 포함되므로 넉넉하게
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Ollama 임베딩 구현체
///
/// ref: https://github.com/ollama/ollama/blob/main/docs/api.md#generate-embeddings
#[derive(Debug)]
pub struct OllamaEmbedding {
    client: reqwest::Client,
    endpoint: Url,
    model: String,
    dimension: usize,
}

/// `/api/embed` 요청 본문
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

/// `/api/embed` 응답
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Ollama 에러 응답
#[derive(Debug, Deserialize)]
struct OllamaError {
    error: String,
}

impl OllamaEmbedding {
    /// 모델을 로드하고 차원을 확인하여 생성
    ///
    /// 프로브 임베딩이 실패하면 에러를 반환합니다. 대체 모델은 없습니다.
    ///
    /// # Arguments
    /// * `base_url` - Ollama 서버 주소 (`/`로 끝나야 함)
    /// * `model` - 임베딩 모델 이름
    pub async fn connect(base_url: &Url, model: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        let endpoint = base_url
            .join("api/embed")
            .context("Failed to build embed endpoint URL")?;

        let mut embedder = Self {
            client,
            endpoint,
            model: model.to_string(),
            dimension: 0,
        };

        let probe = embedder
            .request(&[PROBE_TEXT.to_string()])
            .await
            .with_context(|| format!("Failed to load embedding model '{}'", model))?;

        embedder.dimension = probe
            .first()
            .map(Vec::len)
            .filter(|d| *d > 0)
            .ok_or_else(|| anyhow::anyhow!("Embedding model '{}' returned no vector", model))?;

        tracing::info!(
            "Using Ollama embedding model {} (dimension: {})",
            embedder.model,
            embedder.dimension
        );

        Ok(embedder)
    }

    /// `/api/embed` 호출 (재시도 없음)
    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .context("Failed to send embedding request")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<OllamaError>(&body) {
                anyhow::bail!("Ollama API error ({}): {}", status, error.error);
            }
            anyhow::bail!("Ollama API error ({}): {}", status, body);
        }

        let parsed = parse_embed_response(&body, texts.len())?;
        Ok(parsed)
    }
}

/// 응답 파싱 및 개수 검증
fn parse_embed_response(body: &str, expected: usize) -> Result<Vec<Vec<f32>>> {
    let response: EmbedResponse =
        serde_json::from_str(body).context("Failed to parse embedding response")?;

    if response.embeddings.len() != expected {
        anyhow::bail!(
            "Expected {} embeddings, got {}",
            expected,
            response.embeddings.len()
        );
    }

    Ok(response.embeddings)
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());

        for (i, batch) in texts.chunks(BATCH_SIZE).enumerate() {
            tracing::debug!(
                "Embedding batch {}/{}",
                i + 1,
                texts.len().div_ceil(BATCH_SIZE)
            );

            for vector in self.request(batch).await? {
                if vector.len() != self.dimension {
                    anyhow::bail!(
                        "Dimension mismatch: expected {}, got {}",
                        self.dimension,
                        vector.len()
                    );
                }
                results.push(vector);
            }
        }

        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================
