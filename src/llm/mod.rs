//! 언어 모델 모듈 - Ollama 채팅 API
//!
//! 로컬 Ollama 서버에 프롬프트를 보내고 스트리밍 응답을 받습니다.
//! 지원 모델은 닫힌 열거형(`ChatModel`)으로만 선택합니다.
//!
//! ref: https://github.com/ollama/ollama/blob/main/docs/api.md#generate-a-chat-completion

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncBufReadExt;
use tokio_util::io::StreamReader;
use url::Url;

// ============================================================================
// ChatModel
// ============================================================================

/// 선택 가능한 로컬 모델
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ChatModel {
    #[default]
    Llama3,
    Mistral,
    Gemma,
}

impl ChatModel {
    pub const ALL: [ChatModel; 3] = [ChatModel::Llama3, ChatModel::Mistral, ChatModel::Gemma];

    /// Ollama 모델 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatModel::Llama3 => "llama3",
            ChatModel::Mistral => "mistral",
            ChatModel::Gemma => "gemma",
        }
    }

    /// 이름으로 찾기 (대소문자 무시)
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for ChatModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// LanguageModel Trait
// ============================================================================

/// 언어 모델 트레이트
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// 프롬프트에 대한 응답 생성
    ///
    /// 토큰이 도착할 때마다 `on_token`을 호출하고, 완성된 전체 텍스트를 반환합니다.
    async fn generate(
        &self,
        prompt: &str,
        on_token: &mut (dyn for<'s> FnMut(&'s str) + Send),
    ) -> Result<String>;

    /// 모델 이름
    fn name(&self) -> &str;
}

// ============================================================================
// OllamaChat
// ============================================================================

/// 연결 확인 타임아웃
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Ollama 채팅 구현체
#[derive(Debug)]
pub struct OllamaChat {
    client: reqwest::Client,
    chat_endpoint: Url,
    model: ChatModel,
}

/// `/api/chat` 요청 본문
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// 스트리밍 응답 한 줄
#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChatMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// `/api/tags` 응답
#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

/// Ollama 에러 응답
#[derive(Debug, Deserialize)]
struct OllamaError {
    error: String,
}

impl OllamaChat {
    /// Ollama 서버 연결 확인 후 생성
    ///
    /// 서버에 닿지 않으면 에러입니다. 모델이 설치되지 않은 경우는 경고만 남깁니다.
    pub async fn connect(base_url: &Url, model: ChatModel) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        let tags_url = base_url.join("api/tags").context("Invalid Ollama URL")?;
        let tags: TagsResponse = client
            .get(tags_url)
            .timeout(CONNECT_TIMEOUT)
            .send()
            .await
            .with_context(|| format!("Failed to reach Ollama at {}", base_url))?
            .error_for_status()
            .context("Ollama returned an error status")?
            .json()
            .await
            .context("Failed to parse Ollama model list")?;

        let installed: Vec<&str> = tags.models.iter().map(|m| m.name.as_str()).collect();
        if !is_installed(&installed, model) {
            tracing::warn!(
                "Model '{}' is not installed; run `ollama pull {}`",
                model,
                model
            );
        }

        let chat_endpoint = base_url.join("api/chat").context("Invalid Ollama URL")?;

        Ok(Self {
            client,
            chat_endpoint,
            model,
        })
    }

    /// 선택된 모델
    pub fn model(&self) -> ChatModel {
        self.model
    }
}

#[async_trait]
impl LanguageModel for OllamaChat {
    async fn generate(
        &self,
        prompt: &str,
        on_token: &mut (dyn for<'s> FnMut(&'s str) + Send),
    ) -> Result<String> {
        let request = ChatRequest {
            model: self.model.as_str(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            stream: true,
        };

        let response = self
            .client
            .post(self.chat_endpoint.clone())
            .json(&request)
            .send()
            .await
            .context("Failed to send chat request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if let Ok(error) = serde_json::from_str::<OllamaError>(&body) {
                anyhow::bail!("Ollama API error ({}): {}", status, error.error);
            }
            anyhow::bail!("Ollama API error ({}): {}", status, body);
        }

        let stream = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        read_chat_stream(stream, on_token).await
    }

    fn name(&self) -> &str {
        self.model.as_str()
    }
}

/// 설치된 모델 목록에 포함되는지 (`llama3` == `llama3:latest`)
fn is_installed(installed: &[&str], model: ChatModel) -> bool {
    installed.iter().any(|name| {
        let base = name.split(':').next().unwrap_or(name);
        base == model.as_str()
    })
}

/// NDJSON 응답 스트림을 끝까지 읽어 전체 답변 반환
///
/// `"done": true` 줄 없이 스트림이 끝나면 (연결 끊김 등) 에러입니다.
pub(crate) async fn read_chat_stream<S>(
    stream: S,
    on_token: &mut (dyn FnMut(&str) + Send),
) -> Result<String>
where
    S: Stream<Item = std::io::Result<Bytes>>,
{
    let mut lines = StreamReader::new(Box::pin(stream)).lines();
    let mut answer = String::new();

    while let Some(line) = lines.next_line().await.context("Failed to read chat stream")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if apply_chunk(line, &mut answer, on_token)? {
            return Ok(answer);
        }
    }

    anyhow::bail!(
        "Chat stream ended before completion ({} chars received)",
        answer.chars().count()
    );
}

/// NDJSON 한 줄 처리. `done` 여부를 반환합니다.
fn apply_chunk(
    line: &str,
    answer: &mut String,
    on_token: &mut (dyn FnMut(&str) + Send),
) -> Result<bool> {
    let chunk: ChatChunk =
        serde_json::from_str(line).with_context(|| format!("Invalid chat stream line: {}", line))?;

    if let Some(error) = chunk.error {
        anyhow::bail!("Ollama error: {}", error);
    }

    if let Some(message) = chunk.message {
        if !message.content.is_empty() {
            on_token(&message.content);
            answer.push_str(&message.content);
        }
    }

    Ok(chunk.done)
}

// ============================================================================
// Tests
// ============================================================================
