//! 설정 모듈
//!
//! 동작에 영향을 주는 상수들과 환경변수 오버라이드를 한 곳에 모읍니다.
//! 플래그로 노출하지 않는 값들입니다 (모델 선택 제외).

use std::path::PathBuf;

use anyhow::{Context, Result};
use url::Url;

use crate::llm::ChatModel;

/// 인덱스 저장 디렉토리 기본값
pub const DEFAULT_PERSIST_DIR: &str = "./space_db";

/// Ollama 서버 기본 주소
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434/";

/// 임베딩 모델 (Ollama의 all-MiniLM-L6-v2 빌드)
pub const DEFAULT_EMBEDDING_MODEL: &str = "all-minilm";

/// 청크 최대 크기 (문자 수)
pub const CHUNK_SIZE: usize = 1000;

/// 청크 간 오버랩 (문자 수)
pub const CHUNK_OVERLAP: usize = 200;

/// 질의당 검색 결과 개수
pub const RETRIEVAL_K: usize = 4;

/// 수집 대상 위키백과 토픽 (순서 유지)
pub const TOPICS: [&str; 5] = [
    "Space exploration",
    "NASA",
    "SpaceX",
    "Mars exploration",
    "International Space Station",
];

const ENV_PERSIST_DIR: &str = "SPACE_RAG_DB";
const ENV_OLLAMA_HOST: &str = "OLLAMA_HOST";
const ENV_EMBEDDING_MODEL: &str = "SPACE_RAG_EMBED_MODEL";

/// 런타임 설정
#[derive(Debug, Clone)]
pub struct Settings {
    pub persist_dir: PathBuf,
    pub ollama_url: Url,
    pub embedding_model: String,
    pub chat_model: ChatModel,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub retrieval_k: usize,
    pub topics: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            persist_dir: PathBuf::from(DEFAULT_PERSIST_DIR),
            ollama_url: Url::parse(DEFAULT_OLLAMA_URL).expect("default Ollama URL is valid"),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            chat_model: ChatModel::default(),
            chunk_size: CHUNK_SIZE,
            chunk_overlap: CHUNK_OVERLAP,
            retrieval_k: RETRIEVAL_K,
            topics: TOPICS.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl Settings {
    /// 환경변수를 반영한 설정 로드
    ///
    /// - `SPACE_RAG_DB`: 인덱스 디렉토리
    /// - `OLLAMA_HOST`: Ollama 서버 주소 (스킴 생략 가능)
    /// - `SPACE_RAG_EMBED_MODEL`: 임베딩 모델 이름
    pub fn from_env() -> Result<Self> {
        let mut settings = Self::default();

        if let Some(dir) = non_empty_env(ENV_PERSIST_DIR) {
            tracing::debug!("Using persist dir from {}", ENV_PERSIST_DIR);
            settings.persist_dir = PathBuf::from(dir);
        }

        if let Some(host) = non_empty_env(ENV_OLLAMA_HOST) {
            settings.ollama_url = parse_ollama_url(&host)
                .with_context(|| format!("Invalid {}: {}", ENV_OLLAMA_HOST, host))?;
        }

        if let Some(model) = non_empty_env(ENV_EMBEDDING_MODEL) {
            settings.embedding_model = model;
        }

        Ok(settings)
    }

    /// 모델을 지정한 설정 복사본
    pub fn with_chat_model(mut self, model: ChatModel) -> Self {
        self.chat_model = model;
        self
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Ollama 주소 정규화
///
/// `OLLAMA_HOST`는 `127.0.0.1:11434`처럼 스킴 없이 쓰이는 경우가 많습니다.
/// `Url::join`이 경로를 덮어쓰지 않도록 항상 `/`로 끝나게 맞춥니다.
pub fn parse_ollama_url(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{}", raw)
    };

    let mut url = Url::parse(&with_scheme).context("Failed to parse URL")?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
