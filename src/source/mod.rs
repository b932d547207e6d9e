//! 문서 소스 모듈 - 위키백과 문서 수집
//!
//! 토픽 문자열 하나당 최대 한 개의 문서를 가져옵니다.
//! 실패한 토픽은 기록 후 건너뛰며 재시도하지 않습니다.
//!
//! ref: https://www.mediawiki.org/wiki/Extension:TextExtracts#API

use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use url::Url;

/// 영어 위키백과 Action API
const WIKIPEDIA_API_URL: &str = "https://en.wikipedia.org/w/api.php";

// ============================================================================
// Types
// ============================================================================

/// 수집된 원문 문서
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// 요청한 토픽
    pub topic: String,
    /// 문서 제목
    pub title: String,
    /// 원문 URL
    pub source: String,
    /// 첫 문단 요약
    pub summary: String,
    /// 본문 (plain text)
    pub content: String,
}

/// 토픽별 수집 결과
#[derive(Debug, Default)]
pub struct FetchOutcome {
    /// 성공한 문서 (입력 토픽 순서)
    pub documents: Vec<Document>,
    /// 실패한 토픽과 원인
    pub failures: Vec<(String, anyhow::Error)>,
}

// ============================================================================
// DocumentSource Trait
// ============================================================================

/// 문서 소스 트레이트
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// 토픽에 해당하는 문서 한 개를 가져옴
    async fn fetch(&self, topic: &str) -> Result<Document>;

    /// 소스 이름
    fn name(&self) -> &str;
}

/// 토픽 목록 수집
///
/// 토픽마다 정확히 한 번 시도하고, 실패는 `failures`에 모읍니다.
/// 모든 토픽이 실패해도 에러가 아닙니다.
pub async fn fetch_documents(source: &dyn DocumentSource, topics: &[String]) -> FetchOutcome {
    let mut outcome = FetchOutcome::default();

    for topic in topics {
        match source.fetch(topic).await {
            Ok(doc) => {
                tracing::info!("Loaded '{}' from {} ({})", topic, source.name(), doc.source);
                outcome.documents.push(doc);
            }
            Err(e) => {
                tracing::warn!("Error loading '{}': {:#}", topic, e);
                outcome.failures.push((topic.clone(), e));
            }
        }
    }

    outcome
}

// ============================================================================
// WikipediaSource
// ============================================================================

/// 위키백과 문서 소스
///
/// 검색 결과 첫 번째 문서의 plain-text extract를 가져옵니다.
/// 동음이의 문서는 모호한 매치로 보고 실패 처리합니다.
pub struct WikipediaSource {
    client: reqwest::Client,
    api_url: Url,
}

/// API 응답 (formatversion=2)
#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    query: Option<QueryPages>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct QueryPages {
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    title: String,
    #[serde(default)]
    extract: Option<String>,
    #[serde(default)]
    fullurl: Option<String>,
    #[serde(default)]
    pageprops: Option<PageProps>,
    #[serde(default)]
    missing: bool,
}

#[derive(Debug, Deserialize)]
struct PageProps {
    #[serde(default)]
    disambiguation: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    info: String,
}

impl WikipediaSource {
    /// 영어 위키백과 소스 생성
    pub fn new() -> Result<Self> {
        let api_url = Url::parse(WIKIPEDIA_API_URL).context("Invalid Wikipedia API URL")?;
        Self::with_api_url(api_url)
    }

    /// API 주소를 지정하여 생성
    pub fn with_api_url(api_url: Url) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("space-rag/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, api_url })
    }

    /// 검색 + 본문 추출을 한 번에 요청하는 URL
    fn query_url(&self, topic: &str) -> Url {
        let mut url = self.api_url.clone();
        url.query_pairs_mut()
            .append_pair("action", "query")
            .append_pair("format", "json")
            .append_pair("formatversion", "2")
            .append_pair("generator", "search")
            .append_pair("gsrsearch", topic)
            .append_pair("gsrlimit", "1")
            .append_pair("prop", "extracts|info|pageprops")
            .append_pair("explaintext", "1")
            .append_pair("inprop", "url")
            .append_pair("ppprop", "disambiguation")
            .append_pair("redirects", "1");
        url
    }
}

#[async_trait]
impl DocumentSource for WikipediaSource {
    async fn fetch(&self, topic: &str) -> Result<Document> {
        let url = self.query_url(topic);
        tracing::debug!("Fetching: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("HTTP request failed")?
            .error_for_status()
            .context("Wikipedia API returned an error status")?;

        let body = response.text().await.context("Failed to read response body")?;
        parse_query_response(topic, &body)
    }

    fn name(&self) -> &str {
        "wikipedia"
    }
}

/// 응답 본문을 `Document`로 변환
fn parse_query_response(topic: &str, body: &str) -> Result<Document> {
    let response: QueryResponse =
        serde_json::from_str(body).context("Failed to parse Wikipedia response")?;

    if let Some(error) = response.error {
        anyhow::bail!("Wikipedia API error ({}): {}", error.code, error.info);
    }

    let page = response
        .query
        .and_then(|q| q.pages.into_iter().next())
        .ok_or_else(|| anyhow::anyhow!("No Wikipedia page matches '{}'", topic))?;

    if page.missing {
        anyhow::bail!("Wikipedia page '{}' is missing", page.title);
    }

    if page
        .pageprops
        .as_ref()
        .is_some_and(|p| p.disambiguation.is_some())
    {
        anyhow::bail!(
            "'{}' is ambiguous: resolved to disambiguation page '{}'",
            topic,
            page.title
        );
    }

    let content = normalize_text(page.extract.as_deref().unwrap_or_default());
    if content.is_empty() {
        anyhow::bail!("Wikipedia page '{}' has no text", page.title);
    }

    let source = page.fullurl.unwrap_or_else(|| {
        format!(
            "https://en.wikipedia.org/wiki/{}",
            page.title.replace(' ', "_")
        )
    });

    Ok(Document {
        topic: topic.to_string(),
        summary: first_paragraph(&content).to_string(),
        title: page.title,
        source,
        content,
    })
}

/// 연속 빈 줄 정리
fn normalize_text(text: &str) -> String {
    static BLANK_LINES: OnceLock<Regex> = OnceLock::new();
    let re = BLANK_LINES.get_or_init(|| Regex::new(r"\n\s*\n(\s*\n)+").expect("valid regex"));
    re.replace_all(text.trim(), "\n\n").into_owned()
}

/// 첫 문단 (요약용)
fn first_paragraph(text: &str) -> &str {
    text.split("\n\n").next().unwrap_or_default().trim()
}

// ============================================================================
// Tests
// ============================================================================
