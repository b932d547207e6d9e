//! 채팅 세션 - 대화 기록과 질의별 디스패치
//!
//! 질의 한 건의 상태 흐름:
//! `Idle → AwaitingRetrieval → AwaitingInference → {Rendered | Errored} → Idle`
//!
//! `&mut self`로만 질의를 받으므로 동시에 두 질의가 진행될 수 없습니다.

use std::fmt;

use uuid::Uuid;

use crate::knowledge::Retriever;
use crate::llm::LanguageModel;

use super::prompt::PromptTemplate;

// ============================================================================
// Types
// ============================================================================

/// 발화자
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => f.write_str("user"),
            Role::Assistant => f.write_str("assistant"),
        }
    }
}

/// 대화 한 턴 (생성 후 변경 불가)
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    role: Role,
    content: String,
}

impl Turn {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// 질의 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Idle,
    AwaitingRetrieval,
    AwaitingInference,
    Rendered,
    Errored,
}

/// 질의 실패 원인
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("empty query")]
    EmptyQuery,

    #[error("no language model is connected; check that Ollama is running and try /model")]
    ModelUnavailable,

    #[error("Error retrieving context: {0:#}")]
    Retrieval(anyhow::Error),

    #[error("Error generating response: {0:#}")]
    Inference(anyhow::Error),
}

// ============================================================================
// ChatSession
// ============================================================================

/// 대화 세션
///
/// 모델 연결에 실패했으면 `model`이 비어 있고, 입력은 받되 응답하지 않습니다.
pub struct ChatSession {
    id: Uuid,
    retriever: Retriever,
    prompt: PromptTemplate,
    model: Option<Box<dyn LanguageModel>>,
    turns: Vec<Turn>,
    state: QueryState,
    /// 마지막 질의가 거친 상태들
    trace: Vec<QueryState>,
}

impl ChatSession {
    pub fn new(retriever: Retriever, model: Option<Box<dyn LanguageModel>>) -> Self {
        let id = Uuid::new_v4();
        tracing::debug!(
            "Chat session {} started (model: {})",
            id,
            model.as_ref().map(|m| m.name()).unwrap_or("none")
        );

        Self {
            id,
            retriever,
            prompt: PromptTemplate::default(),
            model,
            turns: Vec::new(),
            state: QueryState::Idle,
            trace: Vec::new(),
        }
    }

    /// 지금까지의 대화 (순서 유지)
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn state(&self) -> QueryState {
        self.state
    }

    /// 연결된 모델 이름
    pub fn model_name(&self) -> Option<&str> {
        self.model.as_ref().map(|m| m.name())
    }

    /// 모델 교체 (대화 기록은 유지)
    pub fn set_model(&mut self, model: Option<Box<dyn LanguageModel>>) {
        tracing::info!(
            "Session {} switched model to {}",
            self.id,
            model.as_ref().map(|m| m.name()).unwrap_or("none")
        );
        self.model = model;
    }

    /// 질의 처리
    ///
    /// 사용자 턴을 먼저 기록하고, 성공했을 때만 어시스턴트 턴을 추가합니다.
    /// 응답 토큰은 도착하는 대로 `on_token`으로 전달됩니다.
    /// 반환 시점에는 항상 `Idle`로 돌아와 있습니다.
    pub async fn submit(
        &mut self,
        query: &str,
        on_token: &mut (dyn FnMut(&str) + Send),
    ) -> Result<String, ChatError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ChatError::EmptyQuery);
        }

        let Some(model) = self.model.as_deref() else {
            return Err(ChatError::ModelUnavailable);
        };

        self.trace.clear();
        self.turns.push(Turn::new(Role::User, query));

        let outcome = run_query(
            &self.retriever,
            &self.prompt,
            model,
            query,
            on_token,
            &mut |next: QueryState| transition(self.id, &mut self.state, &mut self.trace, next),
        )
        .await;

        match &outcome {
            Ok(answer) => self.turns.push(Turn::new(Role::Assistant, answer.clone())),
            Err(e) => tracing::warn!("Query failed with {}: {}", model.name(), e),
        }

        transition(self.id, &mut self.state, &mut self.trace, QueryState::Idle);
        tracing::debug!("Session {} query trace: {:?}", self.id, self.trace);
        outcome
    }

    #[cfg(test)]
    fn last_trace(&self) -> &[QueryState] {
        &self.trace
    }
}

/// 검색 → 프롬프트 → 추론. 단계마다 `step`으로 상태를 알립니다.
async fn run_query(
    retriever: &Retriever,
    prompt: &PromptTemplate,
    model: &dyn LanguageModel,
    query: &str,
    on_token: &mut (dyn FnMut(&str) + Send),
    step: &mut (dyn FnMut(QueryState) + Send),
) -> Result<String, ChatError> {
    step(QueryState::AwaitingRetrieval);
    let results = match retriever.retrieve(query).await {
        Ok(results) => results,
        Err(e) => {
            step(QueryState::Errored);
            return Err(ChatError::Retrieval(e));
        }
    };

    step(QueryState::AwaitingInference);
    let prompt = prompt.format(&results, query);

    match model.generate(&prompt, on_token).await {
        Ok(answer) => {
            step(QueryState::Rendered);
            Ok(answer)
        }
        Err(e) => {
            step(QueryState::Errored);
            Err(ChatError::Inference(e))
        }
    }
}

fn transition(session: Uuid, state: &mut QueryState, trace: &mut Vec<QueryState>, next: QueryState) {
    if *state != next {
        tracing::debug!("Session {}: {:?} -> {:?}", session, state, next);
        *state = next;
        trace.push(next);
    }
}

// ============================================================================
// Tests
// ============================================================================
