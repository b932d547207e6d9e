//! Chat 모듈 - 질의 파이프라인
//!
//! 검색 → 프롬프트 조립 → 추론 → 대화 기록

mod context;
mod prompt;
mod session;

pub use context::{LoadedIndex, QueryContext, MISSING_INDEX_MESSAGE, UNUSABLE_INDEX_MESSAGE};
pub use prompt::{format_context, PromptTemplate, REFUSAL};
pub use session::{ChatError, ChatSession, QueryState, Role, Turn};
