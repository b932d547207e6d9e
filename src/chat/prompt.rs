//! 프롬프트 조립
//!
//! 검색된 청크를 하나의 컨텍스트 블록으로 합치고 고정 지시문으로 감쌉니다.
//! "컨텍스트만으로 답하라"는 지시는 모델에 대한 권고일 뿐 검증하지 않습니다.

use crate::knowledge::SearchResult;

/// 컨텍스트가 부족할 때 모델이 답해야 하는 문장
pub const REFUSAL: &str = "I don't have enough information in my database.";

/// 기본 지시문 템플릿
const ANSWER_TEMPLATE: &str = "Answer the question based ONLY on the following context:
{context}

Question: {question}

If you don't know the answer based on the context, say \"I don't have enough information in my database.\"
Keep the answer concise and informative.
";

/// `{context}`, `{question}` 자리표시자를 가진 템플릿
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: ANSWER_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate {
    /// 검색 결과와 질문으로 프롬프트 생성
    pub fn format(&self, results: &[SearchResult], question: &str) -> String {
        render(&self.template, &format_context(results), question)
    }
}

/// 자리표시자 한 번에 치환 (치환된 값 안의 자리표시자는 그대로 둠)
fn render(template: &str, context: &str, question: &str) -> String {
    let mut out = String::with_capacity(template.len() + context.len() + question.len());
    let mut rest = template;

    while let Some(pos) = rest.find('{') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if let Some(after) = tail.strip_prefix("{context}") {
            out.push_str(context);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("{question}") {
            out.push_str(question);
            rest = after;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }

    out.push_str(rest);
    out
}

/// 검색 순서대로 청크 텍스트를 빈 줄로 이어붙임
pub fn format_context(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(|r| r.chunk.text.trim())
        .collect::<Vec<_>>()
        .join("\n\n")
}
