//! Analyzers — pluggable backends that turn résumé text into an `AnalysisResult`.
//!
//! `AppState` holds an `Arc<dyn Analyzer>`, chosen at startup:
//! `LlmAnalyzer` normally, `MockAnalyzer` in mock mode or without an API key.
//!
//! An analyzer never fails outright. Upstream errors become `AnalysisResult::Failed`.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use crate::analysis::cache::DEFAULT_NAMESPACE;
use crate::analysis::models::{AnalysisFields, AnalysisResult};
use crate::analysis::prompts::{ANALYSIS_PROMPT_TEMPLATE, ANALYSIS_SYSTEM, MATCH_PROMPT_TEMPLATE};
use crate::llm_client::prompts::JSON_ONLY_SYSTEM;
use crate::llm_client::LlmClient;

/// Characters of résumé text sent to the model.
pub const RESUME_CHAR_LIMIT: usize = 3000;
/// Characters of job-description text sent to the model.
pub const JOB_DESCRIPTION_CHAR_LIMIT: usize = 1500;

#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, resume_text: &str, job_description: Option<&str>) -> AnalysisResult;

    /// Cache namespace for this backend's results.
    fn cache_namespace(&self) -> &'static str {
        DEFAULT_NAMESPACE
    }
}

// ────────────────────────────────────────────────────────────────────────────
// LlmAnalyzer
// ────────────────────────────────────────────────────────────────────────────

pub struct LlmAnalyzer(pub LlmClient);

#[async_trait]
impl Analyzer for LlmAnalyzer {
    async fn analyze(&self, resume_text: &str, job_description: Option<&str>) -> AnalysisResult {
        let prompt = build_prompt(resume_text, job_description);
        let system = format!("{ANALYSIS_SYSTEM} {JSON_ONLY_SYSTEM}");

        match self.0.call_json::<Value>(&prompt, &system).await {
            Ok(Value::Object(fields)) => AnalysisResult::Completed(fields),
            Ok(other) => {
                warn!("LLM returned non-object JSON: {other}");
                AnalysisResult::failed("model returned an unexpected response shape")
            }
            Err(e) => {
                warn!("LLM analysis failed: {e}");
                AnalysisResult::failed(e.to_string())
            }
        }
    }
}

/// Builds the user prompt, capping both inputs on character boundaries.
pub fn build_prompt(resume_text: &str, job_description: Option<&str>) -> String {
    let mut prompt = ANALYSIS_PROMPT_TEMPLATE.replace(
        "{resume_text}",
        truncate_chars(resume_text, RESUME_CHAR_LIMIT),
    );
    if let Some(jd) = job_description {
        prompt.push_str(&MATCH_PROMPT_TEMPLATE.replace(
            "{job_description}",
            truncate_chars(jd, JOB_DESCRIPTION_CHAR_LIMIT),
        ));
    }
    prompt
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// MockAnalyzer
// ────────────────────────────────────────────────────────────────────────────

/// Fixed placeholder analysis for local development without credentials.
pub struct MockAnalyzer;

#[async_trait]
impl Analyzer for MockAnalyzer {
    async fn analyze(&self, _resume_text: &str, job_description: Option<&str>) -> AnalysisResult {
        let mut fields = AnalysisFields::new();
        fields.insert(
            "basic_info".into(),
            json!({ "name": "Test User (Mock)", "email": "test@mock.com" }),
        );
        fields.insert("skills".into(), json!(["Mock Skill 1", "Mock Skill 2"]));
        fields.insert(
            "summary".into(),
            json!("Local placeholder data: no LLM API key is active."),
        );
        if job_description.is_some() {
            fields.insert("match_score".into(), json!(88));
            fields.insert(
                "match_analysis".into(),
                json!("Mock-mode match analysis."),
            );
        }
        AnalysisResult::Completed(fields)
    }

    fn cache_namespace(&self) -> &'static str {
        "mock"
    }
}
