use serde::Serialize;
use serde_json::{json, Map, Value};

/// Structured fields produced by a completed analysis (`basic_info`, `skills`,
/// `summary`, optionally `match_score` / `match_analysis`). Kept schema-less:
/// the shape depends on whether a job description was supplied.
pub type AnalysisFields = Map<String, Value>;

/// Outcome of one analysis call.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisResult {
    Completed(AnalysisFields),
    Failed { message: String },
}

impl AnalysisResult {
    pub fn failed(message: impl Into<String>) -> Self {
        AnalysisResult::Failed {
            message: message.into(),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, AnalysisResult::Completed(_))
    }

    /// JSON rendered as the response `data` field. A failure still renders
    /// the usual top-level keys so clients can display it like any result.
    pub fn to_payload(&self) -> Value {
        match self {
            AnalysisResult::Completed(fields) => Value::Object(fields.clone()),
            AnalysisResult::Failed { message } => json!({
                "basic_info": { "name": "Analysis failed" },
                "summary": format!("Service temporarily unavailable: {message}"),
                "skills": [],
                "error": message,
            }),
        }
    }
}

/// Where the returned analysis came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisSource {
    Cache,
    AiGeneration,
}

/// What the orchestration hands back to the HTTP layer.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub result: AnalysisResult,
    pub source: AnalysisSource,
}

/// Response body of `POST /api/analyze`.
#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub filename: String,
    pub success: bool,
    pub data: Value,
    pub source: AnalysisSource,
}
