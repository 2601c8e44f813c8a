//! Axum route handlers for the Analysis API.

use axum::{
    extract::{Multipart, State},
    Json,
};
use bytes::Bytes;
use tracing::info;

use crate::analysis::models::AnalyzeResponse;
use crate::errors::AppError;
use crate::state::AppState;

const FILE_FIELD: &str = "file";
const JOB_DESCRIPTION_FIELD: &str = "job_description";

struct Upload {
    filename: String,
    bytes: Bytes,
}

/// POST /api/analyze
///
/// Multipart form: `file` (PDF, required) and `job_description` (text, optional).
/// Input is validated before the cache or the model is touched.
pub async fn handle_analyze(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let mut upload: Option<Upload> = None;
    let mut job_description: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some(FILE_FIELD) => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;
                upload = Some(Upload { filename, bytes });
            }
            Some(JOB_DESCRIPTION_FIELD) => {
                job_description = Some(field.text().await?);
            }
            _ => {}
        }
    }

    let Upload { filename, bytes } = upload
        .ok_or_else(|| AppError::Validation(format!("missing '{FILE_FIELD}' field")))?;

    if !is_pdf_filename(&filename) {
        return Err(AppError::UnsupportedFile(
            "Only PDF files are supported".to_string(),
        ));
    }

    let job_description = job_description.filter(|jd| !jd.trim().is_empty());
    info!(
        "Analyzing {filename} ({} bytes, job description: {})",
        bytes.len(),
        job_description.is_some()
    );

    let analysis = state
        .analysis
        .analyze(bytes, job_description.as_deref())
        .await?;

    Ok(Json(AnalyzeResponse {
        filename,
        success: analysis.result.is_completed(),
        data: analysis.result.to_payload(),
        source: analysis.source,
    }))
}

fn is_pdf_filename(filename: &str) -> bool {
    filename.to_ascii_lowercase().ends_with(".pdf")
}
