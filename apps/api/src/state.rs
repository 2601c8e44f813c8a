use std::sync::Arc;

use crate::analysis::service::AnalysisService;
use crate::config::Config;

/// Shared application state injected into all route handlers via Axum extractors.
/// Built once in `main`; cloning only bumps reference counts.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Orchestrates cache lookup, text extraction and analysis.
    pub analysis: Arc<AnalysisService>,
}
