// Résumé analysis: fingerprinting, the TTL cache in front of the model,
// analyzer backends and the HTTP handler.

pub mod analyzer;
pub mod cache;
pub mod fingerprint;
pub mod handlers;
pub mod models;
pub mod prompts;
pub mod service;
pub mod store;
