//! Analysis orchestration — fingerprint → cache lookup → extract → analyze → cache write.
//!
//! Only completed analyses are cached. A failed analysis is returned to the
//! caller but the next identical request tries the model again.

use std::sync::Arc;

use bytes::Bytes;
use dashmap::{mapref::entry::Entry, DashMap};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::analysis::analyzer::Analyzer;
use crate::analysis::cache::AnalysisCache;
use crate::analysis::fingerprint::Fingerprint;
use crate::analysis::models::{Analysis, AnalysisFields, AnalysisResult, AnalysisSource};
use crate::errors::AppError;
use crate::extraction::TextExtractor;

pub struct AnalysisService {
    cache: AnalysisCache,
    analyzer: Arc<dyn Analyzer>,
    extractor: Arc<dyn TextExtractor>,
    /// Present when concurrent identical misses share one analysis.
    in_flight: Option<InFlight>,
}

impl AnalysisService {
    pub fn new(
        cache: AnalysisCache,
        analyzer: Arc<dyn Analyzer>,
        extractor: Arc<dyn TextExtractor>,
        single_flight: bool,
    ) -> Self {
        let cache = cache.with_namespace(analyzer.cache_namespace());
        Self {
            cache,
            analyzer,
            extractor,
            in_flight: single_flight.then(InFlight::default),
        }
    }

    /// Analyzes an uploaded résumé, serving a cached result when one exists.
    ///
    /// Fails only when no text can be extracted from the file. Cache and model
    /// failures degrade to a live analysis and an error-shaped result respectively.
    pub async fn analyze(
        &self,
        file_bytes: Bytes,
        job_description: Option<&str>,
    ) -> Result<Analysis, AppError> {
        let fingerprint = Fingerprint::compute(&file_bytes, job_description);

        if let Some(hit) = self.lookup(&fingerprint).await {
            return Ok(hit);
        }

        let Some(in_flight) = &self.in_flight else {
            return self.run(&fingerprint, file_bytes, job_description).await;
        };

        match in_flight.join(&fingerprint) {
            Role::Follower(mut rx) => match rx.recv().await {
                Ok(analysis) => {
                    debug!("Joined in-flight analysis for {fingerprint}");
                    Ok(analysis)
                }
                // Leader gave up without a result (bad input or cancelled)
                Err(_) => self.run(&fingerprint, file_bytes, job_description).await,
            },
            Role::Leader(leader) => {
                // A previous leader may have filled the cache since our lookup
                if let Some(hit) = self.lookup(&fingerprint).await {
                    leader.publish(&hit);
                    return Ok(hit);
                }
                let analysis = self.run(&fingerprint, file_bytes, job_description).await?;
                leader.publish(&analysis);
                Ok(analysis)
            }
        }
    }

    async fn run(
        &self,
        fingerprint: &Fingerprint,
        file_bytes: Bytes,
        job_description: Option<&str>,
    ) -> Result<Analysis, AppError> {
        info!("Cache miss for {fingerprint}, running analysis");

        let text = self.extractor.extract(file_bytes).await;
        if text.is_empty() {
            return Err(AppError::UnprocessableEntity(
                "No text could be extracted from the PDF; it may be a scanned image".to_string(),
            ));
        }

        let result = self.analyzer.analyze(&text, job_description).await;
        if let AnalysisResult::Completed(fields) = &result {
            self.cache
                .put(fingerprint, fields, self.cache.default_ttl())
                .await;
        }

        Ok(Analysis {
            result,
            source: AnalysisSource::AiGeneration,
        })
    }

    async fn lookup(&self, fingerprint: &Fingerprint) -> Option<Analysis> {
        let fields = self.cache.get::<AnalysisFields>(fingerprint).await?;
        info!("Cache hit for {fingerprint}");
        Some(Analysis {
            result: AnalysisResult::Completed(fields),
            source: AnalysisSource::Cache,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Single-flight
// ────────────────────────────────────────────────────────────────────────────

/// Pending analyses keyed by fingerprint.
///
/// The first request for a fingerprint becomes the leader and runs the
/// analysis. Later requests subscribe and receive the leader's `Analysis`,
/// failed ones included. The marker disappears as soon as the leader finishes.
#[derive(Default)]
struct InFlight {
    pending: DashMap<Fingerprint, broadcast::Sender<Analysis>>,
}

enum Role<'a> {
    Leader(Leader<'a>),
    Follower(broadcast::Receiver<Analysis>),
}

impl InFlight {
    fn join(&self, fingerprint: &Fingerprint) -> Role<'_> {
        match self.pending.entry(fingerprint.clone()) {
            Entry::Occupied(pending) => Role::Follower(pending.get().subscribe()),
            Entry::Vacant(slot) => {
                let (tx, _) = broadcast::channel(1);
                slot.insert(tx);
                Role::Leader(Leader {
                    in_flight: self,
                    fingerprint: fingerprint.clone(),
                    published: false,
                })
            }
        }
    }
}

struct Leader<'a> {
    in_flight: &'a InFlight,
    fingerprint: Fingerprint,
    published: bool,
}

impl Leader<'_> {
    fn publish(mut self, analysis: &Analysis) {
        self.published = true;
        if let Some((_, tx)) = self.in_flight.pending.remove(&self.fingerprint) {
            // No receivers is fine: nobody joined
            let _ = tx.send(analysis.clone());
        }
    }
}

impl Drop for Leader<'_> {
    fn drop(&mut self) {
        // After `publish` the slot may already belong to a newer leader
        if !self.published {
            // Dropping the sender wakes followers with `Closed`
            self.in_flight.pending.remove(&self.fingerprint);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::analysis::analyzer::MockAnalyzer;
    use crate::analysis::cache::tests::BrokenStore;
    use crate::analysis::store::{CacheError, CacheStore, MemoryStore};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Extractor returning a fixed text for anything that starts with `%PDF`.
    pub(crate) struct StubExtractor;

    #[async_trait]
    impl TextExtractor for StubExtractor {
        async fn extract(&self, bytes: Bytes) -> String {
            if bytes.starts_with(b"%PDF") {
                String::from_utf8_lossy(&bytes).into_owned()
            } else {
                String::new()
            }
        }
    }

    /// `StubExtractor` behind a fixed delay.
    struct SlowExtractor(Duration);

    #[async_trait]
    impl TextExtractor for SlowExtractor {
        async fn extract(&self, bytes: Bytes) -> String {
            tokio::time::sleep(self.0).await;
            StubExtractor.extract(bytes).await
        }
    }

    /// Analyzer that counts calls and echoes its inputs back.
    #[derive(Default)]
    pub(crate) struct CountingAnalyzer {
        pub calls: AtomicUsize,
        pub fail: bool,
        pub delay: Option<Duration>,
    }

    #[async_trait]
    impl Analyzer for CountingAnalyzer {
        async fn analyze(&self, resume_text: &str, job_description: Option<&str>) -> AnalysisResult {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return AnalysisResult::failed("upstream unavailable");
            }
            let mut fields = AnalysisFields::new();
            fields.insert("summary".into(), json!(resume_text));
            fields.insert("call".into(), json!(call));
            if let Some(jd) = job_description {
                fields.insert("match_analysis".into(), json!(jd));
            }
            AnalysisResult::Completed(fields)
        }
    }

    /// Memory store that counts every operation reaching it.
    #[derive(Default)]
    pub(crate) struct RecordingStore {
        pub inner: MemoryStore,
        pub ops: AtomicUsize,
    }

    #[async_trait]
    impl CacheStore for RecordingStore {
        async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
            self.ops.fetch_add(1, Ordering::SeqCst);
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
            self.ops.fetch_add(1, Ordering::SeqCst);
            self.inner.set(key, value, ttl).await
        }

        fn backend(&self) -> &'static str {
            "recording"
        }
    }

    fn service(
        store: Arc<dyn CacheStore>,
        analyzer: Arc<CountingAnalyzer>,
        single_flight: bool,
    ) -> AnalysisService {
        AnalysisService::new(
            AnalysisCache::new(store, Duration::from_secs(3600), Duration::from_millis(500)),
            analyzer,
            Arc::new(StubExtractor),
            single_flight,
        )
    }

    const PDF_A: &[u8] = b"%PDF-1.7 Jane Doe, Rust engineer";

    #[tokio::test]
    async fn test_second_identical_upload_is_served_from_cache() {
        let analyzer = Arc::new(CountingAnalyzer::default());
        let svc = service(Arc::new(MemoryStore::new()), analyzer.clone(), true);

        let first = svc.analyze(Bytes::from_static(PDF_A), None).await.unwrap();
        let second = svc.analyze(Bytes::from_static(PDF_A), None).await.unwrap();

        assert_eq!(first.source, AnalysisSource::AiGeneration);
        assert_eq!(second.source, AnalysisSource::Cache);
        assert_eq!(first.result, second.result);
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_job_descriptions_never_share_entries() {
        let analyzer = Arc::new(CountingAnalyzer::default());
        let svc = service(Arc::new(MemoryStore::new()), analyzer.clone(), true);

        let x = svc.analyze(Bytes::from_static(PDF_A), Some("X")).await.unwrap();
        let y = svc.analyze(Bytes::from_static(PDF_A), Some("Y")).await.unwrap();

        assert_eq!(x.source, AnalysisSource::AiGeneration);
        assert_eq!(y.source, AnalysisSource::AiGeneration);
        assert_ne!(x.result, y.result);
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 2);

        let x_again = svc.analyze(Bytes::from_static(PDF_A), Some("X")).await.unwrap();
        assert_eq!(x_again.source, AnalysisSource::Cache);
        assert_eq!(x_again.result, x.result);
    }

    #[tokio::test]
    async fn test_broken_store_falls_through_to_live_analysis() {
        let analyzer = Arc::new(CountingAnalyzer::default());
        let svc = service(Arc::new(BrokenStore { hang: false }), analyzer.clone(), true);

        for _ in 0..2 {
            let analysis = svc.analyze(Bytes::from_static(PDF_A), None).await.unwrap();
            assert_eq!(analysis.source, AnalysisSource::AiGeneration);
            assert!(analysis.result.is_completed());
        }
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_analysis_is_not_cached() {
        let analyzer = Arc::new(CountingAnalyzer {
            fail: true,
            ..Default::default()
        });
        let svc = service(Arc::new(MemoryStore::new()), analyzer.clone(), true);

        let first = svc.analyze(Bytes::from_static(PDF_A), None).await.unwrap();
        let second = svc.analyze(Bytes::from_static(PDF_A), None).await.unwrap();

        assert!(!first.result.is_completed());
        assert_eq!(second.source, AnalysisSource::AiGeneration);
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unextractable_file_is_rejected_before_analysis() {
        let analyzer = Arc::new(CountingAnalyzer::default());
        let svc = service(Arc::new(MemoryStore::new()), analyzer.clone(), true);

        let err = svc
            .analyze(Bytes::from_static(b"scanned image bytes"), None)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::UnprocessableEntity(_)));
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_default_ttl() {
        let analyzer = Arc::new(CountingAnalyzer::default());
        let svc = service(Arc::new(MemoryStore::new()), analyzer.clone(), true);

        svc.analyze(Bytes::from_static(PDF_A), None).await.unwrap();
        tokio::time::advance(Duration::from_secs(3600)).await;
        let after = svc.analyze(Bytes::from_static(PDF_A), None).await.unwrap();

        assert_eq!(after.source, AnalysisSource::AiGeneration);
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_flight_coalesces_concurrent_misses() {
        let analyzer = Arc::new(CountingAnalyzer {
            delay: Some(Duration::from_millis(200)),
            ..Default::default()
        });
        let svc = service(Arc::new(MemoryStore::new()), analyzer.clone(), true);

        let (a, b) = tokio::join!(
            svc.analyze(Bytes::from_static(PDF_A), None),
            svc.analyze(Bytes::from_static(PDF_A), None),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.result, b.result);
        assert_eq!(a.source, AnalysisSource::AiGeneration);
        assert_eq!(b.source, AnalysisSource::AiGeneration);
        assert!(svc.in_flight.as_ref().unwrap().pending.is_empty());

        let later = svc.analyze(Bytes::from_static(PDF_A), None).await.unwrap();
        assert_eq!(later.source, AnalysisSource::Cache);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_flight_shares_failed_analysis_with_waiters() {
        let analyzer = Arc::new(CountingAnalyzer {
            fail: true,
            delay: Some(Duration::from_secs(10)),
            ..Default::default()
        });
        let svc = service(Arc::new(MemoryStore::new()), analyzer.clone(), true);

        let started = tokio::time::Instant::now();
        let (a, b, c) = tokio::join!(
            svc.analyze(Bytes::from_static(PDF_A), None),
            svc.analyze(Bytes::from_static(PDF_A), None),
            svc.analyze(Bytes::from_static(PDF_A), None),
        );
        let elapsed = started.elapsed();

        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 1);
        assert!(elapsed < Duration::from_secs(15), "took {elapsed:?}");
        for analysis in [a.unwrap(), b.unwrap(), c.unwrap()] {
            assert!(!analysis.result.is_completed());
        }
        assert!(svc.in_flight.as_ref().unwrap().pending.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_flight_shares_result_when_store_is_down() {
        let analyzer = Arc::new(CountingAnalyzer {
            delay: Some(Duration::from_secs(10)),
            ..Default::default()
        });
        let svc = service(Arc::new(BrokenStore { hang: false }), analyzer.clone(), true);

        let (a, b, c) = tokio::join!(
            svc.analyze(Bytes::from_static(PDF_A), None),
            svc.analyze(Bytes::from_static(PDF_A), None),
            svc.analyze(Bytes::from_static(PDF_A), None),
        );

        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 1);
        let a = a.unwrap();
        assert!(a.result.is_completed());
        assert_eq!(b.unwrap().result, a.result);
        assert_eq!(c.unwrap().result, a.result);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiters_retry_when_leader_input_is_unusable() {
        let analyzer = Arc::new(CountingAnalyzer::default());
        let svc = AnalysisService::new(
            AnalysisCache::new(
                Arc::new(MemoryStore::new()),
                Duration::from_secs(3600),
                Duration::from_millis(500),
            ),
            analyzer.clone(),
            Arc::new(SlowExtractor(Duration::from_secs(1))),
            true,
        );

        let (a, b) = tokio::join!(
            svc.analyze(Bytes::from_static(b"scanned image bytes"), None),
            svc.analyze(Bytes::from_static(b"scanned image bytes"), None),
        );

        assert!(matches!(a, Err(AppError::UnprocessableEntity(_))));
        assert!(matches!(b, Err(AppError::UnprocessableEntity(_))));
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 0);
        assert!(svc.in_flight.as_ref().unwrap().pending.is_empty());
    }

    #[tokio::test]
    async fn test_mock_results_are_invisible_to_the_real_analyzer() {
        let store = Arc::new(MemoryStore::new());
        let cache = AnalysisCache::new(
            store.clone(),
            Duration::from_secs(3600),
            Duration::from_millis(500),
        );
        let mock = AnalysisService::new(
            cache,
            Arc::new(MockAnalyzer),
            Arc::new(StubExtractor),
            true,
        );
        let placeholder = mock.analyze(Bytes::from_static(PDF_A), None).await.unwrap();
        assert!(placeholder.result.is_completed());
        assert_eq!(
            mock.analyze(Bytes::from_static(PDF_A), None).await.unwrap().source,
            AnalysisSource::Cache
        );

        let analyzer = Arc::new(CountingAnalyzer::default());
        let real = service(store, analyzer.clone(), true);
        let live = real.analyze(Bytes::from_static(PDF_A), None).await.unwrap();

        assert_eq!(live.source, AnalysisSource::AiGeneration);
        assert_ne!(live.result, placeholder.result);
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_without_single_flight_concurrent_misses_both_analyze() {
        let analyzer = Arc::new(CountingAnalyzer {
            delay: Some(Duration::from_millis(200)),
            ..Default::default()
        });
        let svc = service(Arc::new(MemoryStore::new()), analyzer.clone(), false);

        let (a, b) = tokio::join!(
            svc.analyze(Bytes::from_static(PDF_A), None),
            svc.analyze(Bytes::from_static(PDF_A), None),
        );

        assert_eq!(a.unwrap().source, AnalysisSource::AiGeneration);
        assert_eq!(b.unwrap().source, AnalysisSource::AiGeneration);
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 2);
    }
}
