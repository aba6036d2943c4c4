//! Pipeline-specific stages.

use super::ScanReport;
use crate::core::cache::{open_or_unavailable, CacheFactory, CacheLookupResult, CacheQuery, HashCache};
use crate::core::hasher::{HashEngine, HashSource, HashedImageResult, MethodVersions};
use crate::core::queue::{CancellationToken, Queue};
use crate::core::reader::DiskReadResult;
use crate::core::scanner::{FileIdentityBatch, ScanRequest};
use crate::core::similarity::SimilarityEngine;
use crate::core::stage::{Sink, Stage, Transform};
use crate::events::{CacheEvent, Event, EventSender, HashEvent, PipelineEvent};
use crossbeam_channel::Sender;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Splits identity batches into cache hits and misses.
///
/// Hits go straight to the results queue; misses are re-batched for the
/// disk reader. Opens its own cache handle on the stage thread.
pub struct CacheLookupStage {
    factory: Arc<dyn CacheFactory>,
    versions: MethodVersions,
    input: Arc<Queue<FileIdentityBatch>>,
    misses: Arc<Queue<FileIdentityBatch>>,
    hits: Arc<Queue<HashedImageResult>>,
    events: EventSender,
    hit_count: usize,
    miss_count: usize,
    error_reported: bool,
}

impl CacheLookupStage {
    pub fn new(
        factory: Arc<dyn CacheFactory>,
        versions: MethodVersions,
        input: Arc<Queue<FileIdentityBatch>>,
        misses: Arc<Queue<FileIdentityBatch>>,
        hits: Arc<Queue<HashedImageResult>>,
        events: EventSender,
    ) -> Self {
        Self {
            factory,
            versions,
            input,
            misses,
            hits,
            events,
            hit_count: 0,
            miss_count: 0,
            error_reported: false,
        }
    }

    fn process(&mut self, cache: &dyn HashCache, batch: FileIdentityBatch) -> ControlFlow<()> {
        let mut missed = Vec::new();

        for identity in batch.iter() {
            let query = CacheQuery::new(identity.clone(), &self.versions);
            match cache.lookup(&query) {
                CacheLookupResult::Hit(result) => {
                    self.hit_count += 1;
                    self.events.send(Event::Hash(HashEvent::Hashed {
                        path: identity.path(),
                        source: HashSource::Cache,
                    }));
                    if self.hits.push(result).is_err() {
                        return ControlFlow::Break(());
                    }
                }
                CacheLookupResult::Miss => {
                    self.miss_count += 1;
                    missed.push(query.identity);
                }
                CacheLookupResult::Error(error) => {
                    self.miss_count += 1;
                    if !self.error_reported {
                        self.error_reported = true;
                        self.events.send(Event::Cache(CacheEvent::Error {
                            message: error.to_string(),
                        }));
                        self.events
                            .status(format!("Cache: unavailable, hashing everything ({error})"));
                    }
                    missed.push(query.identity);
                }
            }
        }

        self.events.send(Event::Cache(CacheEvent::LookupProgress {
            hits: self.hit_count,
            misses: self.miss_count,
        }));

        if !missed.is_empty() && self.misses.push(Arc::new(missed)).is_err() {
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }
}

impl Stage for CacheLookupStage {
    fn name(&self) -> &str {
        "CacheLookup"
    }

    fn on_start(&mut self) {
        self.misses.register_producer();
        self.hits.register_producer();
    }

    fn run(&mut self) {
        let cache = open_or_unavailable(self.factory.as_ref());

        while let Some(batch) = self.input.wait_and_pop() {
            if self.process(cache.as_ref(), batch).is_break() {
                self.input.shutdown();
                break;
            }
        }

        debug!(hits = self.hit_count, misses = self.miss_count, "cache lookup drained");
    }

    fn on_stop(&mut self) {
        self.misses.producer_done();
        self.hits.producer_done();
    }
}

/// One of the parallel hash workers.
pub struct HashWorker {
    name: String,
    engine: HashEngine,
    events: EventSender,
    hashed: usize,
}

impl HashWorker {
    pub fn new(index: usize, engine: HashEngine, events: EventSender) -> Self {
        Self {
            name: format!("HashWorker-{index}"),
            engine,
            events,
            hashed: 0,
        }
    }
}

impl Transform for HashWorker {
    type Input = DiskReadResult;
    type Output = HashedImageResult;

    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&mut self, item: DiskReadResult, output: &Queue<HashedImageResult>) -> ControlFlow<()> {
        let DiskReadResult { identity, content } = item;
        let path = identity.path();
        let result = self.engine.compute(identity, &content);
        drop(content);

        for (method, message) in result.failures() {
            self.events.send(Event::Hash(HashEvent::Failed {
                path: path.clone(),
                method: method.to_string(),
                message: message.to_string(),
            }));
        }
        self.events.send(Event::Hash(HashEvent::Hashed {
            path,
            source: result.source(),
        }));

        self.hashed += 1;
        match output.push(result) {
            Ok(()) => ControlFlow::Continue(()),
            Err(_) => ControlFlow::Break(()),
        }
    }

    fn finish(&mut self, _output: &Queue<HashedImageResult>) {
        debug!(worker = %self.name, hashed = self.hashed, "hash worker drained");
    }
}

/// Writes fresh results to the cache and forwards them.
///
/// After a scan that ran to completion, prunes cache rows under the scan
/// root that this scan never touched.
pub struct CacheStore {
    factory: Arc<dyn CacheFactory>,
    cache: Option<Box<dyn HashCache>>,
    versions: MethodVersions,
    request: ScanRequest,
    token: CancellationToken,
    events: EventSender,
    stored: usize,
    failed: usize,
}

impl CacheStore {
    pub fn new(
        factory: Arc<dyn CacheFactory>,
        versions: MethodVersions,
        request: ScanRequest,
        token: CancellationToken,
        events: EventSender,
    ) -> Self {
        Self {
            factory,
            cache: None,
            versions,
            request,
            token,
            events,
            stored: 0,
            failed: 0,
        }
    }

    fn prune(&mut self) {
        let cache = lazy_open(&mut self.cache, self.factory.as_ref());
        match cache.prune(&self.request.root, self.request.recursive) {
            Ok(removed) => {
                self.events.send(Event::Cache(CacheEvent::Pruned { removed }));
                if removed > 0 {
                    self.events
                        .status(format!("Cache: pruned {removed} stale entries"));
                }
            }
            Err(error) => {
                warn!(%error, "cache prune failed");
                self.events.send(Event::Cache(CacheEvent::Error {
                    message: error.to_string(),
                }));
            }
        }
    }
}

impl Transform for CacheStore {
    type Input = HashedImageResult;
    type Output = HashedImageResult;

    fn name(&self) -> &str {
        "CacheStore"
    }

    fn transform(&mut self, item: HashedImageResult, output: &Queue<HashedImageResult>) -> ControlFlow<()> {
        let cache = lazy_open(&mut self.cache, self.factory.as_ref());
        match cache.store(&item, &self.versions) {
            Ok(()) => self.stored += 1,
            Err(error) => {
                self.failed += 1;
                warn!(path = %item.identity().path().display(), %error, "cache store failed");
                self.events.send(Event::Cache(CacheEvent::Error {
                    message: error.to_string(),
                }));
            }
        }

        match output.push(item) {
            Ok(()) => ControlFlow::Continue(()),
            Err(_) => ControlFlow::Break(()),
        }
    }

    fn finish(&mut self, _output: &Queue<HashedImageResult>) {
        if self.token.is_cancelled() {
            debug!("scan cancelled, skipping cache prune");
        } else {
            self.prune();
        }
        debug!(stored = self.stored, failed = self.failed, "cache store drained");
    }
}

/// The handle is opened on first use so the connection belongs to the
/// stage thread.
fn lazy_open<'a>(
    slot: &'a mut Option<Box<dyn HashCache>>,
    factory: &dyn CacheFactory,
) -> &'a dyn HashCache {
    &**slot.get_or_insert_with(|| open_or_unavailable(factory))
}

/// Buffers every result, then groups them once the stream ends.
pub struct ResultCollector {
    results: Vec<HashedImageResult>,
    engine: SimilarityEngine,
    token: CancellationToken,
    events: EventSender,
    report: Sender<ScanReport>,
    started: Instant,
}

impl ResultCollector {
    pub fn new(
        engine: SimilarityEngine,
        token: CancellationToken,
        events: EventSender,
        report: Sender<ScanReport>,
        started: Instant,
    ) -> Self {
        Self {
            results: Vec::new(),
            engine,
            token,
            events,
            report,
            started,
        }
    }

    fn tally(&self) -> ScanReport {
        let cache_hits = self
            .results
            .iter()
            .filter(|r| r.source() == HashSource::Cache)
            .count();
        ScanReport {
            groups: Vec::new(),
            total_files: self.results.len(),
            cache_hits,
            hashed: self.results.len() - cache_hits,
            errors: self.results.iter().filter(|r| r.has_failures()).count(),
            cancelled: false,
            duration_ms: 0,
        }
    }
}

impl Sink for ResultCollector {
    type Input = HashedImageResult;

    fn name(&self) -> &str {
        "ResultCollector"
    }

    fn consume(&mut self, item: HashedImageResult) -> ControlFlow<()> {
        self.results.push(item);
        ControlFlow::Continue(())
    }

    fn finish(&mut self) {
        let mut report = self.tally();

        if self.token.is_cancelled() {
            report.cancelled = true;
            self.events.status("Scan cancelled");
            self.events.send(Event::Pipeline(PipelineEvent::Cancelled));
        } else {
            self.events
                .status(format!("Grouping {} images", self.results.len()));
            report.groups = self.engine.group(&self.results);
            self.events.send(Event::Pipeline(PipelineEvent::GroupsReady {
                groups: report.groups.clone(),
            }));
        }

        report.duration_ms = self.started.elapsed().as_millis() as u64;

        if !report.cancelled {
            let summary = report.summary();
            info!(
                files = summary.total_files,
                cache_hits = summary.cache_hits,
                groups = summary.duplicate_groups,
                duration_ms = summary.duration_ms,
                "scan complete"
            );
            self.events.status(format!(
                "Found {} duplicate groups ({} duplicates)",
                summary.duplicate_groups, summary.duplicate_count
            ));
            self.events
                .send(Event::Pipeline(PipelineEvent::Completed { summary }));
        }

        // The controller may already be gone after a stop; nothing to do then.
        let _ = self.report.send(report);
    }
}
