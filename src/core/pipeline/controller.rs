//! Pipeline construction and lifecycle.

use super::stages::{CacheLookupStage, CacheStore, HashWorker, ResultCollector};
use super::{PipelineConfig, QueueCapacities, ScanReport};
use crate::core::cache::{open_or_unavailable, CacheFactory, NullCacheFactory};
use crate::core::hasher::{HashCatalog, HashEngine, HashedImageResult};
use crate::core::queue::{CancellationToken, Queue};
use crate::core::reader::{DiskReadResult, DiskReader};
use crate::core::scanner::{DirectoryScanner, FileIdentityBatch, ScanConfig, ScanRequest};
use crate::core::similarity::{SimilarityConfig, SimilarityEngine};
use crate::core::stage::{spawn_stage, SinkStage, SourceStage, StageHandle, TransformStage};
use crate::error::PipelineError;
use crate::events::{null_sender, CacheEvent, Event, EventSender, PipelineEvent, PipelineState};
use crossbeam_channel::Receiver;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{error, info};

/// Type-erased handle used to close every queue on stop
trait Closable: Send + Sync {
    fn close(&self);
}

impl<T: Send> Closable for Queue<T> {
    fn close(&self) {
        self.shutdown();
    }
}

/// Token and queues of one run; enough to cancel it from anywhere
#[derive(Clone)]
struct RunSignals {
    token: CancellationToken,
    queues: Vec<Arc<dyn Closable>>,
}

impl RunSignals {
    fn cancel(&self) {
        self.token.cancel();
        for queue in &self.queues {
            queue.close();
        }
    }
}

/// Cancels the controller's current scan from another thread.
///
/// Stopping through the handle does not join anything; the thread that
/// owns the controller still calls [`PipelineController::wait`], which
/// then returns a cancelled report. Does nothing while no scan runs.
#[derive(Clone, Default)]
pub struct StopHandle {
    active: Arc<Mutex<Option<RunSignals>>>,
}

impl StopHandle {
    pub fn stop(&self) {
        let guard = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(signals) = guard.as_ref() {
            info!("scan cancelled");
            signals.cancel();
        }
    }

    fn arm(&self, signals: RunSignals) {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = Some(signals);
    }

    fn disarm(&self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// Threads and queues of one running scan
struct RunningPipeline {
    signals: RunSignals,
    handles: Vec<StageHandle>,
    report: Receiver<ScanReport>,
}

impl RunningPipeline {
    fn cancel(&self) {
        self.signals.cancel();
    }

    /// Join every stage, then collect the collector's report.
    fn join(self) -> Result<ScanReport, PipelineError> {
        let mut failure = None;
        for handle in self.handles {
            if let Err(e) = handle.join() {
                error!(error = %e, "stage failed");
                failure.get_or_insert(e);
            }
        }

        match (self.report.try_recv(), failure) {
            (Ok(report), _) => Ok(report),
            (Err(_), Some(e)) => Err(e),
            (Err(_), None) => Err(PipelineError::StagePanicked {
                stage: "ResultCollector".to_string(),
            }),
        }
    }
}

/// Builder for [`PipelineController`]
pub struct PipelineBuilder {
    config: PipelineConfig,
    catalog: HashCatalog,
    similarity: SimilarityConfig,
    cache: Arc<dyn CacheFactory>,
    events: EventSender,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            catalog: HashCatalog::new(),
            similarity: SimilarityConfig::default(),
            cache: Arc::new(NullCacheFactory),
            events: null_sender(),
        }
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Number of parallel hash workers (at least one)
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers.max(1);
        self
    }

    pub fn capacities(mut self, capacities: QueueCapacities) -> Self {
        self.config.capacities = capacities;
        self
    }

    pub fn scan_config(mut self, scan: ScanConfig) -> Self {
        self.config.scan = scan;
        self
    }

    pub fn catalog(mut self, catalog: HashCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn similarity(mut self, similarity: SimilarityConfig) -> Self {
        self.similarity = similarity;
        self
    }

    /// Set the cache; defaults to no caching
    pub fn cache(mut self, cache: Arc<dyn CacheFactory>) -> Self {
        self.cache = cache;
        self
    }

    pub fn events(mut self, events: EventSender) -> Self {
        self.events = events;
        self
    }

    pub fn build(self) -> PipelineController {
        PipelineController {
            config: self.config,
            catalog: self.catalog,
            similarity: self.similarity,
            cache: self.cache,
            events: self.events,
            state: PipelineState::Idle,
            running: None,
            last_request: None,
            stop_handle: StopHandle::default(),
        }
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Starts, stops and reconfigures scans.
///
/// One scan runs at a time. Reconfiguration tears the running pipeline
/// down completely and builds a new one.
pub struct PipelineController {
    config: PipelineConfig,
    catalog: HashCatalog,
    similarity: SimilarityConfig,
    cache: Arc<dyn CacheFactory>,
    events: EventSender,
    state: PipelineState,
    running: Option<RunningPipeline>,
    last_request: Option<ScanRequest>,
    stop_handle: StopHandle,
}

impl PipelineController {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn catalog(&self) -> &HashCatalog {
        &self.catalog
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Handle that cancels whichever scan is running when it is used
    pub fn stop_handle(&self) -> StopHandle {
        self.stop_handle.clone()
    }

    fn set_state(&mut self, state: PipelineState) {
        if self.state != state {
            self.state = state;
            self.events
                .send(Event::Pipeline(PipelineEvent::StateChanged { state }));
        }
    }

    /// Spawn every stage for `request`.
    ///
    /// Fails before any thread exists if no hash method is enabled.
    pub fn start(&mut self, request: ScanRequest) -> Result<(), PipelineError> {
        if self.running.is_some() {
            return Err(PipelineError::AlreadyRunning);
        }
        let request = request.resolved();

        let engines = (0..self.config.workers.max(1))
            .map(|_| HashEngine::new(&self.catalog))
            .collect::<Result<Vec<_>, _>>()?;

        self.begin_scan_generation();

        let token = CancellationToken::new();
        let capacities = self.config.capacities;
        let scan_queue: Arc<Queue<FileIdentityBatch>> = Arc::new(Queue::bounded(capacities.scan));
        let disk_queue: Arc<Queue<FileIdentityBatch>> = Arc::new(Queue::bounded(capacities.disk));
        let read_queue: Arc<Queue<DiskReadResult>> = Arc::new(Queue::bounded(capacities.read));
        let hashed_queue: Arc<Queue<HashedImageResult>> =
            Arc::new(Queue::bounded(capacities.hashed));
        let results_queue: Arc<Queue<HashedImageResult>> =
            Arc::new(Queue::bounded(capacities.results));
        let (report_tx, report_rx) = crossbeam_channel::bounded(1);

        let mut running = RunningPipeline {
            signals: RunSignals {
                token: token.clone(),
                queues: vec![
                    scan_queue.clone() as Arc<dyn Closable>,
                    disk_queue.clone(),
                    read_queue.clone(),
                    hashed_queue.clone(),
                    results_queue.clone(),
                ],
            },
            handles: Vec::new(),
            report: report_rx,
        };

        let versions = self.catalog.versions();
        let events = &self.events;

        // Consumers first; a queue only closes once its producers finish.
        let spawned = (|| -> Result<(), PipelineError> {
            running.handles.push(spawn_stage(SinkStage::new(
                ResultCollector::new(
                    SimilarityEngine::new(self.similarity.clone(), &self.catalog),
                    token.clone(),
                    events.clone(),
                    report_tx,
                    Instant::now(),
                ),
                results_queue.clone(),
            ))?);

            running.handles.push(spawn_stage(TransformStage::new(
                CacheStore::new(
                    self.cache.clone(),
                    versions.clone(),
                    request.clone(),
                    token.clone(),
                    events.clone(),
                ),
                hashed_queue.clone(),
                results_queue.clone(),
            ))?);

            for (index, engine) in engines.into_iter().enumerate() {
                running.handles.push(spawn_stage(TransformStage::new(
                    HashWorker::new(index, engine, events.clone()),
                    read_queue.clone(),
                    hashed_queue.clone(),
                ))?);
            }

            running.handles.push(spawn_stage(TransformStage::new(
                DiskReader::new(events.clone(), self.config.disk_progress_interval),
                disk_queue.clone(),
                read_queue.clone(),
            ))?);

            running.handles.push(spawn_stage(CacheLookupStage::new(
                self.cache.clone(),
                versions.clone(),
                scan_queue.clone(),
                disk_queue.clone(),
                results_queue.clone(),
                events.clone(),
            ))?);

            running.handles.push(spawn_stage(SourceStage::new(
                DirectoryScanner::new(
                    request.clone(),
                    self.config.scan.clone(),
                    token.clone(),
                    events.clone(),
                ),
                scan_queue.clone(),
            ))?);

            Ok(())
        })();

        if let Err(e) = spawned {
            error!(error = %e, "failed to start pipeline");
            running.cancel();
            let _ = running.join();
            return Err(e);
        }

        info!(
            root = %request.root.display(),
            recursive = request.recursive,
            workers = self.config.workers,
            "scan started"
        );
        self.events.status(format!(
            "Scanning {} with {} hash workers",
            request.root.display(),
            self.config.workers
        ));

        self.stop_handle.arm(running.signals.clone());
        self.running = Some(running);
        self.last_request = Some(request);
        self.set_state(PipelineState::Scanning);
        Ok(())
    }

    fn begin_scan_generation(&self) {
        let cache = open_or_unavailable(self.cache.as_ref());
        if let Err(error) = cache.begin_scan() {
            self.events.send(Event::Cache(CacheEvent::Error {
                message: error.to_string(),
            }));
        }
    }

    /// Block until the running scan drains, then return its report.
    pub fn wait(&mut self) -> Result<ScanReport, PipelineError> {
        let running = self.running.take().ok_or(PipelineError::NotStarted)?;
        let outcome = running.join();
        self.stop_handle.disarm();
        self.set_state(PipelineState::Stopped);
        outcome
    }

    /// Cancel the running scan, close every queue and join every stage.
    ///
    /// Does nothing when no scan is running.
    pub fn stop(&mut self) -> Result<(), PipelineError> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        self.set_state(PipelineState::Stopping);
        running.cancel();
        let outcome = running.join();
        self.stop_handle.disarm();
        self.set_state(PipelineState::Stopped);
        outcome.map(|_| ())
    }

    /// Tear down and rerun the last request.
    pub fn restart(&mut self) -> Result<(), PipelineError> {
        let request = self.last_request.clone().ok_or(PipelineError::NotStarted)?;
        self.stop()?;
        self.start(request)
    }

    /// Change the enabled hash methods.
    ///
    /// An invalid selection is rejected before anything is torn down. A
    /// running scan is restarted with the new methods.
    pub fn update_active_methods<I, S>(&mut self, keys: I) -> Result<(), PipelineError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut catalog = self.catalog.clone();
        catalog.set_enabled(keys)?;
        self.catalog = catalog;

        if self.running.is_some() {
            self.restart()?;
        }
        Ok(())
    }

    /// Start a scan and wait for its report
    pub fn run_scan(&mut self, request: ScanRequest) -> Result<ScanReport, PipelineError> {
        self.start(request)?;
        self.wait()
    }
}

impl Drop for PipelineController {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!(error = %e, "pipeline did not stop cleanly");
        }
    }
}
