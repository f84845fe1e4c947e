pub mod control;
pub mod pool;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use tracing::{debug, info, warn};

use crate::clustering::cluster_by_time;
use crate::config::ScannerConfig;
use crate::domain::{
    AssetPage, Authorization, DeleteResult, PhotoAsset, ScanPhase, ScanProgress, SimilarGroup,
    TimeCluster,
};
use crate::error::{Error, Result};
use crate::events::{EventSink, ScanEvent};
use crate::fingerprint::{EmbeddingModel, FingerprintExtractor};
use crate::grouping::group_by_similarity;
use crate::library::PhotoLibrary;
use crate::persistence::{CheckpointStore, ProgressCheckpoint};
use crate::thermal::{ThermalLevel, ThermalSignal};
use crate::thumbnails::ThumbnailExporter;

use control::ScanControl;
use pool::WorkerPool;

/// How a scan run ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed { total_groups: usize },
    /// Stopped by a pause or by a newer start/resume.
    Interrupted,
}

/// The scan engine: owns the scan lifecycle and answers the host's commands.
///
/// Cloning is cheap and every clone drives the same engine, so one clone can run a
/// scan on a worker thread while another pauses it.
#[derive(Clone)]
pub struct Scanner {
    inner: Arc<Inner>,
}

struct Inner {
    config: ScannerConfig,
    library: Arc<dyn PhotoLibrary>,
    extractor: FingerprintExtractor,
    thumbnails: ThumbnailExporter,
    checkpoints: CheckpointStore,
    events: Arc<dyn EventSink>,
    control: ScanControl,
    pool: WorkerPool,
    /// Held for the whole of a start/resume run.
    run_lock: Mutex<()>,
    /// Orders checkpoint/snapshot writes between the run and pause callers.
    persist_lock: Mutex<()>,
    threshold: Mutex<f32>,
    published: Mutex<Published>,
    /// Time clusters of the last run, replayed by `regroup`.
    clusters: Mutex<Vec<TimeCluster>>,
    thermal: Mutex<ThermalLevel>,
}

/// Copy of the run's progress and groups readable from any thread.
#[derive(Default)]
struct Published {
    progress: Option<ScanProgress>,
    groups: Vec<SimilarGroup>,
}

/// State owned by one run.
struct ScanRun {
    total: usize,
    processed: usize,
    last_percent: Option<u32>,
    groups: Vec<SimilarGroup>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Marks the run finished when dropped, whatever path the run returned by.
struct RunGuard<'a> {
    control: &'a ScanControl,
    _lock: MutexGuard<'a, ()>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.control.set_running(false);
    }
}

impl Scanner {
    pub fn new(
        config: ScannerConfig,
        library: Arc<dyn PhotoLibrary>,
        model: Arc<dyn EmbeddingModel>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        std::fs::create_dir_all(config.cache_dir())?;
        let extractor = FingerprintExtractor::new(Arc::clone(&library), model, &config);
        let thumbnails = ThumbnailExporter::new(&config, Arc::clone(&library))?;
        let pool = WorkerPool::new(config.max_workers)?;
        let checkpoints = CheckpointStore::new(&config);
        let threshold = config.default_level.threshold();

        debug!(
            cache_dir = %config.cache_dir().display(),
            workers = config.max_workers,
            model = extractor.model_id(),
            "scanner ready"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                library,
                extractor,
                thumbnails,
                checkpoints,
                events,
                control: ScanControl::new(),
                pool,
                run_lock: Mutex::new(()),
                persist_lock: Mutex::new(()),
                threshold: Mutex::new(threshold),
                published: Mutex::new(Published::default()),
                clusters: Mutex::new(Vec::new()),
                thermal: Mutex::new(ThermalLevel::Nominal),
            }),
        })
    }

    /// React to `signal` for the lifetime of this scanner. The signal's current
    /// level is applied immediately unless it is nominal.
    pub fn watch_thermal(&self, signal: &dyn ThermalSignal) {
        let weak = Arc::downgrade(&self.inner);
        signal.subscribe(Box::new(move |level| {
            if let Some(inner) = weak.upgrade() {
                Scanner { inner }.handle_thermal_change(level);
            }
        }));
        let current = signal.current();
        if current != ThermalLevel::Nominal {
            self.handle_thermal_change(current);
        }
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.inner.config
    }

    // ── Commands ──

    pub fn request_permission(&self) -> Authorization {
        let status = self.inner.library.request_authorization();
        info!(%status, "photo library authorization");
        status
    }

    /// Scan the whole library from scratch. Blocks until the run completes or is
    /// interrupted; a previous run is cancelled and waited for first.
    pub fn start_scan(&self, threshold: f32) -> Result<RunOutcome> {
        let _run = self.acquire_run();
        self.set_threshold(threshold);
        {
            let mut published = lock(&self.inner.published);
            published.groups.clear();
            published.progress = None;
        }
        self.inner.checkpoints.clear();
        self.inner.extractor.load_cache();

        info!(threshold, "starting scan");
        self.run_scan(0, Vec::new()).inspect_err(|e| {
            warn!(error = %e, "scan failed");
            self.inner.checkpoints.clear();
        })
    }

    /// Stop after the in-flight cluster, checkpoint, and report `ScanPaused`.
    pub fn pause_scan(&self) {
        self.inner.control.pause();
        if let Err(e) = self.persist_snapshot(true) {
            warn!(error = %e, "failed to checkpoint on pause");
        }
        info!("scan paused");
        self.emit(ScanEvent::ScanPaused(self.progress()));
    }

    /// Continue from the saved checkpoint, or scan from scratch if there is none.
    pub fn resume_scan(&self, threshold: f32) -> Result<RunOutcome> {
        let _run = self.acquire_run();
        self.set_threshold(threshold);
        self.inner.extractor.load_cache();

        let (resume_from, saved) = match self.inner.checkpoints.load_progress() {
            Some(checkpoint) => (
                checkpoint.current,
                self.inner.checkpoints.load_groups().unwrap_or_default(),
            ),
            None => {
                self.inner.checkpoints.clear();
                (0, Vec::new())
            }
        };
        {
            let mut published = lock(&self.inner.published);
            published.groups = saved.clone();
            published.progress = None;
        }

        info!(threshold, resume_from, saved_groups = saved.len(), "resuming scan");
        self.run_scan(resume_from, saved).inspect_err(|e| {
            warn!(error = %e, "resume failed");
            let total_groups = lock(&self.inner.published).groups.len();
            self.emit(ScanEvent::ScanCompleted { total_groups });
            self.inner.checkpoints.clear();
        })
    }

    pub fn progress(&self) -> Option<ScanProgress> {
        lock(&self.inner.published).progress.clone()
    }

    /// Regroup the last run's time clusters at a new threshold, reusing cached
    /// fingerprints. Replaces the found-groups list.
    pub fn regroup(&self, threshold: f32) -> Result<Vec<SimilarGroup>> {
        let _run = match self.inner.run_lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return Err(Error::ScanInProgress),
        };
        self.set_threshold(threshold);

        let clusters = lock(&self.inner.clusters).clone();
        let groups: Vec<SimilarGroup> = clusters
            .iter()
            .filter(|cluster| cluster.len() >= 2)
            .flat_map(|cluster| self.group_cluster(cluster, threshold))
            .collect();

        lock(&self.inner.published).groups = groups.clone();
        info!(threshold, groups = groups.len(), "regrouped");
        Ok(groups)
    }

    /// Delete assets as one batch. Repeated ids count once. Never reports partial success.
    pub fn delete_assets(&self, ids: &[String]) -> DeleteResult {
        let mut seen = HashSet::new();
        let ids: Vec<String> = ids.iter().filter(|id| seen.insert(id.as_str())).cloned().collect();
        if ids.is_empty() {
            return DeleteResult::succeeded(0, 0);
        }
        let assets = match self.inner.library.fetch_assets_by_ids(&ids) {
            Ok(assets) => assets,
            Err(e) => return DeleteResult::failed(e.to_string()),
        };
        if assets.is_empty() {
            return DeleteResult::succeeded(0, 0);
        }

        let freed: u64 = assets.iter().map(|a| a.file_size).sum();
        match self.inner.library.delete_assets(&assets) {
            Ok(()) => {
                info!(count = assets.len(), freed, "deleted assets");
                DeleteResult::succeeded(assets.len(), freed)
            }
            Err(e) => {
                warn!(error = %e, "delete failed");
                DeleteResult::failed(e.to_string())
            }
        }
    }

    /// The saved progress checkpoint, if it describes a resumable run.
    pub fn checkpoint(&self) -> Option<ProgressCheckpoint> {
        self.inner.checkpoints.load_progress()
    }

    pub fn has_partial_scan(&self) -> bool {
        self.checkpoint().is_some()
            || self
                .inner
                .checkpoints
                .load_groups()
                .is_some_and(|groups| !groups.is_empty())
    }

    /// Groups from the last saved snapshot, available before any resume.
    pub fn saved_groups(&self) -> Vec<SimilarGroup> {
        self.inner.checkpoints.load_groups().unwrap_or_default()
    }

    /// Write the checkpoint and the found-groups snapshot now.
    pub fn save_current_state(&self) -> Result<()> {
        self.persist_snapshot(false)
    }

    /// Wipe the fingerprint cache, thumbnails and checkpoint files.
    pub fn clear_cache(&self) -> Result<()> {
        self.inner.extractor.clear_cache()?;
        self.inner.thumbnails.clear()?;
        self.inner.checkpoints.clear();
        info!("cache cleared");
        Ok(())
    }

    pub fn total_asset_count(&self) -> Result<usize> {
        self.inner.library.asset_count()
    }

    /// One page of the capture-time ordered asset list. Out-of-range offsets
    /// yield an empty page.
    pub fn list_assets(&self, offset: usize, limit: usize) -> Result<AssetPage> {
        let assets = self.inner.library.fetch_assets()?;
        let total = assets.len();
        let start = offset.min(total);
        let end = start.saturating_add(limit).min(total);
        Ok(AssetPage {
            assets: assets[start..end].to_vec(),
            total,
        })
    }

    /// Groups found by the current or last run.
    pub fn found_groups(&self) -> Vec<SimilarGroup> {
        lock(&self.inner.published).groups.clone()
    }

    pub fn thumbnail(&self, asset_id: &str, width: u32, height: u32) -> Option<PathBuf> {
        self.inner.thumbnails.thumbnail(asset_id, width, height)
    }

    pub fn thumbnails(&self, asset_ids: &[String], width: u32, height: u32) -> HashMap<String, PathBuf> {
        self.inner.thumbnails.thumbnails(asset_ids, width, height)
    }

    pub fn preview(&self, asset_id: &str) -> Option<PathBuf> {
        self.inner.thumbnails.preview(asset_id)
    }

    pub fn threshold(&self) -> f32 {
        *lock(&self.inner.threshold)
    }

    pub fn thermal_level(&self) -> ThermalLevel {
        *lock(&self.inner.thermal)
    }

    pub fn worker_count(&self) -> usize {
        self.inner.pool.workers()
    }

    /// Throttle at serious, suspend and checkpoint at critical, restore at
    /// nominal/fair unless a cancellation is in flight.
    pub fn handle_thermal_change(&self, level: ThermalLevel) {
        *lock(&self.inner.thermal) = level;
        self.emit(ScanEvent::ThermalWarning { level });

        let control = &self.inner.control;
        match level {
            ThermalLevel::Serious => {
                warn!(%level, "throttling fingerprint workers");
                self.inner.pool.set_workers(self.inner.config.throttled_workers);
            }
            ThermalLevel::Critical => {
                warn!(%level, "suspending scan");
                control.suspend();
                if let Err(e) = self.persist_snapshot(true) {
                    warn!(error = %e, "failed to checkpoint on thermal suspend");
                }
                if control.is_running() {
                    self.emit(ScanEvent::ScanPaused(self.progress()));
                }
            }
            ThermalLevel::Nominal | ThermalLevel::Fair => {
                info!(%level, "restoring fingerprint workers");
                self.inner.pool.set_workers(self.inner.config.max_workers);
                if !control.is_cancelled() {
                    control.resume();
                }
            }
        }
    }

    // ── Run ──

    fn acquire_run(&self) -> RunGuard<'_> {
        let control = &self.inner.control;
        control.cancel();
        let guard = lock(&self.inner.run_lock);
        control.reset();
        // A cool-down seen while a cancellation was pending left the gate closed.
        if self.thermal_level() != ThermalLevel::Critical {
            control.resume();
        }
        control.set_running(true);
        RunGuard {
            control,
            _lock: guard,
        }
    }

    fn run_scan(&self, resume_from: usize, groups: Vec<SimilarGroup>) -> Result<RunOutcome> {
        let inner = &self.inner;
        let assets = inner.library.fetch_assets()?;
        let total = assets.len();

        if resume_from == 0 {
            self.publish_progress(ScanProgress {
                percent: 0.0,
                ..ScanProgress::new(0, total, ScanPhase::Counting, format!("{total} photos"))
            });
            std::thread::sleep(inner.config.counting_pause);
        }

        let clusters = cluster_by_time(&assets, inner.config.cluster_gap);
        debug!(total, clusters = clusters.len(), "clustered by capture time");
        *lock(&inner.clusters) = clusters.clone();

        if resume_from == 0 {
            self.publish_progress(ScanProgress {
                percent: 0.0,
                ..ScanProgress::new(
                    0,
                    total,
                    ScanPhase::Clustering,
                    format!("{} bursts", clusters.len()),
                )
            });
        } else {
            self.publish_progress(ScanProgress::new(
                resume_from.min(total),
                total,
                ScanPhase::Grouping,
                "Resuming",
            ));
        }

        let mut run = ScanRun {
            total,
            processed: 0,
            last_percent: None,
            groups,
        };

        for cluster in &clusters {
            // Fast-forward clusters an earlier attempt already covered.
            if run.processed + cluster.len() <= resume_from {
                run.processed += cluster.len();
                continue;
            }
            if !inner.control.wait_while_suspended() {
                break;
            }
            let found = if cluster.len() >= 2 {
                self.group_cluster(cluster, self.threshold())
            } else {
                Vec::new()
            };
            run.processed += cluster.len();
            self.record_cluster(&mut run, found);
        }

        if inner.control.is_cancelled() {
            if inner.control.is_paused() {
                self.persist_run(&run);
            }
            info!(processed = run.processed, total, "scan interrupted");
            return Ok(RunOutcome::Interrupted);
        }

        self.publish_progress(ScanProgress::new(total, total, ScanPhase::Grouping, "Done"));
        let total_groups = run.groups.len();
        self.emit(ScanEvent::ScanCompleted { total_groups });
        {
            let _persist = lock(&inner.persist_lock);
            inner.control.set_running(false);
            inner.checkpoints.clear();
        }
        if let Err(e) = inner.extractor.save_cache() {
            warn!(error = %e, "failed to save fingerprint cache");
        }
        info!(total_groups, total, "scan completed");
        Ok(RunOutcome::Completed { total_groups })
    }

    fn group_cluster(&self, cluster: &[PhotoAsset], threshold: f32) -> Vec<SimilarGroup> {
        let pool = self.inner.pool.current();
        let prints = self.inner.extractor.fingerprints(cluster, &pool);
        group_by_similarity(cluster, &prints, threshold)
    }

    /// Publish one finished cluster: groups, progress (on whole-percent change),
    /// then the checkpoint.
    fn record_cluster(&self, run: &mut ScanRun, found: Vec<SimilarGroup>) {
        let progress = ScanProgress::new(
            run.processed,
            run.total,
            ScanPhase::Grouping,
            "Finding similar photos",
        );
        {
            let mut published = lock(&self.inner.published);
            published.groups.extend(found.iter().cloned());
            published.progress = Some(progress.clone());
        }

        for group in found {
            self.emit(ScanEvent::GroupFound(group.clone()));
            run.groups.push(group);
        }

        let whole = progress.percent.floor() as u32;
        if run.last_percent.map_or(true, |last| whole > last) || run.processed >= run.total {
            run.last_percent = Some(whole);
            self.emit(ScanEvent::Progress(progress));
        }

        let _persist = lock(&self.inner.persist_lock);
        let checkpoint = ProgressCheckpoint::grouping(run.processed, run.total);
        if let Err(e) = self.inner.checkpoints.save_progress(&checkpoint) {
            warn!(error = %e, "failed to write progress checkpoint");
        }
    }

    /// Rewrite both files from the run's own state after it stopped for a pause.
    fn persist_run(&self, run: &ScanRun) {
        let _persist = lock(&self.inner.persist_lock);
        if run.processed > 0 {
            let checkpoint = ProgressCheckpoint::grouping(run.processed, run.total);
            if let Err(e) = self.inner.checkpoints.save_progress(&checkpoint) {
                warn!(error = %e, "failed to write progress checkpoint");
            }
        }
        if let Err(e) = self.inner.checkpoints.save_groups(&run.groups) {
            warn!(error = %e, "failed to write found groups");
        }
    }

    /// Write the published progress and groups. With `only_while_running`, does
    /// nothing unless a run is active.
    fn persist_snapshot(&self, only_while_running: bool) -> Result<()> {
        let _persist = lock(&self.inner.persist_lock);
        if only_while_running && !self.inner.control.is_running() {
            return Ok(());
        }
        let (progress, groups) = {
            let published = lock(&self.inner.published);
            (published.progress.clone(), published.groups.clone())
        };
        if let Some(progress) = progress.filter(|p| p.current > 0) {
            self.inner
                .checkpoints
                .save_progress(&ProgressCheckpoint::grouping(progress.current, progress.total))?;
        }
        self.inner.checkpoints.save_groups(&groups)
    }

    fn publish_progress(&self, progress: ScanProgress) {
        lock(&self.inner.published).progress = Some(progress.clone());
        self.emit(ScanEvent::Progress(progress));
    }

    fn set_threshold(&self, threshold: f32) {
        *lock(&self.inner.threshold) = threshold;
    }

    fn emit(&self, event: ScanEvent) {
        self.inner.events.emit(event);
    }
}
