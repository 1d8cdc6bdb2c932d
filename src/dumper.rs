//! Single-flight dump orchestration.
//!
//! [`RecipeDumper::start`] arms the counters, starts the progress ticker and hands the whole
//! query/emit pipeline to a background worker, returning immediately. While that worker runs,
//! further `start` calls are rejected with [`DumpError::DuplicateRun`]. Teardown (ticker
//! cancelled, counters back to the idle sentinel, state back to idle) happens in a drop guard so
//! it also runs when the worker fails or panics.

use crate::config::{DumpConfig, STACKS_SUFFIX, WRITER_CAPACITY};
use crate::context::DumpContext;
use crate::emit::{EmitOptions, StreamEmitter};
use crate::error::{panic_message, DumpError};
use crate::models::{InternedItem, ItemStack};
use crate::notify::{Notification, Notifier};
use crate::progress::ProgressTicker;
use crate::query::QueryEngine;
use crate::registry::{ExtractorRegistry, ProductionSourceRegistry};
use crate::stats::RunCounters;
use anyhow::{anyhow, Context, Result};
use rayon::prelude::*;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpState {
    Idle,
    Running,
}

/// Counts captured at the moment a run finished writing its primary dump.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub target: PathBuf,
    pub stacks_path: PathBuf,
    pub completed: i64,
    pub total: i64,
    /// Distinct item identities interned during the run
    pub stacks: usize,
    /// False when the companion stack catalog could not be written
    pub stacks_written: bool,
    pub elapsed_secs: f64,
}

#[derive(Debug)]
pub enum RunOutcome {
    Completed(RunSummary),
    Failed(anyhow::Error),
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }
}

/// Handle to an in-flight run.
#[derive(Debug)]
pub struct RunHandle {
    handle: JoinHandle<RunOutcome>,
}

impl RunHandle {
    /// Blocks until the run has torn down.
    pub fn join(self) -> RunOutcome {
        self.handle
            .join()
            .unwrap_or_else(|_| RunOutcome::Failed(anyhow!("Dump worker panicked")))
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Shared pieces a worker needs, cloned out of the dumper per run.
struct RunShared {
    catalog: Arc<[ItemStack]>,
    sources: Arc<ProductionSourceRegistry>,
    extractors: Arc<ExtractorRegistry>,
    counters: Arc<RunCounters>,
    config: DumpConfig,
}

pub struct RecipeDumper {
    catalog: Arc<[ItemStack]>,
    sources: Arc<ProductionSourceRegistry>,
    extractors: Arc<ExtractorRegistry>,
    notifier: Arc<dyn Notifier>,
    config: DumpConfig,
    counters: Arc<RunCounters>,
    active: Arc<AtomicBool>,
}

impl RecipeDumper {
    pub fn new(
        catalog: impl Into<Arc<[ItemStack]>>,
        sources: Arc<ProductionSourceRegistry>,
        extractors: Arc<ExtractorRegistry>,
        notifier: Arc<dyn Notifier>,
        config: DumpConfig,
    ) -> Self {
        Self {
            catalog: catalog.into(),
            sources,
            extractors,
            notifier,
            config,
            counters: Arc::new(RunCounters::new()),
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> DumpState {
        if self.active.load(Ordering::Acquire) {
            DumpState::Running
        } else {
            DumpState::Idle
        }
    }

    pub fn counters(&self) -> &RunCounters {
        &self.counters
    }

    /// Starts a dump to `target` on a background worker.
    ///
    /// `mode` is accepted for callers that always pass one; every mode writes the same
    /// streaming JSON dump.
    pub fn start_with_mode(
        &self,
        target: impl Into<PathBuf>,
        mode: u8,
    ) -> Result<RunHandle, DumpError> {
        debug!(mode, "Dump mode requested");
        self.start(target)
    }

    /// Starts a dump to `target` on a background worker.
    pub fn start(&self, target: impl Into<PathBuf>) -> Result<RunHandle, DumpError> {
        let target = target.into();

        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(path = ?target, "Rejected dump request, a run is already active");
            self.notifier.notify(Notification::DuplicateRun { target });
            return Err(DumpError::DuplicateRun);
        }

        self.counters.begin(self.catalog.len());
        info!(
            path = ?target,
            total = self.catalog.len(),
            threads = self.config.threads,
            "Starting recipe dump"
        );

        let ticker = match ProgressTicker::start(
            self.counters.clone(),
            self.notifier.clone(),
            self.config.progress_interval,
        ) {
            Ok(ticker) => ticker,
            Err(e) => {
                self.counters.clear();
                self.active.store(false, Ordering::Release);
                return Err(e);
            }
        };

        let shared = RunShared {
            catalog: self.catalog.clone(),
            sources: self.sources.clone(),
            extractors: self.extractors.clone(),
            counters: self.counters.clone(),
            config: self.config.clone(),
        };
        let teardown = Teardown {
            ticker: Some(ticker),
            counters: self.counters.clone(),
            active: self.active.clone(),
        };
        let notifier = self.notifier.clone();
        let worker_target = target.clone();

        // The closure owns the teardown guard; if spawning fails it is dropped with the closure.
        let spawned = thread::Builder::new()
            .name("recipedump-worker".to_string())
            .spawn(move || {
                let outcome = {
                    let _teardown = teardown;
                    panic::catch_unwind(AssertUnwindSafe(|| run_dump(&shared, &worker_target)))
                        .unwrap_or_else(|payload| {
                            let message = panic_message(payload.as_ref());
                            error!(
                                path = ?worker_target,
                                error = %message,
                                "Dump worker panicked"
                            );
                            RunOutcome::Failed(anyhow!("Dump worker panicked: {}", message))
                        })
                };
                match &outcome {
                    RunOutcome::Completed(summary) => notifier.notify(Notification::Completed {
                        target: worker_target,
                        queries: summary.completed.max(0) as usize,
                    }),
                    RunOutcome::Failed(_) => {
                        notifier.notify(Notification::Failed {
                            target: worker_target,
                        })
                    }
                }
                outcome
            });

        match spawned {
            Ok(handle) => Ok(RunHandle { handle }),
            Err(source) => {
                error!(path = ?target, error = %source, "Failed to spawn dump worker");
                Err(DumpError::Spawn {
                    name: "worker",
                    source,
                })
            }
        }
    }
}

/// Cancels the ticker, resets the counters and releases the single-flight flag, in that order.
struct Teardown {
    ticker: Option<ProgressTicker>,
    counters: Arc<RunCounters>,
    active: Arc<AtomicBool>,
}

impl Drop for Teardown {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.cancel();
        }
        self.counters.clear();
        self.active.store(false, Ordering::Release);
    }
}

fn run_dump(shared: &RunShared, target: &Path) -> RunOutcome {
    let start = Instant::now();
    let ctx = DumpContext::new();

    if let Err(e) = write_primary(shared, &ctx, target) {
        error!(
            path = ?target,
            completed = shared.counters.completed(),
            total = shared.counters.total(),
            error = %format!("{:#}", e),
            "Failed to write recipe dump"
        );
        return RunOutcome::Failed(e);
    }

    let completed = shared.counters.completed();
    let total = shared.counters.total();
    let stacks_path = stacks_path(target);

    let (stacks, stacks_written) = match write_stacks(&ctx, &stacks_path) {
        Ok(count) => (count, true),
        Err(e) => {
            error!(
                path = ?stacks_path,
                error = %format!("{:#}", e),
                "Failed to write stack catalog"
            );
            (0, false)
        }
    };

    let elapsed_secs = start.elapsed().as_secs_f64();
    info!(
        path = ?target,
        queries = completed,
        stacks,
        duration_secs = elapsed_secs,
        "Recipe dump written"
    );

    RunOutcome::Completed(RunSummary {
        target: target.to_path_buf(),
        stacks_path,
        completed,
        total,
        stacks,
        stacks_written,
        elapsed_secs,
    })
}

fn write_primary(shared: &RunShared, ctx: &DumpContext, target: &Path) -> Result<()> {
    let file = File::create(target)
        .with_context(|| format!("Failed to create dump file: {}", target.display()))?;
    let emitter = StreamEmitter::new(
        BufWriter::with_capacity(WRITER_CAPACITY, file),
        EmitOptions {
            pretty: shared.config.pretty,
        },
    );
    emitter
        .open(&shared.config.version)
        .with_context(|| format!("Failed to write dump header: {}", target.display()))?;

    let engine = QueryEngine::new(&shared.sources, &shared.extractors);
    let ordered = shared.config.preserve_order;

    let dump_one = |index: usize, item: &ItemStack| -> Result<(), DumpError> {
        let record = engine.query(item, ctx)?;
        if ordered {
            emitter.append_in_order(index, &record)?;
        } else {
            emitter.append_query(&record)?;
        }
        shared.counters.inc_completed();
        Ok(())
    };

    if shared.config.is_parallel() {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(shared.config.threads)
            .thread_name(|i| format!("recipedump-query-{}", i))
            .build()
            .context("Failed to build query thread pool")?;
        pool.install(|| {
            shared
                .catalog
                .par_iter()
                .enumerate()
                .try_for_each(|(index, item)| dump_one(index, item))
        })
        .with_context(|| format!("Failed to write dump records: {}", target.display()))?;
    } else {
        for (index, item) in shared.catalog.iter().enumerate() {
            dump_one(index, item)
                .with_context(|| format!("Failed to write dump records: {}", target.display()))?;
        }
    }

    emitter
        .close()
        .with_context(|| format!("Failed to finish dump file: {}", target.display()))?;
    Ok(())
}

/// Serializes the export as a JSON object keyed by stable id.
struct StackCatalog<'a>(&'a [InternedItem]);

impl Serialize for StackCatalog<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for item in self.0 {
            map.serialize_entry(&item.id, &item.dump)?;
        }
        map.end()
    }
}

fn write_stacks(ctx: &DumpContext, path: &Path) -> Result<usize> {
    let items = ctx.export().context("Failed to export interned stacks")?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let file = File::create(path)
        .with_context(|| format!("Failed to create stack catalog: {}", path.display()))?;
    let mut writer = BufWriter::with_capacity(WRITER_CAPACITY, file);
    serde_json::to_writer(&mut writer, &StackCatalog(&items))
        .with_context(|| format!("Failed to serialize stack catalog: {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("Failed to flush stack catalog: {}", path.display()))?;
    Ok(items.len())
}

/// `dumps/recipes.json` → `dumps/recipes_stacks.json`.
pub fn stacks_path(target: &Path) -> PathBuf {
    let stem = target
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| OsString::from("dump"));
    let mut name = stem;
    name.push(STACKS_SUFFIX);
    if let Some(ext) = target.extension() {
        name.push(".");
        name.push(ext);
    }
    target.with_file_name(name)
}
