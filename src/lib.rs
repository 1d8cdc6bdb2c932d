//! Recipedump: streaming crafting-recipe export engine
//!
//! This crate walks a catalog of craftable items, asks every registered crafting handler how
//! each item is produced, and streams the result to a single JSON file without holding the
//! dump in memory:
//!
//! 1. **Lookup** -- For each catalog item, the [`registry::ProductionSourceRegistry`] returns the
//!    production sources able to craft it, in handler registration order
//! 2. **Extraction** -- For every recipe of every source, the extractors registered for that
//!    handler id (or the fallback set) each contribute one named field
//! 3. **Interning** -- Item stacks met along the way are interned in a per-run
//!    [`context::DumpContext`] and written as small `stackId` references
//! 4. **Streaming** -- Each finished query record is appended to the JSON envelope by the
//!    [`emit::StreamEmitter`]; the interned stack catalog is written to a companion file last
//!
//! # Architecture
//!
//! - **Background worker** -- [`dumper::RecipeDumper`] runs the whole pipeline off the caller's
//!   thread and rejects overlapping runs (single-flight)
//! - **Progress ticker** -- An independent thread reports `completed`/`total` every 2.5s from
//!   lock-free counters
//! - **Concurrent interning** -- DashMap entry locking makes check-then-insert atomic per key
//! - **Optional parallel queries** -- A per-run rayon pool, with opt-in order preservation
//! - **Failure isolation** -- A failing or panicking extractor only loses its own field
//!
//! # Key Modules
//!
//! - [`dumper`] -- Single-flight orchestration, teardown, companion catalog file
//! - [`query`] -- Per-item fan-out over both plugin registries
//! - [`registry`] -- Plugin traits and registries with fallback resolution
//! - [`extractors`] -- Built-in `ingredients`, `other_stacks`, `out_item` extractors
//! - [`context`] -- Per-run interning store
//! - [`codec`] -- Canonical item signatures
//! - [`emit`] -- Incremental JSON envelope writer
//! - [`progress`] -- Periodic progress ticker
//! - [`stats`] -- Atomic run counters
//! - [`notify`] -- Outward notifications (log, progress bar, channel)
//! - [`book`] -- JSON recipe book used as a data-driven crafting handler
//! - [`models`] -- Core data types (ItemStack, QueryRecord, HandlerRecord)
//! - [`config`] -- Constants and run options
//! - [`error`] -- Error taxonomy
//!
//! # Example Usage
//!
//! ```bash
//! # Dump every recipe in a book, querying on 4 threads while keeping catalog order
//! recipedump -v dump --book book.json --output dumps/recipes.json --threads 4 --preserve-order
//! ```

pub mod book;
pub mod codec;
pub mod config;
pub mod context;
pub mod dumper;
pub mod emit;
pub mod error;
pub mod extractors;
pub mod models;
pub mod notify;
pub mod progress;
pub mod query;
pub mod registry;
pub mod stats;
