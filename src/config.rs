use std::time::Duration;

/// Version string written into the dump envelope
pub const DUMP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Progress notification interval in milliseconds
pub const PROGRESS_INTERVAL_MS: u64 = 2500;

/// Lower bound applied to the progress interval
pub const MIN_PROGRESS_INTERVAL_MS: u64 = 1;

/// Appended to the primary dump's file stem to name the interned stack catalog
pub const STACKS_SUFFIX: &str = "_stacks";

/// Extractor registry key used when a handler id has no extractors of its own
pub const FALLBACK_EXTRACTOR_KEY: &str = "fallback";

/// Buffer size for the primary and companion file writers
pub const WRITER_CAPACITY: usize = 128 * 1024;

/// Counter value meaning "no run is active"
pub const IDLE_SENTINEL: i64 = -1;

/// Options for a single dump run.
#[derive(Debug, Clone)]
pub struct DumpConfig {
    /// Written as the envelope's `version` field
    pub version: String,
    /// Worker threads for the query phase (1 = sequential, in catalog order)
    pub threads: usize,
    /// Keep catalog order when `threads > 1` by buffering out-of-order records
    pub preserve_order: bool,
    /// Pretty-print each query record instead of compact output
    pub pretty: bool,
    pub progress_interval: Duration,
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            version: DUMP_VERSION.to_string(),
            threads: 1,
            preserve_order: false,
            pretty: false,
            progress_interval: Duration::from_millis(PROGRESS_INTERVAL_MS),
        }
    }
}

impl DumpConfig {
    /// True when the query phase runs on a rayon pool.
    pub fn is_parallel(&self) -> bool {
        self.threads > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sequential_and_compact() {
        let config = DumpConfig::default();
        assert_eq!(config.threads, 1);
        assert!(!config.is_parallel());
        assert!(!config.pretty);
        assert!(!config.preserve_order);
        assert_eq!(config.progress_interval, Duration::from_millis(2500));
        assert_eq!(config.version, DUMP_VERSION);
    }

    #[test]
    fn multiple_threads_is_parallel() {
        let config = DumpConfig {
            threads: 4,
            ..DumpConfig::default()
        };
        assert!(config.is_parallel());
    }
}
