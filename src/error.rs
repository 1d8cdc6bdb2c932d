use std::io;
use thiserror::Error;

/// Failures raised by the dump engine itself.
#[derive(Debug, Error)]
pub enum DumpError {
    #[error("a recipe dump is already running")]
    DuplicateRun,
    #[error("dump context has already been exported")]
    ContextFinalized,
    #[error("stream emitter is {0}")]
    EmitterState(&'static str),
    #[error("stream emitter closed with {pending} records waiting on index {next}")]
    MissingRecords { pending: usize, next: usize },
    #[error("stream emitter lock poisoned")]
    Poisoned,
    #[error("failed to spawn {name} thread")]
    Spawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Failure of a single extractor invocation. Never escapes the recipe record it belongs to.
#[derive(Debug, Error)]
pub enum ExtractorError {
    #[error("{0}")]
    Failed(String),
    #[error("extractor panicked: {0}")]
    Panicked(String),
    #[error(transparent)]
    Dump(#[from] DumpError),
}

impl ExtractorError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

/// Best-effort text for a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
