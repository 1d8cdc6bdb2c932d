//! Incremental writer for the dump envelope.
//!
//! The envelope is `{"version":"..","queries":[ ... ]}`. [`StreamEmitter::open`] writes everything
//! up to the opening bracket, each append writes exactly one serialized query record, and
//! [`StreamEmitter::close`] writes the closing `]}` and hands the flushed sink back.
//!
//! Records are serialized into a private buffer before the sink lock is taken, so producers only
//! contend on the final `write_all`. With `append_in_order` records that arrive ahead of their
//! catalog position wait in a reorder buffer until the gap is filled.

use crate::error::DumpError;
use crate::models::QueryRecord;
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, Default)]
pub struct EmitOptions {
    pub pretty: bool,
}

enum Phase {
    Pending,
    Open,
    Closed,
}

struct EmitterState<W> {
    sink: Option<W>,
    phase: Phase,
    written: usize,
    next_index: usize,
    reorder: BTreeMap<usize, Vec<u8>>,
}

impl<W: Write> EmitterState<W> {
    fn sink(&mut self) -> Result<&mut W, DumpError> {
        match self.phase {
            Phase::Pending => Err(DumpError::EmitterState("not open")),
            Phase::Closed => Err(DumpError::EmitterState("closed")),
            Phase::Open => self
                .sink
                .as_mut()
                .ok_or(DumpError::EmitterState("closed")),
        }
    }

    fn write_record(&mut self, bytes: &[u8]) -> Result<(), DumpError> {
        let first = self.written == 0;
        let sink = self.sink()?;
        if !first {
            sink.write_all(b",")?;
        }
        sink.write_all(bytes)?;
        self.written += 1;
        Ok(())
    }
}

pub struct StreamEmitter<W: Write> {
    state: Mutex<EmitterState<W>>,
    options: EmitOptions,
}

impl<W: Write> StreamEmitter<W> {
    pub fn new(sink: W, options: EmitOptions) -> Self {
        Self {
            state: Mutex::new(EmitterState {
                sink: Some(sink),
                phase: Phase::Pending,
                written: 0,
                next_index: 0,
                reorder: BTreeMap::new(),
            }),
            options,
        }
    }

    /// Writes the envelope header and the opening of the `queries` array.
    pub fn open(&self, version: &str) -> Result<(), DumpError> {
        let mut header = Vec::with_capacity(32 + version.len());
        header.extend_from_slice(b"{\"version\":");
        serde_json::to_writer(&mut header, version)?;
        header.extend_from_slice(b",\"queries\":[");

        let mut state = self.state.lock().map_err(|_| DumpError::Poisoned)?;
        if !matches!(state.phase, Phase::Pending) {
            return Err(DumpError::EmitterState("already open"));
        }
        state.phase = Phase::Open;
        state.sink()?.write_all(&header)?;
        Ok(())
    }

    /// Appends one record as the next array element. Safe to call from many threads.
    pub fn append_query(&self, record: &QueryRecord) -> Result<(), DumpError> {
        let bytes = self.encode(record)?;
        let mut state = self.state.lock().map_err(|_| DumpError::Poisoned)?;
        state.write_record(&bytes)
    }

    /// Appends the record for catalog position `index`, holding it back until every earlier
    /// index has been written.
    pub fn append_in_order(&self, index: usize, record: &QueryRecord) -> Result<(), DumpError> {
        let bytes = self.encode(record)?;
        let mut state = self.state.lock().map_err(|_| DumpError::Poisoned)?;
        state.sink()?;

        if index != state.next_index {
            state.reorder.insert(index, bytes);
            return Ok(());
        }

        state.write_record(&bytes)?;
        state.next_index += 1;
        while let Some(ready) = {
            let next = state.next_index;
            state.reorder.remove(&next)
        } {
            state.write_record(&ready)?;
            state.next_index += 1;
        }
        Ok(())
    }

    /// Records written to the sink so far.
    pub fn written(&self) -> usize {
        self.state.lock().map(|s| s.written).unwrap_or(0)
    }

    /// Finalizes the envelope, flushes, and returns the sink.
    pub fn close(&self) -> Result<W, DumpError> {
        let mut state = self.state.lock().map_err(|_| DumpError::Poisoned)?;
        if !state.reorder.is_empty() {
            return Err(DumpError::MissingRecords {
                pending: state.reorder.len(),
                next: state.next_index,
            });
        }

        let sink = state.sink()?;
        sink.write_all(b"]}")?;
        sink.flush()?;

        state.phase = Phase::Closed;
        state.sink.take().ok_or(DumpError::EmitterState("closed"))
    }

    fn encode(&self, record: &QueryRecord) -> Result<Vec<u8>, DumpError> {
        let bytes = if self.options.pretty {
            serde_json::to_vec_pretty(record)?
        } else {
            serde_json::to_vec(record)?
        };
        Ok(bytes)
    }
}
