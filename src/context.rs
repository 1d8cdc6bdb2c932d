use crate::codec::ItemSignature;
use crate::error::DumpError;
use crate::models::{InternedItem, ItemStack, StackId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rustc_hash::FxBuildHasher;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

struct Interned {
    id: StackId,
    dump: Value,
}

/// Per-run interning store mapping canonical item keys to stable ids.
///
/// The check-then-insert in [`DumpContext::intern`] holds the DashMap shard lock for the key,
/// so concurrent callers with equal keys always observe the same id. Once
/// [`DumpContext::export`] has been called the context is finalized and rejects further work.
pub struct DumpContext {
    stacks: DashMap<String, Interned, FxBuildHasher>,
    next_id: AtomicU32,
    finalized: AtomicBool,
}

impl Default for DumpContext {
    fn default() -> Self {
        Self::new()
    }
}

impl DumpContext {
    pub fn new() -> Self {
        Self {
            stacks: DashMap::with_hasher(FxBuildHasher),
            next_id: AtomicU32::new(0),
            finalized: AtomicBool::new(false),
        }
    }

    pub fn intern(&self, stack: &ItemStack) -> Result<StackId, DumpError> {
        if self.finalized.load(Ordering::Acquire) {
            return Err(DumpError::ContextFinalized);
        }

        let signature = ItemSignature::of(stack);
        let key = signature.canonical_key()?;

        match self.stacks.entry(key) {
            Entry::Occupied(entry) => Ok(entry.get().id),
            Entry::Vacant(entry) => {
                let dump = signature.minimal_dump()?;
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                entry.insert(Interned { id, dump });
                Ok(id)
            }
        }
    }

    /// Minimal dump of `stack` with its stable id under `stackId`, interning it on the way.
    pub fn query_item_dump(&self, stack: &ItemStack) -> Result<Value, DumpError> {
        let id = self.intern(stack)?;
        let mut dump = ItemSignature::of(stack).minimal_dump()?;
        if let Value::Object(ref mut map) = dump {
            map.insert("stackId".to_string(), Value::from(id));
        }
        Ok(dump)
    }

    pub fn len(&self) -> usize {
        self.stacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }

    /// Drains every interned item sorted by id. Callable once.
    pub fn export(&self) -> Result<Vec<InternedItem>, DumpError> {
        if self.finalized.swap(true, Ordering::AcqRel) {
            return Err(DumpError::ContextFinalized);
        }

        let mut items: Vec<InternedItem> = self
            .stacks
            .iter()
            .map(|entry| InternedItem {
                id: entry.value().id,
                dump: entry.value().dump.clone(),
            })
            .collect();
        items.sort_unstable_by_key(|item| item.id);
        self.stacks.clear();
        Ok(items)
    }
}
