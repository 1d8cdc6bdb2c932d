//! Plugin registries consulted by the query engine.
//!
//! - [`ProductionSourceRegistry`] holds [`CraftingHandler`]s in registration order. A lookup asks
//!   each handler for a [`ProductionSource`] covering the target item.
//! - [`ExtractorRegistry`] maps a handler id to the [`Extractor`]s that dump its recipes, with the
//!   set under [`FALLBACK_EXTRACTOR_KEY`] substituted for handlers that registered none.

use crate::config::FALLBACK_EXTRACTOR_KEY;
use crate::context::DumpContext;
use crate::error::{panic_message, ExtractorError};
use crate::extractors::{IngredientsExtractor, OtherStacksExtractor, OutputExtractor};
use crate::models::ItemStack;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

/// A crafting-production source bound to one target item.
pub trait ProductionSource: Send + Sync {
    fn handler_id(&self) -> &str;
    fn recipe_name(&self) -> &str;
    fn tab_name(&self) -> &str;
    fn recipe_count(&self) -> usize;
    fn ingredients(&self, recipe: usize) -> Vec<ItemStack>;
    fn other_stacks(&self, recipe: usize) -> Vec<ItemStack>;
    fn result(&self, recipe: usize) -> Option<ItemStack>;
}

/// Registered lookup plugin: reports whether and how a target can be crafted.
pub trait CraftingHandler: Send + Sync {
    fn name(&self) -> &str;
    fn crafting_source(&self, target: &ItemStack) -> Option<Box<dyn ProductionSource>>;
}

/// Emits one named field of structured output for a single recipe.
pub trait Extractor: Send + Sync {
    fn slug(&self) -> &str;
    fn extract(
        &self,
        source: &dyn ProductionSource,
        recipe: usize,
        ctx: &DumpContext,
    ) -> Result<Value, ExtractorError>;
}

#[derive(Default)]
pub struct ProductionSourceRegistry {
    handlers: Vec<Arc<dyn CraftingHandler>>,
}

impl ProductionSourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn CraftingHandler>) {
        self.handlers.push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Sources able to produce `target`, in handler registration order.
    ///
    /// Sources with no recipes are dropped. A handler that panics is logged and skipped.
    pub fn lookup(&self, target: &ItemStack) -> Vec<Box<dyn ProductionSource>> {
        let mut sources = Vec::new();
        for handler in &self.handlers {
            let found = panic::catch_unwind(AssertUnwindSafe(|| {
                handler
                    .crafting_source(target)
                    .filter(|source| source.recipe_count() > 0)
            }));
            match found {
                Ok(Some(source)) => sources.push(source),
                Ok(None) => {}
                Err(payload) => {
                    warn!(
                        handler = handler.name(),
                        item = %target.name,
                        error = %panic_message(payload.as_ref()),
                        "Crafting handler panicked during lookup"
                    );
                }
            }
        }
        sources
    }
}

/// Extractors resolved for one handler id.
pub struct Resolved<'a> {
    pub extractors: &'a [Arc<dyn Extractor>],
    pub fallback: bool,
}

#[derive(Default)]
pub struct ExtractorRegistry {
    by_handler: FxHashMap<String, Vec<Arc<dyn Extractor>>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose fallback set is the built-in `ingredients`, `other_stacks`, `out_item`.
    pub fn with_default_extractors() -> Self {
        let mut registry = Self::new();
        registry.register_fallback(Arc::new(IngredientsExtractor));
        registry.register_fallback(Arc::new(OtherStacksExtractor));
        registry.register_fallback(Arc::new(OutputExtractor));
        registry
    }

    pub fn register(&mut self, handler_id: impl Into<String>, extractor: Arc<dyn Extractor>) {
        self.by_handler
            .entry(handler_id.into())
            .or_default()
            .push(extractor);
    }

    pub fn register_fallback(&mut self, extractor: Arc<dyn Extractor>) {
        self.register(FALLBACK_EXTRACTOR_KEY, extractor);
    }

    pub fn contains(&self, handler_id: &str) -> bool {
        self.by_handler.contains_key(handler_id)
    }

    pub fn resolve(&self, handler_id: &str) -> Resolved<'_> {
        if let Some(extractors) = self.by_handler.get(handler_id) {
            return Resolved {
                extractors,
                fallback: false,
            };
        }
        let extractors = self
            .by_handler
            .get(FALLBACK_EXTRACTOR_KEY)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        Resolved {
            extractors,
            fallback: true,
        }
    }
}
