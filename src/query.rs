use crate::context::DumpContext;
use crate::error::{panic_message, DumpError, ExtractorError};
use crate::models::{HandlerRecord, ItemStack, QueryRecord, RecipeRecord};
use crate::registry::{Extractor, ExtractorRegistry, ProductionSource, ProductionSourceRegistry};
use std::panic::{self, AssertUnwindSafe};
use tracing::{trace, warn};

/// Builds one [`QueryRecord`] per target by fanning out over both registries.
pub struct QueryEngine<'a> {
    sources: &'a ProductionSourceRegistry,
    extractors: &'a ExtractorRegistry,
}

impl<'a> QueryEngine<'a> {
    pub fn new(sources: &'a ProductionSourceRegistry, extractors: &'a ExtractorRegistry) -> Self {
        Self {
            sources,
            extractors,
        }
    }

    /// Only a finalized `ctx` makes this fail; extractor failures drop their slug and are logged.
    pub fn query(&self, target: &ItemStack, ctx: &DumpContext) -> Result<QueryRecord, DumpError> {
        let query_item = ctx.query_item_dump(target)?;

        let handlers = self
            .sources
            .lookup(target)
            .iter()
            .filter_map(|source| self.dump_handler(target, source.as_ref(), ctx))
            .collect();

        Ok(QueryRecord {
            query_item,
            handlers,
        })
    }

    /// `None` when the source panics while reporting its metadata; the source is skipped.
    fn dump_handler(
        &self,
        target: &ItemStack,
        source: &dyn ProductionSource,
        ctx: &DumpContext,
    ) -> Option<HandlerRecord> {
        let meta = match SourceMeta::read(source) {
            Ok(meta) => meta,
            Err(error) => {
                warn!(
                    item = %target.name,
                    error = %error,
                    "Production source panicked, skipping it"
                );
                return None;
            }
        };

        let resolved = self.extractors.resolve(&meta.id);
        if resolved.fallback {
            trace!(handler = %meta.id, "No extractors registered, using fallback set");
        }

        let recipes = (0..meta.recipe_count)
            .map(|recipe| {
                let mut record = RecipeRecord::new();
                for extractor in resolved.extractors {
                    match invoke(extractor.as_ref(), source, recipe, ctx) {
                        Ok(value) => {
                            record.insert(extractor.slug().to_string(), value);
                        }
                        Err(e) => {
                            warn!(
                                item = %target.name,
                                handler = %meta.id,
                                recipe,
                                slug = extractor.slug(),
                                error = %e,
                                "Extractor failed, omitting field"
                            );
                        }
                    }
                }
                record
            })
            .collect();

        Some(HandlerRecord {
            id: meta.id,
            name: meta.name,
            tab_name: meta.tab_name,
            recipes,
        })
    }
}

/// Source metadata read once, under a panic guard.
struct SourceMeta {
    id: String,
    name: String,
    tab_name: String,
    recipe_count: usize,
}

impl SourceMeta {
    fn read(source: &dyn ProductionSource) -> Result<Self, ExtractorError> {
        panic::catch_unwind(AssertUnwindSafe(|| SourceMeta {
            id: source.handler_id().to_string(),
            name: source.recipe_name().to_string(),
            tab_name: source.tab_name().to_string(),
            recipe_count: source.recipe_count(),
        }))
        .map_err(|payload| ExtractorError::Panicked(panic_message(payload.as_ref())))
    }
}

fn invoke(
    extractor: &dyn Extractor,
    source: &dyn ProductionSource,
    recipe: usize,
    ctx: &DumpContext,
) -> Result<serde_json::Value, ExtractorError> {
    panic::catch_unwind(AssertUnwindSafe(|| extractor.extract(source, recipe, ctx)))
        .unwrap_or_else(|payload| Err(ExtractorError::Panicked(panic_message(payload.as_ref()))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::CraftingHandler;
    use serde_json::{json, Value};
    use std::sync::Arc;

    struct Source {
        id: String,
        recipes: usize,
    }

    impl ProductionSource for Source {
        fn handler_id(&self) -> &str {
            &self.id
        }
        fn recipe_name(&self) -> &str {
            "Name"
        }
        fn tab_name(&self) -> &str {
            "Tab"
        }
        fn recipe_count(&self) -> usize {
            self.recipes
        }
        fn ingredients(&self, recipe: usize) -> Vec<ItemStack> {
            vec![ItemStack::new(format!("ingredient{}", recipe))]
        }
        fn other_stacks(&self, _recipe: usize) -> Vec<ItemStack> {
            Vec::new()
        }
        fn result(&self, _recipe: usize) -> Option<ItemStack> {
            None
        }
    }

    /// Produces a source for targets whose name starts with `prefix`.
    struct PrefixHandler {
        id: &'static str,
        prefix: &'static str,
        recipes: usize,
    }

    impl CraftingHandler for PrefixHandler {
        fn name(&self) -> &str {
            self.id
        }

        fn crafting_source(&self, target: &ItemStack) -> Option<Box<dyn ProductionSource>> {
            target.name.starts_with(self.prefix).then(|| {
                Box::new(Source {
                    id: self.id.to_string(),
                    recipes: self.recipes,
                }) as Box<dyn ProductionSource>
            })
        }
    }

    struct RecipeIndex;

    impl Extractor for RecipeIndex {
        fn slug(&self) -> &str {
            "index"
        }
        fn extract(
            &self,
            _source: &dyn ProductionSource,
            recipe: usize,
            _ctx: &DumpContext,
        ) -> Result<Value, ExtractorError> {
            Ok(json!(recipe))
        }
    }

    struct Failing;

    impl Extractor for Failing {
        fn slug(&self) -> &str {
            "failing"
        }
        fn extract(
            &self,
            _source: &dyn ProductionSource,
            recipe: usize,
            _ctx: &DumpContext,
        ) -> Result<Value, ExtractorError> {
            if recipe == 1 {
                Err(ExtractorError::failed("bad recipe"))
            } else {
                Ok(json!("ok"))
            }
        }
    }

    struct Panicking;

    impl Extractor for Panicking {
        fn slug(&self) -> &str {
            "panicking"
        }
        fn extract(
            &self,
            _source: &dyn ProductionSource,
            _recipe: usize,
            _ctx: &DumpContext,
        ) -> Result<Value, ExtractorError> {
            panic!("plugin bug")
        }
    }

    fn sources() -> ProductionSourceRegistry {
        let mut registry = ProductionSourceRegistry::new();
        registry.register(Arc::new(PrefixHandler { id: "crafting", prefix: "a", recipes: 1 }));
        registry.register(Arc::new(PrefixHandler { id: "smelting", prefix: "ab", recipes: 3 }));
        registry
    }

    #[test]
    fn query_without_sources_has_no_handlers() {
        let sources = sources();
        let extractors = ExtractorRegistry::with_default_extractors();
        let engine = QueryEngine::new(&sources, &extractors);
        let ctx = DumpContext::new();

        let record = engine.query(&ItemStack::new("zzz"), &ctx).unwrap();
        assert!(record.handlers.is_empty());
        assert_eq!(record.query_item, json!({"name": "zzz", "stackId": 0}));
    }

    #[test]
    fn query_keeps_handler_and_recipe_order() {
        let sources = sources();
        let mut extractors = ExtractorRegistry::new();
        extractors.register_fallback(Arc::new(RecipeIndex));
        let engine = QueryEngine::new(&sources, &extractors);
        let ctx = DumpContext::new();

        let record = engine.query(&ItemStack::new("abc"), &ctx).unwrap();
        assert_eq!(record.handlers.len(), 2);
        assert_eq!(record.handlers[0].id, "crafting");
        assert_eq!(record.handlers[1].id, "smelting");
        let indexes: Vec<&Value> = record.handlers[1]
            .recipes
            .iter()
            .map(|r| &r["index"])
            .collect();
        assert_eq!(indexes, vec![&json!(0), &json!(1), &json!(2)]);
    }

    #[test]
    fn handler_specific_extractors_override_fallback() {
        let sources = sources();
        let mut extractors = ExtractorRegistry::with_default_extractors();
        extractors.register("smelting", Arc::new(RecipeIndex));
        let engine = QueryEngine::new(&sources, &extractors);
        let ctx = DumpContext::new();

        let record = engine.query(&ItemStack::new("ab"), &ctx).unwrap();
        let crafting_keys: Vec<&String> = record.handlers[0].recipes[0].keys().collect();
        assert_eq!(crafting_keys, vec!["ingredients", "other_stacks", "out_item"]);
        let smelting_keys: Vec<&String> = record.handlers[1].recipes[0].keys().collect();
        assert_eq!(smelting_keys, vec!["index"]);
    }

    #[test]
    fn failing_extractor_only_drops_its_slug() {
        let sources = sources();
        let mut extractors = ExtractorRegistry::new();
        extractors.register_fallback(Arc::new(Failing));
        extractors.register_fallback(Arc::new(RecipeIndex));
        let engine = QueryEngine::new(&sources, &extractors);
        let ctx = DumpContext::new();

        let record = engine.query(&ItemStack::new("ab"), &ctx).unwrap();
        let recipes = &record.handlers[1].recipes;
        assert_eq!(recipes.len(), 3);
        assert_eq!(recipes[0]["failing"], json!("ok"));
        assert!(!recipes[1].contains_key("failing"));
        assert_eq!(recipes[1]["index"], json!(1));
        assert_eq!(recipes[2]["failing"], json!("ok"));
    }

    #[test]
    fn panicking_extractor_is_isolated() {
        let sources = sources();
        let mut extractors = ExtractorRegistry::new();
        extractors.register_fallback(Arc::new(Panicking));
        extractors.register_fallback(Arc::new(RecipeIndex));
        let engine = QueryEngine::new(&sources, &extractors);
        let ctx = DumpContext::new();

        let record = engine.query(&ItemStack::new("a"), &ctx).unwrap();
        let recipe = &record.handlers[0].recipes[0];
        assert!(!recipe.contains_key("panicking"));
        assert_eq!(recipe["index"], json!(0));
    }

    struct BrokenTab;

    impl ProductionSource for BrokenTab {
        fn handler_id(&self) -> &str {
            "broken"
        }
        fn recipe_name(&self) -> &str {
            "Broken"
        }
        fn tab_name(&self) -> &str {
            panic!("tab name unavailable")
        }
        fn recipe_count(&self) -> usize {
            1
        }
        fn ingredients(&self, _recipe: usize) -> Vec<ItemStack> {
            Vec::new()
        }
        fn other_stacks(&self, _recipe: usize) -> Vec<ItemStack> {
            Vec::new()
        }
        fn result(&self, _recipe: usize) -> Option<ItemStack> {
            None
        }
    }

    struct BrokenTabHandler;

    impl CraftingHandler for BrokenTabHandler {
        fn name(&self) -> &str {
            "broken"
        }
        fn crafting_source(&self, _target: &ItemStack) -> Option<Box<dyn ProductionSource>> {
            Some(Box::new(BrokenTab))
        }
    }

    #[test]
    fn source_panicking_on_metadata_is_skipped() {
        let mut sources = ProductionSourceRegistry::new();
        sources.register(Arc::new(BrokenTabHandler));
        sources.register(Arc::new(PrefixHandler { id: "crafting", prefix: "a", recipes: 1 }));
        let extractors = ExtractorRegistry::with_default_extractors();
        let engine = QueryEngine::new(&sources, &extractors);
        let ctx = DumpContext::new();

        let record = engine.query(&ItemStack::new("a"), &ctx).unwrap();
        assert_eq!(record.handlers.len(), 1);
        assert_eq!(record.handlers[0].id, "crafting");
        assert_eq!(record.handlers[0].tab_name, "Tab");

        let record = engine.query(&ItemStack::new("b"), &ctx).unwrap();
        assert!(record.handlers.is_empty());
    }

    #[test]
    fn query_fails_on_finalized_context() {
        let sources = sources();
        let extractors = ExtractorRegistry::with_default_extractors();
        let engine = QueryEngine::new(&sources, &extractors);
        let ctx = DumpContext::new();
        ctx.export().unwrap();

        assert!(matches!(
            engine.query(&ItemStack::new("a"), &ctx),
            Err(DumpError::ContextFinalized)
        ));
    }
}
