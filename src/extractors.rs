//! Built-in extractors forming the default fallback set.
//!
//! Each one writes item stacks as `{"stackId": <id>, "count": <n>}` references; the full
//! identity payload lives only in the companion stack catalog.

use crate::context::DumpContext;
use crate::error::ExtractorError;
use crate::models::ItemStack;
use crate::registry::{Extractor, ProductionSource};
use serde_json::{json, Value};

/// Interns `stack` and returns its reference form.
pub fn stack_ref(stack: &ItemStack, ctx: &DumpContext) -> Result<Value, ExtractorError> {
    let id = ctx.intern(stack)?;
    Ok(json!({ "stackId": id, "count": stack.count }))
}

fn stack_refs(stacks: &[ItemStack], ctx: &DumpContext) -> Result<Value, ExtractorError> {
    stacks
        .iter()
        .map(|stack| stack_ref(stack, ctx))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

pub struct IngredientsExtractor;

impl Extractor for IngredientsExtractor {
    fn slug(&self) -> &str {
        "ingredients"
    }

    fn extract(
        &self,
        source: &dyn ProductionSource,
        recipe: usize,
        ctx: &DumpContext,
    ) -> Result<Value, ExtractorError> {
        stack_refs(&source.ingredients(recipe), ctx)
    }
}

/// Catalysts, machines and secondary outputs that are neither ingredient nor result.
pub struct OtherStacksExtractor;

impl Extractor for OtherStacksExtractor {
    fn slug(&self) -> &str {
        "other_stacks"
    }

    fn extract(
        &self,
        source: &dyn ProductionSource,
        recipe: usize,
        ctx: &DumpContext,
    ) -> Result<Value, ExtractorError> {
        stack_refs(&source.other_stacks(recipe), ctx)
    }
}

pub struct OutputExtractor;

impl Extractor for OutputExtractor {
    fn slug(&self) -> &str {
        "out_item"
    }

    fn extract(
        &self,
        source: &dyn ProductionSource,
        recipe: usize,
        ctx: &DumpContext,
    ) -> Result<Value, ExtractorError> {
        match source.result(recipe) {
            Some(stack) => stack_ref(&stack, ctx),
            None => Ok(Value::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Furnace;

    impl ProductionSource for Furnace {
        fn handler_id(&self) -> &str {
            "smelting"
        }
        fn recipe_name(&self) -> &str {
            "Smelting"
        }
        fn tab_name(&self) -> &str {
            "Furnace"
        }
        fn recipe_count(&self) -> usize {
            2
        }
        fn ingredients(&self, recipe: usize) -> Vec<ItemStack> {
            match recipe {
                0 => vec![ItemStack::new("minecraft:iron_ore")],
                _ => vec![ItemStack::new("minecraft:sand").with_count(2)],
            }
        }
        fn other_stacks(&self, _recipe: usize) -> Vec<ItemStack> {
            vec![ItemStack::new("minecraft:coal")]
        }
        fn result(&self, recipe: usize) -> Option<ItemStack> {
            (recipe == 0).then(|| ItemStack::new("minecraft:iron_ingot"))
        }
    }

    #[test]
    fn ingredients_are_interned_references() {
        let ctx = DumpContext::new();
        let value = IngredientsExtractor.extract(&Furnace, 1, &ctx).unwrap();
        assert_eq!(value, json!([{"stackId": 0, "count": 2}]));
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn shared_stacks_reuse_ids_across_recipes() {
        let ctx = DumpContext::new();
        let first = OtherStacksExtractor.extract(&Furnace, 0, &ctx).unwrap();
        let second = OtherStacksExtractor.extract(&Furnace, 1, &ctx).unwrap();
        assert_eq!(first, second);
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn missing_output_is_null() {
        let ctx = DumpContext::new();
        assert_eq!(
            OutputExtractor.extract(&Furnace, 0, &ctx).unwrap(),
            json!({"stackId": 0, "count": 1})
        );
        assert_eq!(OutputExtractor.extract(&Furnace, 1, &ctx).unwrap(), Value::Null);
    }

    #[test]
    fn finalized_context_surfaces_as_extractor_error() {
        let ctx = DumpContext::new();
        ctx.export().unwrap();
        let err = IngredientsExtractor.extract(&Furnace, 0, &ctx).unwrap_err();
        assert!(matches!(err, ExtractorError::Dump(_)));
    }
}
