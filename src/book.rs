//! JSON-backed crafting handlers.
//!
//! A recipe book lists crafting handlers and their recipes. Each handler answers a lookup with
//! the recipes whose result shares the target's identity. It also supplies the item catalog,
//! either explicitly through `items` or derived from the distinct recipe results.

use crate::codec::{same_identity, ItemSignature};
use crate::models::ItemStack;
use crate::registry::{CraftingHandler, ProductionSource, ProductionSourceRegistry};
use anyhow::{Context, Result};
use rustc_hash::FxHashSet;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookRecipe {
    #[serde(default)]
    pub ingredients: Vec<ItemStack>,
    #[serde(default)]
    pub other_stacks: Vec<ItemStack>,
    pub result: Option<ItemStack>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookHandler {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tab_name: String,
    #[serde(default)]
    pub recipes: Vec<BookRecipe>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecipeBook {
    #[serde(default)]
    pub items: Vec<ItemStack>,
    #[serde(default)]
    pub handlers: Vec<BookHandler>,
}

impl RecipeBook {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open recipe book: {}", path.display()))?;
        let book: RecipeBook = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse recipe book: {}", path.display()))?;

        info!(
            items = book.items.len(),
            handlers = book.handlers.len(),
            recipes = book.handlers.iter().map(|h| h.recipes.len()).sum::<usize>(),
            "Recipe book loaded"
        );
        Ok(book)
    }

    /// Explicit `items`, or every distinct recipe result in first-seen order.
    pub fn catalog(&self) -> Result<Vec<ItemStack>> {
        if !self.items.is_empty() {
            return Ok(self.items.clone());
        }

        let mut seen = FxHashSet::default();
        let mut catalog = Vec::new();
        for result in self
            .handlers
            .iter()
            .flat_map(|h| h.recipes.iter())
            .filter_map(|r| r.result.as_ref())
        {
            let key = ItemSignature::of(result)
                .canonical_key()
                .context("Failed to encode catalog item")?;
            if seen.insert(key) {
                catalog.push(ItemStack {
                    count: 1,
                    ..result.clone()
                });
            }
        }
        Ok(catalog)
    }

    /// Registers one crafting handler per book handler, in book order.
    pub fn register(&self, registry: &mut ProductionSourceRegistry) {
        for handler in &self.handlers {
            registry.register(Arc::new(handler.clone()));
        }
    }
}

struct BookSource {
    handler: BookHandler,
}

impl ProductionSource for BookSource {
    fn handler_id(&self) -> &str {
        &self.handler.id
    }

    fn recipe_name(&self) -> &str {
        &self.handler.name
    }

    fn tab_name(&self) -> &str {
        &self.handler.tab_name
    }

    fn recipe_count(&self) -> usize {
        self.handler.recipes.len()
    }

    fn ingredients(&self, recipe: usize) -> Vec<ItemStack> {
        self.handler
            .recipes
            .get(recipe)
            .map(|r| r.ingredients.clone())
            .unwrap_or_default()
    }

    fn other_stacks(&self, recipe: usize) -> Vec<ItemStack> {
        self.handler
            .recipes
            .get(recipe)
            .map(|r| r.other_stacks.clone())
            .unwrap_or_default()
    }

    fn result(&self, recipe: usize) -> Option<ItemStack> {
        self.handler
            .recipes
            .get(recipe)
            .and_then(|r| r.result.clone())
    }
}

impl CraftingHandler for BookHandler {
    fn name(&self) -> &str {
        &self.id
    }

    fn crafting_source(&self, target: &ItemStack) -> Option<Box<dyn ProductionSource>> {
        let recipes: Vec<BookRecipe> = self
            .recipes
            .iter()
            .filter(|r| r.result.as_ref().is_some_and(|out| same_identity(out, target)))
            .cloned()
            .collect();
        if recipes.is_empty() {
            return None;
        }
        Some(Box::new(BookSource {
            handler: BookHandler {
                id: self.id.clone(),
                name: self.name.clone(),
                tab_name: self.tab_name.clone(),
                recipes,
            },
        }))
    }
}
