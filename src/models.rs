use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Stable per-run identifier assigned to an interned item identity
pub type StackId = u32;

/// One extractor-slug → output entry per applicable extractor, in registration order.
pub type RecipeRecord = Map<String, Value>;

/// Item identity payload: which item, which variant, which tagged data.
///
/// `count` travels with the stack in recipes but is not part of its identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemStack {
    pub name: String,
    #[serde(default)]
    pub meta: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbt: Option<Value>,
    #[serde(default = "default_count")]
    pub count: u32,
}

fn default_count() -> u32 {
    1
}

impl ItemStack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            meta: 0,
            nbt: None,
            count: 1,
        }
    }

    pub fn with_meta(mut self, meta: u32) -> Self {
        self.meta = meta;
        self
    }

    pub fn with_nbt(mut self, nbt: Value) -> Self {
        self.nbt = Some(nbt);
        self
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }
}

/// Everything dumped for one catalog item.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRecord {
    pub query_item: Value,
    pub handlers: Vec<HandlerRecord>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerRecord {
    pub id: String,
    pub name: String,
    pub tab_name: String,
    pub recipes: Vec<RecipeRecord>,
}

/// Entry of the companion catalog export.
#[derive(Debug, Clone, PartialEq)]
pub struct InternedItem {
    pub id: StackId,
    pub dump: Value,
}
