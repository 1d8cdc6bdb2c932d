//! Canonical item signatures.
//!
//! An [`ItemSignature`] borrows the identity part of an [`ItemStack`] (name, meta, nbt) and
//! produces two things: a canonical key used for interning, and the minimal JSON dump written
//! to the stack catalog. NBT objects have their keys sorted recursively so that structurally
//! equal tags produce byte-identical keys regardless of insertion order.

use crate::models::ItemStack;
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Serialize)]
pub struct ItemSignature<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "is_zero")]
    meta: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    nbt: Option<Value>,
}

fn is_zero(meta: &u32) -> bool {
    *meta == 0
}

impl<'a> ItemSignature<'a> {
    pub fn of(stack: &'a ItemStack) -> Self {
        Self {
            name: &stack.name,
            meta: stack.meta,
            nbt: stack.nbt.as_ref().map(canonicalize),
        }
    }

    /// Compact, deterministic serialization used as the interning key.
    pub fn canonical_key(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn minimal_dump(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

/// True when both stacks name the same item identity, ignoring count.
pub fn same_identity(a: &ItemStack, b: &ItemStack) -> bool {
    a.name == b.name
        && a.meta == b.meta
        && a.nbt.as_ref().map(canonicalize) == b.nbt.as_ref().map(canonicalize)
}

/// Rebuilds a value with every object's keys in sorted order.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = Map::with_capacity(entries.len());
            for (key, inner) in entries {
                sorted.insert(key.clone(), canonicalize(inner));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
