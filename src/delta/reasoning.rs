//! Consolidation of streamed reasoning-detail blocks.
//!
//! Providers that expose structured reasoning (OpenRouter-style
//! `reasoning_details`) stream `reasoning.text` blocks piecewise. Each piece
//! repeats the block's `index`; the pieces for one index are merged back into a
//! single block. Every other block type is opaque and passes through.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// Block type carrying incremental reasoning text.
pub const REASONING_TEXT_TYPE: &str = "reasoning.text";

/// Merge streamed reasoning fragments into the minimal block list.
///
/// Text blocks are grouped by declared `index` (missing means 0), ordered by
/// index, and emitted first. The first fragment of an index is the template for
/// all non-text fields; a later non-empty `signature` replaces the earlier one.
/// Indices whose merged text is empty are dropped. Everything else, including
/// non-object values, follows in arrival order.
pub fn consolidate_reasoning_details(fragments: Vec<Value>) -> Vec<Value> {
    let mut text_blocks: BTreeMap<u64, (Map<String, Value>, String)> = BTreeMap::new();
    let mut passthrough = Vec::new();

    for fragment in fragments {
        let Value::Object(block) = fragment else {
            passthrough.push(fragment);
            continue;
        };
        if block.get("type").and_then(Value::as_str) != Some(REASONING_TEXT_TYPE) {
            passthrough.push(Value::Object(block));
            continue;
        }

        let index = block.get("index").and_then(Value::as_u64).unwrap_or(0);
        let text = block.get("text").and_then(Value::as_str).unwrap_or_default();
        let signature = block
            .get("signature")
            .and_then(Value::as_str)
            .filter(|sig| !sig.is_empty())
            .map(str::to_owned);

        match text_blocks.get_mut(&index) {
            Some((template, merged)) => {
                merged.push_str(text);
                if let Some(signature) = signature {
                    template.insert("signature".into(), Value::String(signature));
                }
            }
            None => {
                let merged = text.to_owned();
                text_blocks.insert(index, (block, merged));
            }
        }
    }

    let mut consolidated: Vec<Value> = text_blocks
        .into_values()
        .filter(|(_, text)| !text.is_empty())
        .map(|(mut template, text)| {
            template.insert("text".into(), Value::String(text));
            Value::Object(template)
        })
        .collect();
    consolidated.extend(passthrough);
    consolidated
}
