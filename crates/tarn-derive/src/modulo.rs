//! The derivation-modulo hash.
//!
//! The modulo hash replaces each input derivation with its own modulo hash
//! and empties the output paths before hashing, collapsing the reachable
//! graph into a single fingerprint. Fixed-output derivations are opaque:
//! their hash derives from the declared content hash alone, never from the
//! builder, arguments, environment or inputs.

use std::collections::HashMap;

use serde_json::{Map, Value, json};

use crate::{DrvError, DrvId, Graph, Hash, Source, canon, graph, path};

/// Compute the derivation-modulo hash of `root`.
///
/// Cyclic input is refused before any hashing happens; the memo that makes
/// diamond graphs cheap cannot detect cycles on its own.
pub fn hash_derivation_modulo(g: &Graph, root: DrvId) -> Result<Hash, DrvError> {
    graph::topo_sort(g, std::slice::from_ref(&root))?;
    let mut memo = HashMap::new();
    hash_modulo(g, root, &mut memo)
}

fn hash_modulo(
    g: &Graph,
    id: DrvId,
    memo: &mut HashMap<DrvId, Hash>,
) -> Result<Hash, DrvError> {
    if let Some(hit) = memo.get(&id) {
        return Ok(*hit);
    }
    let drv = g.get(id);

    let hash = if let Some(fixed) = &drv.fixed {
        // Identity is the declared content, nothing else.
        Hash::of_str(&path::fixed_fingerprint(&fixed.hash, fixed.mode))
    } else {
        // Identical hash keys merge duplicate inputs, which is what gives
        // the input list its set semantics.
        let mut inputs = Map::new();
        for &input in &drv.inputs {
            let input_hash = hash_modulo(g, input, memo)?;
            inputs.insert(input_hash.to_hex(), json!(["out"]));
        }

        let mut record = Map::new();
        record.insert("name".to_string(), json!(drv.name));
        record.insert("system".to_string(), json!(drv.resolved_system()));
        record.insert("builder".to_string(), json!(drv.builder));
        record.insert("args".to_string(), json!(drv.args));
        record.insert("env".to_string(), json!(drv.env));
        record.insert("inputs".to_string(), Value::Object(inputs));
        // Output paths are emptied pre-hash: the out path is itself a
        // function of this hash.
        record.insert("outputs".to_string(), json!({ "out": "" }));
        match &drv.src {
            Some(Source::Path(p)) => {
                record.insert("src".to_string(), json!(p.display().to_string()));
            }
            Some(Source::Hash(h)) => {
                record.insert("src".to_string(), json!(h));
            }
            None => {}
        }

        canon::canon_hash(&Value::Object(record))?
    };

    memo.insert(id, hash);
    Ok(hash)
}
