//! Instantiation: materializing a derivation graph into the store.
//!
//! Instantiation walks the graph depth-first, inputs before consumers, and
//! writes one resolved derivation file per node. By the time a node's file
//! is written, every ancestor `.drv` and every ingested source already
//! exists in the store.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use tarn_derive::{
    DrvFile, DrvId, DrvOutput, Graph, Source, StorePath, fixed_output_path,
    hash_derivation_modulo, store_path_for, topo_sort,
};

use crate::{Store, StoreError};

/// The store paths produced by instantiating one derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instantiated {
    /// Path of the written derivation file.
    pub drv_path: StorePath,
    /// Path the build output will occupy.
    pub out_path: StorePath,
}

/// Materialize the derivation file for `root` and, recursively, for every
/// reachable input.
pub fn instantiate(store: &Store, graph: &Graph, root: DrvId) -> Result<Instantiated, StoreError> {
    // Cycles are rejected up front; the memo below cannot detect them.
    topo_sort(graph, std::slice::from_ref(&root))?;
    let mut inst = Instantiator {
        store,
        graph,
        memo: HashMap::new(),
    };
    inst.go(root)
}

struct Instantiator<'a> {
    store: &'a Store,
    graph: &'a Graph,
    memo: HashMap<DrvId, Instantiated>,
}

impl Instantiator<'_> {
    fn go(&mut self, id: DrvId) -> Result<Instantiated, StoreError> {
        if let Some(hit) = self.memo.get(&id) {
            return Ok(hit.clone());
        }

        let drv = self.graph.get(id);
        drv.validate()?;

        // Inputs first, depth-first.
        let mut resolved_inputs = Vec::with_capacity(drv.inputs.len());
        for &input in &drv.inputs {
            resolved_inputs.push(self.go(input)?);
        }

        let drv_hash = hash_derivation_modulo(self.graph, id)?;
        let root = self.store.root();

        let out_path = match &drv.fixed {
            Some(fixed) => fixed_output_path(&fixed.hash, fixed.mode, root, &drv.name),
            None => store_path_for("output:out", &drv_hash.to_hex(), root, &drv.name),
        };
        let drv_path = store_path_for("output:out", &drv_hash.to_hex(), root, &drv.name).to_drv();

        let mut input_srcs = Vec::new();
        if let Some(Source::Path(local)) = &drv.src {
            let src = self.store.add_source(local, None)?;
            input_srcs.push(self.store.to_path(&src).display().to_string());
        }
        let builder = self.resolve_builder(&drv.builder, &mut input_srcs)?;

        let out_abs = self.store.to_path(&out_path).display().to_string();

        // User bindings first, then the standard ones on top.
        let mut env = drv.env.clone();
        env.insert("out".to_string(), out_abs.clone());
        env.insert("name".to_string(), drv.name.clone());
        env.insert("system".to_string(), drv.resolved_system().to_string());
        env.insert("PATH".to_string(), "/path-not-set".to_string());
        env.insert("HOME".to_string(), "/homeless-shelter".to_string());
        env.insert("NIX_STORE".to_string(), root.display().to_string());
        for (i, input) in resolved_inputs.iter().enumerate() {
            env.insert(
                format!("input{i}"),
                self.store.to_path(&input.out_path).display().to_string(),
            );
        }

        let mut outputs = BTreeMap::new();
        outputs.insert("out".to_string(), DrvOutput { path: out_abs });

        let mut input_drvs = BTreeMap::new();
        for input in &resolved_inputs {
            input_drvs.insert(
                self.store.to_path(&input.drv_path).display().to_string(),
                vec!["out".to_string()],
            );
        }

        let file = DrvFile {
            outputs,
            input_drvs,
            input_srcs,
            system: drv.resolved_system().to_string(),
            builder,
            args: drv.args.clone(),
            env,
            output_hash: drv.fixed.as_ref().map(|f| f.hash.clone()),
            output_hash_mode: drv.fixed.as_ref().map(|f| f.mode),
        };
        self.store.add_drv(&drv_path, &file)?;

        let result = Instantiated { drv_path, out_path };
        self.memo.insert(id, result.clone());
        Ok(result)
    }

    /// Resolve the builder reference: store paths and absolute host paths
    /// pass through unchanged; anything else is a local file to ingest.
    fn resolve_builder(
        &self,
        builder: &str,
        input_srcs: &mut Vec<String>,
    ) -> Result<String, StoreError> {
        if builder.starts_with('/') {
            return Ok(builder.to_string());
        }
        let src = self.store.add_source(Path::new(builder), None)?;
        let abs = self.store.to_path(&src).display().to_string();
        input_srcs.push(abs.clone());
        Ok(abs)
    }
}
