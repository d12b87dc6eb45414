//! Derivation definition.
//!
//! A derivation is the fundamental unit of building in Tarn. It describes
//! the builder program to run, its arguments and environment, the
//! derivations it consumes as inputs, and optional source material.
//! Derivations live in a [`crate::Graph`] and reference their inputs by
//! [`crate::DrvId`], so shared dependencies stay a single node.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

use crate::DrvId;

/// Errors produced while validating, traversing or hashing derivations.
#[derive(Debug, Error)]
pub enum DrvError {
    #[error("derivation name is empty")]
    EmptyName,

    #[error("invalid derivation name: {0:?}")]
    InvalidName(String),

    #[error("derivation builder is empty")]
    EmptyBuilder,

    #[error("unsupported output hash algorithm: {0}")]
    UnsupportedHashAlgo(String),

    #[error("dependency cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Source material for a derivation.
#[derive(Debug, Clone)]
pub enum Source {
    /// A local file, copied into the store at instantiation time.
    Path(PathBuf),
    /// A declared content fingerprint (64 hex characters).
    Hash(String),
}

/// Hash mode for fixed-output derivations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashMode {
    /// Hash the output file contents directly.
    Flat,
    /// Hash a serialization of the whole output tree.
    Recursive,
}

/// The declared output hash of a fixed-output derivation.
#[derive(Debug, Clone)]
pub struct FixedOutput {
    /// Expected content hash, 64 lowercase hex characters.
    pub hash: String,
    /// Hash algorithm; only "sha256" is supported.
    pub algo: String,
    /// How the produced content is hashed.
    pub mode: HashMode,
}

/// A derivation node. Inputs are references into the owning graph.
#[derive(Debug, Clone)]
pub struct Derivation {
    /// Human-readable name, appended to store paths.
    pub name: String,
    /// The executable to run: an absolute host path, a store path, or a
    /// local file ingested at instantiation time.
    pub builder: String,
    /// Arguments passed to the builder.
    pub args: Vec<String>,
    /// Environment variables for the build.
    pub env: BTreeMap<String, String>,
    /// Target system; defaults to the host system at hash time.
    pub system: Option<String>,
    /// Input derivations. Logically a set: duplicates collapse on the
    /// derivation-modulo hash key.
    pub inputs: Vec<DrvId>,
    /// Optional source material.
    pub src: Option<Source>,
    /// Present iff this is a fixed-output derivation.
    pub fixed: Option<FixedOutput>,
}

impl Derivation {
    /// Create a new derivation builder.
    pub fn builder(name: impl Into<String>) -> DerivationBuilder {
        DerivationBuilder::new(name)
    }

    /// The target system, defaulting to the host.
    pub fn resolved_system(&self) -> &str {
        self.system.as_deref().unwrap_or_else(|| current_system())
    }

    /// Check if this is a fixed-output derivation.
    pub fn is_fixed_output(&self) -> bool {
        self.fixed.is_some()
    }

    /// Validate the fields that hashing and instantiation rely on.
    pub fn validate(&self) -> Result<(), DrvError> {
        if self.name.is_empty() {
            return Err(DrvError::EmptyName);
        }
        if self.name.contains('/') || self.name.contains('\0') {
            return Err(DrvError::InvalidName(self.name.clone()));
        }
        if self.builder.is_empty() {
            return Err(DrvError::EmptyBuilder);
        }
        if let Some(fixed) = &self.fixed
            && fixed.algo != "sha256"
        {
            return Err(DrvError::UnsupportedHashAlgo(fixed.algo.clone()));
        }
        Ok(())
    }
}

/// Builder for creating derivations.
pub struct DerivationBuilder {
    name: String,
    builder: Option<String>,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    system: Option<String>,
    inputs: Vec<DrvId>,
    src: Option<Source>,
    fixed: Option<FixedOutput>,
}

impl DerivationBuilder {
    /// Create a new derivation builder.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            builder: None,
            args: Vec::new(),
            env: BTreeMap::new(),
            system: None,
            inputs: Vec::new(),
            src: None,
            fixed: None,
        }
    }

    /// Set the builder executable.
    pub fn builder_path(mut self, builder: impl Into<String>) -> Self {
        self.builder = Some(builder.into());
        self
    }

    /// Add an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set multiple environment variables.
    pub fn envs(mut self, env: BTreeMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }

    /// Set the target system.
    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Add an input derivation.
    pub fn input(mut self, input: DrvId) -> Self {
        self.inputs.push(input);
        self
    }

    /// Add multiple input derivations.
    pub fn inputs<I: IntoIterator<Item = DrvId>>(mut self, inputs: I) -> Self {
        self.inputs.extend(inputs);
        self
    }

    /// Use a local file as source material.
    pub fn src_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.src = Some(Source::Path(path.into()));
        self
    }

    /// Use a declared content fingerprint as source material.
    pub fn src_hash(mut self, hash: impl Into<String>) -> Self {
        self.src = Some(Source::Hash(hash.into()));
        self
    }

    /// Declare the output hash up front, marking this derivation as
    /// fixed-output.
    pub fn fixed_output(mut self, hash: impl Into<String>, mode: HashMode) -> Self {
        self.fixed = Some(FixedOutput {
            hash: hash.into(),
            algo: "sha256".to_string(),
            mode,
        });
        self
    }

    /// Build the derivation.
    pub fn build(self) -> Derivation {
        Derivation {
            name: self.name,
            builder: self.builder.unwrap_or_else(|| "/bin/sh".to_string()),
            args: self.args,
            env: self.env,
            system: self.system,
            inputs: self.inputs,
            src: self.src,
            fixed: self.fixed,
        }
    }
}

/// Get the current system identifier.
pub fn current_system() -> &'static str {
    #[cfg(target_arch = "x86_64")]
    const ARCH: &str = "x86_64";
    #[cfg(target_arch = "aarch64")]
    const ARCH: &str = "aarch64";
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    const ARCH: &str = "unknown";

    #[cfg(target_os = "linux")]
    const OS: &str = "linux";
    #[cfg(target_os = "macos")]
    const OS: &str = "darwin";
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    const OS: &str = "unknown";

    match (ARCH, OS) {
        ("x86_64", "linux") => "x86_64-linux",
        ("aarch64", "linux") => "aarch64-linux",
        ("x86_64", "darwin") => "x86_64-darwin",
        ("aarch64", "darwin") => "aarch64-darwin",
        _ => "unknown-unknown",
    }
}
