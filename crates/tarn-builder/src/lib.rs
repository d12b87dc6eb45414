//! Build execution for Tarn.
//!
//! Realization reads a derivation file, makes sure every input is realized
//! first, runs the builder inside the configured sandbox, and registers the
//! output atomically in the store. This crate is the only part of the
//! engine that executes external processes.

pub mod direct;
pub mod docker;

use std::fs;
use std::path::Path;

use tarn_derive::{DrvFile, Hash, HashMode, StorePath};
use tarn_store::{Store, StoreError};
use thiserror::Error;

/// Errors that can occur during realization.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("sandbox error: {0}")]
    Sandbox(String),

    #[error("malformed derivation file: {0}")]
    MalformedDrv(String),

    #[error("build failed with exit code {code}: {stderr}")]
    BuildFailed {
        /// Builder exit code; -1 when it was killed by a signal.
        code: i32,
        /// Tail of the captured stderr.
        stderr: String,
    },

    #[error("builder succeeded but produced no output at {0}")]
    MissingOutput(String),

    #[error("output hash mismatch: expected {expected}, got {actual}")]
    OutputHashMismatch { expected: String, actual: String },
}

/// Which sandbox the realizer dispatches builds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxMode {
    /// Run inside a container from a fixed base image.
    Container,
    /// Run directly on the host, without isolation.
    None,
}

/// Realizer configuration.
#[derive(Debug, Clone)]
pub struct RealizeConfig {
    /// Sandbox backend.
    pub sandbox: SandboxMode,
    /// Base image used by the container backend.
    pub container_image: String,
    /// Allow network access. Fixed-output derivations always get network.
    pub network: bool,
    /// Inherit builder stdio instead of capturing it.
    pub verbose: bool,
}

impl Default for RealizeConfig {
    fn default() -> Self {
        Self {
            sandbox: SandboxMode::Container,
            container_image: docker::DEFAULT_BUILD_IMAGE.to_string(),
            network: false,
            verbose: false,
        }
    }
}

/// Realize the derivation recorded at `drv_path`: build it and everything
/// it depends on, and return the output path.
///
/// Already-present outputs are returned without building. Inputs are
/// realized serially, depth-first.
pub fn realize(
    store: &Store,
    drv_path: &StorePath,
    config: &RealizeConfig,
) -> Result<StorePath, BuildError> {
    let file = store.read_drv(drv_path)?;
    let out_abs = file
        .out_path()
        .ok_or_else(|| BuildError::MalformedDrv(format!("{drv_path}: no 'out' output")))?
        .to_string();
    let out_path = StorePath::parse(Path::new(&out_abs))
        .ok_or_else(|| BuildError::MalformedDrv(out_abs.clone()))?;

    if store.has(&out_path) {
        return Ok(out_path);
    }

    for input_drv in file.input_drvs.keys() {
        let input = StorePath::parse(Path::new(input_drv))
            .ok_or_else(|| BuildError::MalformedDrv(input_drv.clone()))?;
        realize(store, &input, config)?;
    }

    match config.sandbox {
        SandboxMode::Container => {
            let built = docker::run(store, &file, &out_path, config)?;
            verify_fixed_output(&file, built.path())?;
            store.register_output(built.path(), &out_path)?;
        }
        SandboxMode::None => {
            let out_fs = store.to_path(&out_path);
            direct::run(store, &file, &out_path, config)?;
            if !out_fs.exists() {
                return Err(BuildError::MissingOutput(out_abs));
            }
            if let Err(err) = verify_fixed_output(&file, &out_fs) {
                let _ = fs::remove_dir_all(&out_fs);
                return Err(err);
            }
            store.register_output(&out_fs, &out_path)?;
        }
    }

    if !store.has(&out_path) {
        return Err(BuildError::MissingOutput(out_abs));
    }
    Ok(out_path)
}

/// Compare a flat-mode fixed output against its declared hash.
///
/// Applies when the built tree is a single file, or a directory holding
/// exactly one file. Recursive-mode outputs are installed unverified; their
/// tree serialization is not implemented.
fn verify_fixed_output(file: &DrvFile, built: &Path) -> Result<(), BuildError> {
    let (Some(expected), Some(HashMode::Flat)) = (&file.output_hash, file.output_hash_mode) else {
        return Ok(());
    };
    let Some(target) = flat_output_file(built)? else {
        return Ok(());
    };
    let actual = Hash::of(&fs::read(&target)?).to_hex();
    if &actual != expected {
        return Err(BuildError::OutputHashMismatch {
            expected: expected.clone(),
            actual,
        });
    }
    Ok(())
}

/// The single file a flat-mode build produced, if the shape matches.
fn flat_output_file(built: &Path) -> Result<Option<std::path::PathBuf>, BuildError> {
    if built.is_file() {
        return Ok(Some(built.to_path_buf()));
    }
    if built.is_dir() {
        let entries: Vec<_> = fs::read_dir(built)?.collect::<Result<_, _>>()?;
        if let [entry] = entries.as_slice()
            && entry.path().is_file()
        {
            return Ok(Some(entry.path()));
        }
    }
    Ok(None)
}

/// Keep the last 4 KiB of captured stderr for error reports.
pub(crate) fn stderr_tail(stderr: &[u8]) -> String {
    const TAIL: usize = 4096;
    let start = stderr.len().saturating_sub(TAIL);
    String::from_utf8_lossy(&stderr[start..]).into_owned()
}

pub(crate) fn exit_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}
