//! Container-backed build execution.
//!
//! Builds run in a Docker container from a fixed base image. The store is
//! mounted read-only at its own absolute path, a scratch directory on the
//! store's filesystem is mounted read-write at the output path, and the
//! network is cut unless the derivation is fixed-output. The builder
//! therefore sees exactly the paths its derivation file names.

use std::fs;
use std::process::{Command, Stdio};

use tarn_derive::{DrvFile, StorePath};
use tarn_store::Store;
use tempfile::TempDir;

use crate::{BuildError, RealizeConfig, exit_code, stderr_tail};

/// Default Docker image for builds.
pub const DEFAULT_BUILD_IMAGE: &str = "tarn-build:latest";

/// Dockerfile for creating the default build image.
pub const BUILD_DOCKERFILE: &str = r#"
FROM alpine:latest

# Basic build tools
RUN apk add --no-cache \
    bash \
    coreutils \
    findutils \
    sed \
    grep \
    gawk \
    gzip \
    tar \
    make \
    gcc \
    musl-dev \
    curl

RUN mkdir -p /tarn/store /build

WORKDIR /build
"#;

/// Check if Docker is available on this host.
pub fn is_available() -> bool {
    Command::new("docker")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Ensure the build image exists, building it from the embedded Dockerfile
/// when missing.
pub fn ensure_image(image: &str) -> Result<(), BuildError> {
    let found = Command::new("docker")
        .args(["image", "inspect", image])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|e| BuildError::Sandbox(format!("docker unavailable: {e}")))?;
    if found.success() {
        return Ok(());
    }
    build_image(image)
}

/// Build the Docker image from the embedded Dockerfile.
pub fn build_image(image: &str) -> Result<(), BuildError> {
    eprintln!("Building Docker image '{image}'...");

    let context = tempfile::Builder::new().prefix("tarn-docker-").tempdir()?;
    let dockerfile = context.path().join("Dockerfile");
    fs::write(&dockerfile, BUILD_DOCKERFILE)?;

    let status = Command::new("docker")
        .arg("build")
        .arg("-t")
        .arg(image)
        .arg(context.path())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .map_err(|e| BuildError::Sandbox(format!("docker unavailable: {e}")))?;

    if !status.success() {
        return Err(BuildError::Sandbox(format!(
            "failed to build Docker image '{image}'"
        )));
    }
    eprintln!("Docker image '{image}' built.");
    Ok(())
}

/// Run one build in a container and return the staged output tree.
///
/// The returned directory lives inside the store root (same filesystem),
/// ready for `register_output`; dropping it without registering cleans up.
pub(crate) fn run(
    store: &Store,
    file: &DrvFile,
    out_path: &StorePath,
    config: &RealizeConfig,
) -> Result<TempDir, BuildError> {
    ensure_image(&config.container_image)?;

    let out_abs = store.to_path(out_path);
    // Writable mount target on the store filesystem, so the final rename
    // stays atomic.
    let out_tmp = tempfile::Builder::new()
        .prefix(".tmp-")
        .tempdir_in(store.root())?;
    let scratch = tempfile::Builder::new().prefix("tarn-build-").tempdir()?;

    let mut cmd = Command::new("docker");
    cmd.arg("run").arg("--rm");
    cmd.arg("-v")
        .arg(format!("{}:{}:ro", store.root().display(), store.root().display()));
    cmd.arg("-v")
        .arg(format!("{}:{}:rw", out_tmp.path().display(), out_abs.display()));
    cmd.arg("-v")
        .arg(format!("{}:/build:rw", scratch.path().display()));

    // Fixed-output derivations declare their result up front, so they are
    // the one place the network is allowed.
    if !file.is_fixed_output() && !config.network {
        cmd.arg("--network").arg("none");
    }

    for (key, value) in &file.env {
        cmd.arg("-e").arg(format!("{key}={value}"));
    }
    cmd.arg("-w").arg("/build");
    cmd.arg(&config.container_image);
    cmd.arg(&file.builder).args(&file.args);

    if config.verbose {
        cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        let status = cmd
            .status()
            .map_err(|e| BuildError::Sandbox(format!("docker unavailable: {e}")))?;
        if !status.success() {
            return Err(BuildError::BuildFailed {
                code: exit_code(status),
                stderr: String::new(),
            });
        }
    } else {
        let output = cmd
            .output()
            .map_err(|e| BuildError::Sandbox(format!("docker unavailable: {e}")))?;
        if !output.status.success() {
            return Err(BuildError::BuildFailed {
                code: exit_code(output.status),
                stderr: stderr_tail(&output.stderr),
            });
        }
    }

    Ok(out_tmp)
}
