//! Direct (unsandboxed) build execution.
//!
//! The builder runs straight on the host with a scratch working directory
//! and a cleared environment. The output directory is created at its final
//! path up front and locked down after the build, so there is no rename
//! step; a failed build removes whatever it wrote there.

use std::fs;
use std::process::{Command, Stdio};

use tarn_derive::{DrvFile, StorePath};
use tarn_store::Store;

use crate::{BuildError, RealizeConfig, exit_code, stderr_tail};

/// Run one build directly on the host, populating the output path.
pub(crate) fn run(
    store: &Store,
    file: &DrvFile,
    out_path: &StorePath,
    config: &RealizeConfig,
) -> Result<(), BuildError> {
    let scratch = tempfile::Builder::new().prefix("tarn-build-").tempdir()?;
    let out_abs = store.to_path(out_path);
    fs::create_dir_all(&out_abs)?;

    let scratch_str = scratch.path().display().to_string();
    let mut env = file.env.clone();
    for key in ["TMPDIR", "TEMPDIR", "TMP", "TEMP"] {
        env.insert(key.to_string(), scratch_str.clone());
    }

    let mut cmd = Command::new(&file.builder);
    cmd.args(&file.args)
        .env_clear()
        .envs(&env)
        .current_dir(scratch.path());

    let result = if config.verbose {
        cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        cmd.status().map(|status| (status, Vec::new()))
    } else {
        cmd.output().map(|out| (out.status, out.stderr))
    };

    let (status, stderr) = match result {
        Ok(r) => r,
        Err(err) => {
            let _ = fs::remove_dir_all(&out_abs);
            return Err(err.into());
        }
    };

    if !status.success() {
        // No partial output may survive a failed build.
        let _ = fs::remove_dir_all(&out_abs);
        return Err(BuildError::BuildFailed {
            code: exit_code(status),
            stderr: stderr_tail(&stderr),
        });
    }

    Ok(())
}
