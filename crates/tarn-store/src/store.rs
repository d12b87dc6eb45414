//! Store operations.
//!
//! The store is a single flat directory of immutable entries. Writes go
//! through a `.tmp-*` staging directory on the same filesystem and land via
//! an atomic rename, so a partially written entry is never observable at
//! its final path. Entries are made read-only on install and are never
//! mutated or deleted here.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tarn_derive::{DrvError, DrvFile, Hash, StorePath, store_path_for};
use thiserror::Error;

use crate::path::store_dir;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("path not found: {0}")]
    PathNotFound(String),

    #[error("not a store path: {0}")]
    InvalidPath(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Drv(#[from] DrvError),
}

/// The Tarn store.
pub struct Store {
    /// The root directory of the store.
    root: PathBuf,
}

impl Store {
    /// Open the store at the default location.
    pub fn open() -> Result<Self, StoreError> {
        Self::open_at(store_dir())
    }

    /// Open the store at a specific location, creating it if absent.
    pub fn open_at(root: PathBuf) -> Result<Self, StoreError> {
        fs::create_dir_all(&root)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&root, fs::Permissions::from_mode(0o755))?;
        }
        Ok(Self { root })
    }

    /// Get the store root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Convert a [`StorePath`] to an absolute filesystem path.
    pub fn to_path(&self, store_path: &StorePath) -> PathBuf {
        store_path.to_absolute(&self.root)
    }

    /// Check if a path exists in the store.
    pub fn has(&self, path: &StorePath) -> bool {
        self.to_path(path).exists()
    }

    /// List the entries in the store. Staging directories and foreign
    /// files are skipped; no ordering is guaranteed.
    pub fn list(&self) -> Result<Vec<StorePath>, StoreError> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            if let Some(store_path) = StorePath::parse(&entry?.path()) {
                paths.push(store_path);
            }
        }
        Ok(paths)
    }

    /// Read the raw bytes of a file entry.
    pub fn read(&self, path: &StorePath) -> Result<Vec<u8>, StoreError> {
        let fs_path = self.to_path(path);
        if !fs_path.exists() {
            return Err(StoreError::PathNotFound(path.display_name()));
        }
        Ok(fs::read(&fs_path)?)
    }

    /// Read and parse a derivation file.
    pub fn read_drv(&self, path: &StorePath) -> Result<DrvFile, StoreError> {
        let bytes = self.read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Add a local file to the store, addressed by its content.
    ///
    /// The name defaults to the file's basename. Returns the store path,
    /// whether or not the entry had to be written.
    pub fn add_source(&self, local: &Path, name: Option<&str>) -> Result<StorePath, StoreError> {
        let name = match name {
            Some(name) => name,
            None => local
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| StoreError::InvalidPath(local.display().to_string()))?,
        };
        let content = fs::read(local)?;
        let content_hash = Hash::of(&content);
        let store_path = store_path_for("source", &content_hash.to_hex(), &self.root, name);

        if !self.has(&store_path) {
            self.install_file(&store_path, &content)?;
        }
        Ok(store_path)
    }

    /// Serialize a derivation file and install it at `path`. No-op when the
    /// path already exists: equal paths imply equal recipes.
    pub fn add_drv(&self, path: &StorePath, drv: &DrvFile) -> Result<(), StoreError> {
        if self.has(path) {
            return Ok(());
        }
        let json = drv.to_json()?;
        self.install_file(path, json.as_bytes())
    }

    /// Install a built output tree.
    ///
    /// Locks `temp` down to read-only permissions and renames it to the
    /// final path. If the final path already exists the temporary tree is
    /// discarded: the first writer wins, and contents are equal by
    /// construction. `temp` may already be the final path, in which case
    /// only the permission lock-down applies.
    pub fn register_output(&self, temp: &Path, path: &StorePath) -> Result<(), StoreError> {
        let dest = self.to_path(path);
        if temp == dest {
            return make_readonly_recursive(temp);
        }
        if dest.exists() {
            fs::remove_dir_all(temp)?;
            return Ok(());
        }
        make_readonly_recursive(temp)?;
        fs::rename(temp, &dest)?;
        Ok(())
    }

    /// Atomically install a single file entry: stage inside a `.tmp-*`
    /// directory in the store root, lock permissions, rename into place.
    fn install_file(&self, path: &StorePath, content: &[u8]) -> Result<(), StoreError> {
        let staging = tempfile::Builder::new()
            .prefix(".tmp-")
            .tempdir_in(&self.root)?;
        let staged = staging.path().join(path.name());
        fs::write(&staged, content)?;
        make_readonly_recursive(&staged)?;

        let dest = self.to_path(path);
        if !dest.exists() {
            fs::rename(&staged, &dest)?;
        }
        // `staging` cleans itself up on drop, including after errors.
        Ok(())
    }
}

/// Recursively apply store permissions: 0o444 for files, 0o555 for
/// directories.
fn make_readonly_recursive(path: &Path) -> Result<(), StoreError> {
    if path.is_dir() {
        for entry in fs::read_dir(path)? {
            make_readonly_recursive(&entry?.path())?;
        }
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = if path.is_dir() { 0o555 } else { 0o444 };
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    {
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_readonly(true);
        fs::set_permissions(path, perms)?;
    }

    Ok(())
}
