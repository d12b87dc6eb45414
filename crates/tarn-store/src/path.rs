//! Store directory selection.

use std::path::PathBuf;

/// The default store directory.
pub const DEFAULT_STORE_DIR: &str = "/tarn/store";

/// Get the store directory from the environment or use the default.
pub fn store_dir() -> PathBuf {
    std::env::var("TARN_STORE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_STORE_DIR))
}
