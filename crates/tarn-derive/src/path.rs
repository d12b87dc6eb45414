//! Store paths and the path computation scheme.
//!
//! A store path is `<store-root>/<digest>-<name>`, where the digest is the
//! base-32 form of a truncated SHA-256 over a fingerprint string binding
//! together the entry type, an inner digest, the store root and the name.
//! Binding the store root is intentional: the same content produces
//! different paths in different stores.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::{Hash, HashMode, nix32};

/// Length of the encoded digest in a store path.
pub const DIGEST_LEN: usize = 32;

/// The digest-and-name component of a store path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorePath {
    digest: String,
    name: String,
}

impl StorePath {
    /// Get the digest component (32 base-32 characters).
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Get the name component.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The `digest-name` form used for store entry file names.
    pub fn display_name(&self) -> String {
        format!("{}-{}", self.digest, self.name)
    }

    /// The absolute filesystem path under `store_root`.
    pub fn to_absolute(&self, store_root: &Path) -> PathBuf {
        store_root.join(self.display_name())
    }

    /// Whether this path names a derivation file.
    pub fn is_drv(&self) -> bool {
        self.name.ends_with(".drv")
    }

    /// The companion derivation-file path: same digest, `.drv` appended to
    /// the name.
    pub fn to_drv(&self) -> StorePath {
        StorePath {
            digest: self.digest.clone(),
            name: format!("{}.drv", self.name),
        }
    }

    /// Parse from a `digest-name` entry name.
    pub fn parse_name(s: &str) -> Option<Self> {
        let (digest, name) = (s.get(..DIGEST_LEN)?, s.get(DIGEST_LEN + 1..)?);
        if s.as_bytes().get(DIGEST_LEN) != Some(&b'-') {
            return None;
        }
        if !nix32::is_encoding(digest) || name.is_empty() {
            return None;
        }
        Some(Self {
            digest: digest.to_string(),
            name: name.to_string(),
        })
    }

    /// Parse from a filesystem path, using its final component.
    pub fn parse(path: &Path) -> Option<Self> {
        Self::parse_name(path.file_name()?.to_str()?)
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.digest, self.name)
    }
}

/// Compute the store path for an entry of the given type.
///
/// `path_type` is a short tag such as `"output:out"` or `"source"`;
/// `inner_digest` is a 64-hex SHA-256 of the entry's defining content.
pub fn store_path_for(
    path_type: &str,
    inner_digest: &str,
    store_root: &Path,
    name: &str,
) -> StorePath {
    let fingerprint = format!(
        "{}:sha256:{}:{}:{}",
        path_type,
        inner_digest,
        store_root.display(),
        name
    );
    let digest = Hash::of_str(&fingerprint);
    StorePath {
        digest: nix32::encode(&digest.as_bytes()[..20]),
        name: name.to_string(),
    }
}

/// The inner fingerprint of a fixed-output derivation: declared content
/// hash and mode only, so the resulting path is independent of how the
/// content is produced.
pub fn fixed_fingerprint(out_hash: &str, mode: HashMode) -> String {
    let mode_tag = match mode {
        HashMode::Recursive => "r:",
        HashMode::Flat => "",
    };
    format!("fixed:out:{}sha256:{}:", mode_tag, out_hash)
}

/// Store path for a fixed-output derivation with a declared content hash.
pub fn fixed_output_path(
    out_hash: &str,
    mode: HashMode,
    store_root: &Path,
    name: &str,
) -> StorePath {
    let inner = Hash::of_str(&fixed_fingerprint(out_hash, mode));
    store_path_for("output:out", &inner.to_hex(), store_root, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest64() -> String {
        "a".repeat(64)
    }

    #[test]
    fn test_store_path_shape() {
        let sp = store_path_for("output:out", &digest64(), Path::new("/tarn/store"), "hello-2.12");
        assert_eq!(sp.digest().len(), DIGEST_LEN);
        assert!(nix32::is_encoding(sp.digest()));
        assert_eq!(sp.name(), "hello-2.12");
        assert_eq!(
            sp.to_absolute(Path::new("/tarn/store")),
            PathBuf::from(format!("/tarn/store/{}-hello-2.12", sp.digest()))
        );
    }

    #[test]
    fn test_path_depends_on_each_component() {
        let root = Path::new("/tarn/store");
        let base = store_path_for("output:out", &digest64(), root, "pkg");
        let other_type = store_path_for("source", &digest64(), root, "pkg");
        let other_digest = store_path_for("output:out", &"b".repeat(64), root, "pkg");
        let other_name = store_path_for("output:out", &digest64(), root, "pkg2");
        assert_ne!(base.digest(), other_type.digest());
        assert_ne!(base.digest(), other_digest.digest());
        assert_ne!(base.digest(), other_name.digest());
    }

    #[test]
    fn test_store_root_changes_digest_not_name() {
        let a = store_path_for("output:out", &digest64(), Path::new("/tarn/store"), "pkg");
        let b = store_path_for("output:out", &digest64(), Path::new("/other/store"), "pkg");
        assert_ne!(a.digest(), b.digest());
        assert_eq!(a.name(), b.name());
    }

    #[test]
    fn test_fixed_fingerprint_modes() {
        let hash = digest64();
        assert_eq!(
            fixed_fingerprint(&hash, HashMode::Flat),
            format!("fixed:out:sha256:{}:", hash)
        );
        assert_eq!(
            fixed_fingerprint(&hash, HashMode::Recursive),
            format!("fixed:out:r:sha256:{}:", hash)
        );
    }

    #[test]
    fn test_fixed_output_path_depends_on_mode() {
        let root = Path::new("/tarn/store");
        let flat = fixed_output_path(&digest64(), HashMode::Flat, root, "blob");
        let recursive = fixed_output_path(&digest64(), HashMode::Recursive, root, "blob");
        assert_ne!(flat.digest(), recursive.digest());
    }

    #[test]
    fn test_to_drv() {
        let sp = store_path_for("output:out", &digest64(), Path::new("/tarn/store"), "pkg");
        let drv = sp.to_drv();
        assert_eq!(drv.digest(), sp.digest());
        assert_eq!(drv.name(), "pkg.drv");
        assert!(drv.is_drv());
        assert!(!sp.is_drv());
    }

    #[test]
    fn test_parse_roundtrip() {
        let sp = store_path_for("source", &digest64(), Path::new("/tarn/store"), "file.txt");
        let parsed = StorePath::parse_name(&sp.display_name()).unwrap();
        assert_eq!(parsed, sp);

        let parsed = StorePath::parse(&sp.to_absolute(Path::new("/tarn/store"))).unwrap();
        assert_eq!(parsed, sp);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(StorePath::parse_name("short-name").is_none());
        assert!(StorePath::parse_name(&"0".repeat(32)).is_none());
        assert!(StorePath::parse_name(&format!("{}x{}", "0".repeat(32), "name")).is_none());
        assert!(StorePath::parse_name(&format!("{}-", "0".repeat(32))).is_none());
        // 'e' is not in the digest alphabet
        assert!(StorePath::parse_name(&format!("{}e-name", "0".repeat(31))).is_none());
    }
}
