//! Content-addressed store for Tarn.
//!
//! An immutable on-disk directory of build artifacts and derivation files,
//! plus the instantiation pipeline that materializes a derivation graph
//! into it. Entries are installed atomically and never mutated; garbage
//! collection is someone else's job.

mod instantiate;
mod path;
mod store;

pub use instantiate::*;
pub use path::*;
pub use store::*;
