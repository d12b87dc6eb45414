//! Derivation model and hashing for Tarn.
//!
//! A derivation describes how to produce a store entry: the builder to run,
//! its arguments and environment, the derivations it consumes, and optional
//! source material. Derivations are content-addressed: their identity is
//! the derivation-modulo hash, which collapses the whole input graph into a
//! single fingerprint and determines the store path of the output.

pub mod canon;
mod derivation;
mod file;
mod graph;
mod hash;
mod modulo;
pub mod nix32;
mod path;

pub use derivation::*;
pub use file::*;
pub use graph::*;
pub use hash::*;
pub use modulo::hash_derivation_modulo;
pub use path::*;
