#![forbid(unsafe_code)]

pub mod cargo;
pub mod emit;
mod runtime;

pub use cargo::{BinTarget, render_cargo_manifest};
pub use emit::{RustArtifacts, RustBackendError, emit_module};
