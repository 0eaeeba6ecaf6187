#![forbid(unsafe_code)]

pub mod ir;
pub mod template;
pub mod validate;

pub use ir::*;
pub use template::*;
pub use validate::*;
