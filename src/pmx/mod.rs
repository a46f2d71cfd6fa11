//! PMX 2.0 模型解析

mod loader;
mod types;

pub use loader::{load, parse};
pub use types::*;
