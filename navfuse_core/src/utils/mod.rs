// navfuse_core/src/utils/mod.rs

pub mod angles;
pub mod linalg;
