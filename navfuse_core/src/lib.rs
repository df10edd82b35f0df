// navfuse_core/src/lib.rs

// This file defines the public modules of the localization core.
pub mod config;
pub mod estimation;
pub mod fusion;
pub mod mapping;
pub mod messages;
pub mod models;
pub mod prelude;
pub mod server;
pub mod types;
pub mod utils;
