// navfuse_node/src/error.rs

use navfuse_core::config::ConfigError;
use navfuse_core::mapping::MapError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] Box<figment::Error>),
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
    #[error("invalid scenario: {0}")]
    Scenario(String),
    #[error(transparent)]
    Map(#[from] MapError),
    #[error("failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),
    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),
}
