// navfuse_core/src/server/mod.rs

//! Serializes client and internal estimate requests against the shared
//! estimate board.

use crate::messages::Estimate;
use thiserror::Error;

mod arbiter;
mod board;

pub use arbiter::{ArbiterClient, ArbiterHandle, ArbiterStats, PendingReply, RequestArbiter, ShutdownSignal};
pub use board::EstimateBoard;

/// A successful answer to an [`crate::messages::EstimateRequest`].
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Estimate(Estimate),
    ShutdownAccepted,
}

impl Reply {
    pub fn into_estimate(self) -> Option<Estimate> {
        match self {
            Reply::Estimate(estimate) => Some(estimate),
            Reply::ShutdownAccepted => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ArbiterError {
    /// The state machine is not tracking yet. Never blocks.
    #[error("no estimate available yet")]
    NotYetAvailable,
    #[error("server is shutting down")]
    ServerShuttingDown,
}
