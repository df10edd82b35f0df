// navfuse_core/src/server/board.rs

use crate::messages::Estimate;
use crate::types::FusionState;
use parking_lot::RwLock;
use std::sync::Arc;

/// What the state machine has most recently made available to readers.
#[derive(Debug, Default)]
struct Publication {
    state: FusionState,
    /// Only present while tracking.
    estimate: Option<Estimate>,
}

/// Single-writer, many-reader hand-off between the state machine and the
/// arbiter.
#[derive(Debug, Clone, Default)]
pub struct EstimateBoard {
    inner: Arc<RwLock<Publication>>,
}

impl EstimateBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, estimate: Estimate) {
        let mut board = self.inner.write();
        board.state = estimate.state;
        board.estimate = Some(estimate);
    }

    /// Records a state change. Leaving `Tracking` withdraws the estimate.
    pub fn set_state(&self, state: FusionState) {
        let mut board = self.inner.write();
        board.state = state;
        if !state.is_tracking() {
            board.estimate = None;
        }
    }

    pub fn state(&self) -> FusionState {
        self.inner.read().state
    }

    pub fn latest(&self) -> Option<Estimate> {
        self.inner.read().estimate.clone()
    }
}
