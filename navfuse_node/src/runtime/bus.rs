// navfuse_node/src/runtime/bus.rs

use crossbeam_channel::{unbounded, Receiver, Sender};
use navfuse_core::messages::SensorSample;

/// The single merge point of every sensor producer.
///
/// Samples reach the fusion thread in the order they were published; there
/// is no reordering across sources.
#[derive(Debug)]
pub struct SensorBus {
    tx: Sender<SensorSample>,
    rx: Receiver<SensorSample>,
}

impl Default for SensorBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorBus {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn publisher(&self) -> SensorPublisher {
        SensorPublisher {
            tx: self.tx.clone(),
        }
    }

    /// Hands the consuming end to the fusion thread. The bus disconnects once
    /// every publisher is dropped.
    pub fn into_receiver(self) -> Receiver<SensorSample> {
        self.rx
    }
}

/// Producer handle onto the [`SensorBus`].
#[derive(Debug, Clone)]
pub struct SensorPublisher {
    tx: Sender<SensorSample>,
}

impl SensorPublisher {
    /// Returns `false` once the consumer is gone.
    pub fn publish(&self, sample: SensorSample) -> bool {
        self.tx.send(sample).is_ok()
    }
}
