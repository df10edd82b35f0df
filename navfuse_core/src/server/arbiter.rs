// navfuse_core/src/server/arbiter.rs

use super::{ArbiterError, EstimateBoard, Reply};
use crate::messages::{Estimate, EstimateRequest};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info};

type ReplyResult = Result<Reply, ArbiterError>;

struct Job {
    request: EstimateRequest,
    reply: Sender<ReplyResult>,
}

// --- Shutdown flag ---

/// Raised as soon as a `Shutdown` request is enqueued.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }
}

// --- Statistics ---

/// Counters of what the processing loop answered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArbiterStats {
    pub external_served: u64,
    pub internal_served: u64,
    pub not_available: u64,
    pub rejected: u64,
}

#[derive(Debug, Default)]
struct Counters {
    external_served: AtomicU64,
    internal_served: AtomicU64,
    not_available: AtomicU64,
    rejected: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> ArbiterStats {
        ArbiterStats {
            external_served: self.external_served.load(Ordering::Relaxed),
            internal_served: self.internal_served.load(Ordering::Relaxed),
            not_available: self.not_available.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

// --- Client side ---

/// Ticket for a request that has been queued.
#[derive(Debug)]
pub struct PendingReply {
    rx: Receiver<ReplyResult>,
}

impl PendingReply {
    fn resolved(result: ReplyResult) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(1);
        // The receiver is alive, so this cannot fail.
        let _ = tx.send(result);
        Self { rx }
    }

    /// Blocks until the processing loop has answered.
    pub fn wait(self) -> ReplyResult {
        self.rx.recv().unwrap_or(Err(ArbiterError::ServerShuttingDown))
    }
}

/// Cheap handle used by any thread to submit requests.
#[derive(Debug, Clone)]
pub struct ArbiterClient {
    queue: Sender<Job>,
    shutdown: ShutdownSignal,
    counters: Arc<Counters>,
}

impl ArbiterClient {
    /// Queues a request and returns immediately.
    ///
    /// `Shutdown` raises the shutdown flag right here, so it overtakes every
    /// query still waiting in the queue.
    pub fn enqueue(&self, request: EstimateRequest) -> PendingReply {
        if request.is_query() && self.shutdown.is_raised() {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return PendingReply::resolved(Err(ArbiterError::ServerShuttingDown));
        }
        if request == EstimateRequest::Shutdown {
            self.shutdown.raise();
        }

        let (reply, rx) = crossbeam_channel::bounded(1);
        if self.queue.send(Job { request, reply }).is_err() {
            let result = match request {
                EstimateRequest::Shutdown => Ok(Reply::ShutdownAccepted),
                _ => Err(ArbiterError::ServerShuttingDown),
            };
            return PendingReply::resolved(result);
        }
        PendingReply { rx }
    }

    /// Queues a request and waits for its answer.
    pub fn submit(&self, request: EstimateRequest) -> ReplyResult {
        self.enqueue(request).wait()
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn stats(&self) -> ArbiterStats {
        self.counters.snapshot()
    }
}

// --- Processing loop ---

/// The one processing loop answering requests in FIFO order.
///
/// Requests may be enqueued before the loop is started; they are answered
/// once [`spawn`](Self::spawn) or [`run`](Self::run) is called.
pub struct RequestArbiter {
    queue: Receiver<Job>,
    client: ArbiterClient,
    board: EstimateBoard,
    subscribers: Vec<Sender<Estimate>>,
}

/// Join handle of a spawned arbiter thread.
pub struct ArbiterHandle {
    handle: JoinHandle<ArbiterStats>,
}

impl ArbiterHandle {
    pub fn join(self) -> thread::Result<ArbiterStats> {
        self.handle.join()
    }
}

impl RequestArbiter {
    pub fn new(board: EstimateBoard) -> Self {
        let (tx, rx) = unbounded();
        Self {
            queue: rx,
            client: ArbiterClient {
                queue: tx,
                shutdown: ShutdownSignal::default(),
                counters: Arc::new(Counters::default()),
            },
            board,
            subscribers: Vec::new(),
        }
    }

    pub fn client(&self) -> ArbiterClient {
        self.client.clone()
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.client.shutdown_signal()
    }

    /// Every estimate served to an `InternalQuery` is also pushed to the
    /// returned channel. This is how consumers receive the estimate after
    /// each GPS cycle without polling.
    pub fn subscribe(&mut self) -> Receiver<Estimate> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    pub fn spawn(self) -> ArbiterHandle {
        let handle = thread::Builder::new()
            .name("arbiter".into())
            .spawn(move || self.run())
            .expect("failed to spawn arbiter thread");
        ArbiterHandle { handle }
    }

    /// Runs the loop on the current thread until a `Shutdown` is processed.
    pub fn run(mut self) -> ArbiterStats {
        info!("request arbiter started");
        let shutdown = self.client.shutdown.clone();
        let counters = Arc::clone(&self.client.counters);

        while let Ok(job) = self.queue.recv() {
            if job.request == EstimateRequest::Shutdown {
                let _ = job.reply.send(Ok(Reply::ShutdownAccepted));
                break;
            }
            let result = if shutdown.is_raised() {
                counters.rejected.fetch_add(1, Ordering::Relaxed);
                Err(ArbiterError::ServerShuttingDown)
            } else {
                self.answer(job.request, &counters)
            };
            // A requester that stopped waiting is not an error.
            let _ = job.reply.send(result);
        }

        for job in self.queue.try_iter() {
            let result = match job.request {
                EstimateRequest::Shutdown => Ok(Reply::ShutdownAccepted),
                _ => {
                    counters.rejected.fetch_add(1, Ordering::Relaxed);
                    Err(ArbiterError::ServerShuttingDown)
                }
            };
            let _ = job.reply.send(result);
        }

        let stats = counters.snapshot();
        info!(?stats, "request arbiter stopped");
        stats
    }

    fn answer(&mut self, request: EstimateRequest, counters: &Counters) -> ReplyResult {
        let Some(estimate) = self.board.latest() else {
            debug!(?request, state = ?self.board.state(), "estimate not yet available");
            counters.not_available.fetch_add(1, Ordering::Relaxed);
            return Err(ArbiterError::NotYetAvailable);
        };

        match request {
            EstimateRequest::ExternalQuery => {
                counters.external_served.fetch_add(1, Ordering::Relaxed);
            }
            EstimateRequest::InternalQuery => {
                counters.internal_served.fetch_add(1, Ordering::Relaxed);
                self.subscribers
                    .retain(|subscriber| subscriber.send(estimate.clone()).is_ok());
            }
            EstimateRequest::Shutdown => {}
        }
        Ok(Reply::Estimate(estimate))
    }
}
