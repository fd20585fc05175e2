use crate::forwarding;
use crate::router::SharedContext;
use log::{debug, warn};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    pub interface: String,
    pub frame: Vec<u8>,
}

/// Cloneable handle used by receive threads to hand frames to the pool.
#[derive(Clone)]
pub struct FrameSubmitter {
    tx: mpsc::Sender<InboundFrame>,
}

impl FrameSubmitter {
    /// Non-blocking. A full queue drops the frame.
    pub fn submit(&self, inbound: InboundFrame) -> bool {
        match self.tx.try_send(inbound) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!("Inbound queue full, dropping frame from {}", dropped.interface);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Fixed set of tasks draining one bounded queue of inbound frames.
pub struct WorkerPool {
    submitter: FrameSubmitter,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn start(ctx: SharedContext, workers: usize, queue_depth: usize) -> Self {
        let (tx, rx) = mpsc::channel::<InboundFrame>(queue_depth.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let handles = (0..workers.max(1))
            .map(|id| {
                let ctx = ctx.clone();
                let rx = rx.clone();
                tokio::spawn(async move {
                    loop {
                        let next = rx.lock().await.recv().await;
                        let Some(inbound) = next else {
                            break;
                        };
                        forwarding::handle_frame(&ctx, &inbound.frame, &inbound.interface).await;
                    }
                    debug!("Worker {} stopped", id);
                })
            })
            .collect();

        Self {
            submitter: FrameSubmitter { tx },
            handles,
        }
    }

    pub fn submitter(&self) -> FrameSubmitter {
        self.submitter.clone()
    }

    pub fn shutdown(self) {
        for handle in self.handles {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let (tx, _rx) = mpsc::channel(1);
        let submitter = FrameSubmitter { tx };
        let frame = || InboundFrame {
            interface: "eth0".to_string(),
            frame: vec![0; 14],
        };

        assert!(submitter.submit(frame()));
        assert!(!submitter.submit(frame()));
        assert!(!submitter.is_closed());
    }
}
