//! Background consumption of the remote change stream.
//!
//! A producer task pumps the remote stream into a bounded channel and a
//! consumer task hands each event to the orchestrator. Both stop when the
//! cancellation token fires, when the stream ends, or when it yields an error.

use std::future::Future;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::remote::{RemoteWatchEvent, RemoteWatchStream};

/// Running producer/consumer pair.
pub struct WatchTask {
    cancel: CancellationToken,
    producer: JoinHandle<()>,
    consumer: JoinHandle<()>,
}

impl WatchTask {
    /// Spawn the tasks. `handle` returns `false` to stop consuming.
    pub fn spawn<F, Fut>(stream: RemoteWatchStream, capacity: usize, handle: F) -> Self
    where
        F: Fn(RemoteWatchEvent) -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send,
    {
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel::<RemoteWatchEvent>(capacity.max(1));

        let producer_cancel = cancel.clone();
        let producer = tokio::spawn(async move {
            let mut stream = stream;
            loop {
                tokio::select! {
                    _ = producer_cancel.cancelled() => {
                        debug!("Change stream producer cancelled");
                        break;
                    }
                    next = stream.next() => match next {
                        Some(Ok(event)) => {
                            if tx.send(event).await.is_err() {
                                debug!("Change consumer gone, stopping producer");
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            error!("Remote change stream failed: {}", e);
                            break;
                        }
                        None => {
                            info!("Remote change stream ended");
                            break;
                        }
                    }
                }
            }
        });

        let consumer_cancel = cancel.clone();
        let consumer = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = consumer_cancel.cancelled() => break,
                    next = rx.recv() => match next {
                        Some(event) => {
                            if !handle(event).await {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
            debug!("Change consumer stopped");
        });

        Self {
            cancel,
            producer,
            consumer,
        }
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Whether the consumer has exited (stopped, stream ended or failed).
    pub fn is_finished(&self) -> bool {
        self.consumer.is_finished()
    }

    /// Stop and wait for both tasks to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        let _ = (&mut self.producer).await;
        let _ = (&mut self.consumer).await;
    }
}

impl Drop for WatchTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
