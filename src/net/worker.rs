//! Fixed-size pool of handler tasks shared by every connection on a
//! [`super::server::ServerEndpoint`].
//!
//! Mirrors the original server's fixed worker-goroutine count reading off one
//! shared channel. Tokio's `mpsc::Receiver` has a single owner, so the "many
//! tasks, one channel" shape is reconstructed with an `Arc<Mutex<Receiver>>`:
//! each worker locks just long enough to pull the next request, never across
//! the handler call itself.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

/// What a handler produces for a given request body.
pub enum HandlerOutcome {
    /// Send `body` back to the connection tagged with the request's sequence number.
    Reply(Vec<u8>),
    /// Produce no response at all (the original server silently drops these too).
    Drop,
}

/// A request handed to the worker pool. Carries a reply channel cloned from
/// its originating connection rather than a reference back to the connection
/// itself, so a request never owns a strong cycle back to its source.
#[derive(Debug)]
pub struct Request {
    pub seq: u64,
    pub body: Vec<u8>,
    pub reply_tx: mpsc::Sender<(u64, Vec<u8>)>,
}

type HandlerFn =
    dyn Fn(&[u8]) -> Pin<Box<dyn Future<Output = HandlerOutcome> + Send>> + Send + Sync;

/// A fixed pool of tasks that pull [`Request`]s off a shared queue and invoke
/// a handler for each.
pub struct WorkerPool {
    request_tx: mpsc::Sender<Request>,
}

impl WorkerPool {
    /// Spawn `worker_count` tasks, each looping on the shared request queue.
    pub fn spawn<F, Fut>(worker_count: usize, queue_cap: usize, handler: F) -> Self
    where
        F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerOutcome> + Send + 'static,
    {
        let handler: Arc<HandlerFn> = Arc::new(move |body: &[u8]| {
            let body = body.to_vec();
            Box::pin(handler(body)) as Pin<Box<dyn Future<Output = HandlerOutcome> + Send>>
        });

        let (request_tx, request_rx) = mpsc::channel::<Request>(queue_cap);
        let request_rx = Arc::new(Mutex::new(request_rx));

        for _ in 0..worker_count.max(1) {
            let request_rx = Arc::clone(&request_rx);
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                loop {
                    let request = {
                        let mut rx = request_rx.lock().await;
                        rx.recv().await
                    };
                    let Some(request) = request else { break };

                    match handler(&request.body).await {
                        HandlerOutcome::Reply(reply_body) => {
                            if request
                                .reply_tx
                                .send((request.seq, reply_body))
                                .await
                                .is_err()
                            {
                                log::debug!(
                                    "dropping reply for seq {}: connection gone",
                                    request.seq
                                );
                            }
                        }
                        HandlerOutcome::Drop => {}
                    }
                }
            });
        }

        Self { request_tx }
    }

    /// Enqueue a request. Backpressures the caller (awaits queue space) rather
    /// than failing fast, since a saturated worker pool is a server-capacity
    /// condition, not a per-request error.
    pub async fn submit(&self, request: Request) -> Result<(), Request> {
        self.request_tx.send(request).await.map_err(|e| e.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echoes_through_reply_channel() {
        let pool = WorkerPool::spawn(2, 8, |body: Vec<u8>| async move {
            HandlerOutcome::Reply(body)
        });

        let (reply_tx, mut reply_rx) = mpsc::channel(8);
        pool.submit(Request {
            seq: 7,
            body: b"hello".to_vec(),
            reply_tx,
        })
        .await
        .unwrap();

        let (seq, body) = reply_rx.recv().await.unwrap();
        assert_eq!(seq, 7);
        assert_eq!(body, b"hello");
    }

    #[tokio::test]
    async fn dropped_outcome_produces_no_reply() {
        let pool = WorkerPool::spawn(1, 8, |_body: Vec<u8>| async move { HandlerOutcome::Drop });

        let (reply_tx, mut reply_rx) = mpsc::channel(8);
        pool.submit(Request {
            seq: 1,
            body: b"ignored".to_vec(),
            reply_tx,
        })
        .await
        .unwrap();

        // Give the worker a chance to run, then confirm nothing arrived.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(reply_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn many_requests_are_all_served_by_fixed_pool() {
        let pool = WorkerPool::spawn(4, 64, |body: Vec<u8>| async move {
            HandlerOutcome::Reply(body)
        });

        let (reply_tx, mut reply_rx) = mpsc::channel(64);
        for i in 0..20u64 {
            pool.submit(Request {
                seq: i,
                body: i.to_be_bytes().to_vec(),
                reply_tx: reply_tx.clone(),
            })
            .await
            .unwrap();
        }
        drop(reply_tx);

        let mut seen = Vec::new();
        while let Some((seq, _body)) = reply_rx.recv().await {
            seen.push(seq);
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..20).collect::<Vec<_>>());
    }
}
