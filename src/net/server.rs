//! The server side of the connection layer: a listener that accepts
//! connections, and per-connection Sender/Receiver tasks feeding a shared
//! [`WorkerPool`].
//!
//! Unlike the client, a server connection keeps no pending-request table —
//! replies are tagged with the sequence number they answer and written as
//! soon as a worker produces them, in whatever order workers finish in.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::frame::{self, Frame};
pub use super::worker::HandlerOutcome;
use super::worker::{Request, WorkerPool};
use super::Config;

/// A bound listener dispatching every accepted connection's requests to a
/// shared, fixed-size worker pool.
pub struct ServerEndpoint {
    shutdown: CancellationToken,
    closed: Arc<AtomicBool>,
}

impl ServerEndpoint {
    /// Bind `addr` and start accepting connections, each served by `handler`
    /// running on a pool of `config.worker_count` shared worker tasks.
    pub async fn bind<H>(addr: &str, config: Config, handler: H) -> std::io::Result<Self>
    where
        H: Fn(&[u8]) -> HandlerOutcome + Send + Sync + Clone + 'static,
    {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self::from_listener(listener, config, handler))
    }

    /// Build a `ServerEndpoint` from an already-bound listener, primarily for
    /// tests that need to read back the ephemeral port.
    pub fn from_listener<H>(listener: TcpListener, config: Config, handler: H) -> Self
    where
        H: Fn(&[u8]) -> HandlerOutcome + Send + Sync + Clone + 'static,
    {
        let shutdown = CancellationToken::new();
        let closed = Arc::new(AtomicBool::new(false));

        let pool = Arc::new(WorkerPool::spawn(
            config.worker_count,
            config.response_queue_cap,
            move |body: Vec<u8>| {
                let handler = handler.clone();
                async move { handler(&body) }
            },
        ));

        tokio::spawn(accept_loop(
            listener,
            config,
            pool,
            shutdown.clone(),
            Arc::clone(&closed),
        ));

        Self { shutdown, closed }
    }

    /// Stop accepting new connections and signal existing connection tasks to
    /// wind down. Idempotent.
    pub fn close(&self) {
        if self
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.shutdown.cancel();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

async fn accept_loop(
    listener: TcpListener,
    config: Config,
    pool: Arc<WorkerPool>,
    shutdown: CancellationToken,
    closed: Arc<AtomicBool>,
) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = listener.accept() => result,
        };

        let (stream, peer) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                log::warn!("accept failed: {e}");
                continue;
            }
        };

        super::apply_keepalive(&stream, config.tcp_keepalive_period);
        log::debug!("accepted connection from {peer}");

        tokio::spawn(serve_connection(
            stream,
            config.clone(),
            Arc::clone(&pool),
            shutdown.clone(),
        ));
    }

    closed.store(true, Ordering::SeqCst);
}

async fn serve_connection(
    stream: TcpStream,
    config: Config,
    pool: Arc<WorkerPool>,
    shutdown: CancellationToken,
) {
    let (read_half, write_half) = stream.into_split();
    let (reply_tx, reply_rx) = mpsc::channel(config.response_queue_cap);

    let sender = tokio::spawn(connection_sender_loop(
        write_half,
        reply_rx,
        config.server_write_deadline,
        shutdown.clone(),
    ));
    let receiver = connection_receiver_loop(
        read_half,
        pool,
        reply_tx,
        config.max_frame_body,
        shutdown.clone(),
    );

    receiver.await;
    shutdown.cancel();
    let _ = sender.await;
}

async fn connection_receiver_loop(
    read_half: OwnedReadHalf,
    pool: Arc<WorkerPool>,
    reply_tx: mpsc::Sender<(u64, Vec<u8>)>,
    max_frame_body: u64,
    shutdown: CancellationToken,
) {
    let mut reader = BufReader::new(read_half);

    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = frame::read_frame(&mut reader, max_frame_body) => result,
        };

        let Frame { seq, body } = match frame {
            Ok(frame) => frame,
            Err(e) => {
                use super::error::FrameError;
                match e {
                    FrameError::Eof => log::debug!("connection closed by peer"),
                    other => log::warn!("server frame read failed: {other}"),
                }
                break;
            }
        };

        let request = Request {
            seq,
            body,
            reply_tx: reply_tx.clone(),
        };
        if pool.submit(request).await.is_err() {
            log::warn!("worker pool gone, closing connection");
            break;
        }
    }
}

async fn connection_sender_loop(
    mut write_half: OwnedWriteHalf,
    mut reply_rx: mpsc::Receiver<(u64, Vec<u8>)>,
    write_deadline: std::time::Duration,
    shutdown: CancellationToken,
) {
    loop {
        let reply = tokio::select! {
            _ = shutdown.cancelled() => break,
            reply = reply_rx.recv() => reply,
        };

        let Some((seq, body)) = reply else { break };
        let wire = frame::encode(&body, seq);

        match tokio::time::timeout(write_deadline, write_half.write_all(&wire)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                log::warn!("server write failed: {e}");
                break;
            }
            Err(_elapsed) => {
                log::warn!("server write deadline exceeded for seq {seq}");
                break;
            }
        }
    }

    let _ = write_half.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::client::ClientEndpoint;

    #[tokio::test]
    async fn serves_multiple_requests_on_one_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = ServerEndpoint::from_listener(listener, Config::default(), |body: &[u8]| {
            let mut reversed = body.to_vec();
            reversed.reverse();
            HandlerOutcome::Reply(reversed)
        });

        let client = ClientEndpoint::connect(&addr, Config::default()).await.unwrap();
        for input in [b"abc".to_vec(), b"defg".to_vec(), b"".to_vec()] {
            let mut expected = input.clone();
            expected.reverse();
            let response = client.submit(input).await.unwrap();
            assert_eq!(response, expected);
        }

        client.close();
        server.close();
    }

    #[tokio::test]
    async fn close_marks_endpoint_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = ServerEndpoint::from_listener(listener, Config::default(), |body: &[u8]| {
            HandlerOutcome::Reply(body.to_vec())
        });
        assert!(!server.is_closed());

        server.close();
        // The accept loop observes cancellation on its next select! poll.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(server.is_closed());
    }
}
