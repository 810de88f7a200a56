//! The client side of the connection layer: a `Sender` task that multiplexes
//! submissions and a timeout sweep, and a `Receiver` task that demultiplexes
//! inbound frames back to their originating request.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::error::ClientError;
use super::frame::{self, Frame};
use super::pending::{PendingRequest, PendingTable};
use super::Config;

struct Submission {
    body: Vec<u8>,
    completion: oneshot::Sender<Result<Vec<u8>, ClientError>>,
}

/// A client-side connection to a [`super::server::ServerEndpoint`].
///
/// Internally owns two tasks bound to the TCP socket: a Sender that assigns
/// sequence numbers and writes frames, and a Receiver that reads frames and
/// completes the matching pending request. See module docs on [`super`].
pub struct ClientEndpoint {
    submit_tx: mpsc::Sender<Submission>,
    closed: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

impl ClientEndpoint {
    /// Connect to `addr` and start the Sender/Receiver tasks.
    pub async fn connect(addr: &str, config: Config) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        super::apply_keepalive(&stream, config.tcp_keepalive_period);
        Ok(Self::from_stream(stream, config))
    }

    /// Build a `ClientEndpoint` from an already-connected socket. Split out
    /// for tests that connect over an in-process `TcpListener`.
    pub fn from_stream(stream: TcpStream, config: Config) -> Self {
        let (read_half, write_half) = stream.into_split();
        let pending = Arc::new(PendingTable::new());
        let closed = Arc::new(AtomicBool::new(false));
        let shutdown = CancellationToken::new();
        let (submit_tx, submit_rx) = mpsc::channel(config.send_queue_cap);

        tokio::spawn(receiver_loop(
            read_half,
            Arc::clone(&pending),
            shutdown.clone(),
            config.max_frame_body,
        ));
        tokio::spawn(sender_loop(
            write_half,
            submit_rx,
            pending,
            Arc::clone(&closed),
            shutdown.clone(),
            config,
        ));

        Self {
            submit_tx,
            closed,
            shutdown,
        }
    }

    /// Submit a request body and await its response.
    ///
    /// Non-blocking at the channel level: a full submission queue completes
    /// immediately with [`ClientError::QueueFull`] without ever touching the
    /// socket. Submitting to a closed endpoint completes immediately with
    /// [`ClientError::EndpointClosed`].
    pub async fn submit(&self, body: Vec<u8>) -> Result<Vec<u8>, ClientError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClientError::EndpointClosed);
        }

        let (completion, rx) = oneshot::channel();
        match self.submit_tx.try_send(Submission { body, completion }) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(sub)) => {
                // Not transmitted: complete synchronously, matching the spec's
                // "immediately completes ... without transmitting".
                let _ = sub.completion.send(Err(ClientError::QueueFull));
            }
            Err(mpsc::error::TrySendError::Closed(sub)) => {
                let _ = sub.completion.send(Err(ClientError::EndpointClosed));
            }
        }

        rx.await.unwrap_or(Err(ClientError::EndpointClosed))
    }

    /// Idempotently close the endpoint. All pending requests complete with
    /// [`ClientError::EndpointClosed`]; new submissions do too.
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

async fn sender_loop(
    mut write_half: OwnedWriteHalf,
    mut submit_rx: mpsc::Receiver<Submission>,
    pending: Arc<PendingTable>,
    closed: Arc<AtomicBool>,
    shutdown: CancellationToken,
    config: Config,
) {
    let mut seq: u64 = 0;
    let mut ticker = tokio::time::interval(config.tick_interval);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            maybe_submission = submit_rx.recv() => {
                let Some(submission) = maybe_submission else { break };
                let this_seq = seq;
                seq += 1;

                let (completion_tx, completion_rx) = oneshot::channel();
                let wire = frame::encode(&submission.body, this_seq);
                pending.insert(PendingRequest::new(this_seq, completion_tx));

                let write_result = tokio::time::timeout(
                    config.client_write_deadline,
                    write_half.write_all(&wire),
                )
                .await;

                match write_result {
                    Ok(Ok(())) => {
                        // Forward the pending table's eventual completion to the caller.
                        tokio::spawn(async move {
                            if let Ok(outcome) = completion_rx.await {
                                let _ = submission.completion.send(outcome);
                            }
                        });
                    }
                    Ok(Err(e)) => {
                        log::warn!("client write failed: {e}");
                        if let Some(req) = pending.remove(this_seq) {
                            req.complete(Err(ClientError::EndpointClosed));
                        }
                        let _ = submission.completion.send(Err(ClientError::EndpointClosed));
                        break;
                    }
                    Err(_elapsed) => {
                        log::warn!("client write deadline exceeded");
                        if let Some(req) = pending.remove(this_seq) {
                            req.complete(Err(ClientError::EndpointClosed));
                        }
                        let _ = submission.completion.send(Err(ClientError::EndpointClosed));
                        break;
                    }
                }
            }
            _ = ticker.tick() => {
                for expired in pending.sweep(config.timeout_dur) {
                    expired.complete(Err(ClientError::RequestTimeout));
                }
            }
        }
    }

    shutdown.cancel();
    closed.store(true, Ordering::SeqCst);
    for remaining in pending.drain() {
        remaining.complete(Err(ClientError::EndpointClosed));
    }
    let _ = write_half.shutdown().await;
}

async fn receiver_loop(
    read_half: OwnedReadHalf,
    pending: Arc<PendingTable>,
    shutdown: CancellationToken,
    max_frame_body: u64,
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
                    FrameError::Eof => log::debug!("client connection closed by peer"),
                    other => log::warn!("client frame read failed: {other}"),
                }
                break;
            }
        };

        match pending.remove(seq) {
            Some(request) => request.complete(Ok(body)),
            None => log::warn!("received response for unknown sequence {seq}, dropping"),
        }
    }

    shutdown.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::server::{HandlerOutcome, ServerEndpoint};
    use std::time::Duration;

    async fn echo_server() -> (ServerEndpoint, String) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = ServerEndpoint::from_listener(
            listener,
            Config::default(),
            |body: &[u8]| HandlerOutcome::Reply(body.to_vec()),
        );
        (server, addr)
    }

    #[tokio::test]
    async fn round_trip_echo() {
        let (server, addr) = echo_server().await;
        let client = ClientEndpoint::connect(&addr, Config::default()).await.unwrap();

        let response = client.submit(b"ping".to_vec()).await.unwrap();
        assert_eq!(response, b"ping");

        client.close();
        server.close();
    }

    #[tokio::test]
    async fn queue_full_completes_synchronously() {
        let (server, addr) = echo_server().await;
        let mut config = Config::default();
        config.send_queue_cap = 1;
        let client = ClientEndpoint::connect(&addr, config).await.unwrap();

        // Fill the queue with slow-to-drain work by issuing concurrently.
        let c1 = client.submit(b"a".to_vec());
        let c2 = client.submit(b"b".to_vec());
        let (r1, r2) = tokio::join!(c1, c2);
        // At least one of the two rapid submissions should see QueueFull or
        // both should succeed if the Sender drained fast enough; the
        // meaningful guarantee is that neither panics nor hangs.
        assert!(r1.is_ok() || r1 == Err(ClientError::QueueFull));
        assert!(r2.is_ok() || r2 == Err(ClientError::QueueFull));

        client.close();
        server.close();
    }

    #[tokio::test]
    async fn close_completes_inflight_with_endpoint_closed() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        // A handler that never replies by dropping the request (simulated via
        // a server that accepts but never runs workers) isn't directly
        // expressible with the public API, so instead verify close-before-response
        // using a server that's accepted but whose worker pool is starved by
        // closing it immediately.
        let server = ServerEndpoint::from_listener(listener, Config::default(), |_: &[u8]| {
            HandlerOutcome::Drop
        });

        let client = ClientEndpoint::connect(&addr, Config::default()).await.unwrap();
        let fut = client.submit(b"will never get a reply".to_vec());
        tokio::time::sleep(Duration::from_millis(20)).await;
        client.close();

        let result = fut.await;
        assert_eq!(result, Err(ClientError::EndpointClosed));
        server.close();
    }

    #[tokio::test]
    async fn unknown_sequence_is_dropped_without_disrupting_others() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);

            let request = frame::read_frame(&mut reader, Config::default().max_frame_body)
                .await
                .unwrap();

            // An out-of-band frame for a sequence number nobody is waiting on,
            // written before the real response.
            frame::write_frame(&mut write_half, b"stray", 0xDEAD_BEEF)
                .await
                .unwrap();
            frame::write_frame(&mut write_half, &request.body, request.seq)
                .await
                .unwrap();
        });

        let client = ClientEndpoint::connect(&addr, Config::default()).await.unwrap();
        let response = client.submit(b"ping".to_vec()).await.unwrap();
        assert_eq!(response, b"ping");

        client.close();
    }
}
