//! The framed, encrypted connection layer shared by the client and server
//! endpoints: wire framing ([`frame`]), the envelope cipher ([`codec`]), the
//! client-side pending-request registry ([`pending`]), and the two endpoints
//! themselves ([`client`], [`server`]) built on top of them.

pub mod client;
pub mod codec;
pub mod error;
pub mod frame;
pub mod pending;
pub mod server;
pub mod worker;

use std::time::Duration;

/// Tunables shared by both endpoints. Defaults match the values this wire
/// format has always used; changing them on only one peer changes observed
/// timeout/backpressure behavior but not wire compatibility.
#[derive(Debug, Clone)]
pub struct Config {
    /// How long a client request waits for a response before `RequestTimeout`.
    pub timeout_dur: Duration,
    /// Capacity of the client's submission channel into its Sender.
    pub send_queue_cap: usize,
    /// Capacity of each server connection's response channel into its Sender.
    pub response_queue_cap: usize,
    /// Number of concurrent server handler tasks.
    pub worker_count: usize,
    /// How long the client's Sender may block on a single write.
    pub client_write_deadline: Duration,
    /// How long the server's Sender may block on a single write (generous,
    /// since a handler may take time to produce its reply).
    pub server_write_deadline: Duration,
    /// Period of the Sender's housekeeping ticker (write-deadline refresh,
    /// timeout sweep on the client).
    pub tick_interval: Duration,
    /// Maximum frame body length accepted by [`frame::read_frame`].
    pub max_frame_body: u64,
    /// Consecutive envelope decryption failures before the server exits.
    pub wrong_password_threshold: u64,
    /// TCP keepalive probe period.
    pub tcp_keepalive_period: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout_dur: pending::DEFAULT_TIMEOUT,
            send_queue_cap: 4096,
            response_queue_cap: 4096,
            worker_count: 4,
            client_write_deadline: Duration::from_millis(300),
            server_write_deadline: Duration::from_millis(30_100),
            tick_interval: Duration::from_millis(100),
            max_frame_body: 512 * 1024 * 1024,
            wrong_password_threshold: 5,
            tcp_keepalive_period: Duration::from_secs(10),
        }
    }
}

/// Enable TCP keepalive with [`Config::tcp_keepalive_period`] on `stream`, if
/// the platform supports it. Grounded in the socket2-over-tokio pattern used
/// elsewhere for raw socket options tokio itself doesn't expose.
pub(crate) fn apply_keepalive(stream: &tokio::net::TcpStream, period: Duration) {
    let sock_ref = socket2::SockRef::from(stream);
    let keepalive = socket2::TcpKeepalive::new().with_time(period);
    if let Err(e) = sock_ref.set_tcp_keepalive(&keepalive) {
        log::warn!("failed to enable TCP keepalive: {e}");
    }
}
