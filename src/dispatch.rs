//! Server-side request dispatcher: decrypt envelope, decode [`CopyMessage`],
//! execute it, re-encode, re-encrypt. Grounded in `mycpserver.MyCP`, which
//! wraps the same decrypt/unmarshal/dispatch/marshal/encrypt sequence and
//! owns the process-wide wrong-password counter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::copyfs;
use crate::net::codec;
use crate::net::worker::HandlerOutcome;
use crate::proto::CopyMessage;

/// Builds the [`crate::net::worker::HandlerOutcome`] for one inbound frame
/// body, given the shared secret and the process-wide bad-envelope counter.
///
/// A decrypt failure drops the request (no reply) and bumps `wrong_password`;
/// at `threshold` the process exits, matching the original's
/// `log.Fatalf("wrongPasswordTimes beyond max times, exit now.")`.
pub fn handle(
    body: &[u8],
    secret: &[u8],
    max_file_size: u64,
    wrong_password: &Arc<AtomicU64>,
    threshold: u64,
) -> HandlerOutcome {
    let cipher_text = match std::str::from_utf8(body) {
        Ok(s) => s,
        Err(_) => {
            log::warn!("request body was not valid utf-8");
            return HandlerOutcome::Drop;
        }
    };

    let plain = match codec::unwrap(cipher_text, secret) {
        Ok(plain) => plain,
        Err(e) => {
            let count = wrong_password.fetch_add(1, Ordering::SeqCst) + 1;
            log::warn!("decrypt failed: {e}, wrongPasswordTimes={count}");
            if count >= threshold {
                log::error!("wrongPasswordTimes beyond max times, exit now.");
                std::process::exit(1);
            }
            return HandlerOutcome::Drop;
        }
    };

    let request: CopyMessage = match serde_json::from_slice(&plain) {
        Ok(msg) => msg,
        Err(e) => {
            log::warn!("decoding copy message failed: {e}");
            return HandlerOutcome::Drop;
        }
    };

    let response = copyfs::serve_request(request, max_file_size);

    let encoded = match serde_json::to_vec(&response) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("encoding response failed: {e}");
            return HandlerOutcome::Drop;
        }
    };

    match codec::wrap(&encoded, secret) {
        Ok(cipher) => HandlerOutcome::Reply(cipher.into_bytes()),
        Err(e) => {
            log::warn!("encrypting response failed: {e}");
            HandlerOutcome::Drop
        }
    }
}
