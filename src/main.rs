//! `portage` — the client half of the copy tool. Parses a source and
//! destination path (one of which names a remote host), resolves the copy
//! direction, and drives the copy to completion over a [`ClientEndpoint`].

use std::collections::VecDeque;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;

use portage::copyfs;
use portage::history::{self, CopyHistory};
use portage::net::client::ClientEndpoint;
use portage::net::codec;
use portage::pathspec::parse_path;
use portage::proto::CopyStatus;

#[derive(Parser)]
#[command(name = "portage")]
#[command(about = "Copy a file or directory to or from a remote portage-server")]
struct Cli {
    /// Source path. Prefix with `@host:port:` to mean "on the remote host",
    /// or `@R:` to reuse the last remote host used.
    src: String,
    /// Destination path, with the same `@host:port:`/`@R:` syntax.
    dst: String,
    /// Only copy files modified since the last successful copy of that path.
    #[arg(long)]
    only_modified: bool,
    /// Shared secret. Required; the same value must be passed to portage-server.
    #[arg(long)]
    password: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();
    let app_config = portage::config::Config::load();
    let binary_dir = history::binary_dir()?;
    let mut history = CopyHistory::load(&binary_dir)?;

    let parsed = parse_path(&cli.src, &cli.dst, history.last_remote_host.as_deref())?;
    log::info!(
        "connecting to {} (remote_is_src={})",
        parsed.remote_host,
        parsed.remote_is_src
    );

    let client = ClientEndpoint::connect(&parsed.remote_host, app_config.net_config())
        .await
        .with_context(|| format!("connecting to {}", parsed.remote_host))?;
    let secret = cli.password.as_bytes();

    // One timestamp and one history key for the whole (possibly recursive)
    // operation, matching `cmd/mycp/main.go`'s single `thisMyCPTime` /
    // `Path2LastMyCPTime[hostSrcPath]` lookup: nested files and directories
    // visited during the copy never get their own history entry.
    let history_key = if parsed.remote_is_src {
        format!("@{}:{}", parsed.remote_host, parsed.real_src)
    } else {
        parsed.real_src.clone()
    };
    let last_copy = history.last_copy_time(&history_key);
    let this_copy_time = Utc::now();

    if parsed.remote_is_src {
        copy_from_remote(
            &client,
            secret,
            cli.only_modified,
            last_copy,
            parsed.real_src,
            parsed.real_dst,
        )
        .await?;
    } else {
        copy_to_remote(
            &client,
            secret,
            cli.only_modified,
            last_copy,
            app_config.max_file_size,
            parsed.real_src,
            parsed.real_dst,
        )
        .await?;
    }

    history.record_copy(&history_key, this_copy_time);
    history.set_last_remote_host(parsed.remote_host);
    history.save(&binary_dir)?;
    client.close();
    Ok(())
}

async fn copy_from_remote(
    client: &ClientEndpoint,
    secret: &[u8],
    only_modified: bool,
    last_copy: Option<chrono::DateTime<Utc>>,
    real_src: String,
    real_dst: String,
) -> Result<()> {
    let mut queue = VecDeque::from([(real_src, real_dst)]);
    while let Some((src, dst)) = queue.pop_front() {
        let req = copyfs::request_copy_from_remote(&src, &dst, only_modified, last_copy);
        let rsp = roundtrip(client, &req, secret).await?;

        if rsp.status == CopyStatus::Fail {
            anyhow::bail!("fail=>remote returned failure for {src}");
        }
        let followups = copyfs::apply_remote_to_local_response(&src, &dst, &rsp)?;
        queue.extend(followups);
    }
    Ok(())
}

async fn copy_to_remote(
    client: &ClientEndpoint,
    secret: &[u8],
    only_modified: bool,
    last_copy: Option<chrono::DateTime<Utc>>,
    max_file_size: u64,
    real_src: String,
    real_dst: String,
) -> Result<()> {
    let mut queue = VecDeque::from([(real_src, real_dst)]);
    while let Some((src, dst)) = queue.pop_front() {
        let Some(req) =
            copyfs::build_local_to_remote_request(&src, &dst, only_modified, last_copy, max_file_size)?
        else {
            continue;
        };
        let is_dir = req.src_is_dir;

        let rsp = roundtrip(client, &req, secret).await?;
        if rsp.status != CopyStatus::Ok {
            anyhow::bail!("remote execution fail for {src}");
        }

        if is_dir {
            queue.extend(copyfs::local_to_remote_followups(&src, &dst)?);
        }
    }
    Ok(())
}

async fn roundtrip(
    client: &ClientEndpoint,
    msg: &portage::proto::CopyMessage,
    secret: &[u8],
) -> Result<portage::proto::CopyMessage> {
    let encoded = serde_json::to_vec(msg).context("encoding copy message")?;
    let wrapped = codec::wrap(&encoded, secret).context("encrypting request")?;

    let response_bytes = client
        .submit(wrapped.into_bytes())
        .await
        .map_err(|e| anyhow::anyhow!("request.Err=>{e}"))?;

    let cipher = std::str::from_utf8(&response_bytes).context("response was not utf-8")?;
    let plain = codec::unwrap(cipher, secret).context("decrypting response")?;
    serde_json::from_slice(&plain).context("decoding response")
}
