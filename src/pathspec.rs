//! Remote-path syntax for the `portage` CLI: `@host:port:path` marks one
//! side of a copy as remote, and `@R:path` reuses the last remote host from
//! the history store. Grounded in `mycpclient.ParsePath`.

use anyhow::{Context, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPath {
    pub real_src: String,
    pub real_dst: String,
    pub remote_host: String,
    pub remote_is_src: bool,
}

/// Parse a `portage <src> <dst>` invocation, resolving which side is remote.
pub fn parse_path(
    src_path: &str,
    dst_path: &str,
    last_remote_host: Option<&str>,
) -> Result<ParsedPath> {
    let src_path = src_path.trim();
    let dst_path = dst_path.trim();

    if src_path.starts_with('@') {
        if dst_path.starts_with('@') {
            anyhow::bail!("only one remote host needed but two offered");
        }
        if let Some(rest) = src_path.strip_prefix("@R:") {
            let host = last_remote_host.context("no last remote host, specify it pls")?;
            return Ok(ParsedPath {
                real_src: rest.to_string(),
                real_dst: dst_path.to_string(),
                remote_host: host.to_string(),
                remote_is_src: true,
            });
        }
        let (host, rest) = split_host(src_path)?;
        return Ok(ParsedPath {
            real_src: rest,
            real_dst: dst_path.to_string(),
            remote_host: host,
            remote_is_src: true,
        });
    }

    if dst_path.starts_with('@') {
        if let Some(rest) = dst_path.strip_prefix("@R:") {
            let host = last_remote_host.context("no last remote host, specify it pls")?;
            return Ok(ParsedPath {
                real_src: src_path.to_string(),
                real_dst: rest.to_string(),
                remote_host: host.to_string(),
                remote_is_src: false,
            });
        }
        let (host, rest) = split_host(dst_path)?;
        return Ok(ParsedPath {
            real_src: src_path.to_string(),
            real_dst: rest,
            remote_host: host,
            remote_is_src: false,
        });
    }

    anyhow::bail!("need remote host but nil")
}

/// Split `@host:port:realpath` into `(host:port, realpath)`.
fn split_host(path_with_at: &str) -> Result<(String, String)> {
    let idx1 = path_with_at.find(':').context("need remote host but nil")?;
    let idx2 = path_with_at[idx1 + 1..]
        .find(':')
        .context("need remote host but nil")?;
    let idx = idx1 + idx2 + 1;
    let host = path_with_at[1..idx].to_string();
    let rest = path_with_at[idx + 1..].to_string();
    Ok((host, rest))
}
