//! Execution of a [`CopyMessage`] against the local filesystem.
//!
//! Grounded in `mycpserver.MyCPFromRemoteToLocal`/`MyCPFromLocalToRemote` (the
//! server-side dispatch in [`serve_request`]) and `mycpclient`'s mirror-image
//! client methods (the client-side helpers below it). Directory recursion
//! happens one level at a time: each function here handles exactly one path,
//! and returns the `(src, dst)` pairs the caller should recurse into next,
//! rather than recursing itself — callers own the request/response round
//! trip and this module only ever touches the local disk.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::proto::{CopyMessage, CopyStatus, Direction, FileEntry};

/// Execute `msg` against the local filesystem and return the response to
/// send back. Never panics on a missing or unreadable path: failures are
/// reported via `CopyStatus::Fail` in the returned message, matching the
/// original server's "log and mark failed" behavior rather than propagating
/// an error through the wire protocol.
pub fn serve_request(mut msg: CopyMessage, max_file_size: u64) -> CopyMessage {
    match msg.direction {
        Direction::RemoteIsSrc => serve_as_source(&mut msg, max_file_size),
        Direction::RemoteIsDst => serve_as_destination(&mut msg),
    }
    msg
}

fn serve_as_source(msg: &mut CopyMessage, max_file_size: u64) {
    let meta = match fs::metadata(&msg.src_path) {
        Ok(meta) => meta,
        Err(e) => {
            log::warn!("stat {} failed: {e}", msg.src_path);
            msg.status = CopyStatus::Fail;
            return;
        }
    };

    if meta.is_dir() {
        msg.src_is_dir = true;
        serve_directory_listing(msg);
        return;
    }

    msg.src_is_dir = false;
    if msg.only_modified {
        if let (Ok(modified), Some(last)) = (meta.modified(), msg.last_copy_time) {
            let modified: DateTime<Utc> = modified.into();
            if modified < last {
                log::info!("no need to copy {}, not modified", msg.src_path);
                msg.status = CopyStatus::NotModified;
                return;
            }
        }
    }

    if meta.len() > max_file_size {
        log::warn!(
            "file larger than {max_file_size} bytes, filename={}",
            msg.src_path
        );
        msg.status = CopyStatus::Fail;
        return;
    }

    match fs::read(&msg.src_path) {
        Ok(data) => {
            msg.data = Some(data);
            msg.status = CopyStatus::Ok;
        }
        Err(e) => {
            log::warn!("read {} failed: {e}", msg.src_path);
            msg.status = CopyStatus::Fail;
        }
    }
}

fn serve_directory_listing(msg: &mut CopyMessage) {
    let entries = match fs::read_dir(&msg.src_path) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("read_dir {} failed: {e}", msg.src_path);
            msg.status = CopyStatus::Fail;
            return;
        }
    };

    let mut out = Vec::new();
    for entry in entries {
        let Ok(entry) = entry else { continue };
        let Ok(file_type) = entry.file_type() else {
            continue;
        };

        if !file_type.is_dir() && msg.only_modified {
            if let (Ok(meta), Some(last)) = (entry.metadata(), msg.last_copy_time) {
                if let Ok(modified) = meta.modified() {
                    let modified: DateTime<Utc> = modified.into();
                    if modified < last {
                        continue;
                    }
                }
            }
        }

        out.push(FileEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir: file_type.is_dir(),
        });
    }
    msg.entries = out;
    msg.status = CopyStatus::Ok;
}

fn serve_as_destination(msg: &mut CopyMessage) {
    if !msg.src_is_dir {
        let src_name = file_name(&msg.src_path);
        let outcome = resolve_dst_file(&src_name, &msg.dst_path)
            .and_then(|path| write_file_bytes(&path, msg.data.as_deref().unwrap_or(&[])));
        msg.status = match outcome {
            Ok(()) => CopyStatus::Ok,
            Err(e) => {
                log::warn!("write destination for {} failed: {e:#}", msg.src_path);
                CopyStatus::Fail
            }
        };
        return;
    }

    let real_dst = format!(
        "{}/{}",
        msg.dst_path.trim_end_matches('/'),
        trimmed_base_name(&msg.src_path)
    );
    msg.status = match fs::create_dir_all(&real_dst) {
        Ok(()) => CopyStatus::Ok,
        Err(e) => {
            log::warn!("mkdir {real_dst} failed: {e}");
            CopyStatus::Fail
        }
    };
}

/// Build the initial request for copying `src_path` (on the peer) to
/// `dst_path` (local). The caller submits this, then feeds the response to
/// [`apply_remote_to_local_response`].
pub fn request_copy_from_remote(
    src_path: impl Into<String>,
    dst_path: impl Into<String>,
    only_modified: bool,
    last_copy_time: Option<DateTime<Utc>>,
) -> CopyMessage {
    let mut msg = CopyMessage::request(src_path, dst_path, Direction::RemoteIsSrc);
    msg.only_modified = only_modified;
    msg.last_copy_time = last_copy_time;
    msg
}

/// Apply a response to a remote-is-source request: write the file, or for a
/// directory, create it locally and return the `(src, dst)` pairs to recurse
/// into next. Grounded in `mycpclient.MyCPFromRemoteToLocal`'s handling of
/// `rsp.MyFileInfoSlice`.
pub fn apply_remote_to_local_response(
    src_path: &str,
    dst_path: &str,
    rsp: &CopyMessage,
) -> Result<Vec<(String, String)>> {
    match rsp.status {
        CopyStatus::Fail => anyhow::bail!("remote execution failed for {src_path}"),
        CopyStatus::NotModified => return Ok(Vec::new()),
        CopyStatus::Ok => {}
    }

    if !rsp.src_is_dir {
        let src_name = file_name(src_path);
        let real_dst = resolve_dst_file(&src_name, dst_path)?;
        write_file_bytes(&real_dst, rsp.data.as_deref().unwrap_or(&[]))?;
        return Ok(Vec::new());
    }

    let real_dst = format!("{}/{}", dst_path.trim_end_matches('/'), trimmed_base_name(src_path));
    fs::create_dir_all(&real_dst)
        .with_context(|| format!("creating destination directory {real_dst}"))?;

    Ok(rsp
        .entries
        .iter()
        .map(|entry| (format!("{src_path}/{}", entry.name), real_dst.clone()))
        .collect())
}

/// Build the request for copying local `src_path` to remote `dst_path`,
/// stat-ing the source first. Returns `Ok(None)` when `only_modified` skips
/// an unchanged file, mirroring the original's "no need to cp" short circuit.
pub fn build_local_to_remote_request(
    src_path: &str,
    dst_path: &str,
    only_modified: bool,
    last_copy_time: Option<DateTime<Utc>>,
    max_file_size: u64,
) -> Result<Option<CopyMessage>> {
    let meta = fs::metadata(src_path).with_context(|| format!("stat {src_path}"))?;
    let mut msg = CopyMessage::request(src_path, dst_path, Direction::RemoteIsDst);

    if meta.is_dir() {
        msg.src_is_dir = true;
        return Ok(Some(msg));
    }

    if only_modified {
        if let (Ok(modified), Some(last)) = (meta.modified(), last_copy_time) {
            let modified: DateTime<Utc> = modified.into();
            if modified < last {
                log::info!("no need to copy {src_path}, not modified");
                return Ok(None);
            }
        }
    }

    if meta.len() > max_file_size {
        anyhow::bail!("file larger than {max_file_size} bytes, filename={src_path}");
    }

    msg.src_is_dir = false;
    msg.data = Some(fs::read(src_path).with_context(|| format!("reading {src_path}"))?);
    Ok(Some(msg))
}

/// List the local children of a directory just copied to the remote side,
/// returning the `(src, dst)` pairs to recurse into next.
pub fn local_to_remote_followups(src_path: &str, dst_path: &str) -> Result<Vec<(String, String)>> {
    let new_dst = format!("{}/{}", dst_path.trim_end_matches('/'), trimmed_base_name(src_path));
    let mut out = Vec::new();
    for entry in fs::read_dir(src_path).with_context(|| format!("read_dir {src_path}"))? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        out.push((format!("{src_path}/{name}"), new_dst.clone()));
    }
    Ok(out)
}

/// Resolve where a single file destined for `dst_path` should actually be
/// written: `dst_path` itself if it names (or will name) a file, or
/// `dst_path/src_name` if it names a directory — existing or, for a
/// trailing-slash path that doesn't exist yet, about to be created.
fn resolve_dst_file(src_name: &str, dst_path: &str) -> Result<PathBuf> {
    match fs::metadata(dst_path) {
        Ok(meta) if meta.is_dir() => Ok(Path::new(dst_path).join(src_name)),
        Ok(_) => Ok(PathBuf::from(dst_path)),
        Err(_) => {
            if dst_path.ends_with('/') {
                fs::create_dir_all(dst_path)
                    .with_context(|| format!("creating destination directory {dst_path}"))?;
                Ok(Path::new(dst_path).join(src_name))
            } else {
                if let Some(parent) = Path::new(dst_path).parent().filter(|p| !p.as_os_str().is_empty())
                {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("creating parent directory {}", parent.display()))?;
                }
                Ok(PathBuf::from(dst_path))
            }
        }
    }
}

fn write_file_bytes(path: &Path, data: &[u8]) -> Result<()> {
    fs::write(path, data).with_context(|| format!("writing {}", path.display()))
}

fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn trimmed_base_name(path: &str) -> String {
    let mut trimmed = path;
    while trimmed.len() >= 2 && trimmed.ends_with('/') {
        trimmed = &trimmed[..trimmed.len() - 1];
    }
    file_name(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn serves_file_as_source() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("input.txt");
        fs::write(&src, b"hello world").unwrap();

        let req = CopyMessage::request(src.to_str().unwrap(), "/unused", Direction::RemoteIsSrc);
        let rsp = serve_request(req, 1024);
        assert_eq!(rsp.status, CopyStatus::Ok);
        assert_eq!(rsp.data.unwrap(), b"hello world");
        assert!(!rsp.src_is_dir);
    }

    #[test]
    fn rejects_oversized_source_file() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("big.bin");
        fs::write(&src, vec![0u8; 32]).unwrap();

        let req = CopyMessage::request(src.to_str().unwrap(), "/unused", Direction::RemoteIsSrc);
        let rsp = serve_request(req, 8);
        assert_eq!(rsp.status, CopyStatus::Fail);
    }

    #[test]
    fn only_modified_skips_unchanged_file() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("input.txt");
        fs::write(&src, b"hello").unwrap();

        let mut req = CopyMessage::request(src.to_str().unwrap(), "/unused", Direction::RemoteIsSrc);
        req.only_modified = true;
        req.last_copy_time = Some(Utc::now() + chrono::Duration::seconds(60));
        let rsp = serve_request(req, 1024);
        assert_eq!(rsp.status, CopyStatus::NotModified);
    }

    #[test]
    fn lists_directory_as_source() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();

        let req = CopyMessage::request(dir.path().to_str().unwrap(), "/unused", Direction::RemoteIsSrc);
        let rsp = serve_request(req, 1024);
        assert_eq!(rsp.status, CopyStatus::Ok);
        assert!(rsp.src_is_dir);
        assert_eq!(rsp.entries.len(), 2);
    }

    #[test]
    fn writes_file_as_destination_into_existing_dir() {
        let dir = tempdir().unwrap();
        let dst_dir = dir.path().join("out");
        fs::create_dir(&dst_dir).unwrap();

        let mut req = CopyMessage::request(
            "/remote/original/name.txt",
            dst_dir.to_str().unwrap(),
            Direction::RemoteIsDst,
        );
        req.data = Some(b"payload".to_vec());
        let rsp = serve_request(req, 1024);
        assert_eq!(rsp.status, CopyStatus::Ok);
        assert_eq!(fs::read(dst_dir.join("name.txt")).unwrap(), b"payload");
    }

    #[test]
    fn writes_file_as_destination_to_trailing_slash_path() {
        let dir = tempdir().unwrap();
        let dst_dir = dir.path().join("created").join("");

        let mut req = CopyMessage::request(
            "/remote/original/name.txt",
            dst_dir.to_str().unwrap(),
            Direction::RemoteIsDst,
        );
        req.data = Some(b"payload".to_vec());
        let rsp = serve_request(req, 1024);
        assert_eq!(rsp.status, CopyStatus::Ok);
        assert_eq!(
            fs::read(dir.path().join("created").join("name.txt")).unwrap(),
            b"payload"
        );
    }

    #[test]
    fn apply_remote_to_local_response_writes_file() {
        let dir = tempdir().unwrap();
        let dst = dir.path().join("copied.txt");

        let mut rsp = CopyMessage::request("/remote/src.txt", dst.to_str().unwrap(), Direction::RemoteIsSrc);
        rsp.status = CopyStatus::Ok;
        rsp.data = Some(b"contents".to_vec());

        let followups =
            apply_remote_to_local_response("/remote/src.txt", dst.to_str().unwrap(), &rsp).unwrap();
        assert!(followups.is_empty());
        assert_eq!(fs::read(&dst).unwrap(), b"contents");
    }

    #[test]
    fn apply_remote_to_local_response_recurses_into_directory() {
        let dir = tempdir().unwrap();
        let dst = dir.path().join("mirror");

        let mut rsp = CopyMessage::request("/remote/dir", dst.to_str().unwrap(), Direction::RemoteIsSrc);
        rsp.status = CopyStatus::Ok;
        rsp.src_is_dir = true;
        rsp.entries = vec![
            FileEntry { name: "a.txt".to_string(), is_dir: false },
            FileEntry { name: "sub".to_string(), is_dir: true },
        ];

        let followups =
            apply_remote_to_local_response("/remote/dir", dst.to_str().unwrap(), &rsp).unwrap();
        assert_eq!(followups.len(), 2);
        assert!(dst.join("dir").exists());
    }

    #[test]
    fn build_local_to_remote_request_skips_unmodified_file() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("input.txt");
        fs::write(&src, b"hello").unwrap();

        let result = build_local_to_remote_request(
            src.to_str().unwrap(),
            "/remote/dst.txt",
            true,
            Some(Utc::now() + chrono::Duration::seconds(60)),
            1024,
        )
        .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn build_local_to_remote_request_reads_file_data() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("input.txt");
        fs::write(&src, b"hello").unwrap();

        let msg = build_local_to_remote_request(src.to_str().unwrap(), "/remote/dst.txt", false, None, 1024)
            .unwrap()
            .unwrap();
        assert_eq!(msg.data.unwrap(), b"hello");
        assert!(!msg.src_is_dir);
    }
}
