//! Persisted "last copy time" sidecar, grounded in `mycpclient.ReadMyCPInfo`
//! / `WriteMyCPInfo` and the `mycp_info.txt` file they read and write.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const HISTORY_FILE_NAME: &str = "copy_history.json";

/// Per-path last-copy timestamps plus the last remote host used, so a bare
/// `@R:` shorthand can be resolved without retyping the host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CopyHistory {
    #[serde(default)]
    pub path_to_last_copy: HashMap<String, DateTime<Utc>>,
    #[serde(default)]
    pub last_remote_host: Option<String>,
}

impl CopyHistory {
    /// Load the sidecar next to `binary_dir`, or an empty history if it
    /// doesn't exist yet.
    pub fn load(binary_dir: &Path) -> Result<Self> {
        let path = binary_dir.join(HISTORY_FILE_NAME);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("reading copy history at {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("parsing copy history at {}", path.display()))
    }

    /// Persist this history next to `binary_dir`, writing to a temp file and
    /// renaming over the real path so a crash mid-write never leaves a
    /// half-written sidecar behind.
    pub fn save(&self, binary_dir: &Path) -> Result<()> {
        let path = binary_dir.join(HISTORY_FILE_NAME);
        let tmp_path = binary_dir.join(format!("{HISTORY_FILE_NAME}.tmp"));
        let json = serde_json::to_string_pretty(self).context("serializing copy history")?;
        fs::write(&tmp_path, json)
            .with_context(|| format!("writing copy history at {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &path)
            .with_context(|| format!("renaming copy history into place at {}", path.display()))
    }

    /// Record that `path` was just copied at `when`.
    pub fn record_copy(&mut self, path: &str, when: DateTime<Utc>) {
        self.path_to_last_copy.insert(path.to_string(), when);
    }

    pub fn last_copy_time(&self, path: &str) -> Option<DateTime<Utc>> {
        self.path_to_last_copy.get(path).copied()
    }

    pub fn set_last_remote_host(&mut self, host: impl Into<String>) {
        self.last_remote_host = Some(host.into());
    }
}

/// Directory the current executable lives in, mirroring `os.Executable` +
/// `filepath.Dir` in the original implementation.
pub fn binary_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("locating current executable")?;
    exe.parent()
        .map(Path::to_path_buf)
        .context("executable has no parent directory")
}
