//! Server startup password handling, grounded in `mycpserver.LoadPassword`.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use rand::distr::{Alphanumeric, SampleString};

const PASSWORD_LEN: usize = 16;

/// Load the shared secret from `path` if it exists and carries at least
/// [`PASSWORD_LEN`] bytes, otherwise generate a fresh one with the process
/// CSPRNG. Mirrors the original's "16+ bytes from file, else generate"
/// fallback, minus its `math/rand` time-seeded generator (see design notes).
///
/// Reads exactly the first [`PASSWORD_LEN`] raw bytes with no trimming: this
/// tool's whole point is byte-compatibility with the Go peer, and Go's
/// `LoadPassword` reads `pwd[:16]` verbatim, so a file with leading or
/// trailing whitespace must derive the same secret here as it does there.
pub fn load_or_generate(path: &Path) -> Result<String> {
    match std::fs::File::open(path) {
        Ok(mut file) => {
            let mut buf = [0u8; PASSWORD_LEN];
            let n = file
                .read(&mut buf)
                .with_context(|| format!("reading password file {}", path.display()))?;
            if n > 0 && n < PASSWORD_LEN {
                anyhow::bail!(
                    "password file {} has invalid length {} (need at least {PASSWORD_LEN})",
                    path.display(),
                    n
                )
            } else if n == PASSWORD_LEN {
                std::str::from_utf8(&buf)
                    .map(str::to_string)
                    .with_context(|| format!("password file {} is not valid utf-8", path.display()))
            } else {
                Ok(generate_password())
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(generate_password()),
        Err(e) => Err(e).with_context(|| format!("opening password file {}", path.display())),
    }
}

fn generate_password() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), PASSWORD_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_generates_a_password() {
        let dir = tempdir().unwrap();
        let password = load_or_generate(&dir.path().join("nope.txt")).unwrap();
        assert_eq!(password.len(), PASSWORD_LEN);
    }

    #[test]
    fn long_enough_file_is_used_verbatim() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("password.txt");
        std::fs::write(&path, "0123456789ABCDEFextra").unwrap();
        let password = load_or_generate(&path).unwrap();
        assert_eq!(password, "0123456789ABCDEF");
    }

    #[test]
    fn empty_file_generates_a_password() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("password.txt");
        std::fs::write(&path, "").unwrap();
        let password = load_or_generate(&path).unwrap();
        assert_eq!(password.len(), PASSWORD_LEN);
    }

    #[test]
    fn too_short_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("password.txt");
        std::fs::write(&path, "short").unwrap();
        assert!(load_or_generate(&path).is_err());
    }

    #[test]
    fn whitespace_only_short_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("password.txt");
        std::fs::write(&path, "   \n").unwrap();
        assert!(load_or_generate(&path).is_err());
    }

    #[test]
    fn leading_whitespace_is_preserved_in_derived_secret() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("password.txt");
        std::fs::write(&path, " abcdef0123456789").unwrap();
        let password = load_or_generate(&path).unwrap();
        assert_eq!(password, " abcdef0123456789"[..PASSWORD_LEN]);
    }
}
