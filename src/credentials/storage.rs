//! File-backed token storage.
//!
//! One JSON file per service, `<dir>/<service>_token.json`, readable by the
//! owning user only.

use super::Token;
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Persistence seam for OAuth tokens, keyed by service name.
pub trait TokenStore: Send + Sync {
    /// Loads the stored token for `service`.
    ///
    /// A missing, unreadable or corrupt record yields `None`; callers treat
    /// that exactly like "no credential yet".
    fn load(&self, service: &str) -> Option<Token>;

    /// Stores `token` for `service`, replacing any previous record.
    ///
    /// # Returns
    /// * `Ok(())` - Token written
    /// * `Err` - Directory creation or file write failed
    fn save(&self, service: &str, token: &Token) -> Result<()>;
}

/// Token store writing plain JSON files into a directory.
#[derive(Clone, Debug)]
pub struct FileTokenStore {
    dir: PathBuf,
}

impl FileTokenStore {
    /// Creates a store rooted at `dir`. The directory is created lazily on
    /// the first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Location of the token file for `service`.
    pub fn path_for(&self, service: &str) -> PathBuf {
        self.dir.join(format!("{}_token.json", service))
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self, service: &str) -> Option<Token> {
        let path = self.path_for(service);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(service = %service, path = %path.display(), "No stored token");
                return None;
            }
            Err(e) => {
                warn!(service = %service, path = %path.display(), error = %e, "Failed to read token file");
                return None;
            }
        };

        match serde_json::from_str::<Token>(&contents) {
            Ok(token) => Some(token),
            Err(e) => {
                warn!(service = %service, path = %path.display(), error = %e, "Ignoring corrupt token file");
                None
            }
        }
    }

    fn save(&self, service: &str, token: &Token) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create token directory {}", self.dir.display()))?;

        let path = self.path_for(service);
        let json = serde_json::to_vec(token).context("Failed to serialize token")?;

        let mut file = open_private(&path)
            .with_context(|| format!("Failed to open token file {}", path.display()))?;
        file.write_all(&json)
            .with_context(|| format!("Failed to write token file {}", path.display()))?;

        debug!(service = %service, path = %path.display(), "Token saved");
        Ok(())
    }
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // mode() only applies on creation; tighten files left by older versions
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    Ok(file)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}
