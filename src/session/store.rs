//! Credential artifact storage.
//!
//! The engine owns the contents of these areas; this type only knows where
//! they live and how to remove them.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Default name of the authentication material area.
pub const DEFAULT_AUTH_DIR: &str = ".wwebjs_auth";

/// Default name of the runtime cache area.
pub const DEFAULT_CACHE_DIR: &str = ".wwebjs_cache";

/// Outcome of a [`SessionStore::wipe`].
#[derive(Debug, Default)]
pub struct WipeReport {
    /// Areas that existed and were removed.
    pub removed: Vec<PathBuf>,
    /// Areas that could not be removed.
    pub failed: Vec<(PathBuf, io::Error)>,
}

impl WipeReport {
    /// True when every area is known to be gone.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Locations of the two credential artifact areas for the session.
#[derive(Debug, Clone)]
pub struct SessionStore {
    auth_dir: PathBuf,
    cache_dir: PathBuf,
}

impl SessionStore {
    /// Create a store with explicit area paths.
    pub fn new(auth_dir: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            auth_dir: auth_dir.into(),
            cache_dir: cache_dir.into(),
        }
    }

    /// Create a store using the default area names under `root`.
    pub fn in_dir(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self::new(root.join(DEFAULT_AUTH_DIR), root.join(DEFAULT_CACHE_DIR))
    }

    /// Authentication material area.
    pub fn auth_dir(&self) -> &Path {
        &self.auth_dir
    }

    /// Runtime cache area.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Check whether any artifact area currently exists.
    pub fn has_artifacts(&self) -> bool {
        self.areas().iter().any(|p| p.exists())
    }

    /// Remove both artifact areas.
    ///
    /// Missing areas count as success. Any other failure is logged and
    /// recorded in the report; the remaining area is still attempted.
    pub fn wipe(&self) -> WipeReport {
        let mut report = WipeReport::default();

        for area in self.areas() {
            match remove_area(area) {
                Ok(true) => {
                    debug!(path = %area.display(), "removed credential area");
                    report.removed.push(area.to_path_buf());
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(path = %area.display(), "failed to remove credential area: {}", e);
                    report.failed.push((area.to_path_buf(), e));
                }
            }
        }

        report
    }

    fn areas(&self) -> [&Path; 2] {
        [&self.auth_dir, &self.cache_dir]
    }
}

/// Returns `Ok(true)` if something was removed, `Ok(false)` if nothing existed.
fn remove_area(path: &Path) -> io::Result<bool> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };

    let result = if metadata.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };

    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
