//! Session credential persistence.
//!
//! A successful login yields a cookie jar snapshot and the chat form token
//! (`fkey`). Persisting them lets a later process skip the login sequence.
//!
//! Entries are keyed by a hash of `(site, email, password)`, so changing any
//! of the three misses the cache. Entries older than the freshness window
//! are treated as absent.

// ============================================================================
// Imports
// ============================================================================

use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::transport::CookieRecord;

// ============================================================================
// Constants
// ============================================================================

/// Default freshness window of stored credentials (10 hours).
pub const DEFAULT_MAX_AGE: Duration = Duration::from_millis(36_000_000);

// ============================================================================
// Credentials
// ============================================================================

/// What a warm-started session needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Cookie jar snapshot.
    pub jar: Vec<CookieRecord>,
    /// Chat form token.
    pub fkey: String,
}

// ============================================================================
// CredentialStore
// ============================================================================

/// Persistence for [`Credentials`].
pub trait CredentialStore: Send + Sync {
    /// Returns fresh credentials for this login, if any.
    fn load(&self, site: &str, email: &str, password: &str) -> Option<Credentials>;

    /// Stores credentials for this login.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials cannot be written.
    fn save(&self, site: &str, email: &str, password: &str, credentials: &Credentials) -> Result<()>;
}

// ============================================================================
// FileCredentialStore
// ============================================================================

/// On-disk record.
#[derive(Serialize, Deserialize)]
struct StoredEntry {
    data: Credentials,
    /// Milliseconds since the Unix epoch.
    time: u64,
}

/// Stores credentials as JSON files in a directory.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    dir: PathBuf,
    max_age: Duration,
}

impl FileCredentialStore {
    /// Creates a store rooted at `dir` (created on first save).
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_age: DEFAULT_MAX_AGE,
        }
    }

    /// Sets the freshness window.
    #[inline]
    #[must_use]
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Returns the storage directory.
    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the file holding credentials for this login.
    ///
    /// Only ASCII alphanumerics, `-` and `_` of the site survive in the
    /// file name, so every entry stays directly inside the store directory.
    fn entry_path(&self, site: &str, email: &str, password: &str) -> PathBuf {
        let mut hasher = FxHasher::default();
        (site, email, password).hash(&mut hasher);

        let label: String = site
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{label}-{:016x}.json", hasher.finish()))
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self, site: &str, email: &str, password: &str) -> Option<Credentials> {
        let path = self.entry_path(site, email, password);
        let text = fs::read_to_string(&path).ok()?;

        let entry: StoredEntry = match serde_json::from_str(&text) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable credentials");
                return None;
            }
        };

        let age = now_millis().saturating_sub(entry.time);
        if age > self.max_age.as_millis() as u64 {
            debug!(site, age_ms = age, "Stored credentials are stale");
            return None;
        }

        Some(entry.data)
    }

    fn save(&self, site: &str, email: &str, password: &str, credentials: &Credentials) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let entry = StoredEntry {
            data: credentials.clone(),
            time: now_millis(),
        };
        let path = self.entry_path(site, email, password);
        fs::write(&path, serde_json::to_string(&entry)?)?;

        debug!(site, path = %path.display(), "Credentials saved");
        Ok(())
    }
}

/// Milliseconds since the Unix epoch.
fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

// ============================================================================
// Tests
// ============================================================================
