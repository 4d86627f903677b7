//! Persisted preferences — plain JSON, readable before unlock.
//!
//! Holds only non-sensitive flags; key material never goes here. The
//! `auto_unlock` flag is read on launch to decide whether the unlock
//! ceremony is skipped, independent of the master key.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

const PREFERENCES_FILE: &str = "preferences.json";

/// Non-sensitive vault preferences.
///
/// Persisted to `{data_dir}/preferences.json`; all fields default via
/// serde so a partial or missing file is recoverable.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    /// Skip the authentication ceremony on next launch.
    /// Explicit opt-in from a prior unlocked session.
    #[serde(default)]
    pub auto_unlock: bool,
}

impl Preferences {
    /// Load preferences from `{data_dir}/preferences.json`.
    ///
    /// Returns defaults when the file is missing or contains invalid
    /// JSON (corrupt-file recovery).
    #[must_use]
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join(PREFERENCES_FILE);
        fs::read_to_string(&path).map_or_else(
            |_| Self::default(),
            |contents| serde_json::from_str(&contents).unwrap_or_default(),
        )
    }

    /// Persist preferences atomically (write `.tmp`, then rename) so a
    /// crash mid-write never leaves a corrupt file.
    ///
    /// # Errors
    ///
    /// Returns an `io::Error` if the directory is missing or the file
    /// system rejects the write/rename.
    pub fn save(&self, data_dir: &Path) -> std::io::Result<()> {
        let path = data_dir.join(PREFERENCES_FILE);
        let tmp = data_dir.join(".preferences.json.tmp");

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        fs::write(&tmp, &json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
        }

        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
