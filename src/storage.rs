// netswitch - Switch State Storage
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Persistent store for the switch state document.
//!
//! One JSON file holds the whole document. Every save rewrites it through
//! a temporary sibling and a rename, so readers never observe a partial
//! file. Saves are serialized by a mutex. Failures are logged and never
//! escalated: the in-memory document stays authoritative for the running
//! process.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::models::{Result, SettingsDocument};

/// File-backed store for [`SettingsDocument`].
#[derive(Debug)]
pub struct SettingsStore {
    /// State file path.
    path: PathBuf,
    /// Held for the duration of a write.
    save_lock: Mutex<()>,
}

impl SettingsStore {
    /// Create a store backed by the given file.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            save_lock: Mutex::new(()),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document.
    ///
    /// A missing file yields defaults, which are written out immediately.
    /// An unreadable or malformed file yields defaults and is left alone.
    pub fn load(&self) -> SettingsDocument {
        if !self.path.exists() {
            info!("No switch state at {:?}, creating defaults", self.path);
            let document = SettingsDocument::default();
            self.save(&document);
            return document;
        }

        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                error!("Failed to read switch state {:?}: {}", self.path, e);
                return SettingsDocument::default();
            }
        };

        match SettingsDocument::from_json(&content) {
            Ok(document) => {
                info!(
                    "Loaded switch state for {} devices from {:?}",
                    document.devices.len(),
                    self.path
                );
                document
            }
            Err(e) => {
                error!("Failed to parse switch state {:?}: {}", self.path, e);
                SettingsDocument::default()
            }
        }
    }

    /// Save the document, logging any failure.
    pub fn save(&self, document: &SettingsDocument) {
        let _guard = match self.save_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Save lock poisoned, recovering");
                poisoned.into_inner()
            }
        };

        if let Err(e) = self.write_document(document) {
            error!("Failed to save switch state {:?}: {}", self.path, e);
        }
    }

    fn write_document(&self, document: &SettingsDocument) -> Result<()> {
        let content = document.to_json()?;

        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
                // Set restrictive permissions on the state directory (0700)
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let _ = fs::set_permissions(dir, fs::Permissions::from_mode(0o700));
                }
            }
        }

        let tmp_path = self.tmp_path();
        {
            let mut file = fs::File::create(&tmp_path)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let _ = fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600));
            }
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }

        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        debug!("Saved switch state to {:?}", self.path);
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
