//! Change tracking — file backups and rollback.
//!
//! Before the agent mutates a file, the tracker snapshots its bytes under a
//! session-scoped, timestamped directory mirroring the file's relative path.
//! On accept the backups are discarded; on reject each change is restored
//! best-effort, a failure on one file never stopping the rest.

use chrono::Utc;
use oxpilot_core::decision::Change;
use oxpilot_core::error::TrackerError;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Tracks file backups for one session.
pub struct ChangeTracker {
    workspace_root: PathBuf,
    backup_dir: PathBuf,
}

/// The result of a best-effort rollback.
#[derive(Debug, Default)]
pub struct RollbackReport {
    /// Files restored to their pre-modification bytes.
    pub restored: Vec<String>,
    /// Per-file restore failures, collected rather than aborting.
    pub failures: Vec<(String, String)>,
}

impl RollbackReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl std::fmt::Display for RollbackReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "restored {} file(s)", self.restored.len())?;
        if !self.failures.is_empty() {
            write!(f, ", {} failure(s):", self.failures.len())?;
            for (path, reason) in &self.failures {
                write!(f, "\n  {path}: {reason}")?;
            }
        }
        Ok(())
    }
}

impl ChangeTracker {
    /// Create a tracker with a fresh session-scoped backup directory under
    /// `<workspace>/.oxpilot/backups/<timestamp>`.
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        let workspace_root = workspace_root.into();
        let stamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let backup_dir = workspace_root.join(".oxpilot").join("backups").join(stamp);
        Self {
            workspace_root,
            backup_dir,
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.workspace_root.join(p)
        }
    }

    /// Keep the backup tree out of version control: stage-all commits must
    /// never pick up snapshots.
    fn ensure_ignore_file(&self) {
        let dir = self.workspace_root.join(".oxpilot");
        let ignore = dir.join(".gitignore");
        if ignore.exists() {
            return;
        }
        if std::fs::create_dir_all(&dir).is_ok()
            && let Err(e) = std::fs::write(&ignore, "*\n")
        {
            warn!(error = %e, "Failed to write backup ignore file");
        }
    }

    /// Snapshot a file's bytes. Returns the backup path.
    ///
    /// The backup mirrors the file's workspace-relative path so nested files
    /// never collide.
    pub fn backup(&self, path: &str) -> Result<PathBuf, TrackerError> {
        self.ensure_ignore_file();
        let source = self.resolve(path);
        let destination = self.backup_dir.join(path);

        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TrackerError::Backup {
                path: path.to_string(),
                reason: format!("failed to create backup directory: {e}"),
            })?;
        }

        let content = std::fs::read(&source).map_err(|e| TrackerError::Backup {
            path: path.to_string(),
            reason: format!("failed to read source file: {e}"),
        })?;

        std::fs::write(&destination, content).map_err(|e| TrackerError::Backup {
            path: path.to_string(),
            reason: format!("failed to write backup file: {e}"),
        })?;

        debug!(path, backup = %destination.display(), "Backed up file");
        Ok(destination)
    }

    /// Write a backup's bytes back to the original path, then delete the
    /// backup copy.
    pub fn restore(&self, path: &str, backup_path: &Path) -> Result<(), TrackerError> {
        let content = std::fs::read(backup_path).map_err(|e| TrackerError::Restore {
            path: path.to_string(),
            reason: format!("failed to read backup file: {e}"),
        })?;

        let destination = self.resolve(path);
        std::fs::write(&destination, content).map_err(|e| TrackerError::Restore {
            path: path.to_string(),
            reason: format!("failed to restore file: {e}"),
        })?;

        if let Err(e) = std::fs::remove_file(backup_path) {
            warn!(backup = %backup_path.display(), error = %e, "Failed to remove consumed backup");
        }

        info!(path, "Restored file from backup");
        Ok(())
    }

    /// Delete a backup copy without restoring it (accept path).
    pub fn discard(&self, backup_path: &Path) {
        if let Err(e) = std::fs::remove_file(backup_path) {
            warn!(backup = %backup_path.display(), error = %e, "Failed to discard backup");
        }
    }

    /// Discard every backup recorded on the given changes.
    pub fn discard_all(&self, changes: &[Change]) {
        for change in changes {
            if let Some(backup) = &change.backup_path {
                self.discard(backup);
            }
        }
    }

    /// Back up every tracked modified/added file listed in a
    /// `git status --porcelain` output. Untracked (`??`) entries are outside
    /// automatic backup scope.
    pub fn backup_changed_files(&self, porcelain: &str) -> Result<Vec<Change>, TrackerError> {
        let mut changes = Vec::new();

        for line in porcelain.lines() {
            if line.len() < 3 {
                continue;
            }
            let state = &line[..2];
            let file = line[3..].trim();

            if state == "??" {
                continue;
            }

            let backup_path = self.backup(file)?;
            let mut change = Change::new(file, format!("working tree change ({})", state.trim()));
            change.backup_path = Some(backup_path);
            changes.push(change);
        }

        Ok(changes)
    }

    /// Restore every change that has a populated backup path, best-effort.
    ///
    /// A failure on one change is recorded in the report and the loop
    /// continues with the remaining ones.
    pub fn rollback(&self, changes: &[Change]) -> RollbackReport {
        let mut report = RollbackReport::default();

        for change in changes {
            let Some(backup) = &change.backup_path else {
                continue;
            };
            match self.restore(&change.file_path, backup) {
                Ok(()) => report.restored.push(change.file_path.clone()),
                Err(e) => {
                    warn!(path = %change.file_path, error = %e, "Rollback restore failed, continuing");
                    report
                        .failures
                        .push((change.file_path.clone(), e.to_string()));
                }
            }
        }

        report
    }
}
