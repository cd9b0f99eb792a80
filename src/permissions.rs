// ABOUTME: Ownership and mode normalization for the mirrored destination tree
// ABOUTME: Broad pass first, then group-writable overrides for runtime directories

use anyhow::{Context, Result};
use nix::unistd::{Gid, Uid, User};
use std::fs::{self, Permissions};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use walkdir::WalkDir;

use crate::config::PermissionConfig;
use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner {
    pub uid: Uid,
    pub gid: Gid,
}

impl Owner {
    /// Looks up a system user and its primary group.
    pub fn lookup(user: &str) -> Result<Self> {
        let found = User::from_name(user)
            .with_context(|| format!("Failed to look up user {}", user))?
            .ok_or_else(|| SyncError::Permission(format!("system user {} does not exist", user)))?;
        Ok(Self {
            uid: found.uid,
            gid: found.gid,
        })
    }
}

#[derive(Debug, Default)]
pub struct NormalizeReport {
    pub directories: usize,
    pub files: usize,
    pub symlinks: usize,
    pub writable_entries: usize,
    pub failures: Vec<String>,
}

impl NormalizeReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, path: &Path, what: &str, err: impl std::fmt::Display) {
        self.failures
            .push(format!("{} {}: {}", what, path.display(), err));
    }
}

/// Applies ownership (when `owner` is given) and the mode policy below `root`.
///
/// Symlinks are never followed and never chmodded. Per-entry failures are
/// collected in the report rather than stopping the walk; only a missing or
/// unreadable root is an error.
pub fn normalize(
    root: &Path,
    owner: Option<Owner>,
    policy: &PermissionConfig,
) -> Result<NormalizeReport> {
    let meta = fs::symlink_metadata(root)
        .with_context(|| format!("Failed to stat web root {}", root.display()))?;
    if !meta.is_dir() {
        return Err(SyncError::Permission(format!(
            "web root {} is not a directory",
            root.display()
        ))
        .into());
    }

    let mut report = NormalizeReport::default();
    let broad = apply_modes(root, owner, policy.dir_mode, policy.file_mode, &mut report);
    report.directories = broad.directories;
    report.files = broad.files;
    report.symlinks = broad.symlinks;

    for relative in &policy.writable_dirs {
        let dir = root.join(relative);
        match fs::symlink_metadata(&dir) {
            Ok(meta) if meta.is_dir() => {
                let counts = apply_modes(
                    &dir,
                    None,
                    policy.writable_dir_mode,
                    policy.writable_file_mode,
                    &mut report,
                );
                report.writable_entries += counts.directories + counts.files;
            }
            Ok(_) => {
                tracing::warn!("Writable path {} is not a directory, skipped", dir.display());
            }
            Err(_) => {
                tracing::debug!("Writable dir {} does not exist, skipped", dir.display());
            }
        }
    }

    Ok(report)
}

#[derive(Default)]
struct Counts {
    directories: usize,
    files: usize,
    symlinks: usize,
}

fn apply_modes(
    root: &Path,
    owner: Option<Owner>,
    dir_mode: u32,
    file_mode: u32,
    report: &mut NormalizeReport,
) -> Counts {
    let mut counts = Counts::default();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                report.fail(&path, "walk", err);
                continue;
            }
        };
        let path = entry.path();
        let file_type = entry.file_type();

        if let Some(owner) = owner {
            if let Err(err) = std::os::unix::fs::lchown(
                path,
                Some(owner.uid.as_raw()),
                Some(owner.gid.as_raw()),
            ) {
                report.fail(path, "chown", err);
            }
        }

        let mode = if file_type.is_symlink() {
            counts.symlinks += 1;
            continue;
        } else if file_type.is_dir() {
            counts.directories += 1;
            dir_mode
        } else {
            counts.files += 1;
            file_mode
        };

        if let Err(err) = fs::set_permissions(path, Permissions::from_mode(mode)) {
            report.fail(path, "chmod", err);
        }
    }
    counts
}
