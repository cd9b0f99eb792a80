// ABOUTME: rsync invocations for pulling the dump file and mirroring the site tree
// ABOUTME: Also verifies pulled files against a checksum computed on the source host

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

use crate::command::CommandSpec;
use crate::remote::RemoteClient;

const ARCHIVE_FLAGS: [&str; 3] = ["-az", "--partial", "--progress"];

pub struct Rsync<'a> {
    program: String,
    remote: &'a RemoteClient,
}

impl<'a> Rsync<'a> {
    pub fn new(program: &str, remote: &'a RemoteClient) -> Self {
        Self {
            program: program.to_string(),
            remote,
        }
    }

    fn base(&self) -> CommandSpec {
        CommandSpec::new(&self.program)
            .args(ARCHIVE_FLAGS)
            .arg("-e")
            .arg(self.remote.rsync_shell())
    }

    /// Copies one remote file into `local_dir`, keeping its name.
    pub fn pull_file(&self, remote_file: &Path, local_dir: &Path) -> CommandSpec {
        self.base()
            .arg(self.remote.remote_path(remote_file, false))
            .arg(with_trailing_slash(local_dir))
    }

    /// Mirrors the contents of `remote_root` into `local_root`.
    ///
    /// Excluded paths are neither copied nor, with `delete_extraneous`, removed
    /// on the destination, so destination-local config survives every run.
    pub fn mirror_tree(
        &self,
        remote_root: &Path,
        local_root: &Path,
        excludes: &[String],
        delete_extraneous: bool,
    ) -> CommandSpec {
        let mut spec = self.base();
        if delete_extraneous {
            spec = spec.arg("--delete");
        }
        spec.args(excludes.iter().map(|pattern| format!("--exclude={}", pattern)))
            .arg(self.remote.remote_path(remote_root, true))
            .arg(with_trailing_slash(local_root))
    }
}

fn with_trailing_slash(path: &Path) -> String {
    let mut rendered = path.display().to_string();
    if !rendered.ends_with('/') {
        rendered.push('/');
    }
    rendered
}

/// `sha256sum` run on the source host.
pub fn remote_checksum(file: &Path) -> CommandSpec {
    CommandSpec::new("sha256sum").arg(file.display().to_string())
}

/// First whitespace-separated token of `sha256sum` output, lowercased.
pub fn parse_checksum(stdout: &str) -> Option<String> {
    let digest = stdout.split_whitespace().next()?;
    if digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(digest.to_ascii_lowercase())
    } else {
        None
    }
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {} for checksum", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file
            .read(&mut buffer)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
