// ABOUTME: Loads, resolves and validates the run configuration
// ABOUTME: Produces one immutable Config that every stage receives by reference

pub mod models;

use anyhow::{Context, Result};
use chrono::{FixedOffset, Offset, Utc};
use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::error::SyncError;

pub use models::{
    ConfigFile, DatabasePolicy, EnvironmentConfig, MirrorConfig, PermissionConfig, RestartPolicy,
    RunConfig, Secret, SshConfig, ToolsConfig,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Source,
    Destination,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Role::Source => write!(f, "source"),
            Role::Destination => write!(f, "destination"),
        }
    }
}

/// A fully resolved site on one of the two hosts.
#[derive(Debug, Clone)]
pub struct Environment {
    pub role: Role,
    pub domain: String,
    pub site_user: String,
    pub database_name: String,
    pub database_user: String,
    pub database_password: Option<Secret>,
    pub web_root: PathBuf,
    pub scratch_dir: PathBuf,
}

impl Environment {
    fn resolve(role: Role, raw: EnvironmentConfig) -> Self {
        let database_name = raw
            .database_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| raw.site_user.clone());
        let database_user = raw
            .database_user
            .filter(|user| !user.trim().is_empty())
            .unwrap_or_else(|| raw.site_user.clone());
        let home = PathBuf::from("/home").join(&raw.site_user);
        let web_root = raw
            .web_root
            .unwrap_or_else(|| home.join("htdocs").join(&raw.domain));
        let scratch_dir = raw.scratch_dir.unwrap_or_else(|| home.join("scripts"));

        Self {
            role,
            domain: raw.domain,
            site_user: raw.site_user,
            database_name,
            database_user,
            database_password: raw.database_password,
            web_root,
            scratch_dir,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub source: Environment,
    pub destination: Environment,
    pub ssh: SshConfig,
    pub run: RunConfig,
    pub mirror: MirrorConfig,
    pub permissions: PermissionConfig,
    pub tools: ToolsConfig,
    pub timezone: FixedOffset,
}

impl ConfigFile {
    /// Reads and deserializes the file without validating it.
    pub fn read(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&contents)
            .map_err(|e| SyncError::Configuration(e.to_string()))
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Where and in which offset to log, known before validation runs.
    /// A malformed timezone falls back to UTC here; validation reports it.
    pub fn log_target(&self) -> (PathBuf, FixedOffset) {
        let offset = parse_timezone(&self.run.timezone).unwrap_or_else(|_| utc());
        (self.run.log_file.clone(), offset)
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        Self::from_file(ConfigFile::read(path)?)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents)
            .map_err(|e| SyncError::Configuration(e.to_string()))?;
        Self::from_file(file)
    }

    pub fn from_file(file: ConfigFile) -> Result<Self> {
        let timezone = parse_timezone(&file.run.timezone)?;
        let config = Self {
            source: Environment::resolve(Role::Source, file.source),
            destination: Environment::resolve(Role::Destination, file.destination),
            ssh: file.ssh,
            run: file.run,
            mirror: file.mirror,
            permissions: file.permissions,
            tools: file.tools,
            timezone,
        };
        config.validate()?;
        Ok(config)
    }

    /// Runs every check that must pass before any command is issued.
    pub fn validate(&self) -> Result<()> {
        for env in [&self.source, &self.destination] {
            require_non_empty(&env.domain, &format!("{} domain", env.role))?;
            require_non_empty(&env.site_user, &format!("{} site_user", env.role))?;
            require_absolute(&env.web_root, &format!("{} web_root", env.role))?;
            require_absolute(&env.scratch_dir, &format!("{} scratch_dir", env.role))?;
        }
        require_non_empty(&self.ssh.host, "ssh host")?;
        if self.ssh.connect_timeout_secs == 0 {
            return Err(config_error("ssh connect_timeout_secs must be greater than zero"));
        }

        if self.run.database_policy == DatabasePolicy::Recreate {
            let has_password = self
                .destination
                .database_password
                .as_ref()
                .map(|secret| !secret.is_empty())
                .unwrap_or(false);
            if !has_password {
                return Err(config_error(
                    "destination database_password is required when database_policy is \"recreate\"",
                ));
            }
        }

        if self.run.restart_policy != RestartPolicy::None {
            require_non_empty(&self.run.service_name, "run service_name")?;
        }

        require_absolute(&self.run.log_file, "run log_file")?;
        require_absolute(&self.lock_file(), "run lock_file")?;

        for (name, mode) in [
            ("dir_mode", self.permissions.dir_mode),
            ("file_mode", self.permissions.file_mode),
            ("writable_dir_mode", self.permissions.writable_dir_mode),
            ("writable_file_mode", self.permissions.writable_file_mode),
        ] {
            if mode > 0o7777 {
                return Err(config_error(&format!(
                    "permissions {} {:o} is not a valid file mode",
                    name, mode
                )));
            }
        }
        for dir in &self.permissions.writable_dirs {
            let escapes = dir
                .components()
                .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
            if escapes || dir.as_os_str().is_empty() {
                return Err(config_error(&format!(
                    "writable dir \"{}\" must be a relative path inside the web root",
                    dir.display()
                )));
            }
        }
        for pattern in &self.mirror.exclude {
            require_non_empty(pattern, "mirror exclude pattern")?;
        }

        Ok(())
    }

    pub fn lock_file(&self) -> PathBuf {
        self.run
            .lock_file
            .clone()
            .unwrap_or_else(|| self.destination.scratch_dir.join(".site-pull-sync.lock"))
    }
}

/// Accepts `UTC`, `Z` or a fixed offset such as `+02:00` / `-0530`.
pub fn parse_timezone(value: &str) -> Result<FixedOffset> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("utc") || trimmed == "Z" {
        return Ok(utc());
    }

    let (sign, rest) = match trimmed.chars().next() {
        Some('+') => (1, &trimmed[1..]),
        Some('-') => (-1, &trimmed[1..]),
        _ => {
            return Err(config_error(&format!(
                "timezone \"{}\" must be UTC or an offset like +02:00",
                value
            )))
        }
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(config_error(&format!("timezone \"{}\" is malformed", value)));
    }
    let hours: i32 = digits[..2].parse().context("timezone hours")?;
    let minutes: i32 = digits[2..].parse().context("timezone minutes")?;
    if hours > 23 || minutes > 59 {
        return Err(config_error(&format!("timezone \"{}\" is out of range", value)));
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .ok_or_else(|| config_error(&format!("timezone \"{}\" is out of range", value)))
}

pub fn utc() -> FixedOffset {
    Utc.fix()
}

fn require_non_empty(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(config_error(&format!("{} must not be empty", what)));
    }
    Ok(())
}

fn require_absolute(path: &Path, what: &str) -> Result<()> {
    if !path.is_absolute() {
        return Err(config_error(&format!(
            "{} must be an absolute path, got {}",
            what,
            path.display()
        )));
    }
    Ok(())
}

fn config_error(msg: &str) -> anyhow::Error {
    SyncError::Configuration(msg.to_string()).into()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE: &str = r#"
[source]
domain = "shop.example.com"
site_user = "shop"
database_name = "shop_prod"

[destination]
domain = "staging.shop.example.com"
site_user = "staging"
database_password = "s3cret"

[ssh]
host = "203.0.113.10"
user = "root"
port = 2222

[run]
restart_policy = "stop_start"
timezone = "+02:00"
log_file = "/var/log/site-pull-sync.log"
"#;

    pub(crate) fn sample_config() -> Config {
        Config::from_toml_str(SAMPLE).unwrap()
    }

    #[test]
    fn test_database_fields_default_to_site_user() {
        let config = sample_config();
        assert_eq!(config.source.database_name, "shop_prod");
        assert_eq!(config.source.database_user, "shop");
        assert_eq!(config.destination.database_name, "staging");
        assert_eq!(config.destination.database_user, "staging");
    }

    #[test]
    fn test_paths_default_under_site_home() {
        let config = sample_config();
        assert_eq!(
            config.destination.web_root,
            PathBuf::from("/home/staging/htdocs/staging.shop.example.com")
        );
        assert_eq!(
            config.source.scratch_dir,
            PathBuf::from("/home/shop/scripts")
        );
        assert_eq!(
            config.lock_file(),
            PathBuf::from("/home/staging/scripts/.site-pull-sync.lock")
        );
    }

    #[test]
    fn test_recreate_without_password_is_rejected() {
        let raw = SAMPLE.replace("database_password = \"s3cret\"", "database_password = \"  \"");
        let err = Config::from_toml_str(&raw).unwrap_err();
        let sync_err = err.downcast_ref::<SyncError>().unwrap();
        assert!(matches!(sync_err, SyncError::Configuration(_)));
        assert!(err.to_string().contains("database_password"));
    }

    #[test]
    fn test_log_target_is_known_before_validation() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.toml");
        let raw = SAMPLE
            .replace("database_password = \"s3cret\"\n", "")
            .replace("/var/log/site-pull-sync.log", "/var/log/staging-sync.log");
        std::fs::write(&path, raw).unwrap();

        let file = ConfigFile::read(&path).unwrap();
        let (log_file, offset) = file.log_target();
        assert_eq!(log_file, PathBuf::from("/var/log/staging-sync.log"));
        assert_eq!(offset.local_minus_utc(), 7200);

        let err = Config::from_file(file).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::Configuration(_))
        ));
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_log_target_survives_bad_timezone() {
        let raw = SAMPLE.replace("\"+02:00\"", "\"Europe/Berlin\"");
        let file: ConfigFile = toml::from_str(&raw).unwrap();
        let (log_file, offset) = file.log_target();
        assert_eq!(log_file, PathBuf::from("/var/log/site-pull-sync.log"));
        assert_eq!(offset, utc());
        assert!(Config::from_file(file).is_err());
    }

    #[test]
    fn test_unparseable_file_has_no_log_target() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[source\ndomain = ").unwrap();
        let err = ConfigFile::read(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::Configuration(_))
        ));
    }

    #[test]
    fn test_truncate_does_not_need_password() {
        let raw = SAMPLE
            .replace("database_password = \"s3cret\"", "")
            .replace("[run]", "[run]\ndatabase_policy = \"truncate\"");
        let config = Config::from_toml_str(&raw).unwrap();
        assert_eq!(config.run.database_policy, DatabasePolicy::Truncate);
    }

    #[test]
    fn test_unknown_restart_policy_is_rejected() {
        let raw = SAMPLE.replace("\"stop_start\"", "\"reload\"");
        assert!(Config::from_toml_str(&raw).is_err());
    }

    #[test]
    fn test_ssh_defaults() {
        let raw = SAMPLE.replace("port = 2222\n", "");
        let config = Config::from_toml_str(&raw).unwrap();
        assert_eq!(config.ssh.port, 22);
        assert!(config.ssh.batch_mode);
        assert_eq!(config.ssh.connect_timeout_secs, 10);
    }

    #[test]
    fn test_relative_writable_dir_required() {
        let raw = format!("{}\n[permissions]\nwritable_dirs = [\"/tmp\"]\n", SAMPLE);
        assert!(Config::from_toml_str(&raw).is_err());
    }

    #[test]
    fn test_writable_dir_cannot_leave_web_root() {
        for dir in ["../..", "application/../../etc", ""] {
            let raw = format!("{}\n[permissions]\nwritable_dirs = [\"{}\"]\n", SAMPLE, dir);
            let err = Config::from_toml_str(&raw).unwrap_err();
            assert!(
                matches!(err.downcast_ref::<SyncError>(), Some(SyncError::Configuration(_))),
                "{} was accepted",
                dir
            );
        }
        let raw = format!(
            "{}\n[permissions]\nwritable_dirs = [\"application/cache\", \"./uploads\"]\n",
            SAMPLE
        );
        assert!(Config::from_toml_str(&raw).is_ok());
    }

    #[test]
    fn test_default_excludes_keep_destination_config() {
        let config = sample_config();
        for pattern in [
            "/application/cache/",
            "/application/logs/",
            "/application/config/database.php",
            "/application/config/config.php",
            ".env",
        ] {
            assert!(
                config.mirror.exclude.iter().any(|p| p == pattern),
                "{} is not excluded",
                pattern
            );
        }
        assert_eq!(
            config.permissions.writable_dirs,
            vec![
                PathBuf::from("application/cache"),
                PathBuf::from("application/logs"),
                PathBuf::from("application/sessions"),
            ]
        );
    }

    #[test]
    fn test_parse_timezone() {
        assert_eq!(parse_timezone("UTC").unwrap().local_minus_utc(), 0);
        assert_eq!(parse_timezone("+02:00").unwrap().local_minus_utc(), 7200);
        assert_eq!(parse_timezone("-0530").unwrap().local_minus_utc(), -19800);
        assert!(parse_timezone("Europe/Berlin").is_err());
        assert!(parse_timezone("+25:00").is_err());
    }

    #[test]
    fn test_password_is_not_debug_printed() {
        let config = sample_config();
        let rendered = format!("{:?}", config.destination);
        assert!(!rendered.contains("s3cret"));
    }
}
