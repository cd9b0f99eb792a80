// ABOUTME: Serde data structures for the TOML configuration file
// ABOUTME: Optional fields are resolved into a concrete Environment by the loader

use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub source: EnvironmentConfig,
    pub destination: EnvironmentConfig,
    pub ssh: SshConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub mirror: MirrorConfig,
    #[serde(default)]
    pub permissions: PermissionConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentConfig {
    pub domain: String,
    pub site_user: String,
    pub database_name: Option<String>,
    pub database_user: Option<String>,
    pub database_password: Option<Secret>,
    pub web_root: Option<PathBuf>,
    pub scratch_dir: Option<PathBuf>,
}

/// A credential that never shows up in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Secret(***)")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SshConfig {
    pub host: String,
    pub user: Option<String>,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub batch_mode: bool,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabasePolicy {
    /// Drop the database and its user, then create both again.
    Recreate,
    /// Drop every table but keep the database and its user.
    Truncate,
}

impl fmt::Display for DatabasePolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DatabasePolicy::Recreate => write!(f, "recreate"),
            DatabasePolicy::Truncate => write!(f, "truncate"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartPolicy {
    Restart,
    StopStart,
    None,
}

impl fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RestartPolicy::Restart => write!(f, "restart"),
            RestartPolicy::StopStart => write!(f, "stop_start"),
            RestartPolicy::None => write!(f, "none"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    #[serde(default = "default_database_policy")]
    pub database_policy: DatabasePolicy,
    #[serde(default)]
    pub backup_before_overwrite: bool,
    #[serde(default = "default_true")]
    pub backup_failure_fatal: bool,
    #[serde(default = "default_restart_policy")]
    pub restart_policy: RestartPolicy,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    pub lock_file: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub verify_checksum: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            database_policy: default_database_policy(),
            backup_before_overwrite: false,
            backup_failure_fatal: true,
            restart_policy: default_restart_policy(),
            service_name: default_service_name(),
            timezone: default_timezone(),
            log_file: default_log_file(),
            lock_file: None,
            verify_checksum: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MirrorConfig {
    #[serde(default = "default_excludes")]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub delete_extraneous: bool,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            exclude: default_excludes(),
            delete_extraneous: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PermissionConfig {
    #[serde(default = "default_dir_mode")]
    pub dir_mode: u32,
    #[serde(default = "default_file_mode")]
    pub file_mode: u32,
    #[serde(default = "default_writable_dir_mode")]
    pub writable_dir_mode: u32,
    #[serde(default = "default_writable_file_mode")]
    pub writable_file_mode: u32,
    /// Paths relative to the destination web root that stay group-writable.
    #[serde(default = "default_writable_dirs")]
    pub writable_dirs: Vec<PathBuf>,
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            dir_mode: default_dir_mode(),
            file_mode: default_file_mode(),
            writable_dir_mode: default_writable_dir_mode(),
            writable_file_mode: default_writable_file_mode(),
            writable_dirs: default_writable_dirs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolsConfig {
    #[serde(default = "default_ssh")]
    pub ssh: String,
    #[serde(default = "default_rsync")]
    pub rsync: String,
    #[serde(default = "default_db_cli")]
    pub db_cli: String,
    #[serde(default = "default_sql_client")]
    pub sql_client: String,
    #[serde(default = "default_service_manager")]
    pub service_manager: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ssh: default_ssh(),
            rsync: default_rsync(),
            db_cli: default_db_cli(),
            sql_client: default_sql_client(),
            service_manager: default_service_manager(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_ssh_port() -> u16 {
    22
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_database_policy() -> DatabasePolicy {
    DatabasePolicy::Recreate
}

fn default_restart_policy() -> RestartPolicy {
    RestartPolicy::None
}

fn default_service_name() -> String {
    "mariadb".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_log_file() -> PathBuf {
    PathBuf::from("/var/log/site-pull-sync.log")
}

fn default_excludes() -> Vec<String> {
    [
        "/application/cache/",
        "/application/logs/",
        "/application/config/database.php",
        "/application/config/config.php",
        ".env",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_dir_mode() -> u32 {
    0o755
}

fn default_file_mode() -> u32 {
    0o644
}

fn default_writable_dir_mode() -> u32 {
    0o775
}

fn default_writable_file_mode() -> u32 {
    0o664
}

fn default_writable_dirs() -> Vec<PathBuf> {
    ["application/cache", "application/logs", "application/sessions"]
        .iter()
        .map(PathBuf::from)
        .collect()
}

fn default_ssh() -> String {
    "ssh".to_string()
}

fn default_rsync() -> String {
    "rsync".to_string()
}

fn default_db_cli() -> String {
    "clpctl".to_string()
}

fn default_sql_client() -> String {
    "mysql".to_string()
}

fn default_service_manager() -> String {
    "systemctl".to_string()
}
