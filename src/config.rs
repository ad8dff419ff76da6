//! Configuration management for Linkwatch using the prefer crate.
//!
//! Settings come from, in increasing priority: built-in defaults, a config
//! file (explicit `--config`, next to the data directory, or discovered by
//! prefer), the `--data` flag, and environment variables.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::checker::{CheckerSettings, DEFAULT_MAX_BODY_BYTES};
use crate::http_client::resolve_user_agent;
use crate::models::{clamp_http_timeout, DEFAULT_HTTP_TIMEOUT_SECS};
use crate::rate_limit::DEFAULT_MANUAL_CHECKS_PER_MINUTE;
use crate::repository::DbContext;
use crate::services::alerts::{LogMailer, Mailer, SendmailMailer};

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "linkwatch.db";

/// Default number of concurrent check workers.
pub const DEFAULT_WORKERS: usize = 8;

/// How alert emails are delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailerKind {
    /// Log emails instead of sending them.
    #[default]
    Log,
    /// Pipe emails to the local sendmail binary.
    Sendmail,
}

impl MailerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Sendmail => "sendmail",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "log" => Some(Self::Log),
            "sendmail" => Some(Self::Sendmail),
            _ => None,
        }
    }
}

impl prefer::FromValue for MailerKind {
    fn from_value(value: &prefer::ConfigValue) -> prefer::Result<Self> {
        match value.as_str() {
            Some(s) => Self::from_str(s).ok_or_else(|| prefer::Error::ConversionError {
                key: String::new(),
                type_name: "MailerKind".to_string(),
                source: format!("unknown mailer: {}", s).into(),
            }),
            None => Err(prefer::Error::ConversionError {
                key: String::new(),
                type_name: "MailerKind".to_string(),
                source: "expected string".into(),
            }),
        }
    }
}

/// Notification settings section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, prefer::FromValue)]
pub struct NotificationsConfig {
    #[serde(default)]
    #[prefer(default)]
    pub mailer: MailerKind,
    /// Sender address for alert emails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mail_from: Option<String>,
}

impl NotificationsConfig {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename.
    pub database_filename: String,
    /// Database URL (overrides data_dir/database_filename if set).
    pub database_url: Option<String>,
    /// Resolved user agent for page fetches.
    pub user_agent: String,
    /// Fetch timeout in seconds for backlinks without an owner.
    pub request_timeout: u64,
    /// Pages larger than this are treated as unreachable.
    pub max_body_bytes: usize,
    /// Concurrent workers for batch checks.
    pub workers: usize,
    /// Manual checks allowed per user per minute.
    pub manual_checks_per_minute: u32,
    pub mailer: MailerKind,
    pub mail_from: String,
}

impl Default for Settings {
    fn default() -> Self {
        // Documents dir -> Home dir -> Current dir
        let data_dir = dirs::document_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("linkwatch");

        Self {
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            database_url: None,
            user_agent: resolve_user_agent(None),
            request_timeout: DEFAULT_HTTP_TIMEOUT_SECS,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            workers: DEFAULT_WORKERS,
            manual_checks_per_minute: DEFAULT_MANUAL_CHECKS_PER_MINUTE,
            mailer: MailerKind::default(),
            mail_from: "linkwatch@localhost".to_string(),
        }
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            ..Default::default()
        }
    }

    /// Get the database URL, constructing from path if not explicitly set.
    pub fn database_url(&self) -> String {
        if let Some(ref url) = self.database_url {
            url.clone()
        } else {
            format!("sqlite:{}", self.database_path().display())
        }
    }

    /// Get the full path to the database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    /// Check if the database appears to be initialized.
    pub fn database_exists(&self) -> bool {
        match self.database_url {
            Some(ref url) => {
                let path = url
                    .strip_prefix("sqlite://")
                    .or_else(|| url.strip_prefix("sqlite:"))
                    .unwrap_or(url);
                Path::new(path).exists()
            }
            None => self.database_path().exists(),
        }
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        tracing::debug!("data_dir check: path={}", self.data_dir.display());
        fs::create_dir_all(&self.data_dir).map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create data directory '{}': {}",
                    self.data_dir.display(),
                    e
                ),
            )
        })
    }

    /// Create a database context using the configured database URL or path.
    pub fn create_db_context(&self) -> DbContext {
        DbContext::from_url(&self.database_url())
    }

    /// Fetch settings for the checker.
    pub fn checker_settings(&self) -> CheckerSettings {
        CheckerSettings {
            timeout: Duration::from_secs(clamp_http_timeout(self.request_timeout)),
            user_agent: self.user_agent.clone(),
            max_body_bytes: self.max_body_bytes,
        }
    }

    /// Build the configured mailer, falling back to logging when sendmail
    /// is unavailable.
    pub fn build_mailer(&self) -> Arc<dyn Mailer> {
        match self.mailer {
            MailerKind::Log => Arc::new(LogMailer),
            MailerKind::Sendmail => match SendmailMailer::new(self.mail_from.clone()) {
                Ok(mailer) => Arc::new(mailer),
                Err(e) => {
                    tracing::warn!("{}; alert emails will only be logged", e);
                    Arc::new(LogMailer)
                }
            },
        }
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, prefer::FromValue)]
pub struct Config {
    /// Data directory path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Database filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// User agent string, or "impersonate".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
    /// Maximum page size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_body_bytes: Option<usize>,
    /// Concurrent check workers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    /// Manual checks allowed per user per minute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_checks_per_minute: Option<u32>,
    /// Alert delivery settings.
    #[serde(default, skip_serializing_if = "NotificationsConfig::is_default")]
    #[prefer(default)]
    pub notifications: NotificationsConfig,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    #[prefer(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    pub async fn load() -> Self {
        match prefer::load("linkwatch").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => Self::load_from_path(path).await.unwrap_or_else(|e| {
                    tracing::warn!("{}", e);
                    Self::default()
                }),
                None => Self::default(),
            },
            // No config file found
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e))?,
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e))?,
            _ => serde_json::from_str(&contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e))?,
        };

        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Directory of the config file, if loaded from one.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved relative to `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = self.resolve_path(data_dir, base_dir);
        }
        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
        if self.user_agent.is_some() {
            settings.user_agent = resolve_user_agent(self.user_agent.as_deref());
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = clamp_http_timeout(timeout);
        }
        if let Some(max) = self.max_body_bytes {
            settings.max_body_bytes = max;
        }
        if let Some(workers) = self.workers {
            settings.workers = workers.max(1);
        }
        if let Some(quota) = self.manual_checks_per_minute {
            settings.manual_checks_per_minute = quota.max(1);
        }
        settings.mailer = self.notifications.mailer;
        if let Some(ref from) = self.notifications.mail_from {
            settings.mail_from = from.clone();
        }
    }

    /// Compute SHA-256 hash of the serialized config.
    pub fn hash(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Use CWD for relative paths instead of config file directory.
    pub use_cwd: bool,
    /// Data directory or database file (--data flag).
    pub data: Option<PathBuf>,
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    }
}

fn is_db_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == "db" || ext == "sqlite" || ext == "sqlite3")
        || (path.exists() && path.is_file())
}

/// Split a `--data` value into (data directory, database filename).
fn resolve_data_path(path: &Path) -> (PathBuf, Option<String>) {
    let path = absolute(path);
    if is_db_file(&path) {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(DEFAULT_DATABASE_FILENAME)
            .to_string();
        let dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
        (dir, Some(filename))
    } else {
        (path, None)
    }
}

/// Look for a config file next to the database.
fn find_config_next_to_db(data_dir: &Path) -> Option<PathBuf> {
    let extensions = ["json", "yaml", "yml", "toml"];
    let basenames = ["linkwatch", "config"];

    for basename in basenames {
        for ext in extensions {
            let path = data_dir.join(format!("{}.{}", basename, ext));
            if path.exists() {
                return Some(path);
            }
        }
    }
    None
}

async fn load_file_config(options: &LoadOptions, data_dir: Option<&Path>) -> Config {
    // Priority 1: Explicit --config flag
    if let Some(ref config_path) = options.config_path {
        return Config::load_from_path(config_path)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("{}", e);
                Config::default()
            });
    }

    // Priority 2: Config next to data dir
    if let Some(config_path) = data_dir.and_then(find_config_next_to_db) {
        tracing::debug!("Found config next to data dir: {}", config_path.display());
        return Config::load_from_path(&config_path)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("{}", e);
                Config::default()
            });
    }

    // Priority 3: Auto-discover via prefer
    Config::load().await
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

/// Apply environment variable overrides, which take highest precedence.
fn apply_env_overrides(settings: &mut Settings) {
    if let Some(url) = env_var("DATABASE_URL") {
        if url.starts_with("sqlite:") || !url.contains("://") {
            tracing::debug!("Using DATABASE_URL from environment: {}", url);
            settings.database_url = Some(url);
        } else {
            tracing::warn!("Ignoring DATABASE_URL {}: only SQLite is supported", url);
        }
    }
    if let Some(agent) = env_var("LINKWATCH_USER_AGENT") {
        settings.user_agent = resolve_user_agent(Some(&agent));
    }
    if let Some(workers) = env_var("LINKWATCH_WORKERS") {
        match workers.parse::<usize>() {
            Ok(n) => settings.workers = n.max(1),
            Err(_) => tracing::warn!("Ignoring invalid LINKWATCH_WORKERS: {}", workers),
        }
    }
}

/// Load settings with explicit options.
/// Returns (Settings, Config) tuple.
pub async fn load_settings_with_options(options: LoadOptions) -> (Settings, Config) {
    let data = options.data.as_deref().map(resolve_data_path);

    let config = load_file_config(&options, data.as_ref().map(|(dir, _)| dir.as_path())).await;

    let mut settings = Settings::default();

    let base_dir = if options.use_cwd {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    } else {
        config
            .base_dir()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    };

    config.apply_to_settings(&mut settings, &base_dir);

    // --data takes precedence over the config file
    if let Some((dir, filename)) = data {
        settings.data_dir = dir;
        if let Some(filename) = filename {
            settings.database_filename = filename;
        }
    }

    apply_env_overrides(&mut settings);

    (settings, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_resolve_data_path() {
        let (dir, file) = resolve_data_path(Path::new("/srv/links/custom.db"));
        assert_eq!(dir, PathBuf::from("/srv/links"));
        assert_eq!(file.as_deref(), Some("custom.db"));

        let (dir, file) = resolve_data_path(Path::new("/srv/links"));
        assert_eq!(dir, PathBuf::from("/srv/links"));
        assert_eq!(file, None);
    }

    #[test]
    fn test_database_url_from_path() {
        let settings = Settings::with_data_dir(PathBuf::from("/srv/links"));
        assert_eq!(settings.database_url(), "sqlite:/srv/links/linkwatch.db");
    }

    #[tokio::test]
    async fn test_load_toml_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("linkwatch.toml");
        std::fs::write(
            &path,
            r#"
data_dir = "./data"
request_timeout = 500
workers = 0

[notifications]
mailer = "sendmail"
mail_from = "alerts@example.com"
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, dir.path());

        assert_eq!(settings.data_dir, dir.path().join("./data"));
        assert_eq!(settings.request_timeout, 120);
        assert_eq!(settings.workers, 1);
        assert_eq!(settings.mailer, MailerKind::Sendmail);
        assert_eq!(settings.mail_from, "alerts@example.com");
    }

    #[tokio::test]
    async fn test_load_yaml_and_bad_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("linkwatch.yaml");
        std::fs::write(&path, "user_agent: \"MyBot/1.0\"\nmax_body_bytes: 1024\n").unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, dir.path());
        assert_eq!(settings.user_agent, "MyBot/1.0");
        assert_eq!(settings.max_body_bytes, 1024);
        assert_eq!(settings.mailer, MailerKind::Log);

        let bad = dir.path().join("broken.json");
        std::fs::write(&bad, "{ not json").unwrap();
        assert!(Config::load_from_path(&bad).await.is_err());
    }

    #[tokio::test]
    async fn test_config_next_to_data_dir() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("linkwatch.json"), r#"{"workers": 3}"#).unwrap();

        let options = LoadOptions {
            data: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let (settings, config) = load_settings_with_options(options).await;
        assert_eq!(config.workers, Some(3));
        assert_eq!(settings.data_dir, dir.path());
    }

    #[test]
    fn test_config_hash_is_stable() {
        let config = Config {
            workers: Some(4),
            ..Default::default()
        };
        assert_eq!(config.hash(), config.clone().hash());
        assert_ne!(config.hash(), Config::default().hash());
    }
}
