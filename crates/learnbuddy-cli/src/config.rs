//! Configuration file management for learnbuddy.
//!
//! Provides a TOML-based config file at `~/.config/learnbuddy/config.toml`
//! and a resolution chain: CLI flag > env var > config file > default.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use learnbuddy_core::Identity;
use learnbuddy_db::config::DbConfig;

pub const USER_ENV: &str = "LEARNBUDDY_USER";
pub const DATA_DIR_ENV: &str = "LEARNBUDDY_DATA_DIR";
pub const CLAUDE_BIN_ENV: &str = "LEARNBUDDY_CLAUDE_BIN";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    pub identity: IdentitySection,
    pub storage: StorageSection,
    pub generation: GenerationSection,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentitySection {
    /// Signed-in user. Absent means tasks live in the local snapshot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claude_binary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the learnbuddy config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/learnbuddy` or
/// `~/.config/learnbuddy`, also on macOS.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("learnbuddy");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("learnbuddy")
}

/// Return the path to the learnbuddy config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Default directory for the local task snapshot.
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("learnbuddy"))
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file at `path`. `Ok(None)` if it does not exist.
pub fn load_config_at(path: &Path) -> Result<Option<ConfigFile>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e)
                .with_context(|| format!("failed to read config file at {}", path.display()));
        }
    };
    let config = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(Some(config))
}

/// Serialize and write the config file at `path`, creating parent dirs as
/// needed. Sets file permissions to 0600 on Unix.
pub fn save_config_at(path: &Path, config: &ConfigFile) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config directory {}", dir.display()))?;
    }

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

pub fn save_config(config: &ConfigFile) -> Result<()> {
    save_config_at(&config_path(), config)
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Values given as global CLI flags.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub database_url: Option<String>,
    pub user: Option<String>,
    pub data_dir: Option<PathBuf>,
}

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct LearnbuddyConfig {
    pub db_config: DbConfig,
    pub user: Option<Identity>,
    pub data_dir: PathBuf,
    pub claude_binary: String,
    pub model: Option<String>,
}

impl LearnbuddyConfig {
    /// Resolve configuration from flags, the environment and the config file.
    pub fn resolve(overrides: &Overrides) -> Result<Self> {
        let file = load_config_at(&config_path())?.unwrap_or_default();
        Self::resolve_with(overrides, file)
    }

    /// Resolve against an already loaded config file.
    ///
    /// - DB URL: flag > `LEARNBUDDY_DATABASE_URL` > `[database] url` > `DbConfig::DEFAULT_URL`
    /// - User: flag > `LEARNBUDDY_USER` > `[identity] user` > signed out
    /// - Data dir: flag > `LEARNBUDDY_DATA_DIR` > `[storage] data_dir` > platform data dir
    /// - Claude binary: `LEARNBUDDY_CLAUDE_BIN` > `[generation] claude_binary` > `claude`
    pub fn resolve_with(overrides: &Overrides, file: ConfigFile) -> Result<Self> {
        let db_url = overrides
            .database_url
            .clone()
            .or_else(|| env_var(DbConfig::ENV_VAR))
            .or(file.database.url)
            .unwrap_or_else(|| DbConfig::DEFAULT_URL.to_owned());

        let user = match overrides
            .user
            .clone()
            .or_else(|| env_var(USER_ENV))
            .or(file.identity.user)
        {
            Some(raw) => match Identity::new(&raw) {
                Some(identity) => Some(identity),
                None => bail!("user id must not be blank"),
            },
            None => None,
        };

        let data_dir = match overrides
            .data_dir
            .clone()
            .or_else(|| env_var(DATA_DIR_ENV).map(PathBuf::from))
            .or(file.storage.data_dir)
            .or_else(default_data_dir)
        {
            Some(dir) => dir,
            None => bail!(
                "cannot determine a data directory; pass --data-dir or set {DATA_DIR_ENV}"
            ),
        };

        let claude_binary = env_var(CLAUDE_BIN_ENV)
            .or(file.generation.claude_binary)
            .unwrap_or_else(|| "claude".to_owned());

        Ok(Self {
            db_config: DbConfig::new(db_url),
            user,
            data_dir,
            claude_binary,
            model: file.generation.model,
        })
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
