//! Console configuration: built-in defaults, an optional TOML file and
//! `BINGOSHOP__*` environment overrides, layered with the `config` crate.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{error::ConsoleError, game::WinningPattern};

/// Directory under the platform config/data roots.
pub const APP_DIR: &str = "bingoshop";
/// Remote shop API used when nothing else is configured.
pub const DEFAULT_API_BASE_URL: &str = "https://gojoapi.onrender.com";
/// Shops run on East Africa Time.
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 3;

const ENV_PREFIX: &str = "BINGOSHOP";

const DEFAULT_CONFIG_TOML: &str = r#"# bingoshop console configuration.
# Every key may also be set through the environment, e.g.
#   BINGOSHOP__API_BASE_URL=https://example.com
#   BINGOSHOP__DEFAULTS__BET_PER_CARD=20

# api_base_url = "https://gojoapi.onrender.com"

# Hours east of UTC used for "today", "this week" and friends.
# utc_offset_hours = 3

# Where the session file and logs are kept.
# data_dir = "/home/me/.local/share/bingoshop"

[defaults]
# bet_per_card = 10.0
# interval_seconds = 4
# language = "Amharic"
# pattern = "All"
"#;

/// Runtime configuration for the console.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the shop API, without a trailing slash.
    pub api_base_url: String,
    /// Directory holding `session.json` and the log folder.
    pub data_dir: PathBuf,
    /// Offset of the shop's civil calendar from UTC, in hours.
    pub utc_offset_hours: i32,
    /// Starting values for a new game configuration.
    pub defaults: GameDefaults,
}

/// Initial values for the game-configuration builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameDefaults {
    /// Stake per selected card.
    pub bet_per_card: f64,
    /// Seconds between drawn numbers.
    pub interval_seconds: u32,
    /// Caller voice language.
    pub language: String,
    /// Winning pattern preselected on the game screen.
    pub pattern: WinningPattern,
}

impl Default for GameDefaults {
    fn default() -> Self {
        Self {
            bet_per_card: 10.0,
            interval_seconds: 4,
            language: "Amharic".to_string(),
            pattern: WinningPattern::All,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            data_dir: default_data_dir(),
            utc_offset_hours: DEFAULT_UTC_OFFSET_HOURS,
            defaults: GameDefaults::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default file location plus environment.
    pub fn load() -> Result<Self> {
        Self::load_from(config_path())
    }

    /// Load configuration layered over the given TOML file, which may be absent.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_layers(path.as_ref(), environment())
    }

    fn load_layers(path: &Path, environment: config::Environment) -> Result<Self> {
        let defaults = Self::default();
        let built = config::Config::builder()
            .set_default("api_base_url", defaults.api_base_url.clone())?
            .set_default(
                "data_dir",
                defaults.data_dir.to_string_lossy().into_owned(),
            )?
            .set_default("utc_offset_hours", i64::from(defaults.utc_offset_hours))?
            .set_default("defaults.bet_per_card", defaults.defaults.bet_per_card)?
            .set_default(
                "defaults.interval_seconds",
                i64::from(defaults.defaults.interval_seconds),
            )?
            .set_default("defaults.language", defaults.defaults.language.clone())?
            .set_default("defaults.pattern", defaults.defaults.pattern.label())?
            .add_source(
                config::File::from(path.to_path_buf())
                    .format(config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(environment)
            .build()
            .with_context(|| format!("failed to read configuration {}", path.display()))?;

        let mut loaded: AppConfig = built
            .try_deserialize()
            .context("failed to deserialize configuration")?;
        loaded.api_base_url = loaded.api_base_url.trim_end_matches('/').to_string();
        info!(api = %loaded.api_base_url, offset = loaded.utc_offset_hours, "Configuration loaded");
        Ok(loaded)
    }

    /// Fixed offset of the shop's civil calendar.
    pub fn shop_offset(&self) -> crate::error::Result<FixedOffset> {
        if self.utc_offset_hours.abs() > 23 {
            return Err(ConsoleError::Config(format!(
                "utc_offset_hours must be within -23..=23 (got {})",
                self.utc_offset_hours
            )));
        }
        FixedOffset::east_opt(self.utc_offset_hours * 3600).ok_or_else(|| {
            ConsoleError::Config(format!("invalid utc offset {}", self.utc_offset_hours))
        })
    }

    /// Location of the persisted session.
    pub fn session_path(&self) -> PathBuf {
        self.data_dir.join("session.json")
    }

    /// Directory receiving log files.
    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}

/// Default configuration file path under the user's config directory.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("config.toml")
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Write the commented default configuration if no file exists yet.
pub fn ensure_default_config() -> Result<()> {
    ensure_default_config_at(config_path())
}

/// Write the commented default configuration at `path` unless one is present.
pub fn ensure_default_config_at(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    fs::write(path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("failed to write default config {}", path.display()))?;
    info!(path = %path.display(), "Wrote default configuration");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// Environment layer fed from `vars` instead of the process environment.
    fn env_from(vars: &[(&str, &str)]) -> config::Environment {
        environment().source(Some(
            vars.iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        ))
    }

    #[test]
    fn default_file_loads_to_builtin_values() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("bingoshop/config.toml");
        ensure_default_config_at(&path)?;
        assert!(path.exists());

        let config = AppConfig::load_layers(&path, env_from(&[]))?;
        assert_eq!(config.utc_offset_hours, DEFAULT_UTC_OFFSET_HOURS);
        assert_eq!(config.defaults.interval_seconds, 4);
        assert_eq!(config.defaults.language, "Amharic");
        assert_eq!(config.defaults.pattern, WinningPattern::All);
        Ok(())
    }

    #[test]
    fn existing_file_is_not_overwritten() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.toml");
        fs::write(&path, "utc_offset_hours = 1\n")?;
        ensure_default_config_at(&path)?;
        assert_eq!(fs::read_to_string(&path)?, "utc_offset_hours = 1\n");
        Ok(())
    }

    #[test]
    fn file_values_override_defaults() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
api_base_url = "http://localhost:8000/"
utc_offset_hours = 0
data_dir = "/tmp/bingoshop-test"

[defaults]
bet_per_card = 25.0
pattern = "Full House"
"#,
        )?;

        let config = AppConfig::load_layers(&path, env_from(&[]))?;
        assert_eq!(config.api_base_url, "http://localhost:8000");
        assert_eq!(config.utc_offset_hours, 0);
        assert_eq!(config.defaults.bet_per_card, 25.0);
        assert_eq!(config.defaults.pattern, WinningPattern::FullHouse);
        assert_eq!(config.defaults.language, "Amharic");
        assert_eq!(
            config.session_path(),
            PathBuf::from("/tmp/bingoshop-test/session.json")
        );
        Ok(())
    }

    #[test]
    fn environment_overrides_file() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.toml");
        fs::write(&path, "utc_offset_hours = 0\n[defaults]\nlanguage = \"Oromo\"\n")?;

        let config = AppConfig::load_layers(
            &path,
            env_from(&[
                ("BINGOSHOP__UTC_OFFSET_HOURS", "2"),
                ("BINGOSHOP__API_BASE_URL", "http://127.0.0.1:8000/"),
            ]),
        )?;
        assert_eq!(config.utc_offset_hours, 2);
        assert_eq!(config.api_base_url, "http://127.0.0.1:8000");
        assert_eq!(config.defaults.language, "Oromo");
        Ok(())
    }

    #[test]
    fn rejects_out_of_range_offset() {
        let config = AppConfig {
            utc_offset_hours: 30,
            ..AppConfig::default()
        };
        assert!(matches!(
            config.shop_offset(),
            Err(ConsoleError::Config(_))
        ));

        let config = AppConfig::default();
        assert_eq!(
            config.shop_offset().map(|offset| offset.local_minus_utc()).ok(),
            Some(3 * 3600)
        );
    }
}
