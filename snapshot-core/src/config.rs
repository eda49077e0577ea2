use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const API_KEY_VAR: &str = "OPENWEATHER_API_KEY";
pub const CITY_VAR: &str = "CITY";
pub const STORAGE_CONNECTION_VAR: &str = "AzureWebJobsStorage";

pub const DEFAULT_CITY: &str = "Sao Paulo,BR";

/// Everything one invocation of the job needs, resolved once at process entry.
#[derive(Clone, PartialEq, Eq)]
pub struct JobConfig {
    pub api_key: Option<String>,
    pub city: String,
    pub storage_connection: Option<String>,
    /// Overrides the OpenWeather endpoint, e.g. for a proxy.
    pub weather_endpoint: Option<String>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            city: DEFAULT_CITY.to_string(),
            storage_connection: None,
            weather_endpoint: None,
        }
    }
}

// Secrets stay out of logs and panics.
impl std::fmt::Debug for JobConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("city", &self.city)
            .field("storage_connection", &self.storage_connection.as_ref().map(|_| "<redacted>"))
            .field("weather_endpoint", &self.weather_endpoint)
            .finish()
    }
}

impl JobConfig {
    /// Resolve from the process environment layered over `file`.
    pub fn from_env(file: &FileConfig) -> Self {
        Self::resolve(file, |name| std::env::var(name).ok())
    }

    /// Environment wins over the file, the file wins over defaults.
    /// Empty values count as unset.
    pub fn resolve<F>(file: &FileConfig, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |var: &str, from_file: &Option<String>| {
            non_empty(env(var)).or_else(|| non_empty(from_file.clone()))
        };

        Self {
            api_key: pick(API_KEY_VAR, &file.api_key),
            city: pick(CITY_VAR, &file.city).unwrap_or_else(|| DEFAULT_CITY.to_string()),
            storage_connection: pick(STORAGE_CONNECTION_VAR, &file.storage_connection),
            weather_endpoint: non_empty(file.weather_endpoint.clone()),
        }
    }

    /// Replace the city when a non-empty override is given.
    pub fn with_city(mut self, city: Option<String>) -> Self {
        if let Some(city) = non_empty(city) {
            self.city = city;
        }
        self
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Optional configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// api_key = "..."
/// city = "Curitiba,BR"
/// storage_connection = "DefaultEndpointsProtocol=https;AccountName=...;AccountKey=..."
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct FileConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_connection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather_endpoint: Option<String>,
}

impl FileConfig {
    /// Load config from the platform config directory, or an empty default if absent.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: FileConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Like [`FileConfig::load`], but an unreadable or malformed file only costs a warning.
    pub fn load_or_default() -> Self {
        Self::or_default(Self::load())
    }

    pub fn load_from_or_default(path: &Path) -> Self {
        Self::or_default(Self::load_from(path))
    }

    fn or_default(loaded: Result<Self>) -> Self {
        loaded.unwrap_or_else(|e| {
            tracing::warn!("Ignoring config file: {e:#}");
            Self::default()
        })
    }

    /// Save config to the platform config directory.
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_file_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save config, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-snapshot", "weather-snapshot")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let cfg = JobConfig::resolve(&FileConfig::default(), env_of(&[]));

        assert_eq!(cfg, JobConfig::default());
        assert_eq!(cfg.city, "Sao Paulo,BR");
        assert!(cfg.api_key.is_none());
        assert!(cfg.storage_connection.is_none());
    }

    #[test]
    fn env_wins_over_file() {
        let file = FileConfig {
            api_key: Some("FILE_KEY".into()),
            city: Some("Recife,BR".into()),
            storage_connection: Some("file-conn".into()),
            weather_endpoint: None,
        };
        let cfg = JobConfig::resolve(
            &file,
            env_of(&[(API_KEY_VAR, "ENV_KEY"), (CITY_VAR, "Manaus,BR")]),
        );

        assert_eq!(cfg.api_key.as_deref(), Some("ENV_KEY"));
        assert_eq!(cfg.city, "Manaus,BR");
        assert_eq!(cfg.storage_connection.as_deref(), Some("file-conn"));
    }

    #[test]
    fn empty_values_count_as_unset() {
        let cfg = JobConfig::resolve(
            &FileConfig::default(),
            env_of(&[(API_KEY_VAR, ""), (CITY_VAR, "  "), (STORAGE_CONNECTION_VAR, "")]),
        );

        assert!(cfg.api_key.is_none());
        assert!(cfg.storage_connection.is_none());
        assert_eq!(cfg.city, DEFAULT_CITY);
    }

    #[test]
    fn city_override_applies_only_when_non_empty() {
        let cfg = JobConfig::default().with_city(Some("Belem,BR".into()));
        assert_eq!(cfg.city, "Belem,BR");

        let cfg = cfg.with_city(Some(String::new())).with_city(None);
        assert_eq!(cfg.city, "Belem,BR");
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let cfg = JobConfig {
            api_key: Some("SECRET_KEY".into()),
            storage_connection: Some("AccountKey=SECRET".into()),
            ..JobConfig::default()
        };
        let out = format!("{cfg:?}");

        assert!(!out.contains("SECRET"));
        assert!(out.contains("<redacted>"));
    }

    #[test]
    fn file_config_roundtrips_through_disk() {
        let dir = tempfile::tempdir().expect("failed to create temp dir for test");
        let path = dir.path().join("nested").join("config.toml");

        let cfg = FileConfig {
            api_key: Some("KEY".into()),
            city: Some("Natal,BR".into()),
            storage_connection: None,
            weather_endpoint: None,
        };
        cfg.save_to(&path).expect("save should succeed");

        let loaded = FileConfig::load_from(&path).expect("load should succeed");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = tempfile::tempdir().expect("failed to create temp dir for test");
        let loaded = FileConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded, FileConfig::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("failed to create temp dir for test");
        let path = dir.path().join("config.toml");
        fs::write(&path, "api_key = [not toml").unwrap();

        let err = FileConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn malformed_file_falls_back_to_environment() {
        let dir = tempfile::tempdir().expect("failed to create temp dir for test");
        let path = dir.path().join("config.toml");
        fs::write(&path, "api_key = [not toml").unwrap();

        let file = FileConfig::load_from_or_default(&path);
        assert_eq!(file, FileConfig::default());

        let cfg = JobConfig::resolve(
            &file,
            env_of(&[
                (API_KEY_VAR, "ENV_KEY"),
                (STORAGE_CONNECTION_VAR, "UseDevelopmentStorage=true"),
            ]),
        );
        assert_eq!(cfg.api_key.as_deref(), Some("ENV_KEY"));
        assert_eq!(cfg.storage_connection.as_deref(), Some("UseDevelopmentStorage=true"));
        assert_eq!(cfg.city, DEFAULT_CITY);
    }
}
