use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::backend::Vec3;
use crate::error::ConfigError;
use crate::sound_system::SoundType;

/// Upper bound on the channel pool; backends typically cap sources well below this
pub const MAX_POOL_SIZE: usize = 256;

const APP_DIR: &str = "SoundPool";

/// Where a loaded configuration came from. Loading runs before logging is
/// set up, so the caller reports this afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    Loaded(PathBuf),
    CreatedDefault(PathBuf),
}

impl std::fmt::Display for ConfigOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigOrigin::Loaded(path) => write!(f, "Loaded config from: {}", path.display()),
            ConfigOrigin::CreatedDefault(path) => write!(f, "Created default config at: {}", path.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedSoundEntry {
    pub sound: SoundType,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedSoundEntry {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenerConfig {
    pub position: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            forward: Vec3::FORWARD,
            up: Vec3::UP,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Number of anonymous pool channels
    pub pool_size: usize,

    /// Directory relative sound paths are resolved against
    #[serde(default)]
    pub asset_root: PathBuf,

    #[serde(default)]
    pub listener: ListenerConfig,

    /// Sounds addressed by built-in type
    #[serde(default)]
    pub typed_sounds: Vec<TypedSoundEntry>,

    /// Sounds addressed by free-form name
    #[serde(default)]
    pub named_sounds: Vec<NamedSoundEntry>,

    /// Dedicated sources created at startup
    #[serde(default)]
    pub named_sources: Vec<String>,

    /// Scheduler tick in milliseconds
    pub tick_ms: u64,

    /// Tracing filter used when RUST_LOG is unset
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool_size: 16,
            asset_root: PathBuf::new(),
            listener: ListenerConfig::default(),
            typed_sounds: SoundType::ALL
                .iter()
                .map(|&sound| TypedSoundEntry {
                    sound,
                    path: sound.default_asset_path(),
                })
                .collect(),
            named_sounds: Vec::new(),
            named_sources: Vec::new(),
            tick_ms: 16, // ~60 ticks per second
            log_filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the platform-specific config directory.
    /// Creates default config if file doesn't exist.
    pub fn load() -> Result<(Self, ConfigOrigin), ConfigError> {
        Self::load_or_create(&Self::config_path()?)
    }

    /// Load `path`, writing the default configuration there first if it does not exist.
    pub fn load_or_create(path: &Path) -> Result<(Self, ConfigOrigin), ConfigError> {
        if path.exists() {
            let config = Self::load_from(path)?;
            Ok((config, ConfigOrigin::Loaded(path.to_path_buf())))
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok((config, ConfigOrigin::CreatedDefault(path.to_path_buf())))
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let load_failed = |source: Box<dyn std::error::Error + Send + Sync>| ConfigError::LoadFailed {
            path: path.display().to_string(),
            source,
        };

        let content = fs::read_to_string(path).map_err(|e| load_failed(Box::new(e)))?;
        let config: Config = serde_json::from_str(&content).map_err(|e| load_failed(Box::new(e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to disk, creating the parent directory if needed
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |source: Box<dyn std::error::Error + Send + Sync>| ConfigError::SaveFailed {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| save_failed(Box::new(e)))?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|e| save_failed(Box::new(e)))?;
        fs::write(path, json).map_err(|e| save_failed(Box::new(e)))?;

        Ok(())
    }

    /// Get the config file path in the user config directory
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR).join("config.json"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Directory for rotated log files
    pub fn log_dir() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR).join("logs"))
            .unwrap_or_else(|| PathBuf::from("logs"))
    }

    /// Resolve a sound path against `asset_root`. Absolute paths are kept.
    pub fn sound_path(&self, path: &Path) -> PathBuf {
        self.asset_root.join(path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_size > MAX_POOL_SIZE {
            return Err(ConfigError::Invalid(format!(
                "pool_size {} exceeds maximum of {}",
                self.pool_size, MAX_POOL_SIZE
            )));
        }

        if self.tick_ms == 0 {
            return Err(ConfigError::Invalid("tick_ms must be positive".to_string()));
        }

        let mut seen = std::collections::HashSet::new();
        for entry in &self.typed_sounds {
            if !seen.insert(entry.sound) {
                return Err(ConfigError::Invalid(format!("sound type '{}' listed twice", entry.sound)));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for entry in &self.named_sounds {
            if !seen.insert(entry.name.as_str()) {
                return Err(ConfigError::Invalid(format!("sound '{}' listed twice", entry.name)));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for name in &self.named_sources {
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::Invalid(format!("source '{}' listed twice", name)));
            }
        }

        // Spatialization is undefined otherwise; the backend does not check
        let listener = &self.listener;
        if listener.forward.dot(listener.up).abs() > 1e-3 {
            tracing::warn!("Listener forward and up vectors are not perpendicular");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("sound_pool_config_{}_{}", name, std::process::id()))
            .join("config.json")
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.pool_size, 16);
        assert_eq!(config.tick_ms, 16);
        assert_eq!(config.typed_sounds.len(), 3);
        assert_eq!(config.listener.up, Vec3::UP);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_and_load() {
        let path = temp_config_path("roundtrip");
        let mut config = Config::default();
        config.pool_size = 4;
        config.named_sources.push("music".to_string());

        config.save_to(&path).unwrap();
        let loaded = Config::load_from(&path).unwrap();
        let _ = fs::remove_dir_all(path.parent().unwrap());

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_or_create_writes_default_once() {
        let path = temp_config_path("create");
        let _ = fs::remove_dir_all(path.parent().unwrap());

        let (created, origin) = Config::load_or_create(&path).unwrap();
        assert_eq!(origin, ConfigOrigin::CreatedDefault(path.clone()));
        assert_eq!(created, Config::default());
        assert!(path.exists());

        let (loaded, origin) = Config::load_or_create(&path).unwrap();
        let _ = fs::remove_dir_all(path.parent().unwrap());
        assert_eq!(origin, ConfigOrigin::Loaded(path.clone()));
        assert_eq!(loaded, created);
        assert!(origin.to_string().starts_with("Loaded config from"));
    }

    #[test]
    fn test_missing_optional_fields_use_defaults() {
        let json = r#"{ "pool_size": 2, "tick_ms": 10, "log_filter": "debug" }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.typed_sounds.is_empty());
        assert_eq!(config.listener, ListenerConfig::default());
    }

    #[test]
    fn test_validate_rejects_oversized_pool() {
        let config = Config {
            pool_size: MAX_POOL_SIZE + 1,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_duplicate_sources() {
        let config = Config {
            named_sources: vec!["a".to_string(), "a".to_string()],
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_missing_file_fails() {
        let result = Config::load_from(Path::new("/definitely/missing/config.json"));
        assert!(matches!(result, Err(ConfigError::LoadFailed { .. })));
    }

    #[test]
    fn test_sound_path_resolution() {
        let config = Config {
            asset_root: PathBuf::from("/opt/game"),
            ..Config::default()
        };
        assert_eq!(
            config.sound_path(Path::new("sfx/laser.wav")),
            PathBuf::from("/opt/game/sfx/laser.wav")
        );
        assert_eq!(config.sound_path(Path::new("/abs/x.wav")), PathBuf::from("/abs/x.wav"));
    }
}
