//! Configuration file I/O operations

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;

use super::EngineConfig;

impl EngineConfig {
    /// Get the global config directory path (~/.physio-quest/)
    pub fn global_config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".physio-quest")
    }

    /// Get the global config file path (~/.physio-quest/config.toml)
    pub fn global_config_path() -> PathBuf {
        Self::global_config_dir().join("config.toml")
    }

    /// Database location: configured path or ~/.physio-quest/engine.db
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| Self::global_config_dir().join("engine.db"))
    }

    /// Load and validate configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: EngineConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load from `path` if given, else the global config, else built-in defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        let global_path = Self::global_config_path();
        if global_path.exists() {
            return Self::from_file(&global_path);
        }
        Ok(Self::with_defaults())
    }

    /// Validate and write the configuration, replacing `path` atomically
    ///
    /// Fails instead of waiting when another process is writing the same
    /// directory's config.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        self.validate().context("Refusing to save an invalid config")?;
        let body = toml::to_string_pretty(self).context("Failed to serialize config")?;
        write_locked(path, format!("{CONFIG_HEADER}{body}").as_bytes())
    }
}

const CONFIG_HEADER: &str = "# Physio Quest engine configuration\n\n";
const LOCK_FILE_NAME: &str = ".config.lock";

/// Stage `bytes` beside `path` and rename over it under the directory lock
fn write_locked(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

    let lock_path = dir.join(LOCK_FILE_NAME);
    let lock = File::create(&lock_path)
        .with_context(|| format!("Failed to create lock file: {}", lock_path.display()))?;
    lock.try_lock_exclusive()
        .with_context(|| format!("Config {} is being written by another process", path.display()))?;

    let staged = path.with_extension(format!("tmp.{}", std::process::id()));
    let written = File::create(&staged)
        .and_then(|mut file| {
            file.write_all(bytes)?;
            file.sync_all()
        })
        .and_then(|()| std::fs::rename(&staged, path));
    if let Err(e) = written {
        let _ = std::fs::remove_file(&staged);
        return Err(e).with_context(|| format!("Failed to write config file: {}", path.display()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_reload_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = EngineConfig::with_defaults();
        config.save_to_file(&path).unwrap();

        let loaded = EngineConfig::from_file(&path).unwrap();
        assert_eq!(loaded.events.len(), config.events.len());
        assert_eq!(loaded.achievements, config.achievements);
        assert_eq!(loaded.quests, config.quests);
        assert_eq!(loaded.rewards, config.rewards);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with(CONFIG_HEADER));
        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .filter(|name| name.contains(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "staged files left behind: {leftovers:?}");
    }

    #[test]
    fn test_save_fails_while_another_writer_holds_the_lock() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = EngineConfig::with_defaults();
        config.save_to_file(&path).unwrap();

        let holder = File::create(dir.path().join(LOCK_FILE_NAME)).unwrap();
        holder.lock_exclusive().unwrap();

        let err = config.save_to_file(&path).unwrap_err();
        assert!(format!("{err:#}").contains("being written"));

        drop(holder);
        config.save_to_file(&path).unwrap();
        assert!(EngineConfig::from_file(&path).is_ok());
    }

    #[test]
    fn test_invalid_config_is_not_saved() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = EngineConfig::with_defaults();
        config.leveling.thresholds = vec![5, 10];

        assert!(config.save_to_file(&path).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_from_file_reports_invalid_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[leveling]\nthresholds = [5, 10]\n").unwrap();
        let err = EngineConfig::from_file(&path).unwrap_err();
        assert!(format!("{err:#}").contains("first level threshold"));
    }
}
