use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::plugins::{AllocationStrategy, DynamicLoader, Factory};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub plugins: PluginsConfig,
    #[serde(default)]
    pub driver: DriverConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// Directories searched for plugin libraries, in order
    #[serde(default = "default_search_paths")]
    pub search_paths: Vec<PathBuf>,

    /// Keep loaded modules between constructions
    #[serde(default)]
    pub cache_modules: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Name given to every constructed animal
    #[serde(default = "default_constructor_arg")]
    pub constructor_arg: String,

    #[serde(default)]
    pub strategy: AllocationStrategy,

    /// Plugins to load when none are given on the command line
    #[serde(default)]
    pub plugins: Vec<String>,
}

// Default value functions
fn default_search_paths() -> Vec<PathBuf> {
    vec![PathBuf::from(".")]
}

fn default_constructor_arg() -> String {
    "Modrobradi".to_string()
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            search_paths: default_search_paths(),
            cache_modules: false,
        }
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            constructor_arg: default_constructor_arg(),
            strategy: AllocationStrategy::default(),
            plugins: Vec::new(),
        }
    }
}

impl PluginsConfig {
    /// Factory loading plugins from the configured search paths
    #[must_use]
    pub fn factory(&self) -> Factory {
        Factory::new(DynamicLoader::with_search_paths(self.search_paths.iter().cloned()))
            .with_cache(self.cache_modules)
    }
}

impl Config {
    /// Load configuration from default location
    pub fn load_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;

        let config: Config =
            serde_yaml::from_str(&contents).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = serde_yaml::to_string(self).context("Failed to serialize config")?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        fs::write(path.as_ref(), contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Get default configuration path
    pub fn default_config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Failed to get home directory")?;

        Ok(home.join(".menagerie").join("config.yaml"))
    }
}
