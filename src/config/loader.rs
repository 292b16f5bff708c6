//! Configuration Loader
//!
//! Environment-aware configuration loading. Layers, lowest precedence first:
//!
//! 1. `geobatch.toml` in the configuration directory (required)
//! 2. `geobatch.<environment>.toml` next to it (optional)
//! 3. `GEOBATCH__SECTION__KEY` environment variables

use super::error::{ConfigResult, ConfigurationError};
use super::GeobatchConfig;
use crate::constants::{env_vars, CONFIG_FILE_STEM, DEFAULT_ENVIRONMENT};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Loaded, validated configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: GeobatchConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment.
    /// Useful for testing without touching global environment variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config_file = Self::find_config_file(&config_directory)?;
        let overlay = config_directory.join(format!("{CONFIG_FILE_STEM}.{environment}.toml"));
        let config = Self::build(&config_file, Some(&overlay))?;

        info!(
            environment = %environment,
            config_file = %config_file.display(),
            overwrite_output = config.workspace.overwrite_output,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Load a single explicit file (plus environment variable overrides)
    pub fn load_file(path: &Path) -> ConfigResult<Arc<ConfigManager>> {
        if !path.is_file() {
            return Err(ConfigurationError::ConfigFileNotFound {
                searched_paths: vec![path.to_path_buf()],
            });
        }

        let config = Self::build(path, None)?;
        let config_directory = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration, validating it first
    pub fn from_config(config: GeobatchConfig, environment: &str) -> ConfigResult<ConfigManager> {
        config.validate()?;
        Ok(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: PathBuf::from("."),
        })
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &GeobatchConfig {
        &self.config
    }

    /// Get the current environment
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Get the configuration directory
    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Configuration as JSON, for `geobatch validate --show`
    pub fn debug_config(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or(serde_json::Value::Null)
    }

    fn build(config_file: &Path, overlay: Option<&Path>) -> ConfigResult<GeobatchConfig> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from(config_file.to_path_buf()).required(true));

        if let Some(overlay) = overlay {
            if overlay.exists() {
                debug!("Applying environment overlay: {}", overlay.display());
            }
            builder = builder.add_source(config::File::from(overlay.to_path_buf()).required(false));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(env_vars::CONFIG_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigurationError::parse_error(config_file.display().to_string(), e))?;

        let config: GeobatchConfig = settings
            .try_deserialize()
            .map_err(|e| ConfigurationError::parse_error(config_file.display().to_string(), e))?;

        config.validate()?;
        Ok(config)
    }

    /// Detect current environment from environment variables
    pub fn detect_environment() -> String {
        env::var(env_vars::ENVIRONMENT)
            .unwrap_or_else(|_| DEFAULT_ENVIRONMENT.to_string())
            .to_lowercase()
    }

    fn default_config_directory() -> PathBuf {
        if let Ok(dir) = env::var(env_vars::CONFIG_DIR) {
            return PathBuf::from(dir);
        }
        PathBuf::from("config")
    }

    fn find_config_file(config_directory: &Path) -> ConfigResult<PathBuf> {
        let mut searched_paths = Vec::new();

        for extension in ["toml", "yaml", "yml", "json"] {
            let config_path = config_directory.join(format!("{CONFIG_FILE_STEM}.{extension}"));
            searched_paths.push(config_path.clone());

            if config_path.is_file() {
                debug!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        Err(ConfigurationError::ConfigFileNotFound { searched_paths })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const BASE: &str = r#"
[workspace]
root = "/data/scratch.gdb"
overwrite_output = true

[veg_summary]
points = "SBI_LB_points"
vegetation = "SBI_VegMap_2010"
case_field = "alliance_draft1"
spreadsheet_dir = "/data/xls"
"#;

    #[test]
    fn loads_base_file_and_environment_overlay() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("geobatch.toml"), BASE).unwrap();
        fs::write(
            dir.path().join("geobatch.test.toml"),
            "[workspace]\noverwrite_output = false\n",
        )
        .unwrap();

        let manager =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
                .unwrap();

        assert_eq!(manager.environment(), "test");
        assert!(!manager.config().workspace.overwrite_output);
        let veg = manager.config().veg_summary.as_ref().unwrap();
        assert_eq!(veg.id_field, "ident");
        assert_eq!(veg.buffer_distance, "125 METERS");
    }

    #[test]
    fn missing_file_reports_searched_paths() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
            .unwrap_err();

        match err {
            ConfigurationError::ConfigFileNotFound { searched_paths } => {
                assert_eq!(searched_paths.len(), 4);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn invalid_section_fails_validation_at_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geobatch.toml");
        fs::write(
            &path,
            "[zone_sort]\nroot = \"/data\"\nzones = []\n",
        )
        .unwrap();

        let err = ConfigManager::load_file(&path).unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingRequiredField { ref field, .. } if field == "zones"));
    }
}
