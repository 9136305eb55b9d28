//! Configuration Loader
//!
//! Environment-aware loading on top of the `config` crate. Sources, lowest
//! precedence first:
//!
//! 1. `NotifierConfig::default()`
//! 2. the TOML file (`NOTIFIER_CONFIG_PATH`, else `config/notifier.toml` if present)
//! 3. its environment sibling, e.g. `config/notifier.production.toml` (optional)
//! 4. `NOTIFIER__<SECTION>__<KEY>` environment variables

use super::error::{ConfigResult, ConfigurationError};
use super::NotifierConfig;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub const CONFIG_PATH_VAR: &str = "NOTIFIER_CONFIG_PATH";
pub const ENVIRONMENT_VAR: &str = "NOTIFIER_ENV";
pub const DEFAULT_CONFIG_PATH: &str = "config/notifier.toml";

const ENV_PREFIX: &str = "NOTIFIER";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug)]
pub struct ConfigManager {
    config: NotifierConfig,
    environment: String,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        let path = Self::default_config_path();
        Self::load_from_file_with_env(path.as_deref(), &environment)
    }

    /// Load from an explicit file (or none) and environment, reading overrides
    /// from the process environment
    pub fn load_from_file_with_env(
        path: Option<&Path>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        Self::build(path, environment, None)
    }

    /// Like [`load_from_file_with_env`](Self::load_from_file_with_env) but takes
    /// the override variables from `overrides` instead of the process
    /// environment. Useful for testing without mutating global state.
    pub fn load_with_overrides(
        path: Option<&Path>,
        environment: &str,
        overrides: config::Map<String, String>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        Self::build(path, environment, Some(overrides))
    }

    /// Wrap an already-built configuration after validating it
    pub fn from_config(config: NotifierConfig, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_path: None,
        }))
    }

    fn build(
        path: Option<&Path>,
        environment: &str,
        overrides: Option<config::Map<String, String>>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let defaults = config::Config::try_from(&NotifierConfig::default())
            .map_err(|e| ConfigurationError::load_error("defaults", e))?;
        let mut builder = config::Config::builder().add_source(defaults);

        if let Some(path) = path {
            if !path.is_file() {
                return Err(ConfigurationError::config_file_not_found(path));
            }
            debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );

            if let Some(env_path) = Self::environment_file(path, environment) {
                debug!(path = %env_path.display(), "Applying environment overrides file");
                builder = builder.add_source(
                    config::File::from(env_path)
                        .format(config::FileFormat::Toml)
                        .required(false),
                );
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator(ENV_SEPARATOR)
                .try_parsing(true)
                .source(overrides),
        );

        let config: NotifierConfig = builder
            .build()
            .and_then(|merged| merged.try_deserialize())
            .map_err(|e| {
                let source_name = path
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "defaults and environment".to_string());
                ConfigurationError::load_error(source_name, e)
            })?;

        config.validate()?;

        debug!(
            "Configuration loaded: {}",
            serde_json::to_string(&Self::sanitize_config_for_logging(&config))
                .unwrap_or_else(|_| "[serialization error]".to_string())
        );
        info!(
            environment = environment,
            max_attempts = config.worker.max_attempts,
            max_concurrent_jobs = config.worker.max_concurrent_jobs,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_path: path.map(Path::to_path_buf),
        }))
    }

    pub fn config(&self) -> &NotifierConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Configuration as JSON with credentials masked
    pub fn debug_config(&self) -> serde_json::Value {
        Self::sanitize_config_for_logging(&self.config)
    }

    fn sanitize_config_for_logging(config: &NotifierConfig) -> serde_json::Value {
        let mut config_json = serde_json::json!(config);
        let sensitive_patterns = ["password", "secret", "token", "url"];
        Self::sanitize_json_recursive(&mut config_json, &sensitive_patterns);
        config_json
    }

    fn sanitize_json_recursive(value: &mut serde_json::Value, sensitive_patterns: &[&str]) {
        match value {
            serde_json::Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    let key_lower = key.to_lowercase();
                    let is_sensitive = sensitive_patterns
                        .iter()
                        .any(|pattern| key_lower.contains(pattern));

                    if !is_sensitive {
                        Self::sanitize_json_recursive(val, sensitive_patterns);
                        continue;
                    }

                    *val = match val {
                        serde_json::Value::String(s) if s.is_empty() => {
                            serde_json::Value::String("[EMPTY]".to_string())
                        }
                        _ => serde_json::Value::String("[MASKED]".to_string()),
                    };
                }
            }
            serde_json::Value::Array(items) => {
                for item in items.iter_mut() {
                    Self::sanitize_json_recursive(item, sensitive_patterns);
                }
            }
            _ => {}
        }
    }

    /// `NOTIFIER_ENV`, defaulting to `development`
    pub fn detect_environment() -> String {
        env::var(ENVIRONMENT_VAR)
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    /// `NOTIFIER_CONFIG_PATH`, else the default path if that file exists
    pub fn default_config_path() -> Option<PathBuf> {
        if let Ok(path) = env::var(CONFIG_PATH_VAR) {
            return Some(PathBuf::from(path));
        }
        let path = PathBuf::from(DEFAULT_CONFIG_PATH);
        path.is_file().then_some(path)
    }

    /// `dir/notifier.toml` + `test` -> `dir/notifier.test.toml`
    fn environment_file(path: &Path, environment: &str) -> Option<PathBuf> {
        let stem = path.file_stem()?.to_str()?;
        let candidate = path.with_file_name(format!("{stem}.{environment}.toml"));
        candidate.is_file().then_some(candidate)
    }
}
