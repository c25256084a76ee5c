//! Configuration structs grouped by concern, loaded from environment variables.

use super::env_keys::{observability as obv_keys, paths, virtualenvs};
use super::loader::{env_bool, env_optional, env_or, parse_bool, EnvVars};
use std::path::PathBuf;

/// Cache directory configuration
#[derive(Debug, Clone)]
pub struct CacheConfig;

impl CacheConfig {
    /// Explicitly configured cache root, if any.
    pub fn cache_dir() -> Option<String> {
        super::loader::load_dotenv();
        env_optional(paths::QUARRY_CACHE_DIR, paths::CACHE_DIR_ALIASES)
    }

    /// Configured cache root, else the platform cache dir + `quarry`.
    pub fn resolved_cache_dir() -> PathBuf {
        Self::cache_dir().map(PathBuf::from).unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| {
                    dirs::home_dir()
                        .unwrap_or_else(|| PathBuf::from("."))
                        .join(".cache")
                })
                .join("quarry")
        })
    }
}

/// Virtualenv settings consumed by the environment manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvSettings {
    /// Directory holding every named virtualenv plus `envs.toml`.
    pub virtualenvs_path: PathBuf,
    /// When false, nothing is created and the system interpreter is used.
    pub create: bool,
    /// Use `<project>/.venv` instead of a named env under `virtualenvs_path`.
    pub in_project: bool,
}

impl EnvSettings {
    /// Resolve from an environment snapshot; `default_root` is used when no
    /// virtualenvs path is configured.
    pub fn from_vars(vars: &EnvVars, default_root: PathBuf) -> Self {
        let lookup = |primary: &str, aliases: &[&str]| {
            std::iter::once(primary)
                .chain(aliases.iter().copied())
                .find_map(|k| vars.non_empty(k))
                .map(|v| v.trim().to_string())
        };
        Self {
            virtualenvs_path: lookup(
                paths::QUARRY_VIRTUALENVS_PATH,
                paths::VIRTUALENVS_PATH_ALIASES,
            )
            .map(PathBuf::from)
            .unwrap_or(default_root),
            create: lookup(
                virtualenvs::QUARRY_VIRTUALENVS_CREATE,
                virtualenvs::CREATE_ALIASES,
            )
            .map(|v| parse_bool(&v))
            .unwrap_or(true),
            in_project: lookup(
                virtualenvs::QUARRY_VIRTUALENVS_IN_PROJECT,
                virtualenvs::IN_PROJECT_ALIASES,
            )
            .map(|v| parse_bool(&v))
            .unwrap_or(false),
        }
    }
}

/// Observability configuration: quiet, log_level, log_json
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub quiet: bool,
    pub log_level: String,
    pub log_json: bool,
}

impl ObservabilityConfig {
    pub fn from_env() -> &'static Self {
        use std::sync::OnceLock;
        static CACHE: OnceLock<ObservabilityConfig> = OnceLock::new();
        CACHE.get_or_init(|| {
            super::loader::load_dotenv();
            Self {
                quiet: env_bool(obv_keys::QUARRY_QUIET, obv_keys::QUIET_ALIASES, false),
                log_level: env_or(obv_keys::QUARRY_LOG_LEVEL, obv_keys::LOG_LEVEL_ALIASES, || {
                    "quarry=info".to_string()
                }),
                log_json: env_bool(obv_keys::QUARRY_LOG_JSON, obv_keys::LOG_JSON_ALIASES, false),
            }
        })
    }
}
