//! Quarry configuration layer
//!
//! Every environment variable read happens here; command code works with the
//! structured configs instead of calling `std::env::var` directly.
//!
//! - `loader`: env_or, env_optional, env_bool, ScopedEnv, EnvVars
//! - `schema`: EnvSettings, CacheConfig, ObservabilityConfig
//! - `env_keys`: key constants (with `POETRY_*` fallbacks)

pub mod env_keys;
pub mod loader;
pub mod schema;

pub use loader::{
    env_bool, env_optional, env_or, load_dotenv, load_dotenv_from_dir, parse_bool,
    remove_env_var, set_env_var, EnvVars, ScopedEnv,
};
pub use schema::{CacheConfig, EnvSettings, ObservabilityConfig};
