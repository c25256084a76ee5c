//! Environment variable loading.
//!
//! Keeps the fallback chains in one place so command code never calls
//! `std::env::var` with an `or_else` ladder of its own.

use std::collections::{BTreeMap, HashMap};
use std::env;
use std::ffi::OsString;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Load `.env` from the current directory (never overrides variables already set).
pub fn load_dotenv() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let dir = env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from("."));
        load_dotenv_from_dir(&dir);
    });
}

/// Load `.env` from `dir`. Lines are `KEY=value`; `#` starts a comment,
/// surrounding quotes are stripped.
pub fn load_dotenv_from_dir(dir: &Path) {
    let Ok(content) = std::fs::read_to_string(dir.join(".env")) else {
        return;
    };
    for (key, value) in parse_dotenv(&content) {
        if env::var_os(&key).is_none() {
            set_env_var(&key, &value);
        }
    }
}

fn parse_dotenv(content: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some(eq_pos) = line.find('=') else {
            continue;
        };
        let key = line[..eq_pos].trim();
        let mut value = line[eq_pos + 1..].trim();
        // Strip inline comment (# not inside quotes)
        if let Some(hash_pos) = value.find('#') {
            let before_hash = value[..hash_pos].trim_end();
            if !before_hash.contains('"') && !before_hash.contains('\'') {
                value = before_hash;
            }
        }
        if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            value = &value[1..value.len() - 1];
        }
        if !key.is_empty() {
            pairs.push((key.to_string(), value.to_string()));
        }
    }
    pairs
}

/// Read the primary variable or the first alias that is set; empty counts as unset.
pub fn env_or<F>(primary: &str, aliases: &[&str], default: F) -> String
where
    F: FnOnce() -> String,
{
    env_optional(primary, aliases).unwrap_or_else(default)
}

/// Like [`env_or`] but returns `None` when nothing (non-empty) is set.
pub fn env_optional(primary: &str, aliases: &[&str]) -> Option<String> {
    env::var(primary)
        .ok()
        .or_else(|| aliases.iter().find_map(|a| env::var(a).ok()))
        .and_then(|s| {
            let s = s.trim().to_string();
            if s.is_empty() {
                None
            } else {
                Some(s)
            }
        })
}

/// Boolean variable: 0/false/no/off are false, anything else set is true.
pub fn env_bool(primary: &str, aliases: &[&str], default: bool) -> bool {
    match env_optional(primary, aliases) {
        Some(s) => parse_bool(&s),
        None => default,
    }
}

pub fn parse_bool(value: &str) -> bool {
    !matches!(
        value.trim().to_lowercase().as_str(),
        "0" | "false" | "no" | "off" | ""
    )
}

// ─── Centralized env::set_var / remove_var wrappers ─────────────────────────
//
// Every mutation of the process environment goes through these functions or
// through `ScopedEnv`. Callers must not mutate the environment while other
// threads read it; `ScopedEnv` holds a process-wide lock for its lifetime.

#[allow(unsafe_code)]
pub fn set_env_var(key: &str, value: &str) {
    unsafe { env::set_var(key, value) };
}

#[allow(unsafe_code)]
pub fn remove_env_var(key: &str) {
    unsafe { env::remove_var(key) };
}

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// RAII guard: snapshots the whole process environment on creation and puts
/// it back exactly on drop, whatever happened in between.
///
/// Guards must not be nested on the same thread (the lock is not reentrant).
pub struct ScopedEnv {
    saved: Vec<(OsString, OsString)>,
    _lock: MutexGuard<'static, ()>,
}

impl ScopedEnv {
    pub fn new() -> Self {
        let lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Self {
            saved: env::vars_os().collect(),
            _lock: lock,
        }
    }

    pub fn set(&self, key: &str, value: &str) -> &Self {
        set_env_var(key, value);
        self
    }

    pub fn unset(&self, key: &str) -> &Self {
        remove_env_var(key);
        self
    }
}

impl Default for ScopedEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ScopedEnv {
    #[allow(unsafe_code)]
    fn drop(&mut self) {
        // Only touch what changed, so untouched variables such as PATH are
        // never briefly missing.
        let saved: HashMap<&OsString, &OsString> =
            self.saved.iter().map(|(k, v)| (k, v)).collect();
        for (key, _) in env::vars_os() {
            if !saved.contains_key(&key) {
                unsafe { env::remove_var(&key) };
            }
        }
        for (key, value) in &self.saved {
            if env::var_os(key).as_ref() != Some(value) {
                unsafe { env::set_var(key, value) };
            }
        }
    }
}

/// Immutable snapshot of environment variables, taken once per invocation
/// and handed to whatever needs to inspect the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvVars {
    vars: BTreeMap<String, String>,
}

impl EnvVars {
    /// Snapshot the current process environment (non-UTF-8 entries are skipped).
    pub fn from_process() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Value if set and non-empty.
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.trim().is_empty())
    }

    pub fn is_truthy(&self, key: &str) -> bool {
        self.get(key).map(parse_bool).unwrap_or(false)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.vars.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvVars {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}
