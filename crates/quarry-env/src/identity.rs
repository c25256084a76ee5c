//! Stable, filesystem-safe names for a project's environments.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use quarry_core::Version;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;

const MAX_NAME_LEN: usize = 42;
const HASH_LEN: usize = 8;
const FORBIDDEN: &[char] = &[' ', '$', '`', '!', '*', '@', '"', '\\', '\r', '\n', '\t'];

/// `<sanitized name>-<8 char path hash>`; same directory, same identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnvIdentity {
    pub sanitized_name: String,
    pub path_hash: String,
}

impl EnvIdentity {
    /// `name` is the project name, `project_dir` its canonical absolute directory.
    pub fn generate(name: &str, project_dir: &Path) -> Self {
        let sanitized_name = sanitize_name(name);
        let digest = Sha256::digest(project_dir.to_string_lossy().as_bytes());
        let encoded = URL_SAFE.encode(digest);
        Self {
            sanitized_name,
            path_hash: encoded[..HASH_LEN].to_string(),
        }
    }

    /// Directory name of the environment for `version`'s minor series.
    pub fn venv_name(&self, version: &Version) -> String {
        format!("{}-py{}.{}", self, version.major, version.minor)
    }

    /// Glob-style prefix shared by all of this project's environments.
    pub fn venv_prefix(&self) -> String {
        format!("{}-py", self)
    }
}

impl fmt::Display for EnvIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.sanitized_name, self.path_hash)
    }
}

/// Lowercase, replace shell-hostile characters with `_`, cap at 42 chars.
pub fn sanitize_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if FORBIDDEN.contains(&c) { '_' } else { c })
        .take(MAX_NAME_LEN)
        .collect()
}
