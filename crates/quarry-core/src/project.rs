//! Project manifest lookup (`pyproject.toml`).

use crate::constraint::{parse_constraint, Constraint, ConstraintParseError};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const MANIFEST_FILE: &str = "pyproject.toml";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Could not find a {MANIFEST_FILE} file in {0} or its parents")]
    NotFound(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{path} does not declare a project name ([tool.quarry] name or [project] name)")]
    MissingName { path: PathBuf },

    #[error("Invalid python constraint in {path}: {source}")]
    Constraint {
        path: PathBuf,
        #[source]
        source: ConstraintParseError,
    },
}

#[derive(Debug, Default, Deserialize)]
struct Manifest {
    #[serde(default)]
    project: Option<ProjectTable>,
    #[serde(default)]
    tool: Option<ToolTable>,
}

#[derive(Debug, Default, Deserialize)]
struct ProjectTable {
    name: Option<String>,
    #[serde(rename = "requires-python")]
    requires_python: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ToolTable {
    quarry: Option<QuarryTable>,
}

#[derive(Debug, Default, Deserialize)]
struct QuarryTable {
    name: Option<String>,
    #[serde(default)]
    dependencies: Option<toml::Table>,
}

/// The project whose environments are being managed.
#[derive(Debug, Clone)]
pub struct Project {
    pub name: String,
    /// Canonical absolute directory containing the manifest.
    pub root: PathBuf,
    pub manifest: PathBuf,
    /// Python requirement as written (`*` when absent).
    pub python_versions: String,
    pub python_constraint: Constraint,
}

impl Project {
    /// Walk up from `start` to the first directory holding a manifest.
    pub fn discover(start: &Path) -> Result<Self, ManifestError> {
        let start = start.canonicalize().unwrap_or_else(|_| start.to_path_buf());
        let manifest = start
            .ancestors()
            .map(|dir| dir.join(MANIFEST_FILE))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| ManifestError::NotFound(start.clone()))?;
        Self::load(&manifest)
    }

    pub fn load(manifest: &Path) -> Result<Self, ManifestError> {
        tracing::debug!("Loading project manifest {}", manifest.display());
        let content = std::fs::read_to_string(manifest).map_err(|source| ManifestError::Read {
            path: manifest.to_path_buf(),
            source,
        })?;
        let parsed: Manifest = toml::from_str(&content).map_err(|source| ManifestError::Parse {
            path: manifest.to_path_buf(),
            source,
        })?;

        let quarry = parsed.tool.and_then(|t| t.quarry);
        let project = parsed.project.unwrap_or_default();

        let name = quarry
            .as_ref()
            .and_then(|q| q.name.clone())
            .or(project.name)
            .ok_or_else(|| ManifestError::MissingName {
                path: manifest.to_path_buf(),
            })?;

        let python_versions = quarry
            .as_ref()
            .and_then(|q| q.dependencies.as_ref())
            .and_then(|deps| deps.get("python"))
            .and_then(|v| v.as_str().map(str::to_string))
            .or(project.requires_python)
            .unwrap_or_else(|| "*".to_string());
        let python_constraint =
            parse_constraint(&python_versions).map_err(|source| ManifestError::Constraint {
                path: manifest.to_path_buf(),
                source,
            })?;

        let root = manifest
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let root = root.canonicalize().unwrap_or(root);

        Ok(Self {
            name,
            manifest: root.join(MANIFEST_FILE),
            root,
            python_versions,
            python_constraint,
        })
    }

    /// In-project virtualenv location.
    pub fn in_project_venv(&self) -> PathBuf {
        self.root.join(".venv")
    }
}
