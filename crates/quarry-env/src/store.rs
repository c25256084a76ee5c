//! `envs.toml`: which environment each project explicitly selected.
//!
//! ```toml
//! [demo-abcdefgh]
//! minor = "3.7"
//! patch = "3.7.1"
//! ```
//!
//! Updates take an advisory lock on `envs.toml.lock` (unix) and replace the
//! file through a temp file + rename, so readers never see a torn document.

use crate::error::{EnvError, Result};
use crate::identity::EnvIdentity;
use quarry_core::Version;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const ENVS_FILE: &str = "envs.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveRecord {
    pub minor: String,
    pub patch: String,
}

impl ActiveRecord {
    pub fn for_version(version: &Version) -> Self {
        Self {
            minor: version.minor_text(),
            patch: version.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnvsFile {
    path: PathBuf,
}

impl EnvsFile {
    pub fn new(virtualenvs_path: &Path) -> Self {
        Self {
            path: virtualenvs_path.join(ENVS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whole document; a missing file reads as empty.
    pub fn read(&self) -> Result<toml::Table> {
        match fs::read_to_string(&self.path) {
            Ok(content) => content.parse::<toml::Table>().map_err(|e| EnvError::Store {
                path: self.path.clone(),
                detail: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(toml::Table::new()),
            Err(e) => Err(EnvError::io("Failed to read", &self.path, e)),
        }
    }

    pub fn record(&self, identity: &EnvIdentity) -> Result<Option<ActiveRecord>> {
        let doc = self.read()?;
        match doc.get(&identity.to_string()) {
            None => Ok(None),
            Some(value) => value
                .clone()
                .try_into::<ActiveRecord>()
                .map(Some)
                .map_err(|e| EnvError::Store {
                    path: self.path.clone(),
                    detail: format!("record {identity}: {e}"),
                }),
        }
    }

    /// Patch version of the active selection, if any.
    pub fn active_version(&self, identity: &EnvIdentity) -> Result<Option<Version>> {
        let Some(record) = self.record(identity)? else {
            return Ok(None);
        };
        Version::parse(&record.patch)
            .map(Some)
            .map_err(|e| EnvError::Store {
                path: self.path.clone(),
                detail: e.to_string(),
            })
    }

    pub fn write_active_version(&self, identity: &EnvIdentity, version: &Version) -> Result<()> {
        let record = ActiveRecord::for_version(version);
        let value = toml::Value::try_from(&record).map_err(|e| EnvError::Store {
            path: self.path.clone(),
            detail: e.to_string(),
        })?;
        self.update(|doc| {
            doc.insert(identity.to_string(), value);
        })
    }

    /// Remove the record; returns whether one existed.
    pub fn delete_active_version(&self, identity: &EnvIdentity) -> Result<bool> {
        let mut existed = false;
        self.update(|doc| {
            existed = doc.remove(&identity.to_string()).is_some();
        })?;
        Ok(existed)
    }

    fn update<F>(&self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut toml::Table),
    {
        let dir = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&dir).map_err(|e| EnvError::io("Failed to create", &dir, e))?;

        let _lock = lock(&self.path.with_extension("toml.lock"))?;
        let mut doc = self.read()?;
        mutate(&mut doc);
        let content = toml::to_string(&doc).map_err(|e| EnvError::Store {
            path: self.path.clone(),
            detail: e.to_string(),
        })?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| EnvError::io("Failed to create temp file in", &dir, e))?;
        tmp.write_all(content.as_bytes())
            .map_err(|e| EnvError::io("Failed to write", tmp.path().to_path_buf(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| EnvError::io("Failed to replace", &self.path, e.error))?;
        Ok(())
    }
}

#[cfg(unix)]
fn lock(path: &Path) -> Result<nix::fcntl::Flock<File>> {
    use nix::fcntl::{Flock, FlockArg};

    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .map_err(|e| EnvError::io("Failed to open", path, e))?;
    Flock::lock(file, FlockArg::LockExclusive)
        .map_err(|(_, errno)| EnvError::io("Failed to lock", path, std::io::Error::from(errno)))
}

#[cfg(not(unix))]
fn lock(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .map_err(|e| EnvError::io("Failed to open", path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> EnvIdentity {
        EnvIdentity {
            sanitized_name: "demo".into(),
            path_hash: "abcdefgh".into(),
        }
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let file = EnvsFile::new(&tmp.path().join("not-created-yet"));
        assert!(file.read().unwrap().is_empty());
        assert_eq!(file.active_version(&identity()).unwrap(), None);
    }

    #[test]
    fn test_write_then_read_record() {
        let tmp = tempfile::tempdir().unwrap();
        let file = EnvsFile::new(tmp.path());
        file.write_active_version(&identity(), &Version::new(3, 7, 1)).unwrap();

        let record = file.record(&identity()).unwrap().unwrap();
        assert_eq!(record.minor, "3.7");
        assert_eq!(record.patch, "3.7.1");
        assert_eq!(
            file.active_version(&identity()).unwrap(),
            Some(Version::new(3, 7, 1))
        );

        let raw = fs::read_to_string(tmp.path().join(ENVS_FILE)).unwrap();
        assert!(raw.contains("[demo-abcdefgh]"));
    }

    #[test]
    fn test_other_projects_are_preserved() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join(ENVS_FILE),
            "[other-12345678]\nminor = \"3.6\"\npatch = \"3.6.9\"\n",
        )
        .unwrap();
        let file = EnvsFile::new(tmp.path());
        file.write_active_version(&identity(), &Version::new(3, 8, 0)).unwrap();
        assert!(file.delete_active_version(&identity()).unwrap());

        let doc = file.read().unwrap();
        assert!(doc.contains_key("other-12345678"));
        assert!(!doc.contains_key("demo-abcdefgh"));
    }

    #[test]
    fn test_delete_without_record_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let file = EnvsFile::new(tmp.path());
        assert!(!file.delete_active_version(&identity()).unwrap());
    }

    #[test]
    fn test_concurrent_writers_keep_both_records() {
        let tmp = tempfile::tempdir().unwrap();
        let other = EnvIdentity {
            sanitized_name: "other".into(),
            path_hash: "12345678".into(),
        };

        std::thread::scope(|s| {
            for (identity, version) in [
                (identity(), Version::new(3, 7, 1)),
                (other.clone(), Version::new(3, 9, 4)),
            ] {
                let dir = tmp.path();
                s.spawn(move || {
                    let file = EnvsFile::new(dir);
                    for _ in 0..50 {
                        file.write_active_version(&identity, &version).unwrap();
                    }
                });
            }
        });

        let file = EnvsFile::new(tmp.path());
        let demo = file.record(&identity()).unwrap().unwrap();
        assert_eq!((demo.minor.as_str(), demo.patch.as_str()), ("3.7", "3.7.1"));
        let other = file.record(&other).unwrap().unwrap();
        assert_eq!((other.minor.as_str(), other.patch.as_str()), ("3.9", "3.9.4"));
    }

    #[test]
    fn test_corrupt_file_is_store_error() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join(ENVS_FILE), "[[[ not toml").unwrap();
        let file = EnvsFile::new(tmp.path());
        assert!(matches!(file.read(), Err(EnvError::Store { .. })));
    }
}
