//! Environment lifecycle: which interpreter a project runs in, and the
//! virtualenvs that back it.
//!
//! Selection precedence for [`EnvManager::get`], first match wins:
//!
//! 1. no explicit selection and an external env is active (`VIRTUAL_ENV`,
//!    or a non-`base` conda env)
//! 2. the in-project `.venv`
//! 3. the named env for the selected version (or the host's version)
//! 4. the host interpreter

use crate::builder::SandboxBuilder;
use crate::error::{EnvError, Result};
use crate::identity::EnvIdentity;
use crate::info_log;
use crate::probe::Probe;
use crate::runtime::{Env, HostRuntime, Runtime, SandboxRuntime};
use crate::store::EnvsFile;
use quarry_core::config::env_keys::external;
use quarry_core::config::{EnvSettings, EnvVars};
use quarry_core::{parse_constraint, Project, Version, VersionConstraint};
use std::path::{Path, PathBuf};

/// Interpreter series tried by the compatible-interpreter search.
pub const AVAILABLE_PYTHONS: &[&str] = &[
    "2", "2.7", "3", "3.4", "3.5", "3.6", "3.7", "3.8", "3.9", "3.10", "3.11", "3.12", "3.13",
];

/// Search order: the 3 series first, more specific names first, then newest.
pub fn candidate_order() -> Vec<&'static str> {
    let mut candidates = AVAILABLE_PYTHONS.to_vec();
    candidates.sort_by_key(|c| {
        std::cmp::Reverse((
            c.starts_with('3'),
            c.len(),
            Version::parse(c).unwrap_or(Version::new(0, 0, 0)),
        ))
    });
    candidates
}

/// `3.9` → `python3.9`, `3` → `python3`; anything that is not a version is
/// taken to be an executable name or path already.
pub fn exec_or_version_to_exec(exec_or_version: &str) -> String {
    match Version::parse(exec_or_version) {
        Ok(version) if version.precision > 1 => {
            format!("python{}.{}", version.major, version.minor)
        }
        Ok(version) => format!("python{}", version.major),
        Err(_) => exec_or_version.to_string(),
    }
}

pub struct EnvManager {
    project: Project,
    settings: EnvSettings,
    vars: EnvVars,
    probe: Box<dyn Probe>,
    builder: Box<dyn SandboxBuilder>,
    identity: EnvIdentity,
    store: EnvsFile,
    env: Option<Env>,
}

impl EnvManager {
    pub fn new(
        project: Project,
        settings: EnvSettings,
        vars: EnvVars,
        probe: Box<dyn Probe>,
        builder: Box<dyn SandboxBuilder>,
    ) -> Self {
        let identity = EnvIdentity::generate(&project.name, &project.root);
        let store = EnvsFile::new(&settings.virtualenvs_path);
        Self {
            project,
            settings,
            vars,
            probe,
            builder,
            identity,
            store,
            env: None,
        }
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn settings(&self) -> &EnvSettings {
        &self.settings
    }

    pub fn identity(&self) -> &EnvIdentity {
        &self.identity
    }

    pub fn vars(&self) -> &EnvVars {
        &self.vars
    }

    /// Select the interpreter named by `executable_or_version` for this
    /// project, building or rebuilding its env as needed.
    pub fn activate(&mut self, executable_or_version: &str) -> Result<Env> {
        let python = exec_or_version_to_exec(executable_or_version);
        self.env = None;
        if self.settings.in_project {
            self.activate_in_project(&python)?;
        } else {
            self.activate_named(&python)?;
        }
        let env = self.get()?;
        self.env = Some(env.clone());
        Ok(env)
    }

    fn activate_in_project(&mut self, python: &str) -> Result<()> {
        let version = self.probe.python_version(python)?;
        let venv = self.project.in_project_venv();
        // One directory holds every version, so any drift means a rebuild.
        let recreate = venv.exists()
            && match self.probe.python_version(&SandboxRuntime::new(&venv).python()) {
                Ok(current) => current != version,
                Err(e) => {
                    tracing::debug!("Could not probe {}: {}", venv.display(), e);
                    true
                }
            };
        self.create_venv(Some(python), recreate)?;
        Ok(())
    }

    fn activate_named(&mut self, python: &str) -> Result<()> {
        let version = self.probe.python_version(python)?;
        let recreate = self
            .active_version()?
            .map(|active| active.same_minor(&version) && !active.same_patch(&version))
            .unwrap_or(false);
        if !self.venv_path(&version).exists() || recreate {
            self.create_venv(Some(python), true)?;
        }
        self.store.write_active_version(&self.identity, &version)
    }

    /// Forget the explicit selection. The env directory stays on disk.
    pub fn deactivate(&mut self) -> Result<()> {
        self.env = None;
        if let Some(active) = self.active_version()? {
            info_log!(
                "Deactivating virtualenv: {}",
                self.venv_path(&active).display()
            );
            self.store.delete_active_version(&self.identity)?;
        }
        Ok(())
    }

    /// The environment this project currently runs in.
    pub fn get(&self) -> Result<Env> {
        let active = self.active_version()?;

        let env_prefix = self
            .vars
            .non_empty(external::VIRTUAL_ENV)
            .or_else(|| self.vars.non_empty(external::CONDA_PREFIX));
        let conda_base = self.vars.get(external::CONDA_DEFAULT_ENV) == Some("base");
        if active.is_none() && !conda_base {
            if let Some(prefix) = env_prefix {
                return Ok(SandboxRuntime::new(prefix).into());
            }
        }

        let root_venv = self.project.in_project_venv();
        if root_venv.is_dir() {
            return Ok(SandboxRuntime::new(root_venv).into());
        }

        let version = match active {
            Some(version) => Some(version),
            None => match self.probe.host() {
                Ok(host) => Some(host.version()),
                Err(e) if e.is_probe_failure() => {
                    tracing::debug!("No host interpreter: {}", e);
                    None
                }
                Err(e) => return Err(e),
            },
        };
        if let Some(version) = version {
            let venv = self.venv_path(&version);
            if self.settings.create && venv.exists() {
                return Ok(SandboxRuntime::new(venv).into());
            }
        }

        self.host()
    }

    /// This project's named envs, ordered by name.
    pub fn list(&self) -> Result<Vec<Env>> {
        let prefix = self.identity.venv_prefix();
        let entries = match std::fs::read_dir(&self.settings.virtualenvs_path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(EnvError::io(
                    "Failed to read",
                    &self.settings.virtualenvs_path,
                    e,
                ))
            }
        };
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_dir()
                    && path
                        .file_name()
                        .map(|n| n.to_string_lossy().starts_with(&prefix))
                        .unwrap_or(false)
            })
            .collect();
        paths.sort();
        Ok(paths
            .into_iter()
            .map(|p| SandboxRuntime::new(p).into())
            .collect())
    }

    /// Delete the env named by its directory name, a version or an executable.
    pub fn remove(&mut self, name_or_executable_or_version: &str) -> Result<Env> {
        let (venv, version) = if name_or_executable_or_version
            .starts_with(&self.identity.to_string())
        {
            self.find_venv_by_name(name_or_executable_or_version)?
        } else {
            self.find_venv_by_executable_or_version(name_or_executable_or_version)?
        };

        if let Some(active) = self.active_version()? {
            if active.same_minor(&version) {
                self.store.delete_active_version(&self.identity)?;
            }
        }

        self.env = None;
        self.builder.remove(venv.path())?;
        Ok(venv)
    }

    fn find_venv_by_name(&self, name: &str) -> Result<(Env, Version)> {
        for venv in self.list()? {
            let matches = venv
                .path()
                .file_name()
                .map(|n| n.to_string_lossy() == name)
                .unwrap_or(false);
            if matches {
                let version = match version_from_venv_name(name) {
                    Some(version) => version,
                    None => venv.version()?,
                };
                return Ok((venv, version));
            }
        }
        Err(EnvError::UnknownEnv {
            name: name.to_string(),
        })
    }

    fn find_venv_by_executable_or_version(&self, requested: &str) -> Result<(Env, Version)> {
        let executable = exec_or_version_to_exec(requested);
        let version = self.probe.python_version(&executable)?;
        let venv = self.venv_path(&version);
        if !venv.exists() {
            return Err(EnvError::UnknownEnv {
                name: venv
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            });
        }
        Ok((SandboxRuntime::new(venv).into(), version))
    }

    /// Make sure the project has an environment, creating one when allowed.
    pub fn create_venv(&mut self, executable: Option<&str>, force_recreate: bool) -> Result<Env> {
        if let Some(env) = &self.env {
            if !force_recreate {
                return Ok(env.clone());
            }
        }

        if !force_recreate {
            match self.get() {
                // Already inside a virtualenv.
                Ok(env) if env.is_venv() => return Ok(env),
                Ok(_) => {}
                Err(e) if e.is_probe_failure() => {
                    tracing::debug!("No current environment: {}", e);
                }
                Err(e) => return Err(e),
            }
        }

        let (executable, version) = self.select_python_executable(executable)?;
        let venv = if self.settings.in_project {
            self.project.in_project_venv()
        } else {
            self.venv_path(&version)
        };
        let name = venv
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if !venv.exists() {
            if !self.settings.create {
                tracing::warn!("Skipping virtualenv creation, as specified in config file.");
                return self.host();
            }
            info_log!("Creating virtualenv {} in {}", name, venv.display());
            self.builder.build(&venv, executable.as_deref())?;
        } else if force_recreate {
            info_log!("Recreating virtualenv {} in {}", name, venv.display());
            self.builder.remove(&venv)?;
            self.builder.build(&venv, executable.as_deref())?;
        } else {
            tracing::debug!("Virtualenv {} already exists.", name);
        }

        let env: Env = SandboxRuntime::new(venv).into();
        self.env = Some(env.clone());
        Ok(env)
    }

    /// The interpreter to build with, and its version. `None` means the host.
    pub fn select_python_executable(
        &self,
        executable: Option<&str>,
    ) -> Result<(Option<String>, Version)> {
        let constraint = &self.project.python_constraint;
        if let Some(executable) = executable {
            let version = self.probe.python_version(executable)?;
            if !constraint.allows(&version) {
                return Err(EnvError::NoCompatiblePython {
                    expected: self.project.python_versions.clone(),
                    given: Some(version),
                });
            }
            return Ok((Some(executable.to_string()), version));
        }

        let version = self.probe.host()?.version();
        if constraint.allows(&version) {
            return Ok((None, version));
        }
        tracing::warn!(
            "The currently activated Python version {} is not supported by the project ({}).\n\
             Trying to find and use a compatible version.",
            version,
            self.project.python_versions
        );
        match self.find_compatible_python()? {
            Some((executable, version)) => Ok((Some(executable), version)),
            None => Err(EnvError::NoCompatiblePython {
                expected: self.project.python_versions.clone(),
                given: None,
            }),
        }
    }

    /// First candidate whose probed version the project allows.
    pub fn find_compatible_python(&self) -> Result<Option<(String, Version)>> {
        let constraint = &self.project.python_constraint;
        for candidate in candidate_order() {
            let possible = if candidate.len() == 1 {
                parse_constraint(&format!("^{candidate}.0"))
                    .map(|series| series.allows_any(constraint))
                    .unwrap_or(false)
            } else {
                parse_constraint(&format!("{candidate}.*"))
                    .map(|series| constraint.allows_all(&series))
                    .unwrap_or(false)
            };
            if !possible {
                continue;
            }

            let executable = format!("python{candidate}");
            tracing::debug!("Trying {}", executable);
            let version = match self.probe.python_version(&executable) {
                Ok(version) => version,
                Err(e) if e.is_probe_failure() => continue,
                Err(e) => return Err(e),
            };

            if constraint.allows(&version) {
                info_log!("Using {} ({})", executable, version);
                return Ok(Some((executable, version)));
            }
        }
        Ok(None)
    }

    /// Patch version of the explicit selection, if there is one.
    pub fn active_version(&self) -> Result<Option<Version>> {
        self.store.active_version(&self.identity)
    }

    pub fn venv_path(&self, version: &Version) -> PathBuf {
        self.settings
            .virtualenvs_path
            .join(self.identity.venv_name(version))
    }

    pub fn virtualenvs_path(&self) -> &Path {
        &self.settings.virtualenvs_path
    }

    fn host(&self) -> Result<Env> {
        Ok(HostRuntime::new(self.probe.host()?).into())
    }
}

/// `demo-abcdefgh-py3.7` → `3.7`
fn version_from_venv_name(name: &str) -> Option<Version> {
    name.rsplit_once("-py")
        .and_then(|(_, version)| Version::parse(version).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::HostInterpreter;
    use crate::runtime::RuntimeKind;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    #[derive(Default)]
    struct ScriptedProbe {
        versions: HashMap<String, Version>,
        host_version: Vec<u64>,
        no_host: bool,
        tried: Rc<RefCell<Vec<String>>>,
    }

    impl ScriptedProbe {
        fn new(host_version: &[u64]) -> Self {
            Self {
                host_version: host_version.to_vec(),
                ..Default::default()
            }
        }

        fn with(mut self, executable: &str, version: Version) -> Self {
            self.versions.insert(executable.to_string(), version);
            self
        }

        /// Nothing named `python3` or `python` on PATH.
        fn without_host() -> Self {
            Self {
                no_host: true,
                ..Default::default()
            }
        }
    }

    impl Probe for ScriptedProbe {
        fn python_version(&self, executable: &str) -> Result<Version> {
            self.tried.borrow_mut().push(executable.to_string());
            self.versions
                .get(executable)
                .copied()
                .ok_or_else(|| EnvError::Spawn {
                    command: executable.to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
                })
        }

        fn host(&self) -> Result<HostInterpreter> {
            if self.no_host {
                return Err(EnvError::Spawn {
                    command: "python3".to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
                });
            }
            Ok(HostInterpreter {
                executable: PathBuf::from("/usr/bin/python3"),
                prefix: PathBuf::from("/usr"),
                base_prefix: PathBuf::from("/usr"),
                version_info: self.host_version.clone(),
            })
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum BuildOp {
        Build(PathBuf, Option<String>),
        Remove(PathBuf),
    }

    /// Creates bare directories instead of real virtualenvs.
    #[derive(Default, Clone)]
    struct DirBuilder {
        ops: Rc<RefCell<Vec<BuildOp>>>,
    }

    impl SandboxBuilder for DirBuilder {
        fn build(&self, path: &Path, executable: Option<&str>) -> Result<()> {
            std::fs::create_dir_all(path.join("bin")).unwrap();
            self.ops.borrow_mut().push(BuildOp::Build(
                path.to_path_buf(),
                executable.map(str::to_string),
            ));
            Ok(())
        }

        fn remove(&self, path: &Path) -> Result<()> {
            self.ops.borrow_mut().push(BuildOp::Remove(path.to_path_buf()));
            std::fs::remove_dir_all(path).map_err(|e| EnvError::io("Failed to remove", path, e))
        }
    }

    fn project(root: &Path, constraint: &str) -> Project {
        Project {
            name: "demo".to_string(),
            root: root.to_path_buf(),
            manifest: root.join("pyproject.toml"),
            python_versions: constraint.to_string(),
            python_constraint: parse_constraint(constraint).unwrap(),
        }
    }

    fn settings(root: &Path) -> EnvSettings {
        EnvSettings {
            virtualenvs_path: root.to_path_buf(),
            create: true,
            in_project: false,
        }
    }

    fn manager(
        project: Project,
        settings: EnvSettings,
        vars: EnvVars,
        probe: ScriptedProbe,
    ) -> (EnvManager, DirBuilder) {
        let builder = DirBuilder::default();
        let manager = EnvManager::new(
            project,
            settings,
            vars,
            Box::new(probe),
            Box::new(builder.clone()),
        );
        (manager, builder)
    }

    fn sandbox(path: PathBuf) -> Env {
        SandboxRuntime::new(path).into()
    }

    #[test]
    fn test_exec_or_version_to_exec() {
        assert_eq!(exec_or_version_to_exec("3.9"), "python3.9");
        assert_eq!(exec_or_version_to_exec("3.9.1"), "python3.9");
        assert_eq!(exec_or_version_to_exec("3"), "python3");
        assert_eq!(exec_or_version_to_exec("python3.8"), "python3.8");
        assert_eq!(exec_or_version_to_exec("/usr/bin/python"), "/usr/bin/python");
    }

    #[test]
    fn test_candidate_order() {
        let order = candidate_order();
        assert_eq!(&order[..3], &["3.13", "3.12", "3.11"]);
        assert_eq!(&order[order.len() - 3..], &["3", "2.7", "2"]);
        let pos = |c: &str| order.iter().position(|x| *x == c).unwrap();
        assert!(pos("3.10") < pos("3.9"));
        assert!(pos("3.4") < pos("3"));
    }

    #[test]
    fn test_activate_end_to_end() {
        let venvs = tempfile::tempdir().unwrap();
        let probe = ScriptedProbe::new(&[3, 8, 0]).with("python3.7", Version::new(3, 7, 1));
        let (mut manager, builder) = manager(
            project(Path::new("/work/demo"), "^3.6"),
            settings(venvs.path()),
            EnvVars::default(),
            probe,
        );

        let env = manager.activate("3.7").unwrap();

        let id = EnvIdentity::generate("demo", Path::new("/work/demo"));
        let expected = venvs.path().join(format!("{id}-py3.7"));
        assert!(expected.is_dir());
        assert_eq!(env, sandbox(expected.clone()));
        assert_eq!(
            builder.ops.borrow().as_slice(),
            &[BuildOp::Build(expected.clone(), Some("python3.7".to_string()))]
        );

        let content = std::fs::read_to_string(venvs.path().join("envs.toml")).unwrap();
        let doc: toml::Table = content.parse().unwrap();
        let record = doc[&id.to_string()].as_table().unwrap();
        assert_eq!(record["minor"].as_str(), Some("3.7"));
        assert_eq!(record["patch"].as_str(), Some("3.7.1"));

        assert_eq!(manager.get().unwrap(), sandbox(expected));
    }

    #[test]
    fn test_activate_patch_drift_rebuilds_in_place() {
        let venvs = tempfile::tempdir().unwrap();
        let probe = ScriptedProbe::new(&[3, 8, 0]).with("python3.7", Version::new(3, 7, 1));
        let (mut manager, builder) = manager(
            project(Path::new("/work/demo"), "^3.6"),
            settings(venvs.path()),
            EnvVars::default(),
            probe,
        );
        let venv = manager.venv_path(&Version::new(3, 7, 0));
        std::fs::create_dir_all(&venv).unwrap();
        manager
            .store
            .write_active_version(&manager.identity, &Version::new(3, 7, 0))
            .unwrap();

        manager.activate("3.7").unwrap();

        assert_eq!(
            builder.ops.borrow().as_slice(),
            &[
                BuildOp::Remove(venv.clone()),
                BuildOp::Build(venv.clone(), Some("python3.7".to_string())),
            ]
        );
        assert_eq!(
            manager.active_version().unwrap(),
            Some(Version::new(3, 7, 1))
        );
    }

    #[test]
    fn test_activate_minor_drift_creates_new_env() {
        let venvs = tempfile::tempdir().unwrap();
        let probe = ScriptedProbe::new(&[3, 8, 0]).with("python3.7", Version::new(3, 7, 1));
        let (mut manager, builder) = manager(
            project(Path::new("/work/demo"), "^3.6"),
            settings(venvs.path()),
            EnvVars::default(),
            probe,
        );
        let old = manager.venv_path(&Version::new(3, 6, 0));
        std::fs::create_dir_all(&old).unwrap();
        manager
            .store
            .write_active_version(&manager.identity, &Version::new(3, 6, 5))
            .unwrap();

        let env = manager.activate("3.7").unwrap();

        let new = manager.venv_path(&Version::new(3, 7, 0));
        assert!(old.is_dir());
        assert!(new.is_dir());
        assert_eq!(env, sandbox(new.clone()));
        assert_eq!(
            builder.ops.borrow().as_slice(),
            &[BuildOp::Build(new, Some("python3.7".to_string()))]
        );
        let record = manager.store.record(&manager.identity).unwrap().unwrap();
        assert_eq!(record.minor, "3.7");
        assert_eq!(record.patch, "3.7.1");
    }

    #[test]
    fn test_activate_existing_env_without_drift_only_records() {
        let venvs = tempfile::tempdir().unwrap();
        let probe = ScriptedProbe::new(&[3, 8, 0]).with("python3.7", Version::new(3, 7, 1));
        let (mut manager, builder) = manager(
            project(Path::new("/work/demo"), "^3.6"),
            settings(venvs.path()),
            EnvVars::default(),
            probe,
        );
        std::fs::create_dir_all(manager.venv_path(&Version::new(3, 7, 0))).unwrap();

        manager.activate("3.7").unwrap();

        assert!(builder.ops.borrow().is_empty());
        assert_eq!(
            manager.active_version().unwrap(),
            Some(Version::new(3, 7, 1))
        );
    }

    #[test]
    fn test_activate_explicit_interpreter_without_host() {
        let venvs = tempfile::tempdir().unwrap();
        let probe = ScriptedProbe::without_host()
            .with("/opt/py39/bin/python3.9", Version::new(3, 9, 1));
        let (mut manager, builder) = manager(
            project(Path::new("/work/demo"), "^3.6"),
            settings(venvs.path()),
            EnvVars::default(),
            probe,
        );

        let env = manager.activate("/opt/py39/bin/python3.9").unwrap();

        let venv = manager.venv_path(&Version::new(3, 9, 0));
        assert_eq!(env, sandbox(venv.clone()));
        assert_eq!(
            builder.ops.borrow().as_slice(),
            &[BuildOp::Build(
                venv,
                Some("/opt/py39/bin/python3.9".to_string())
            )]
        );
        assert_eq!(
            manager.active_version().unwrap(),
            Some(Version::new(3, 9, 1))
        );
    }

    #[test]
    fn test_create_in_project_venv_without_host() {
        let project_dir = tempfile::tempdir().unwrap();
        let venvs = tempfile::tempdir().unwrap();
        let probe = ScriptedProbe::without_host().with("python3.9", Version::new(3, 9, 1));
        let mut config = settings(venvs.path());
        config.in_project = true;
        let (mut manager, builder) = manager(
            project(project_dir.path(), "^3.6"),
            config,
            EnvVars::default(),
            probe,
        );

        let env = manager.create_venv(Some("python3.9"), false).unwrap();

        let root_venv = project_dir.path().join(".venv");
        assert_eq!(env, sandbox(root_venv.clone()));
        assert_eq!(
            builder.ops.borrow().as_slice(),
            &[BuildOp::Build(root_venv, Some("python3.9".to_string()))]
        );
    }

    #[test]
    fn test_get_without_host_or_env_is_an_error() {
        let venvs = tempfile::tempdir().unwrap();
        let (manager, _) = manager(
            project(Path::new("/work/demo"), "^3.6"),
            settings(venvs.path()),
            EnvVars::default(),
            ScriptedProbe::without_host(),
        );
        assert!(matches!(manager.get(), Err(EnvError::Spawn { .. })));
    }

    #[test]
    fn test_activate_rejects_incompatible_executable() {
        let venvs = tempfile::tempdir().unwrap();
        let probe = ScriptedProbe::new(&[3, 8, 0]).with("python3.5", Version::new(3, 5, 9));
        let (mut manager, builder) = manager(
            project(Path::new("/work/demo"), "^3.6"),
            settings(venvs.path()),
            EnvVars::default(),
            probe,
        );

        let err = manager.activate("3.5").unwrap_err();
        match err {
            EnvError::NoCompatiblePython { expected, given } => {
                assert_eq!(expected, "^3.6");
                assert_eq!(given, Some(Version::new(3, 5, 9)));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(builder.ops.borrow().is_empty());
        assert_eq!(manager.active_version().unwrap(), None);
    }

    #[test]
    fn test_activate_in_project_rebuilds_on_version_change() {
        let project_dir = tempfile::tempdir().unwrap();
        let venvs = tempfile::tempdir().unwrap();
        let root_venv = project_dir.path().join(".venv");
        let bin = SandboxRuntime::new(&root_venv).bin_dir();
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::write(bin.join("python"), "").unwrap();
        let venv_python = SandboxRuntime::new(&root_venv).python();

        let probe = ScriptedProbe::new(&[3, 8, 0])
            .with("python3.9", Version::new(3, 9, 1))
            .with(&venv_python, Version::new(3, 8, 0));
        let mut config = settings(venvs.path());
        config.in_project = true;
        let (mut manager, builder) = manager(
            project(project_dir.path(), "^3.6"),
            config,
            EnvVars::default(),
            probe,
        );

        let env = manager.activate("3.9").unwrap();

        assert_eq!(env, sandbox(root_venv.clone()));
        assert_eq!(
            builder.ops.borrow().as_slice(),
            &[
                BuildOp::Remove(root_venv.clone()),
                BuildOp::Build(root_venv, Some("python3.9".to_string())),
            ]
        );
        // In-project envs are not recorded.
        assert_eq!(manager.active_version().unwrap(), None);
    }

    #[test]
    fn test_deactivate_without_record_is_noop() {
        let venvs = tempfile::tempdir().unwrap();
        let (mut manager, _) = manager(
            project(Path::new("/work/demo"), "^3.6"),
            settings(venvs.path()),
            EnvVars::default(),
            ScriptedProbe::new(&[3, 8, 0]),
        );

        manager.deactivate().unwrap();
        assert!(!venvs.path().join("envs.toml").exists());
    }

    #[test]
    fn test_deactivate_keeps_env_directory() {
        let venvs = tempfile::tempdir().unwrap();
        let (mut manager, _) = manager(
            project(Path::new("/work/demo"), "^3.6"),
            settings(venvs.path()),
            EnvVars::default(),
            ScriptedProbe::new(&[3, 8, 0]),
        );
        let venv = manager.venv_path(&Version::new(3, 7, 0));
        std::fs::create_dir_all(&venv).unwrap();
        manager
            .store
            .write_active_version(&manager.identity, &Version::new(3, 7, 1))
            .unwrap();

        manager.deactivate().unwrap();

        assert_eq!(manager.active_version().unwrap(), None);
        assert!(venv.is_dir());
    }

    #[test]
    fn test_get_precedence() {
        let project_dir = tempfile::tempdir().unwrap();
        let venvs = tempfile::tempdir().unwrap();
        let vars: EnvVars = [(external::VIRTUAL_ENV, "/external/venv")].into_iter().collect();
        let (manager, _) = manager(
            project(project_dir.path(), "^3.6"),
            settings(venvs.path()),
            vars,
            ScriptedProbe::new(&[3, 8, 0]),
        );
        let named = manager.venv_path(&Version::new(3, 7, 0));
        std::fs::create_dir_all(&named).unwrap();
        let root_venv = project_dir.path().join(".venv");
        std::fs::create_dir_all(&root_venv).unwrap();

        // No record: the external env wins over everything.
        assert_eq!(manager.get().unwrap(), sandbox(PathBuf::from("/external/venv")));

        // A record demotes the external env below the in-project one.
        manager
            .store
            .write_active_version(&manager.identity, &Version::new(3, 7, 1))
            .unwrap();
        assert_eq!(manager.get().unwrap(), sandbox(root_venv.clone()));

        // Then the recorded named env.
        std::fs::remove_dir_all(&root_venv).unwrap();
        assert_eq!(manager.get().unwrap(), sandbox(named.clone()));

        // Then the host.
        std::fs::remove_dir_all(&named).unwrap();
        let env = manager.get().unwrap();
        assert_eq!(env.kind(), RuntimeKind::Host);
        assert_eq!(env.path(), Path::new("/usr"));
    }

    #[test]
    fn test_get_ignores_conda_base() {
        let venvs = tempfile::tempdir().unwrap();
        let vars: EnvVars = [
            (external::CONDA_PREFIX, "/opt/conda"),
            (external::CONDA_DEFAULT_ENV, "base"),
        ]
        .into_iter()
        .collect();
        let (manager, _) = manager(
            project(Path::new("/work/demo"), "^3.6"),
            settings(venvs.path()),
            vars,
            ScriptedProbe::new(&[3, 8, 0]),
        );
        assert_eq!(manager.get().unwrap().kind(), RuntimeKind::Host);
    }

    #[test]
    fn test_get_uses_conda_env() {
        let venvs = tempfile::tempdir().unwrap();
        let vars: EnvVars = [
            (external::CONDA_PREFIX, "/opt/conda/envs/work"),
            (external::CONDA_DEFAULT_ENV, "work"),
        ]
        .into_iter()
        .collect();
        let (manager, _) = manager(
            project(Path::new("/work/demo"), "^3.6"),
            settings(venvs.path()),
            vars,
            ScriptedProbe::new(&[3, 8, 0]),
        );
        assert_eq!(
            manager.get().unwrap(),
            sandbox(PathBuf::from("/opt/conda/envs/work"))
        );
    }

    #[test]
    fn test_get_falls_back_to_host_version_env() {
        let venvs = tempfile::tempdir().unwrap();
        let (manager, _) = manager(
            project(Path::new("/work/demo"), "^3.6"),
            settings(venvs.path()),
            EnvVars::default(),
            ScriptedProbe::new(&[3, 8, 2]),
        );
        let venv = manager.venv_path(&Version::new(3, 8, 0));
        std::fs::create_dir_all(&venv).unwrap();
        assert_eq!(manager.get().unwrap(), sandbox(venv));
    }

    #[test]
    fn test_list_only_returns_this_projects_envs() {
        let venvs = tempfile::tempdir().unwrap();
        let (manager, _) = manager(
            project(Path::new("/work/demo"), "^3.6"),
            settings(venvs.path()),
            EnvVars::default(),
            ScriptedProbe::new(&[3, 8, 0]),
        );
        let py37 = manager.venv_path(&Version::new(3, 7, 0));
        let py36 = manager.venv_path(&Version::new(3, 6, 0));
        std::fs::create_dir_all(&py37).unwrap();
        std::fs::create_dir_all(&py36).unwrap();
        std::fs::create_dir_all(venvs.path().join("other-abcdefgh-py3.7")).unwrap();
        std::fs::write(venvs.path().join("envs.toml"), "").unwrap();

        let listed: Vec<PathBuf> = manager
            .list()
            .unwrap()
            .iter()
            .map(|e| e.path().to_path_buf())
            .collect();
        assert_eq!(listed, vec![py36, py37]);
    }

    #[test]
    fn test_list_without_root_is_empty() {
        let venvs = tempfile::tempdir().unwrap();
        let (manager, _) = manager(
            project(Path::new("/work/demo"), "^3.6"),
            settings(&venvs.path().join("missing")),
            EnvVars::default(),
            ScriptedProbe::new(&[3, 8, 0]),
        );
        assert!(manager.list().unwrap().is_empty());
    }

    #[test]
    fn test_remove_by_version_clears_matching_record() {
        let venvs = tempfile::tempdir().unwrap();
        let probe = ScriptedProbe::new(&[3, 8, 0]).with("python3.6", Version::new(3, 6, 5));
        let (mut manager, _) = manager(
            project(Path::new("/work/demo"), "^3.6"),
            settings(venvs.path()),
            EnvVars::default(),
            probe,
        );
        let py36 = manager.venv_path(&Version::new(3, 6, 0));
        let py37 = manager.venv_path(&Version::new(3, 7, 0));
        std::fs::create_dir_all(&py36).unwrap();
        std::fs::create_dir_all(&py37).unwrap();
        manager
            .store
            .write_active_version(&manager.identity, &Version::new(3, 6, 5))
            .unwrap();

        let removed = manager.remove("3.6").unwrap();

        assert_eq!(removed, sandbox(py36.clone()));
        assert!(!py36.exists());
        assert!(py37.is_dir());
        assert_eq!(manager.active_version().unwrap(), None);
    }

    #[test]
    fn test_remove_by_name_keeps_other_record() {
        let venvs = tempfile::tempdir().unwrap();
        let (mut manager, _) = manager(
            project(Path::new("/work/demo"), "^3.6"),
            settings(venvs.path()),
            EnvVars::default(),
            ScriptedProbe::new(&[3, 8, 0]),
        );
        let py36 = manager.venv_path(&Version::new(3, 6, 0));
        let py37 = manager.venv_path(&Version::new(3, 7, 0));
        std::fs::create_dir_all(&py36).unwrap();
        std::fs::create_dir_all(&py37).unwrap();
        manager
            .store
            .write_active_version(&manager.identity, &Version::new(3, 6, 5))
            .unwrap();

        let name = format!("{}-py3.7", manager.identity());
        manager.remove(&name).unwrap();

        assert!(!py37.exists());
        assert_eq!(
            manager.active_version().unwrap(),
            Some(Version::new(3, 6, 5))
        );
    }

    #[test]
    fn test_remove_unknown_env() {
        let venvs = tempfile::tempdir().unwrap();
        let probe = ScriptedProbe::new(&[3, 8, 0]).with("python3.8", Version::new(3, 8, 1));
        let (mut manager, builder) = manager(
            project(Path::new("/work/demo"), "^3.6"),
            settings(venvs.path()),
            EnvVars::default(),
            probe,
        );
        let py36 = manager.venv_path(&Version::new(3, 6, 0));
        std::fs::create_dir_all(&py36).unwrap();

        let err = manager.remove("3.8").unwrap_err();
        assert!(matches!(err, EnvError::UnknownEnv { ref name } if name.ends_with("-py3.8")));

        let name = format!("{}-py2.7", manager.identity());
        let err = manager.remove(&name).unwrap_err();
        assert_eq!(err.to_string(), format!("Environment \"{name}\" does not exist."));

        assert!(builder.ops.borrow().is_empty());
        assert!(py36.is_dir());
    }

    #[test]
    fn test_create_venv_disabled_returns_host() {
        let venvs = tempfile::tempdir().unwrap();
        let mut config = settings(venvs.path());
        config.create = false;
        let (mut manager, builder) = manager(
            project(Path::new("/work/demo"), "^3.6"),
            config,
            EnvVars::default(),
            ScriptedProbe::new(&[3, 7, 1]),
        );

        let env = manager.create_venv(None, false).unwrap();

        assert_eq!(env.kind(), RuntimeKind::Host);
        assert!(builder.ops.borrow().is_empty());
    }

    #[test]
    fn test_create_venv_with_host_interpreter() {
        let venvs = tempfile::tempdir().unwrap();
        let (mut manager, builder) = manager(
            project(Path::new("/work/demo"), "^3.6"),
            settings(venvs.path()),
            EnvVars::default(),
            ScriptedProbe::new(&[3, 7, 1]),
        );

        let env = manager.create_venv(None, false).unwrap();

        let venv = manager.venv_path(&Version::new(3, 7, 0));
        assert_eq!(env, sandbox(venv.clone()));
        assert_eq!(
            builder.ops.borrow().as_slice(),
            &[BuildOp::Build(venv, None)]
        );
        // Cached for the rest of the invocation.
        assert_eq!(manager.create_venv(None, false).unwrap(), env);
        assert_eq!(builder.ops.borrow().len(), 1);
    }

    #[test]
    fn test_create_venv_inside_external_env_is_noop() {
        let venvs = tempfile::tempdir().unwrap();
        let vars: EnvVars = [(external::VIRTUAL_ENV, "/external/venv")].into_iter().collect();
        let (mut manager, builder) = manager(
            project(Path::new("/work/demo"), "^3.6"),
            settings(venvs.path()),
            vars,
            ScriptedProbe::new(&[3, 7, 1]),
        );

        let env = manager.create_venv(None, false).unwrap();
        assert_eq!(env, sandbox(PathBuf::from("/external/venv")));
        assert!(builder.ops.borrow().is_empty());
    }

    #[test]
    fn test_create_venv_searches_for_compatible_python() {
        let venvs = tempfile::tempdir().unwrap();
        let probe = ScriptedProbe::new(&[3, 7, 1]).with("python3.9", Version::new(3, 9, 2));
        let tried = probe.tried.clone();
        let (mut manager, builder) = manager(
            project(Path::new("/work/demo"), "^3.8"),
            settings(venvs.path()),
            EnvVars::default(),
            probe,
        );

        manager.create_venv(None, false).unwrap();

        let venv = manager.venv_path(&Version::new(3, 9, 0));
        assert_eq!(
            builder.ops.borrow().as_slice(),
            &[BuildOp::Build(venv, Some("python3.9".to_string()))]
        );
        assert_eq!(
            tried.borrow().as_slice(),
            &["python3.13", "python3.12", "python3.11", "python3.10", "python3.9"]
        );
    }

    #[test]
    fn test_compatible_search_skips_impossible_series() {
        let venvs = tempfile::tempdir().unwrap();
        let probe = ScriptedProbe::new(&[3, 7, 1]);
        let tried = probe.tried.clone();
        let (manager, _) = manager(
            project(Path::new("/work/demo"), ">=2.7,<2.8"),
            settings(venvs.path()),
            EnvVars::default(),
            probe,
        );

        assert_eq!(manager.find_compatible_python().unwrap(), None);
        assert_eq!(tried.borrow().as_slice(), &["python2.7", "python2"]);
    }

    #[test]
    fn test_create_venv_without_compatible_python() {
        let venvs = tempfile::tempdir().unwrap();
        let (mut manager, _) = manager(
            project(Path::new("/work/demo"), "^3.8"),
            settings(venvs.path()),
            EnvVars::default(),
            ScriptedProbe::new(&[3, 7, 1]),
        );

        let err = manager.create_venv(None, false).unwrap_err();
        assert!(matches!(
            err,
            EnvError::NoCompatiblePython { given: None, .. }
        ));
        assert!(err.to_string().contains("unable to find a compatible version"));
    }

    #[test]
    fn test_version_from_venv_name() {
        assert_eq!(
            version_from_venv_name("demo-abcdefgh-py3.10"),
            Some(Version::new(3, 10, 0))
        );
        assert_eq!(version_from_venv_name("demo"), None);
    }
}
