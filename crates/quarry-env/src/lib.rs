//! Interpreter discovery and per-project virtualenv lifecycle.

pub mod builder;
pub mod error;
pub mod identity;
pub mod log;
pub mod manager;
pub mod probe;
pub mod process;
pub mod runtime;
pub mod shell;
pub mod store;

pub use builder::{SandboxBuilder, VenvBuilder};
pub use error::{EnvError, Result};
pub use identity::EnvIdentity;
pub use manager::EnvManager;
pub use probe::{Probe, SystemProbe};
pub use runtime::{Env, Runtime, RuntimeKind};
pub use shell::Shell;
