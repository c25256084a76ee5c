pub mod config;
pub mod constraint;
pub mod observability;
pub mod project;
pub mod version;

pub use constraint::{parse_constraint, Constraint, VersionConstraint};
pub use project::Project;
pub use version::Version;
