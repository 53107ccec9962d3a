//! Task daemon: runs `skill.function` commands under a shell.

pub mod catalog;
pub mod registry;
pub mod shell;

pub use catalog::{SkillCatalog, SkillCommand};
pub use registry::ConfiguredAgents;
pub use shell::ShellDaemon;
