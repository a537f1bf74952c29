//! The skill registry: named, schema-described callables plus the
//! validated, time-bounded runner that executes them.

pub mod context;
pub mod loader;
pub mod manifest;
pub mod registry;
pub mod runner;
pub mod schema;
pub mod types;

pub use context::{ChatBackend, SkillContext};
pub use registry::SkillRegistry;
pub use runner::{run_skill, RunOptions};
pub use types::{ParamSpec, ParamType, Skill, SkillHandler};
