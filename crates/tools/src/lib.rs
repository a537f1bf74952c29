//! Built-in tool bodies. Each body obeys the Ok/Error envelope: recovery
//! is local, and nothing here ever takes the server down.

pub mod builtin;
pub mod chat;
pub mod file_ops;
pub mod git;
pub mod memory_tools;
pub mod script;
pub mod shell;

pub use builtin::{register_builtins, ToolDeps};
