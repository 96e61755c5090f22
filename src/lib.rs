//! Pre-execution security gate for shell commands issued by an autonomous
//! coding agent.

pub mod gate;
pub mod platform_dirs;
