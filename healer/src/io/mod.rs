//! Side-effecting adapters: filesystem, network, git and environment.

pub mod apply;
pub mod config;
pub mod env;
pub mod fixes;
pub mod git;
pub mod logs;
pub mod model;
pub mod process;
pub mod prompt;
pub mod scratch;
