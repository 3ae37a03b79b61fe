//! Self-healing patch engine for failed CI runs.
//!
//! Given a failed run, the engine downloads its logs, tries a fixed set of
//! deterministic repairs, and otherwise asks a language model for whole-file
//! replacements, which it validates, writes and pushes. The architecture
//! keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (patch protocol, log reduction,
//!   fixers, path boundary). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting adapters (HTTP, filesystem, git, environment).
//!   Network access sits behind traits so tests can script it.
//!
//! Orchestration modules ([`heal`], [`publish`]) coordinate core logic with
//! I/O to implement the `healer run` command.

pub mod core;
pub mod exit_codes;
pub mod heal;
pub mod io;
pub mod logging;
pub mod publish;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
