//! Deterministic, pure logic shared by the healing pipeline.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod boundary;
pub mod fixers;
pub mod protocol;
pub mod reduce;
pub mod types;
