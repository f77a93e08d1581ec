//! Deterministic, pure logic shared by the updater.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod externals;
pub mod path;
pub mod types;
