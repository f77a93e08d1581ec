//! I/O helpers for checkout tasks.

pub mod client;
pub mod config;
pub mod pipe;
pub mod relay;
pub mod revision;
pub mod sink;
pub mod svn;
pub mod workspace;
