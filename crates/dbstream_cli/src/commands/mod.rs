//! CLI command implementations.

pub mod backup;
pub mod options;
pub mod restore;
