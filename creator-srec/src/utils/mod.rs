//! Shared helpers.

pub mod filename;
pub mod fs;
pub mod hash;
pub mod http_client;
pub mod process;
