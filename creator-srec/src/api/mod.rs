//! Platform API: liveness probing and account lookup.

mod client;
pub mod models;

pub use client::{ApiClient, LiveProber};
pub use models::{Account, LiveStatus};
