//! Creator monitoring: watch-list, poll loops and task registries.

mod registry;
mod service;
mod watchlist;

pub use registry::Registry;
pub use service::MonitorService;
pub use watchlist::{WatchEntry, WatchList};
