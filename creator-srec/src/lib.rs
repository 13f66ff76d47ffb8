//! creator-srec library crate.
//!
//! Watches creators on a subscription platform, records their live
//! broadcasts with ffmpeg, captures live chat alongside, and registers the
//! resulting files in a local media store.

pub mod api;
pub mod chat;
pub mod config;
pub mod error;
pub mod logging;
pub mod media_store;
pub mod monitor;
pub mod notification;
pub mod panic_hook;
pub mod recorder;
pub mod utils;

pub use error::{Error, Result};
