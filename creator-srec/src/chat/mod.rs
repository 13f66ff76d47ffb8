//! Live chat capture.
//!
//! - [`protocol`]: frame encoding and chat message extraction
//! - [`transport`]: connection seam and the WebSocket implementation
//! - [`session`]: supervised capture of one chat room
//! - [`writer`]: merge-on-save chat log persistence
//! - [`service`]: registry of active sessions

pub mod message;
pub mod protocol;
mod service;
mod session;
pub mod transport;
mod writer;

pub use message::{ChatAuthor, ChatMessage};
pub use service::ChatService;
pub use session::{ChatCaptureSession, ChatSessionParams, ChatSettings};
pub use transport::{ChatConnection, ChatTransport, WsTransport};
pub use writer::ChatWriter;
