//! hookchat-core: webhook chat client library
//!
//! Manages a single chat conversation against a configurable webhook
//! endpoint: session bootstrap, message history, and the send/receive
//! request cycle. State is observable through a watch channel so any
//! front-end can render it.

pub mod chat;
pub mod config;
pub mod error;
pub mod message;
pub mod session;
pub mod webhook;

pub use chat::{ChatManager, ChatState};
pub use config::{ChatConfig, HttpMethod};
pub use error::{Error, Result};
pub use message::{Message, Sender};
pub use session::SessionStore;
pub use webhook::{Attachment, WebhookClient};
