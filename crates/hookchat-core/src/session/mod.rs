//! Session identifier persistence

mod store;

pub use store::SessionStore;

/// Fixed storage key under which the current session id is kept
pub const SESSION_STORAGE_KEY: &str = "chat-session";
