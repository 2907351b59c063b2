//! Chat session state management

mod manager;

pub use manager::{ChatManager, ChatState};
