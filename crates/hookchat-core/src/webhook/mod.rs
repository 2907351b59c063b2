//! Webhook transport and wire formats

mod client;
mod types;

pub use client::WebhookClient;
pub use types::{Attachment, extract_reply, map_history};
