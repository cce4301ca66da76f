//! switchboard-core: chat data model and conversation store
//!
//! This crate provides:
//! - Messages, typed parts and conversations shared by every other crate
//! - An in-memory conversation store safe to share across request handlers

pub mod conversation;
pub mod types;

pub use conversation::{ConversationStore, StoreError};
pub use types::{Conversation, Message, Part, Role, meta};
