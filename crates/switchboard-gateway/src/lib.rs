//! switchboard-gateway: HTTP + WebSocket front door for switchboard
//!
//! Serves the REST API used by the chat UI and a WebSocket endpoint that
//! fans agent replies out to every client that joined a conversation.

pub mod auth;
pub mod chat;
pub mod events;
pub mod protocol;
pub mod rest;
pub mod server;

pub use server::{GatewayServer, GatewayState};
