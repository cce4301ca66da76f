//! switchboard-a2a: talk to remote agents over the A2A task protocol
//!
//! This crate provides:
//! - Agent descriptors and discovery via `/.well-known/agent.json`
//! - A concurrency-safe agent registry and the agent selection policy
//! - JSON-RPC `tasks/send` / `tasks/get` envelopes and response classification
//! - A reqwest transport with typed, non-retrying failures
//! - The message router that turns a chat message into an agent reply

pub mod card;
pub mod client;
pub mod discovery;
pub mod manager;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod selector;

pub use card::{AgentCapabilities, AgentDescriptor, AgentId, AgentSkill};
pub use client::{A2aClient, AgentTransport, ClientError};
pub use discovery::{DescriptorFetcher, FetchError, ProbeReport};
pub use manager::{A2aSettings, AgentManager, RegisteredAgent};
pub use protocol::{ParsedAgentResponse, RequestEnvelope, build_get_request, build_send_request, classify_response};
pub use registry::{AgentRegistry, RegistryError};
pub use router::MessageRouter;
pub use selector::select_agent;
