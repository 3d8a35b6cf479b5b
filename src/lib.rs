//! discord-relay — polls a Discord-style REST API for new channel messages
//! and relays an agent's outbound messages back, recording each one in the
//! agent's memory store.
//!
//! The entry point is [`relay::RelayManager`]. The platform is reached through
//! [`platform::MessageApi`] and the agent through [`runtime::AgentRuntime`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod logging;
pub mod memory;
pub mod platform;
pub mod relay;
pub mod runtime;
