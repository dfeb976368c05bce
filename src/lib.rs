//! editor-bridge-mcp: MCP bridge between an editor host and AI assistants
//!
//! This library implements both halves of a bidirectional bridge that
//! exposes an interactive editor process (the "host") to an external
//! agent framework:
//!
//! - The **agent** is loaded into the host. It listens on a loopback
//!   TCP socket, dispatches requests to registered tools on the right
//!   lane (background thread or host main loop), and wakes a minimised
//!   host window when main-thread work is queued.
//! - The **broker** runs as a subprocess of the agent framework. It
//!   discovers the host through `Library/MCPInstance.json`, keeps a
//!   resilient TCP session to the agent across host reloads, and
//!   re-advertises whatever tools the host currently exposes over
//!   stdio JSON-RPC.
//!
//! # Modules
//!
//! - [`agent`] — in-host listener, request lanes, main-thread drain
//! - [`broker`] — outer MCP server, agent session, reconnection
//! - [`config`] — broker configuration loading
//! - [`discovery`] — discovery record and project-root location
//! - [`error`] — shared error types
//! - [`host`] — the embedding host runtime model
//! - [`schema`] — tool parameter schemas and the versioned catalog
//! - [`tools`] — the tool trait, registry and builtin tools
//! - [`wire`] — the line-delimited JSON wire protocol

pub mod agent;
pub mod broker;
pub mod config;
pub mod discovery;
pub mod error;
pub mod host;
pub mod schema;
pub mod tools;
pub mod wire;
