//! The external broker: outer MCP server, agent session, reconnection.
//!
//! The broker is launched as a subprocess by the agent framework and
//! speaks the framework's stdio JSON-RPC dialect on one side and the
//! inner wire protocol on the other.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Broker                             │
//! │                                                             │
//! │   ┌───────────┐   ┌────────────┐   ┌──────────────────┐    │
//! │   │ Transport │──▶│   Server   │──▶│   Tool surface   │    │
//! │   │  (stdio)  │   │ (lifecycle)│   │ (dynamic, proxy) │    │
//! │   └───────────┘   └────────────┘   └────────┬─────────┘    │
//! │                                             │              │
//! │                              ┌──────────────▼───────────┐  │
//! │                              │   Reconnect controller   │  │
//! │                              │  (discovery, backoff)    │  │
//! │                              └──────────────┬───────────┘  │
//! │                                             │              │
//! │                              ┌──────────────▼───────────┐  │
//! │                              │     Agent connection     │  │
//! │                              │  (loopback TCP, pending) │  │
//! │                              └──────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The broker is single-threaded cooperative: all I/O is async on a
//! current-thread runtime, and the pending-request table is only ever
//! touched from the event loop.

pub mod connection;
pub mod protocol;
pub mod reconnect;
pub mod server;
pub mod surface;
pub mod transport;

pub use connection::{AgentConnection, ConnectionError};
pub use reconnect::{ReconnectController, ReconnectTimeouts};
pub use server::BrokerServer;
pub use surface::ToolSurface;
pub use transport::StdioTransport;
