//! The in-host agent: TCP listener, request lanes, main-thread drain.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Host process                          │
//! │                                                              │
//! │  accept thread ──▶ reader thread (one per client)            │
//! │                        │                                     │
//! │            background lane │ main-thread lane                │
//! │            (run inline)    ▼                                 │
//! │                        MPSC queue ──▶ drain (host tick)      │
//! │                            │              │                  │
//! │                     window waker      responses              │
//! │                                                              │
//! │  responses serialised under a per-stream write mutex         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The listener binds the loopback interface on a dynamic port and
//! records it in the discovery file. Each accepted client gets its own
//! reader thread; requests are dispatched inline (background lane) or
//! queued for the host's next tick (main-thread lane). Enqueuing a
//! main-thread request also prods the window waker so a minimised host
//! keeps ticking.

pub mod queue;
pub mod server;
pub mod stream;
pub mod waker;

pub use server::{AgentError, AgentHandle, AgentServer};
pub use waker::{platform_waker, NullWaker, SimulatedWaker, WindowWaker};
