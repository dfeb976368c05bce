//! Inner wire protocol: newline-delimited JSON envelopes.
//!
//! The agent and the broker exchange UTF-8 text over a loopback TCP
//! socket. One JSON object per line, terminated by `\n`; blank lines
//! are ignored. The codec imposes no size limit — per-message timeouts
//! are enforced by the caller.
//!
//! # Envelope shapes
//!
//! ```text
//! Request:  {"id": string, "cmd": string, "params": string}
//! Response: {"id": string, "ok": bool, "data": string, "error": string}
//! ```
//!
//! `params` and `data` are JSON **strings** embedded in JSON objects.
//! The host's JSON facility cannot carry arbitrary nested objects, so
//! payloads are double-encoded and re-parsed by the receiver against
//! its own schema.

pub mod envelope;
pub mod framing;

pub use envelope::{Command, RequestEnvelope, ResponseEnvelope};
pub use framing::FrameDecoder;
