//! Self-describing tools and the registry that serves them.
//!
//! A tool declares its name, description, threading requirement and a
//! parameter schema, and handles invocations with already-parsed JSON
//! arguments. Tools are registered once at agent init (the
//! registration-at-startup pattern); the registry is frozen before the
//! server starts accepting connections and is read-only for the
//! lifetime of the accept loop.

pub mod builtin;
pub mod registry;

pub use registry::ToolRegistry;

use serde_json::Value;
use thiserror::Error;

use crate::schema::ParameterSpec;

/// Errors a tool can raise during invocation.
#[derive(Error, Debug)]
pub enum ToolError {
    /// The arguments parsed but are semantically unusable.
    #[error("invalid arguments: {message}")]
    InvalidArguments {
        /// What is wrong with the arguments.
        message: String,
    },

    /// The tool's own work failed.
    #[error("{message}")]
    Failed {
        /// The tool's error text (surfaced to the caller; stack traces
        /// stay host-side).
        message: String,
    },
}

/// The capability contract every registered tool satisfies.
///
/// Implementations must be internally thread-safe: a tool that
/// declares itself background-safe may be invoked from several reader
/// threads at once. The registry does not enforce this.
pub trait Tool: Send + Sync {
    /// Unique snake_case name.
    fn name(&self) -> &'static str;

    /// Human-readable description for the catalog.
    fn description(&self) -> &str;

    /// Whether invocations must run on the host main thread.
    fn requires_main_thread(&self) -> bool {
        false
    }

    /// The tool's parameter schema.
    fn schema(&self) -> ParameterSpec;

    /// Handles an invocation. `arguments` has already been validated
    /// against [`Tool::schema`].
    ///
    /// # Errors
    ///
    /// Returns a [`ToolError`] carrying the message surfaced to the
    /// caller.
    fn invoke(&self, arguments: &Value) -> Result<Value, ToolError>;
}
