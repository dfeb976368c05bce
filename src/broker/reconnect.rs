//! The reconnect controller: `ensure_connection` state machine.
//!
//! Run before every outer request. Reuses a healthy connection,
//! reopens after an observed drop, and survives host-triggered reloads
//! that tear down and recreate the agent (new port, same process) by
//! polling the discovery record with exponential backoff.
//!
//! `expecting_reload` is set by the caller when it has just submitted
//! a command known to trigger a reload. In that mode the controller
//! never takes the reuse fast path, and it refuses a successful ping
//! until it has observed a disconnect or a port change — otherwise it
//! could hand back the momentarily-still-reachable pre-reload server.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::broker::connection::{AgentConnection, ConnectionError};
use crate::discovery;
use crate::error::{DiscoveryError, LifecycleError};

/// Timeout knobs for the controller.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectTimeouts {
    /// Budget for the health ping on a reused connection.
    pub ping: Duration,

    /// Total budget of the wait-for-reload substate.
    pub reload_budget: Duration,
}

impl Default for ReconnectTimeouts {
    fn default() -> Self {
        Self {
            ping: Duration::from_secs(5),
            reload_budget: Duration::from_secs(60),
        }
    }
}

/// Initial wait-for-reload poll delay.
const BACKOFF_START: Duration = Duration::from_millis(500);

/// Poll delay cap.
const BACKOFF_CAP: Duration = Duration::from_millis(2000);

/// The connection state machine.
pub struct ReconnectController {
    start_dir: PathBuf,
    timeouts: ReconnectTimeouts,
    project_root: Option<PathBuf>,
    connection: Option<Arc<AgentConnection>>,
    /// Port of the last successfully opened connection.
    last_port: Option<u16>,
    /// Pid last seen when a connection succeeded.
    last_pid: Option<u32>,
    /// Set when a fresh connection was opened; cleared by
    /// [`ReconnectController::take_needs_sync`].
    needs_sync: bool,
}

impl ReconnectController {
    /// Creates a controller that discovers the project upward from
    /// `start_dir`.
    #[must_use]
    pub fn new(start_dir: PathBuf, timeouts: ReconnectTimeouts) -> Self {
        Self {
            start_dir,
            timeouts,
            project_root: None,
            connection: None,
            last_port: None,
            last_pid: None,
            needs_sync: false,
        }
    }

    /// The port of the current connection, if one is held.
    #[must_use]
    pub fn current_port(&self) -> Option<u16> {
        self.connection.as_ref().map(|c| c.port())
    }

    /// True once after each fresh connection; the caller resyncs the
    /// tool surface when it observes the flag.
    pub fn take_needs_sync(&mut self) -> bool {
        std::mem::take(&mut self.needs_sync)
    }

    /// Returns a live connection, establishing or re-establishing one
    /// as needed.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::HostNotRunning`] when no host is reachable
    ///   and no reload can be in progress.
    /// - [`LifecycleError::ReloadTimeout`] when the reload wait budget
    ///   is exhausted.
    /// - [`LifecycleError::Discovery`] when no project root exists
    ///   above the starting directory.
    pub async fn ensure_connection(
        &mut self,
        expecting_reload: bool,
    ) -> Result<Arc<AgentConnection>, LifecycleError> {
        // Fast path: reuse the current connection if it still answers.
        // Skipped when a reload is expected — the pre-reload server may
        // still answer, and returning it would be wrong.
        if !expecting_reload {
            if let Some(connection) = &self.connection {
                if connection.is_alive() && connection.ping(self.timeouts.ping).await.is_ok() {
                    return Ok(Arc::clone(connection));
                }
                debug!("Existing connection failed its health ping");
            }
        }

        let pre_reload_port = self.last_port;
        let mut disconnect_observed = match self.connection.take() {
            // The server side of the old connection was already seen
            // dead, or we never had one to begin with.
            Some(old) => {
                let dead = !old.is_alive();
                old.close().await;
                dead || !expecting_reload
            }
            None => !expecting_reload || pre_reload_port.is_none(),
        };

        // One direct attempt against the current discovery record.
        let first_error = match self.try_open().await {
            Ok(connection) => {
                let accepted = !expecting_reload
                    || disconnect_observed
                    || Some(connection.port()) != pre_reload_port;
                if accepted {
                    return Ok(self.adopt(connection));
                }
                debug!(port = connection.port(), "Ignoring stale pre-reload server");
                connection.close().await;
                "pre-reload server still reachable".to_string()
            }
            Err(e) => {
                let no_project = matches!(
                    &e,
                    OpenError::Lifecycle(LifecycleError::Discovery(
                        DiscoveryError::ProjectRootNotFound { .. },
                    ))
                );
                if no_project {
                    return Err(e.into_lifecycle());
                }
                e.to_string()
            }
        };

        // No usable server right now. If the host process is alive a
        // reload may be in progress; otherwise give up.
        if !self.host_process_alive() {
            return Err(LifecycleError::HostNotRunning {
                reason: first_error,
            });
        }

        self.wait_for_reload(expecting_reload, pre_reload_port, &mut disconnect_observed)
            .await
    }

    /// Drops the current connection, if any. The next
    /// `ensure_connection` starts from discovery.
    pub async fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close().await;
        }
    }

    /// Polls the discovery record with exponential backoff until a
    /// fresh agent answers or the budget runs out.
    async fn wait_for_reload(
        &mut self,
        expecting_reload: bool,
        pre_reload_port: Option<u16>,
        disconnect_observed: &mut bool,
    ) -> Result<Arc<AgentConnection>, LifecycleError> {
        let deadline = Instant::now() + self.timeouts.reload_budget;
        let mut delay = BACKOFF_START;
        let mut last_error = "host did not come back".to_string();

        info!(expecting_reload, "Waiting for the host agent to come (back) up");

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(LifecycleError::ReloadTimeout {
                    seconds: self.timeouts.reload_budget.as_secs(),
                    last_error,
                });
            }
            tokio::time::sleep(delay.min(deadline - now)).await;
            delay = (delay * 2).min(BACKOFF_CAP);

            match self.try_open().await {
                Ok(connection) => {
                    let accepted = !expecting_reload
                        || *disconnect_observed
                        || Some(connection.port()) != pre_reload_port;
                    if accepted {
                        return Ok(self.adopt(connection));
                    }
                    // Same port, no drop observed yet: this is the
                    // stale pre-reload server. Keep waiting.
                    debug!(port = connection.port(), "Still the pre-reload server; waiting");
                    connection.close().await;
                    last_error = "pre-reload server still reachable".to_string();
                }
                Err(e) => {
                    // A failed connect at the old port counts as the
                    // disconnect the reload gate is waiting for.
                    if matches!(&e, OpenError::Connection { port, .. } if Some(*port) == pre_reload_port)
                    {
                        *disconnect_observed = true;
                    }
                    if !self.host_process_alive() {
                        return Err(LifecycleError::HostNotRunning {
                            reason: e.to_string(),
                        });
                    }
                    last_error = e.to_string();
                }
            }
        }
    }

    /// Reads the discovery record and opens a connection to it.
    async fn try_open(&mut self) -> Result<Arc<AgentConnection>, OpenError> {
        let root = self.locate_project_root()?;
        let record = discovery::load_live_record(&root)
            .map_err(|e| OpenError::Lifecycle(LifecycleError::Discovery(e)))?;

        match AgentConnection::open(record.port).await {
            Ok((connection, reply)) => {
                debug!(
                    port = record.port,
                    pid = record.pid,
                    host_version = %reply.host_version,
                    "Connected to agent"
                );
                self.last_pid = Some(record.pid);
                Ok(Arc::new(connection))
            }
            Err(source) => Err(OpenError::Connection {
                port: record.port,
                source,
            }),
        }
    }

    fn adopt(&mut self, connection: Arc<AgentConnection>) -> Arc<AgentConnection> {
        self.last_port = Some(connection.port());
        self.needs_sync = true;
        self.connection = Some(Arc::clone(&connection));
        connection
    }

    fn locate_project_root(&mut self) -> Result<PathBuf, OpenError> {
        if let Some(root) = &self.project_root {
            return Ok(root.clone());
        }
        let root = discovery::find_project_root(&self.start_dir)
            .map_err(|e| OpenError::Lifecycle(LifecycleError::Discovery(e)))?;
        self.project_root = Some(root.clone());
        Ok(root)
    }

    /// Whether the host process observed at the last successful
    /// connection is still running.
    fn host_process_alive(&self) -> bool {
        match self.last_pid {
            Some(pid) => discovery::process_alive(pid),
            None => false,
        }
    }
}

impl std::fmt::Debug for ReconnectController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectController")
            .field("start_dir", &self.start_dir)
            .field("last_port", &self.last_port)
            .field("last_pid", &self.last_pid)
            .finish_non_exhaustive()
    }
}

/// Internal error of one open attempt.
#[derive(Debug, thiserror::Error)]
enum OpenError {
    /// Discovery-level failure (no root, no record, stale record).
    #[error(transparent)]
    Lifecycle(LifecycleError),

    /// The record was fine but the connect or its ping failed.
    #[error("failed to connect to agent on port {port}: {source}")]
    Connection {
        /// The port from the discovery record.
        port: u16,
        /// The underlying connection error.
        #[source]
        source: ConnectionError,
    },
}

impl OpenError {
    fn into_lifecycle(self) -> LifecycleError {
        match self {
            Self::Lifecycle(e) => e,
            Self::Connection { port, source } => LifecycleError::HostNotRunning {
                reason: format!("connect to port {port} failed: {source}"),
            },
        }
    }
}
