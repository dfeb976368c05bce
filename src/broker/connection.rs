//! The broker's TCP session to the in-host agent.
//!
//! One connection at a time. Requests are correlated to responses by
//! id through a pending-request table; the table is only ever touched
//! from the broker's single-threaded event loop and the reader task.
//! A response arriving after its waiter timed out is logged and
//! discarded.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::wire::framing::encode_frame;
use crate::wire::{Command, RequestEnvelope, ResponseEnvelope};

/// Process-wide request id counter; ids must be globally unique per
/// process so a late response can never be matched to a new waiter.
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Budget for the liveness ping issued right after connect.
pub const CONNECT_PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors raised by the agent connection.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// TCP connect or socket I/O failed.
    #[error("agent socket error: {0}")]
    Io(#[from] std::io::Error),

    /// No response arrived within the budget.
    #[error("request timed out after {seconds}s")]
    Timeout {
        /// The exhausted budget in seconds.
        seconds: u64,
    },

    /// The connection dropped while a request was in flight.
    #[error("connection to agent closed")]
    Closed,

    /// The agent answered `ok=false`.
    #[error("{message}")]
    Agent {
        /// The agent's error text.
        message: String,
    },

    /// The agent's payload did not parse as expected.
    #[error("unexpected agent payload: {message}")]
    Payload {
        /// What was wrong with the payload.
        message: String,
    },
}

/// The `ping` success payload.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingReply {
    /// Always "ok" on success.
    pub status: String,
    /// Host application version.
    pub host_version: String,
    /// Name of the open project.
    pub project_name: String,
}

type PendingTable = Arc<Mutex<HashMap<String, oneshot::Sender<ResponseEnvelope>>>>;

/// An open session to the agent.
pub struct AgentConnection {
    port: u16,
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    pending: PendingTable,
    alive: Arc<AtomicBool>,
    reader_task: tokio::task::JoinHandle<()>,
}

impl AgentConnection {
    /// Connects to the agent on the given loopback port and validates
    /// liveness with a ping (5 s budget).
    ///
    /// # Errors
    ///
    /// Returns an error if the connect or the initial ping fails; the
    /// socket is closed before returning.
    pub async fn open(port: u16) -> Result<(Self, PingReply), ConnectionError> {
        let stream = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).await?;
        let (read_half, write_half) = stream.into_split();

        let pending: PendingTable = Arc::new(Mutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));

        let reader_task = tokio::spawn(read_loop(
            read_half,
            Arc::clone(&pending),
            Arc::clone(&alive),
        ));

        let connection = Self {
            port,
            writer: tokio::sync::Mutex::new(write_half),
            pending,
            alive,
            reader_task,
        };

        match connection.ping(CONNECT_PING_TIMEOUT).await {
            Ok(reply) => {
                debug!(port, host_version = %reply.host_version, "Agent connection established");
                Ok((connection, reply))
            }
            Err(e) => {
                connection.close().await;
                Err(e)
            }
        }
    }

    /// The port this connection is bound to.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Whether the socket has been observed open so far.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Sends one request and awaits its response.
    ///
    /// # Errors
    ///
    /// Returns an error on socket failure, connection loss, or when no
    /// response arrives within `timeout`.
    pub async fn request(
        &self,
        cmd: Command,
        params: impl Into<String>,
        timeout: Duration,
    ) -> Result<ResponseEnvelope, ConnectionError> {
        let id = format!("req-{}", NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed));
        let envelope = RequestEnvelope::new(id.as_str(), cmd, params);
        let bytes = encode_frame(&envelope).map_err(|e| ConnectionError::Payload {
            message: e.to_string(),
        })?;

        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(id.clone(), tx);

        let write_result = {
            let mut writer = self.writer.lock().await;
            writer.write_all(&bytes).await
        };
        if let Err(e) = write_result {
            self.forget(&id);
            self.alive.store(false, Ordering::SeqCst);
            return Err(ConnectionError::Io(e));
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(ConnectionError::Closed),
            Err(_) => {
                // The entry is removed so a late response is treated
                // as unsolicited: logged and discarded by the reader.
                self.forget(&id);
                Err(ConnectionError::Timeout {
                    seconds: timeout.as_secs(),
                })
            }
        }
    }

    /// Issues a `ping` and parses its payload.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or an `ok=false` answer.
    pub async fn ping(&self, timeout: Duration) -> Result<PingReply, ConnectionError> {
        let response = self.request(Command::Ping, "", timeout).await?;
        if !response.ok {
            return Err(ConnectionError::Agent {
                message: response.error,
            });
        }
        serde_json::from_str(&response.data).map_err(|e| ConnectionError::Payload {
            message: format!("ping reply: {e}"),
        })
    }

    /// Issues `list_tools` and parses the catalog.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or an `ok=false` answer.
    pub async fn list_tools(
        &self,
        timeout: Duration,
    ) -> Result<crate::schema::ToolCatalog, ConnectionError> {
        let response = self.request(Command::ListTools, "", timeout).await?;
        if !response.ok {
            return Err(ConnectionError::Agent {
                message: response.error,
            });
        }
        serde_json::from_str(&response.data).map_err(|e| ConnectionError::Payload {
            message: format!("tool catalog: {e}"),
        })
    }

    /// Issues `invoke_tool` for a named tool.
    ///
    /// Returns the raw response envelope; the caller distinguishes
    /// tool-level failure (`ok=false`) from transport failure.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure only.
    pub async fn invoke_tool(
        &self,
        tool: &str,
        arguments_json: &str,
        timeout: Duration,
    ) -> Result<ResponseEnvelope, ConnectionError> {
        let params = serde_json::json!({
            "tool": tool,
            "arguments": arguments_json,
        });
        self.request(Command::InvokeTool, params.to_string(), timeout)
            .await
    }

    /// Closes the connection: stops the reader and fails every pending
    /// waiter with a connection-closed error.
    pub async fn close(&self) {
        self.alive.store(false, Ordering::SeqCst);
        self.reader_task.abort();
        fail_all_pending(&self.pending);
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }

    fn forget(&self, id: &str) {
        self.pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(id);
    }
}

impl Drop for AgentConnection {
    fn drop(&mut self) {
        // An explicit close() has already aborted this; a bare drop
        // must not leave the reader task running.
        self.reader_task.abort();
    }
}

impl std::fmt::Debug for AgentConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConnection")
            .field("port", &self.port)
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

/// Reads response lines and delivers them to their waiters.
async fn read_loop(read_half: OwnedReadHalf, pending: PendingTable, alive: Arc<AtomicBool>) {
    let mut lines = BufReader::new(read_half).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                let response: ResponseEnvelope = match serde_json::from_str(&line) {
                    Ok(response) => response,
                    Err(e) => {
                        warn!(error = %e, "Discarding unparseable line from agent");
                        continue;
                    }
                };
                let waiter = pending
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .remove(&response.id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(response);
                    }
                    None => {
                        debug!(id = %response.id, "Discarding late or unsolicited response");
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "Agent socket read failed");
                break;
            }
        }
    }
    alive.store(false, Ordering::SeqCst);
    fail_all_pending(&pending);
}

/// Drops every pending sender, waking its waiter with `Closed`.
fn fail_all_pending(pending: &PendingTable) {
    pending
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .clear();
}
