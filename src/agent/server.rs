//! The agent's TCP listener, reader threads and lifecycle.

use std::io::Read;
use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::agent::queue::{MainThreadQueue, QueuedInvocation};
use crate::agent::stream::ClientStream;
use crate::agent::waker::WindowWaker;
use crate::discovery::DiscoveryRecord;
use crate::error::DiscoveryError;
use crate::host::HostState;
use crate::tools::ToolRegistry;
use crate::wire::{Command, FrameDecoder, RequestEnvelope, ResponseEnvelope};

/// Poll interval of the non-blocking accept loop.
const ACCEPT_POLL: Duration = Duration::from_millis(25);

/// Errors that can occur while starting the agent.
#[derive(Error, Debug)]
pub enum AgentError {
    /// The listener could not be bound or inspected.
    #[error("failed to start agent listener")]
    Io(#[from] std::io::Error),

    /// The discovery record could not be written.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

/// `invoke_tool` parameter payload.
#[derive(Debug, Deserialize)]
struct InvokeParams {
    /// Target tool name.
    tool: String,

    /// Double-encoded argument payload for the tool.
    #[serde(default)]
    arguments: String,
}

/// Starts agent incarnations. See [`AgentServer::start`].
pub struct AgentServer;

impl AgentServer {
    /// Starts the agent: runs tool discovery, binds the loopback
    /// listener on a dynamic port, writes the discovery record and
    /// spawns the accept thread.
    ///
    /// The returned handle is the lifecycle record; the host calls
    /// [`AgentHandle::drain_main_thread`] once per tick and
    /// [`AgentHandle::shutdown`] (or drops the handle) on teardown or
    /// reload.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound or the
    /// discovery record cannot be written.
    pub fn start(
        host: Arc<HostState>,
        waker: Arc<dyn WindowWaker>,
    ) -> Result<AgentHandle, AgentError> {
        let registry = Arc::new(ToolRegistry::discover(&host));
        waker.initialize();

        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
        let port = listener.local_addr()?.port();
        listener.set_nonblocking(true)?;

        let project_root = host.info().project_path.clone();
        DiscoveryRecord::for_current_process(port, project_root.display().to_string())
            .write(&project_root)?;

        let queue = Arc::new(MainThreadQueue::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let clients: Arc<Mutex<Vec<Arc<ClientStream>>>> = Arc::new(Mutex::new(Vec::new()));

        let accept_thread = {
            let registry = Arc::clone(&registry);
            let host = Arc::clone(&host);
            let waker = Arc::clone(&waker);
            let shutdown = Arc::clone(&shutdown);
            let clients = Arc::clone(&clients);
            let producer = queue.producer();
            thread::Builder::new()
                .name("agent-accept".to_string())
                .spawn(move || {
                    accept_loop(&listener, &registry, &host, &waker, &shutdown, &clients, &producer);
                })?
        };

        info!(port, pid = std::process::id(), "Agent listening on loopback");

        Ok(AgentHandle {
            port,
            project_root,
            registry,
            queue,
            waker,
            shutdown,
            clients,
            accept_thread: Some(accept_thread),
        })
    }
}

/// A running agent incarnation.
///
/// Dropping the handle performs a clean shutdown: the listener and all
/// accepted streams are closed, still-queued main-thread requests are
/// answered with a shutdown error, and the discovery record is
/// deleted.
pub struct AgentHandle {
    port: u16,
    project_root: PathBuf,
    registry: Arc<ToolRegistry>,
    queue: Arc<MainThreadQueue>,
    waker: Arc<dyn WindowWaker>,
    shutdown: Arc<AtomicBool>,
    clients: Arc<Mutex<Vec<Arc<ClientStream>>>>,
    accept_thread: Option<thread::JoinHandle<()>>,
}

impl AgentHandle {
    /// The dynamic port the listener bound.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// The catalog version of this incarnation's registry.
    #[must_use]
    pub fn catalog_version(&self) -> u64 {
        self.registry.version()
    }

    /// The host-tick hook: executes every currently-queued main-thread
    /// request synchronously and writes its response, then re-minimises
    /// the host window if this subsystem woke it.
    ///
    /// Returns the number of requests serviced.
    pub fn drain_main_thread(&self) -> usize {
        let drained = self.queue.drain();
        let serviced = drained.len();
        for item in drained {
            let response = self
                .registry
                .invoke(&item.tool, &item.request_id, &item.arguments);
            item.client.write_envelope(&response);
        }
        if serviced > 0 && self.waker.should_restore() {
            self.waker.restore_minimized_state();
        }
        serviced
    }

    /// Shuts the agent down. Equivalent to dropping the handle, but
    /// explicit at call sites that tear down for a reload.
    pub fn shutdown(mut self) {
        self.shutdown_impl();
    }

    fn shutdown_impl(&mut self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(port = self.port, "Agent shutting down");

        // Close every accepted stream so reader threads unblock.
        {
            let clients = self
                .clients
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            for client in clients.iter() {
                client.close();
            }
        }

        if let Some(handle) = self.accept_thread.take() {
            if handle.join().is_err() {
                error!("Agent accept thread panicked");
            }
        }

        // Answer whatever main-thread work is still queued.
        for item in self.queue.drain() {
            item.client
                .write_envelope(&ResponseEnvelope::failure(item.request_id.as_str(), "agent shutting down"));
        }

        DiscoveryRecord::delete(&self.project_root);
        info!(port = self.port, "Agent stopped");
    }
}

impl Drop for AgentHandle {
    fn drop(&mut self) {
        self.shutdown_impl();
    }
}

impl std::fmt::Debug for AgentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentHandle")
            .field("port", &self.port)
            .field("catalog_version", &self.registry.version())
            .finish_non_exhaustive()
    }
}

/// Accepts connections until shutdown; each accepted client gets its
/// own reader thread.
#[allow(clippy::too_many_arguments)]
fn accept_loop(
    listener: &TcpListener,
    registry: &Arc<ToolRegistry>,
    host: &Arc<HostState>,
    waker: &Arc<dyn WindowWaker>,
    shutdown: &Arc<AtomicBool>,
    clients: &Arc<Mutex<Vec<Arc<ClientStream>>>>,
    producer: &Sender<QueuedInvocation>,
) {
    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                debug!(%peer, "Accepted connection");
                if let Err(e) = spawn_reader(stream, registry, host, waker, shutdown, clients, producer) {
                    warn!(%peer, error = %e, "Failed to start reader thread");
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
            }
            Err(e) => {
                if !shutdown.load(Ordering::SeqCst) {
                    warn!(error = %e, "Accept failed");
                }
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
}

fn spawn_reader(
    stream: TcpStream,
    registry: &Arc<ToolRegistry>,
    host: &Arc<HostState>,
    waker: &Arc<dyn WindowWaker>,
    shutdown: &Arc<AtomicBool>,
    clients: &Arc<Mutex<Vec<Arc<ClientStream>>>>,
    producer: &Sender<QueuedInvocation>,
) -> std::io::Result<()> {
    // The listener is non-blocking and accepted sockets can inherit
    // that on some platforms; readers want blocking reads.
    stream.set_nonblocking(false)?;
    let client = Arc::new(ClientStream::new(stream)?);

    clients
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .push(Arc::clone(&client));

    let registry = Arc::clone(registry);
    let host = Arc::clone(host);
    let waker = Arc::clone(waker);
    let shutdown = Arc::clone(shutdown);
    let clients = Arc::clone(clients);
    let producer = producer.clone();

    thread::Builder::new()
        .name("agent-reader".to_string())
        .spawn(move || {
            reader_loop(&client, &registry, &host, &waker, &shutdown, &producer);
            let mut clients = clients
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            clients.retain(|c| !Arc::ptr_eq(c, &client));
            debug!(peer = %client.peer(), "Connection closed");
        })?;
    Ok(())
}

/// Reads envelopes off one connection until EOF, error or shutdown.
fn reader_loop(
    client: &Arc<ClientStream>,
    registry: &Arc<ToolRegistry>,
    host: &Arc<HostState>,
    waker: &Arc<dyn WindowWaker>,
    shutdown: &Arc<AtomicBool>,
    producer: &Sender<QueuedInvocation>,
) {
    let mut reader = match client.reader() {
        Ok(reader) => reader,
        Err(e) => {
            warn!(peer = %client.peer(), error = %e, "Failed to clone stream for reading");
            return;
        }
    };

    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                decoder.extend(&buf[..n]);
                while let Some(frame) = decoder.next_frame() {
                    match frame {
                        Ok(line) => {
                            handle_frame(&line, client, registry, host, waker, producer);
                        }
                        Err(_) => {
                            client.write_envelope(&ResponseEnvelope::failure(
                                "unknown",
                                "malformed request: not valid UTF-8",
                            ));
                        }
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(_) => break,
        }
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
    }
}

/// Parses one request line and dispatches it on the correct lane.
fn handle_frame(
    line: &str,
    client: &Arc<ClientStream>,
    registry: &Arc<ToolRegistry>,
    host: &Arc<HostState>,
    waker: &Arc<dyn WindowWaker>,
    producer: &Sender<QueuedInvocation>,
) {
    let request: RequestEnvelope = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            let id = best_effort_id(line);
            client.write_envelope(&ResponseEnvelope::failure(
                id,
                format!("malformed request: {e}"),
            ));
            return;
        }
    };

    let Some(command) = request.command() else {
        client.write_envelope(&ResponseEnvelope::failure(
            request.id.as_str(),
            format!("unknown command: {}", request.cmd),
        ));
        return;
    };

    match command {
        // Background-safe by contract: must complete while the host is
        // minimised, so it never touches the main loop.
        Command::Ping => {
            let info = host.info();
            let data = json!({
                "status": "ok",
                "hostVersion": info.host_version,
                "projectName": info.project_name,
            });
            client.write_envelope(&ResponseEnvelope::success(request.id.as_str(), data.to_string()));
        }
        Command::ListTools => match serde_json::to_string(&registry.catalog()) {
            Ok(data) => client.write_envelope(&ResponseEnvelope::success(request.id.as_str(), data)),
            Err(e) => client.write_envelope(&ResponseEnvelope::failure(
                request.id.as_str(),
                format!("failed to serialise catalog: {e}"),
            )),
        },
        Command::InvokeTool => {
            let params: InvokeParams = match serde_json::from_str(&request.params) {
                Ok(params) => params,
                Err(e) => {
                    client.write_envelope(&ResponseEnvelope::failure(
                        request.id.as_str(),
                        format!("missing tool parameter: {e}"),
                    ));
                    return;
                }
            };

            match registry.get(&params.tool) {
                // Unknown tool: stay on the background lane so the
                // error response is immediate.
                None => {
                    client.write_envelope(&ResponseEnvelope::failure(
                        request.id.as_str(),
                        format!("unknown tool: {}", params.tool),
                    ));
                }
                Some(tool) if tool.requires_main_thread() => {
                    let queued = QueuedInvocation {
                        request_id: request.id,
                        tool: params.tool,
                        arguments: params.arguments,
                        client: Arc::clone(client),
                    };
                    if producer.send(queued).is_err() {
                        // Drain side gone; the agent is tearing down.
                        return;
                    }
                    waker.wake_if_minimized();
                }
                Some(_) => {
                    let response =
                        registry.invoke(&params.tool, &request.id, &params.arguments);
                    client.write_envelope(&response);
                }
            }
        }
    }
}

/// Extracts the request id from an unparseable line, best effort.
fn best_effort_id(line: &str) -> String {
    serde_json::from_str::<serde_json::Value>(line)
        .ok()
        .and_then(|v| v.get("id").and_then(serde_json::Value::as_str).map(ToString::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}
