//! Integration tests for the in-host agent server.
//!
//! These tests start a real agent on a loopback port and drive it with
//! a raw TCP client speaking the line-delimited wire protocol, the way
//! the broker's connection layer does. The host main loop is simulated
//! by a ticker thread calling the drain hook.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde_json::Value;
use tempfile::TempDir;

use editor_bridge_mcp::agent::{AgentHandle, AgentServer, SimulatedWaker, WindowWaker};
use editor_bridge_mcp::discovery;
use editor_bridge_mcp::host::{HostInfo, HostState};
use editor_bridge_mcp::wire::ResponseEnvelope;

// =============================================================================
// Test Helpers
// =============================================================================

/// A running agent plus the simulated host around it.
struct TestAgent {
    handle: Option<Arc<AgentHandle>>,
    host: Arc<HostState>,
    waker: Arc<SimulatedWaker>,
    project: Option<TempDir>,
    ticker_stop: Arc<AtomicBool>,
    ticker: Option<thread::JoinHandle<()>>,
}

impl TestAgent {
    /// Starts an agent. `minimized` sets the simulated window state;
    /// `ticking` spawns a thread driving the main-thread drain.
    fn start(minimized: bool, ticking: bool) -> Self {
        let project = TempDir::new().expect("temp project");
        let host = Arc::new(HostState::new(HostInfo {
            host_version: "2022.3.10f1".to_string(),
            project_name: "Sandbox".to_string(),
            project_path: project.path().to_path_buf(),
        }));
        let waker = Arc::new(SimulatedWaker::new(minimized));

        let handle = Arc::new(
            AgentServer::start(
                Arc::clone(&host),
                Arc::clone(&waker) as Arc<dyn WindowWaker>,
            )
            .expect("agent start"),
        );

        let ticker_stop = Arc::new(AtomicBool::new(false));
        let ticker = ticking.then(|| {
            let handle = Arc::clone(&handle);
            let stop = Arc::clone(&ticker_stop);
            thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    handle.drain_main_thread();
                    thread::sleep(Duration::from_millis(10));
                }
            })
        });

        Self {
            handle: Some(handle),
            host,
            waker,
            project: Some(project),
            ticker_stop,
            ticker,
        }
    }

    fn handle(&self) -> &AgentHandle {
        self.handle.as_ref().expect("agent running")
    }

    fn port(&self) -> u16 {
        self.handle().port()
    }

    fn project_root(&self) -> PathBuf {
        self.project.as_ref().expect("project").path().to_path_buf()
    }

    /// Stops the ticker and shuts the agent down, keeping the project
    /// directory alive for post-shutdown assertions.
    fn shutdown(mut self) -> TempDir {
        self.stop_ticker();
        drop(self.handle.take());
        self.project.take().expect("project")
    }

    fn stop_ticker(&mut self) {
        self.ticker_stop.store(true, Ordering::SeqCst);
        if let Some(ticker) = self.ticker.take() {
            ticker.join().expect("ticker join");
        }
    }
}

impl Drop for TestAgent {
    fn drop(&mut self) {
        self.stop_ticker();
        drop(self.handle.take());
    }
}

/// A raw wire-protocol client.
struct WireClient {
    writer: TcpStream,
    reader: BufReader<TcpStream>,
}

impl WireClient {
    fn connect(port: u16) -> Self {
        let stream = TcpStream::connect(("127.0.0.1", port)).expect("connect");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("read timeout");
        let reader = BufReader::new(stream.try_clone().expect("clone"));
        Self {
            writer: stream,
            reader,
        }
    }

    fn send_line(&mut self, line: &str) {
        self.writer
            .write_all(line.as_bytes())
            .and_then(|()| self.writer.write_all(b"\n"))
            .and_then(|()| self.writer.flush())
            .expect("send");
    }

    fn read_response(&mut self) -> ResponseEnvelope {
        let line = self.read_line();
        serde_json::from_str(&line).unwrap_or_else(|e| panic!("bad response line {line:?}: {e}"))
    }

    fn read_line(&mut self) -> String {
        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read line");
        assert!(!line.is_empty(), "connection closed unexpectedly");
        line
    }
}

fn data_json(response: &ResponseEnvelope) -> Value {
    serde_json::from_str(&response.data)
        .unwrap_or_else(|e| panic!("data is not JSON ({e}): {:?}", response.data))
}

// =============================================================================
// Scenario Tests (S1-S4)
// =============================================================================

#[test]
fn s1_ping_round_trip() {
    let agent = TestAgent::start(false, false);
    let mut client = WireClient::connect(agent.port());

    client.send_line(r#"{"id":"a","cmd":"ping","params":""}"#);
    let response = client.read_response();

    assert_eq!(response.id, "a");
    assert!(response.ok);
    assert!(response.error.is_empty());

    let payload = data_json(&response);
    assert_eq!(payload["status"], "ok");
    assert_eq!(payload["hostVersion"], "2022.3.10f1");
    assert_eq!(payload["projectName"], "Sandbox");
}

#[test]
fn s2_list_tools_catalog() {
    let agent = TestAgent::start(false, false);
    let mut client = WireClient::connect(agent.port());

    client.send_line(r#"{"id":"b","cmd":"list_tools"}"#);
    let response = client.read_response();

    assert!(response.ok);
    let payload = data_json(&response);
    assert!(payload["version"].as_u64().unwrap() >= 1);

    let tools = payload["tools"].as_array().unwrap();
    assert!(!tools.is_empty());
    for tool in tools {
        assert!(!tool["name"].as_str().unwrap().is_empty());
        let schema = tool["parameterSchema"].as_str().unwrap();
        let parsed: Value = serde_json::from_str(schema).expect("parseable schema");
        assert_eq!(parsed["type"], "object");
    }
}

#[test]
fn s3_invoke_unknown_tool_fails_immediately() {
    // No ticker: an unknown tool must be answered on the background
    // lane without waiting for a drain.
    let agent = TestAgent::start(false, false);
    let mut client = WireClient::connect(agent.port());

    client.send_line(r#"{"id":"c","cmd":"invoke_tool","params":"{\"tool\":\"nope\",\"arguments\":\"{}\"}"}"#);
    let response = client.read_response();

    assert_eq!(response.id, "c");
    assert!(!response.ok);
    assert!(response.error.contains("nope"));
}

#[test]
fn s4_invoke_with_missing_required_field_names_it() {
    let agent = TestAgent::start(false, true);
    let mut client = WireClient::connect(agent.port());

    client.send_line(
        r#"{"id":"d","cmd":"invoke_tool","params":"{\"tool\":\"execute_menu_item\",\"arguments\":\"{}\"}"}"#,
    );
    let response = client.read_response();

    assert!(!response.ok);
    assert!(response.error.contains("path"), "error was: {}", response.error);
}

// =============================================================================
// Protocol Error Tests
// =============================================================================

#[test]
fn malformed_json_gets_best_effort_error() {
    let agent = TestAgent::start(false, false);
    let mut client = WireClient::connect(agent.port());

    client.send_line("this is not json");
    let response = client.read_response();
    assert_eq!(response.id, "unknown");
    assert!(!response.ok);

    // Partially decodable: the id is salvaged.
    client.send_line(r#"{"id":"e","cmd":17}"#);
    let response = client.read_response();
    assert_eq!(response.id, "e");
    assert!(!response.ok);
}

#[test]
fn unknown_command_is_rejected() {
    let agent = TestAgent::start(false, false);
    let mut client = WireClient::connect(agent.port());

    client.send_line(r#"{"id":"f","cmd":"reboot","params":""}"#);
    let response = client.read_response();
    assert!(!response.ok);
    assert!(response.error.contains("reboot"));
}

#[test]
fn blank_lines_are_ignored() {
    let agent = TestAgent::start(false, false);
    let mut client = WireClient::connect(agent.port());

    client.send_line("");
    client.send_line(r#"{"id":"g","cmd":"ping","params":""}"#);
    let response = client.read_response();
    assert_eq!(response.id, "g");
    assert!(response.ok);
}

#[test]
fn split_frames_are_reassembled() {
    let agent = TestAgent::start(false, false);
    let mut client = WireClient::connect(agent.port());

    // Deliver one request in two writes with a pause between them.
    let request = br#"{"id":"h","cmd":"ping","params":""}"#;
    let (head, tail) = request.split_at(12);
    client.writer.write_all(head).unwrap();
    client.writer.flush().unwrap();
    thread::sleep(Duration::from_millis(50));
    client.writer.write_all(tail).unwrap();
    client.writer.write_all(b"\n").unwrap();
    client.writer.flush().unwrap();

    let response = client.read_response();
    assert_eq!(response.id, "h");
    assert!(response.ok);
}

// =============================================================================
// Concurrency Properties
// =============================================================================

/// Property 1 + 2: every request gets exactly one response with its
/// id, and concurrent writers never interleave response lines.
#[test]
fn responses_are_atomic_under_mixed_lanes() {
    let agent = TestAgent::start(false, true);
    let mut client = WireClient::connect(agent.port());

    // Pipeline main-thread and background work so the drain thread and
    // the reader thread write concurrently to one stream.
    let mut expected_ids = Vec::new();
    for i in 0..25 {
        let menu_id = format!("menu-{i}");
        let ping_id = format!("ping-{i}");
        client.send_line(&format!(
            r#"{{"id":"{menu_id}","cmd":"invoke_tool","params":"{{\"tool\":\"execute_menu_item\",\"arguments\":\"{{\\\"path\\\":\\\"Window/Console\\\"}}\"}}"}}"#
        ));
        client.send_line(&format!(r#"{{"id":"{ping_id}","cmd":"ping","params":""}}"#));
        expected_ids.push(menu_id);
        expected_ids.push(ping_id);
    }

    // Every line must parse cleanly (no interleaved bytes) and every
    // id must arrive exactly once.
    let mut seen = Vec::new();
    for _ in 0..expected_ids.len() {
        let response = client.read_response();
        assert!(response.ok, "unexpected failure: {}", response.error);
        seen.push(response.id);
    }
    seen.sort();
    expected_ids.sort();
    assert_eq!(seen, expected_ids);
}

/// Property 3: main-thread-lane requests parsed in order begin
/// execution in order.
#[test]
fn main_thread_requests_execute_fifo() {
    let agent = TestAgent::start(false, false);
    let mut client = WireClient::connect(agent.port());

    for path in ["First/Item", "Second/Item", "Third/Item"] {
        client.send_line(&format!(
            r#"{{"id":"{path}","cmd":"invoke_tool","params":"{{\"tool\":\"execute_menu_item\",\"arguments\":\"{{\\\"path\\\":\\\"{path}\\\"}}\"}}"}}"#
        ));
    }

    // Give the reader time to enqueue all three, then drain once.
    thread::sleep(Duration::from_millis(200));
    let serviced = agent.handle().drain_main_thread();
    assert_eq!(serviced, 3);

    assert_eq!(
        agent.host.executed_menu_items(),
        vec!["First/Item", "Second/Item", "Third/Item"]
    );
}

/// Property 4: a stalled main-thread request does not block a ping on
/// the same connection.
#[test]
fn ping_is_not_blocked_by_queued_main_thread_work() {
    // No ticker: the queued invocation cannot complete.
    let agent = TestAgent::start(false, false);
    let mut client = WireClient::connect(agent.port());

    client.send_line(
        r#"{"id":"stuck","cmd":"invoke_tool","params":"{\"tool\":\"execute_menu_item\",\"arguments\":\"{\\\"path\\\":\\\"Window/Console\\\"}\"}"}"#,
    );
    client.send_line(r#"{"id":"quick","cmd":"ping","params":""}"#);

    // The ping answers while the invocation is still queued.
    let response = client.read_response();
    assert_eq!(response.id, "quick");
    assert!(response.ok);

    // Draining releases the stuck request.
    assert_eq!(agent.handle().drain_main_thread(), 1);
    let response = client.read_response();
    assert_eq!(response.id, "stuck");
    assert!(response.ok);
}

// =============================================================================
// Discovery Record Lifecycle (Property 5)
// =============================================================================

#[test]
fn discovery_record_tracks_agent_lifecycle() {
    let agent = TestAgent::start(false, false);
    let root = agent.project_root();
    let port = agent.port();

    let record = discovery::DiscoveryRecord::read(&root).expect("record present after start");
    assert_eq!(record.port, port);
    assert_eq!(record.pid, std::process::id());
    assert_eq!(record.project_path, root.display().to_string());

    let project = agent.shutdown();
    assert!(
        !discovery::record_path(project.path()).exists(),
        "record must be deleted on clean shutdown"
    );
}

// =============================================================================
// Reload Semantics (Property 6)
// =============================================================================

#[test]
fn catalog_version_increases_across_reload() {
    let agent = TestAgent::start(false, false);
    let mut client = WireClient::connect(agent.port());
    client.send_line(r#"{"id":"v1","cmd":"list_tools"}"#);
    let first = data_json(&client.read_response())["version"].as_u64().unwrap();

    // A reload tears the agent down and recreates it in-process.
    let host = Arc::clone(&agent.host);
    drop(client);
    agent.shutdown();

    let reloaded = AgentServer::start(host, Arc::new(SimulatedWaker::new(false))).expect("restart");
    let mut client = WireClient::connect(reloaded.port());
    client.send_line(r#"{"id":"v2","cmd":"list_tools"}"#);
    let second = data_json(&client.read_response())["version"].as_u64().unwrap();

    assert!(second > first, "{second} must exceed {first}");
}

// =============================================================================
// Window Waker Policy (S6)
// =============================================================================

#[test]
fn s6_minimized_host_is_woken_and_re_minimized() {
    let agent = TestAgent::start(true, false);
    let mut client = WireClient::connect(agent.port());

    client.send_line(
        r#"{"id":"wake","cmd":"invoke_tool","params":"{\"tool\":\"execute_menu_item\",\"arguments\":\"{\\\"path\\\":\\\"Assets/Refresh\\\"}\"}"}"#,
    );

    // The reader wakes the window as it enqueues.
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while agent.waker.wake_count() == 0 {
        assert!(std::time::Instant::now() < deadline, "window never woken");
        thread::sleep(Duration::from_millis(10));
    }
    assert!(!agent.waker.is_minimized());

    // The drain services the request and re-minimises.
    assert_eq!(agent.handle().drain_main_thread(), 1);
    let response = client.read_response();
    assert!(response.ok);
    assert!(agent.waker.is_minimized());
    assert_eq!(agent.waker.restore_count(), 1);
}

#[test]
fn background_work_never_touches_the_window() {
    let agent = TestAgent::start(true, false);
    let mut client = WireClient::connect(agent.port());

    client.send_line(r#"{"id":"bg","cmd":"ping","params":""}"#);
    assert!(client.read_response().ok);

    client.send_line(
        r#"{"id":"bg2","cmd":"invoke_tool","params":"{\"tool\":\"project_info\",\"arguments\":\"{}\"}"}"#,
    );
    assert!(client.read_response().ok);

    assert_eq!(agent.waker.wake_count(), 0);
    assert!(agent.waker.is_minimized());
}

// =============================================================================
// Shutdown Semantics
// =============================================================================

#[test]
fn queued_requests_get_shutdown_errors() {
    let agent = TestAgent::start(false, false);
    let mut client = WireClient::connect(agent.port());

    client.send_line(
        r#"{"id":"doomed","cmd":"invoke_tool","params":"{\"tool\":\"execute_menu_item\",\"arguments\":\"{\\\"path\\\":\\\"Window/Console\\\"}\"}"}"#,
    );
    // Let the reader enqueue before tearing down.
    thread::sleep(Duration::from_millis(200));

    agent.shutdown();

    // The shutdown drain answers the queued request before the socket
    // goes away; depending on timing the line may still be readable.
    let mut line = String::new();
    if client.reader.read_line(&mut line).is_ok() && !line.is_empty() {
        let response: ResponseEnvelope = serde_json::from_str(&line).expect("parseable");
        assert_eq!(response.id, "doomed");
        assert!(!response.ok);
        assert!(response.error.contains("shutting down"));
    }
}

#[test]
fn concurrent_connections_are_independent() {
    let agent = TestAgent::start(false, false);

    let port = agent.port();
    let workers: Vec<_> = (0..4)
        .map(|worker| {
            thread::spawn(move || {
                let mut client = WireClient::connect(port);
                for i in 0..10 {
                    let id = format!("w{worker}-{i}");
                    client.send_line(&format!(r#"{{"id":"{id}","cmd":"ping","params":""}}"#));
                    let response = client.read_response();
                    assert_eq!(response.id, id);
                    assert!(response.ok);
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().expect("worker");
    }
}
