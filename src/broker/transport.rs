//! Stdio transport for the outer JSON-RPC dialect.
//!
//! One JSON message per line on stdin/stdout. stdout carries protocol
//! traffic only; all logging goes to stderr.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin, Stdout};

use crate::broker::protocol::{JsonRpcError, JsonRpcResponse};

/// Line-oriented stdio transport.
pub struct StdioTransport {
    reader: Lines<BufReader<Stdin>>,
    writer: Stdout,
}

impl StdioTransport {
    /// Creates a transport over this process's stdio.
    #[must_use]
    pub fn new() -> Self {
        Self {
            reader: BufReader::new(tokio::io::stdin()).lines(),
            writer: tokio::io::stdout(),
        }
    }

    /// Reads the next line. `Ok(None)` means EOF (client hung up).
    ///
    /// # Errors
    ///
    /// Returns an error if reading from stdin fails.
    pub async fn read_line(&mut self) -> std::io::Result<Option<String>> {
        self.reader.next_line().await
    }

    /// Writes a success response as one line.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to stdout fails.
    pub async fn write_response(&mut self, response: &JsonRpcResponse) -> std::io::Result<()> {
        let json = serde_json::to_string(response)?;
        self.write_raw(&json).await
    }

    /// Writes an error response as one line.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to stdout fails.
    pub async fn write_error(&mut self, error: &JsonRpcError) -> std::io::Result<()> {
        let json = serde_json::to_string(error)?;
        self.write_raw(&json).await
    }

    async fn write_raw(&mut self, json: &str) -> std::io::Result<()> {
        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}
