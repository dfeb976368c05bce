//! Shared per-client stream with atomic line writes.

use std::io::Write;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::wire::framing::encode_frame;
use crate::wire::ResponseEnvelope;

/// One accepted client connection.
///
/// Reads happen on the client's dedicated reader thread through a
/// cloned handle; writes can come from any thread (reader threads for
/// background-lane responses, the host main thread for drained ones)
/// and are serialised by a per-stream mutex so response lines are
/// never interleaved.
pub struct ClientStream {
    stream: Mutex<TcpStream>,
    peer: SocketAddr,
}

impl ClientStream {
    /// Wraps an accepted stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the peer address cannot be read.
    pub fn new(stream: TcpStream) -> std::io::Result<Self> {
        let peer = stream.peer_addr()?;
        Ok(Self {
            stream: Mutex::new(stream),
            peer,
        })
    }

    /// The peer address, for logging.
    #[must_use]
    pub const fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Clones a handle for the reader thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS refuses to duplicate the socket.
    pub fn reader(&self) -> std::io::Result<TcpStream> {
        self.stream
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .try_clone()
    }

    /// Serialises one response and writes it with its terminator under
    /// the write lock. Write failures are logged, not propagated: a
    /// dying connection is detected by its reader.
    pub fn write_envelope(&self, response: &ResponseEnvelope) {
        let bytes = match encode_frame(response) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(id = %response.id, error = %e, "Failed to serialise response");
                return;
            }
        };

        let mut stream = self
            .stream
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Err(e) = stream.write_all(&bytes).and_then(|()| stream.flush()) {
            debug!(peer = %self.peer, error = %e, "Dropped response on closed connection");
        }
    }

    /// Closes both directions, unblocking the reader thread.
    pub fn close(&self) {
        let stream = self
            .stream
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let _ = stream.shutdown(Shutdown::Both);
    }
}

impl std::fmt::Debug for ClientStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientStream")
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}
