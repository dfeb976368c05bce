//! The main-thread dispatch queue.
//!
//! The multi-producer/single-consumer channel is the only
//! synchronisation point between reader threads and the host-tick
//! drain. Reader threads enqueue; the drain hook, called once per host
//! tick on the main thread, removes every currently-queued request and
//! executes it synchronously.

use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex};

use crate::agent::stream::ClientStream;

/// A deferred `invoke_tool` request awaiting the host main thread.
pub struct QueuedInvocation {
    /// The request identifier to echo in the response.
    pub request_id: String,

    /// Target tool name.
    pub tool: String,

    /// Double-encoded argument payload.
    pub arguments: String,

    /// The originating connection, for routing the response back.
    pub client: Arc<ClientStream>,
}

/// The MPSC queue carrying main-thread-lane work.
pub struct MainThreadQueue {
    sender: Sender<QueuedInvocation>,
    // The drain is the single consumer; the mutex exists only because
    // `Receiver` is not Sync and the handle holding it is shared.
    receiver: Mutex<Receiver<QueuedInvocation>>,
}

impl MainThreadQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
        }
    }

    /// A producer handle for a reader thread.
    #[must_use]
    pub fn producer(&self) -> Sender<QueuedInvocation> {
        self.sender.clone()
    }

    /// Removes every currently-queued invocation, FIFO.
    #[must_use]
    pub fn drain(&self) -> Vec<QueuedInvocation> {
        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut drained = Vec::new();
        loop {
            match receiver.try_recv() {
                Ok(item) => drained.push(item),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        drained
    }
}

impl Default for MainThreadQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MainThreadQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainThreadQueue").finish_non_exhaustive()
    }
}
