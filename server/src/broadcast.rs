//! Broadcast router and per-connection outbound queues.
//!
//! Every connection owns one bounded queue drained by exactly one writer
//! task, which gives per-recipient FIFO ordering: deltas produced in order
//! are written in order. A slow or wedged client only ever fills its own
//! queue; overflow drops that connection's oldest message with a warning
//! and never stalls delivery to anyone else.

use log::{debug, warn};
use shared::Message;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Per-connection outbound buffer capacity in messages.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

#[derive(Debug)]
struct QueueState {
    messages: VecDeque<Message>,
    closed: bool,
}

#[derive(Debug)]
struct QueueInner {
    conn_id: u32,
    capacity: usize,
    state: Mutex<QueueState>,
    notify: Notify,
}

/// Handle to one connection's outbound queue. Cheap to clone; the writer
/// task holds one end and the router holds the other.
#[derive(Debug, Clone)]
pub struct OutboundQueue {
    inner: Arc<QueueInner>,
}

impl OutboundQueue {
    pub fn new(conn_id: u32, capacity: usize) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                conn_id,
                capacity,
                state: Mutex::new(QueueState {
                    messages: VecDeque::new(),
                    closed: false,
                }),
                notify: Notify::new(),
            }),
        }
    }

    /// Enqueues a message, dropping the oldest entry when the queue is full.
    pub fn push(&self, message: Message) {
        {
            let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
            if state.closed {
                return;
            }
            if state.messages.len() >= self.inner.capacity {
                state.messages.pop_front();
                warn!(
                    "outbound queue full for connection {}, dropping oldest message",
                    self.inner.conn_id
                );
            }
            state.messages.push_back(message);
        }
        self.inner.notify.notify_one();
    }

    /// Marks the queue closed. The writer drains what is already buffered,
    /// then terminates and closes the socket.
    pub fn close(&self) {
        {
            let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
            state.closed = true;
        }
        self.inner.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .closed
    }

    /// Next message for the writer task; `None` once closed and drained.
    pub async fn pop(&self) -> Option<Message> {
        loop {
            {
                let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(message) = state.messages.pop_front() {
                    return Some(message);
                }
                if state.closed {
                    return None;
                }
            }
            self.inner.notify.notified().await;
        }
    }

    /// Non-blocking pop used by unit tests to inspect queued traffic.
    #[cfg(test)]
    pub(crate) fn try_pop(&self) -> Option<Message> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .messages
            .pop_front()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .messages
            .len()
    }
}

/// Fans deltas out to the recipient set with per-recipient ordering. Owned
/// by the server's decision path, so registration and iteration never race.
pub struct BroadcastRouter {
    queues: HashMap<u32, OutboundQueue>,
}

impl BroadcastRouter {
    pub fn new() -> Self {
        Self {
            queues: HashMap::new(),
        }
    }

    pub fn register(&mut self, conn_id: u32, queue: OutboundQueue) {
        self.queues.insert(conn_id, queue);
    }

    /// Removes and closes a connection's queue.
    pub fn remove(&mut self, conn_id: u32) {
        if let Some(queue) = self.queues.remove(&conn_id) {
            queue.close();
        }
    }

    pub fn broadcast_all(&self, message: &Message) {
        for queue in self.queues.values() {
            queue.push(message.clone());
        }
    }

    pub fn broadcast_all_except(&self, message: &Message, excluded: u32) {
        for (conn_id, queue) in &self.queues {
            if *conn_id != excluded {
                queue.push(message.clone());
            }
        }
    }

    /// Sends to one session. Returns false for unknown connections, which
    /// the caller treats as an implicit disconnect, not an error.
    pub fn unicast(&self, conn_id: u32, message: &Message) -> bool {
        match self.queues.get(&conn_id) {
            Some(queue) => {
                queue.push(message.clone());
                true
            }
            None => {
                debug!("unicast to unknown connection {}", conn_id);
                false
            }
        }
    }

    pub fn close_all(&mut self) {
        for queue in self.queues.values() {
            queue.close();
        }
        self.queues.clear();
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}

impl Default for BroadcastRouter {
    fn default() -> Self {
        Self::new()
    }
}
