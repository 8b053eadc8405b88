//! Fan-out of wire messages to connected viewers.
//!
//! A single task owns the session set and drains a request queue:
//!
//! ```text
//! HubHandle::join ----\
//! HubHandle::leave ----+--> requests --> BroadcastHub task --> session queues
//! HubHandle::publish -/                      (sequential)        (bounded)
//! ```
//!
//! Delivery to a session never blocks the hub. A session whose queue is
//! full is dropped; its queue closes once the transport drains it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::runtime::Handle;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use super::message::Message;

/// Encoded message, shared by every session it goes to.
pub type Payload = Arc<str>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

enum HubRequest {
    Join {
        id: SessionId,
        queue: mpsc::Sender<Payload>,
        replay: Vec<Payload>,
    },
    Leave(SessionId),
    Publish(Payload),
    Count(oneshot::Sender<usize>),
    Shutdown,
}

/// Receiving end of one viewer's outbound queue.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    queue: mpsc::Receiver<Payload>,
}

impl Session {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Next message for this viewer. `None` once the hub dropped the session.
    pub async fn recv(&mut self) -> Option<Payload> {
        self.queue.recv().await
    }

    /// Non-blocking variant of [`Session::recv`].
    pub fn try_recv(&mut self) -> Option<Payload> {
        self.queue.try_recv().ok()
    }
}

/// Cloneable entry point to the hub task.
#[derive(Clone)]
pub struct HubHandle {
    requests: mpsc::UnboundedSender<HubRequest>,
    next_session: Arc<AtomicU64>,
    queue_capacity: usize,
}

impl HubHandle {
    /// Open a session. `replay` is queued ahead of anything published
    /// after this call returns, in slots of its own: the session still
    /// has `queue_capacity` free for live messages.
    pub fn join(&self, replay: &[Message]) -> Session {
        let id = SessionId(self.next_session.fetch_add(1, Ordering::Relaxed));
        let replay: Vec<Payload> = replay.iter().filter_map(encode).collect();
        let (queue, receiver) = mpsc::channel(self.queue_capacity + replay.len());

        if self
            .requests
            .send(HubRequest::Join { id, queue, replay })
            .is_err()
        {
            // Hub is gone; the dropped sender closes the session at once.
            crate::debug_event!("hub", "join after shutdown", "{id}");
        }

        Session {
            id,
            queue: receiver,
        }
    }

    /// Remove a session. Unknown or already-dropped ids are ignored.
    pub fn leave(&self, id: SessionId) {
        let _ = self.requests.send(HubRequest::Leave(id));
    }

    pub fn publish(&self, message: &Message) {
        let Some(payload) = encode(message) else {
            return;
        };
        if self.requests.send(HubRequest::Publish(payload)).is_err() {
            crate::debug_event!("hub", "dropped", "{} after shutdown", message.kind());
        }
    }

    /// Number of joined sessions, as seen by the hub task.
    pub async fn session_count(&self) -> usize {
        let (reply, count) = oneshot::channel();
        if self.requests.send(HubRequest::Count(reply)).is_err() {
            return 0;
        }
        count.await.unwrap_or(0)
    }

    /// Close every session and stop the hub task. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.requests.send(HubRequest::Shutdown);
    }
}

fn encode(message: &Message) -> Option<Payload> {
    match serde_json::to_string(message) {
        Ok(json) => Some(Payload::from(json)),
        Err(e) => {
            tracing::error!("[hub] cannot encode {} message: {e}", message.kind());
            None
        }
    }
}

pub struct BroadcastHub {
    requests: mpsc::UnboundedReceiver<HubRequest>,
    sessions: HashMap<SessionId, mpsc::Sender<Payload>>,
}

impl BroadcastHub {
    /// Start the hub task on `runtime`. Each session buffers up to
    /// `queue_capacity` live messages, on top of its replay, before it
    /// is dropped.
    pub fn spawn(runtime: &Handle, queue_capacity: usize) -> HubHandle {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let hub = BroadcastHub {
            requests: requests_rx,
            sessions: HashMap::new(),
        };
        runtime.spawn(hub.run());

        HubHandle {
            requests: requests_tx,
            next_session: Arc::new(AtomicU64::new(1)),
            queue_capacity: queue_capacity.max(1),
        }
    }

    async fn run(mut self) {
        crate::debug_event!("hub", "started");

        while let Some(request) = self.requests.recv().await {
            match request {
                HubRequest::Join { id, queue, replay } => self.join(id, queue, replay),
                HubRequest::Leave(id) => {
                    if self.sessions.remove(&id).is_some() {
                        crate::debug_event!("hub", "left", "{id}");
                    }
                }
                HubRequest::Publish(payload) => self.publish(payload),
                HubRequest::Count(reply) => {
                    let _ = reply.send(self.sessions.len());
                }
                HubRequest::Shutdown => break,
            }
        }

        let closed = self.sessions.len();
        self.sessions.clear();
        crate::log_event!("hub", "stopped", "{closed} sessions closed");
    }

    fn join(&mut self, id: SessionId, queue: mpsc::Sender<Payload>, replay: Vec<Payload>) {
        for payload in replay {
            if let Err(e) = queue.try_send(payload) {
                tracing::warn!("[hub] session {id} could not take its replay: {e}");
                return;
            }
        }
        self.sessions.insert(id, queue);
        crate::debug_event!("hub", "joined", "{id} ({} sessions)", self.sessions.len());
    }

    fn publish(&mut self, payload: Payload) {
        self.sessions
            .retain(|id, queue| match queue.try_send(payload.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!("[hub] session {id} is not keeping up; dropped");
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    crate::debug_event!("hub", "closed", "{id}");
                    false
                }
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{Duration, timeout};

    fn removed(path: &str) -> Message {
        Message::Removed {
            path: path.to_string(),
        }
    }

    async fn next(session: &mut Session) -> Message {
        let payload = timeout(Duration::from_secs(1), session.recv())
            .await
            .unwrap()
            .unwrap();
        serde_json::from_str(&payload).unwrap()
    }

    #[tokio::test]
    async fn test_join_replays_before_live_messages() {
        let hub = BroadcastHub::spawn(&Handle::current(), 8);

        let mut session = hub.join(&[Message::Files { files: Vec::new() }]);
        hub.publish(&removed("/a.md"));

        assert_eq!(next(&mut session).await.kind(), "files");
        assert_eq!(next(&mut session).await, removed("/a.md"));
    }

    #[tokio::test]
    async fn test_publish_order_is_fifo_per_session() {
        let hub = BroadcastHub::spawn(&Handle::current(), 16);
        let mut first = hub.join(&[]);
        let mut second = hub.join(&[]);

        for name in ["a", "b", "c"] {
            hub.publish(&removed(name));
        }

        for session in [&mut first, &mut second] {
            for name in ["a", "b", "c"] {
                assert_eq!(next(session).await, removed(name));
            }
        }
    }

    #[tokio::test]
    async fn test_slow_session_is_dropped() {
        let hub = BroadcastHub::spawn(&Handle::current(), 2);
        let mut slow = hub.join(&[]);
        let mut fast = hub.join(&[]);

        for i in 0..5 {
            hub.publish(&removed(&format!("/{i}.md")));
            // Keep the fast viewer drained
            assert_eq!(next(&mut fast).await, removed(&format!("/{i}.md")));
        }

        assert_eq!(hub.session_count().await, 1);

        // The slow viewer gets what fit in its queue, then the end
        assert_eq!(next(&mut slow).await, removed("/0.md"));
        assert_eq!(next(&mut slow).await, removed("/1.md"));
        assert!(slow.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_replay_does_not_consume_live_capacity() {
        let hub = BroadcastHub::spawn(&Handle::current(), 2);
        let replay = [
            Message::Files { files: Vec::new() },
            Message::Logs { logs: Vec::new() },
            removed("/old.md"),
        ];
        let mut session = hub.join(&replay);

        hub.publish(&removed("/a.md"));
        hub.publish(&removed("/b.md"));
        assert_eq!(hub.session_count().await, 1);

        assert_eq!(next(&mut session).await.kind(), "files");
        assert_eq!(next(&mut session).await.kind(), "logs");
        assert_eq!(next(&mut session).await, removed("/old.md"));
        assert_eq!(next(&mut session).await, removed("/a.md"));
        assert_eq!(next(&mut session).await, removed("/b.md"));
    }

    #[tokio::test]
    async fn test_undrained_session_survives_until_live_capacity_is_spent() {
        let hub = BroadcastHub::spawn(&Handle::current(), 1);
        let mut session = hub.join(&[Message::Files { files: Vec::new() }]);

        hub.publish(&removed("/a.md"));
        assert_eq!(hub.session_count().await, 1);

        hub.publish(&removed("/b.md"));
        assert_eq!(hub.session_count().await, 0);

        assert_eq!(next(&mut session).await.kind(), "files");
        assert_eq!(next(&mut session).await, removed("/a.md"));
        assert!(session.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_leave_is_idempotent() {
        let hub = BroadcastHub::spawn(&Handle::current(), 4);
        let mut session = hub.join(&[]);
        let id = session.id();

        hub.leave(id);
        hub.leave(id);

        assert_eq!(hub.session_count().await, 0);
        assert!(session.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_closes_sessions() {
        let hub = BroadcastHub::spawn(&Handle::current(), 4);
        let mut session = hub.join(&[]);

        hub.shutdown();
        hub.shutdown();

        assert!(session.recv().await.is_none());
        assert_eq!(hub.session_count().await, 0);

        // Joining afterwards yields an already-closed session
        let mut late = hub.join(&[]);
        assert!(late.recv().await.is_none());
    }
}
