use crate::frame::{CLOSE_GOING_AWAY, CLOSE_NORMAL, CLOSE_TRY_AGAIN_LATER};
use crate::message::{ChatId, Payload};
use crate::registry::Registry;
use log::*;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};

/// Authenticated user key; fixed for the lifetime of a connection.
pub type UserId = i32;

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Unique identifier for a connection (server-generated)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tunables shared by every connection of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Outbound queue capacity; a send into a full queue tears the connection down.
    pub queue_capacity: usize,
    /// Ping interval while the outbound queue is idle.
    pub keepalive_interval: Duration,
    /// Read deadline, re-armed by every inbound frame including pongs.
    pub idle_timeout: Duration,
    /// Upper bound for a single transport write.
    pub write_timeout: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

/// Lifecycle of a connection once the session gate has accepted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ConnectionState {
    Authenticated = 0,
    Active = 1,
    Closing = 2,
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Authenticated,
            1 => ConnectionState::Active,
            2 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

/// First trigger that moved a connection into `Closing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    PeerClosed,
    TransportRead,
    IdleTimeout,
    TransportWrite,
    BackpressureOverflow,
    Shutdown,
}

impl CloseReason {
    /// Close frame code and reason sent to the peer, when the transport is still writable.
    pub fn close_code(&self) -> (u16, &'static str) {
        match self {
            CloseReason::BackpressureOverflow => (CLOSE_TRY_AGAIN_LATER, "outbound queue full"),
            CloseReason::IdleTimeout => (CLOSE_GOING_AWAY, "idle timeout"),
            CloseReason::Shutdown => (CLOSE_GOING_AWAY, "server shutting down"),
            _ => (CLOSE_NORMAL, ""),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Enqueued,
    Dropped,
}

/// Receiving half of a connection's outbound queue, drained only by that
/// connection's write pump.
#[derive(Debug)]
pub struct OutboundQueue(mpsc::Receiver<Payload>);

impl OutboundQueue {
    pub async fn recv(&mut self) -> Option<Payload> {
        self.0.recv().await
    }
}

/// One live duplex transport bound to exactly one authenticated user.
pub struct Connection {
    id: ConnectionId,
    user_id: UserId,
    state: AtomicU8,
    close_reason: Mutex<Option<CloseReason>>,
    // Taken (dropped) on teardown, which closes the outbound queue
    outbound: Mutex<Option<mpsc::Sender<Payload>>>,
    teardown: watch::Sender<bool>,
    last_activity: Mutex<Instant>,
    // Advisory only: which conversations the client reports as open
    active_chats: Mutex<HashSet<ChatId>>,
    // Non-owning: the registry owns its connections, never the other way round
    registry: Weak<Registry>,
}

impl Connection {
    /// Creates a connection in the `Authenticated` state along with the
    /// receiving end of its outbound queue.
    pub fn new(
        user_id: UserId,
        queue_capacity: usize,
        registry: &Arc<Registry>,
    ) -> (Arc<Self>, OutboundQueue) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let (teardown, _) = watch::channel(false);

        let connection = Arc::new(Self {
            id: ConnectionId::new(),
            user_id,
            state: AtomicU8::new(ConnectionState::Authenticated as u8),
            close_reason: Mutex::new(None),
            outbound: Mutex::new(Some(tx)),
            teardown,
            last_activity: Mutex::new(Instant::now()),
            active_chats: Mutex::new(HashSet::new()),
            registry: Arc::downgrade(registry),
        });

        (connection, OutboundQueue(rx))
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_closing(&self) -> bool {
        self.state() >= ConnectionState::Closing
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        *lock(&self.close_reason)
    }

    /// Non-blocking enqueue. A full queue marks this connection as a slow
    /// consumer: it is torn down and the payload is dropped, never retried.
    pub fn send(&self, payload: Payload) -> SendOutcome {
        let result = match lock(&self.outbound).as_ref() {
            Some(tx) => tx.try_send(payload),
            None => return SendOutcome::Dropped,
        };

        match result {
            Ok(()) => SendOutcome::Enqueued,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    "Outbound queue full for connection {} (user {}), disconnecting slow consumer",
                    self.id, self.user_id
                );
                self.close(CloseReason::BackpressureOverflow);
                SendOutcome::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => SendOutcome::Dropped,
        }
    }

    /// Starts teardown. Re-entrant: only the first call has any effect.
    pub fn close(&self, reason: CloseReason) {
        // Held across the transition so `Closing` is never observable without its reason
        let mut close_reason = lock(&self.close_reason);
        let transitioned = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < ConnectionState::Closing as u8)
                    .then_some(ConnectionState::Closing as u8)
            })
            .is_ok();

        if !transitioned {
            return;
        }

        *close_reason = Some(reason);
        drop(close_reason);

        lock(&self.outbound).take();
        self.teardown.send_replace(true);

        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(self);
        }

        info!(
            "Tearing down connection {} for user {}: {:?}",
            self.id, self.user_id, reason
        );
    }

    /// Resolves once teardown has started.
    pub async fn closed(&self) {
        let mut teardown = self.teardown.subscribe();
        // The sender lives as long as `self`, so this can only return once the flag is set
        let _ = teardown.wait_for(|closing| *closing).await;
    }

    pub fn touch(&self) {
        *lock(&self.last_activity) = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        lock(&self.last_activity).elapsed()
    }

    pub fn open_chat(&self, chat_id: ChatId) {
        lock(&self.active_chats).insert(chat_id);
    }

    pub fn close_chat(&self, chat_id: ChatId) {
        lock(&self.active_chats).remove(&chat_id);
    }

    pub fn has_active_chat(&self, chat_id: ChatId) -> bool {
        lock(&self.active_chats).contains(&chat_id)
    }

    pub(crate) fn mark_active(&self) {
        let _ = self.state.compare_exchange(
            ConnectionState::Authenticated as u8,
            ConnectionState::Active as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Terminal transition, made once both pumps have exited and the transport is released.
    pub(crate) fn mark_closed(&self) {
        self.close(CloseReason::PeerClosed);
        self.state
            .store(ConnectionState::Closed as u8, Ordering::Release);
        debug!("Connection {} for user {} closed", self.id, self.user_id);
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("state", &self.state())
            .finish()
    }
}

// Poisoning only means another task panicked mid-update of plain data; keep going
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
