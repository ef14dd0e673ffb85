use crate::connection::{CloseReason, Connection, ConnectionId, SendOutcome, UserId};
use crate::message::Payload;
use log::*;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Outcome of one fan-out call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Connections in the membership snapshot taken for this call
    pub attempted: usize,
    pub enqueued: usize,
    /// Connections that were already closing or overflowed during this call
    pub dropped: usize,
}

#[derive(Default)]
struct Members {
    /// Primary storage: lookup by connection_id for registration/cleanup
    connections: HashMap<ConnectionId, Arc<Connection>>,
    /// Secondary index: lookup by user_id for direct-message routing
    user_index: HashMap<UserId, HashSet<ConnectionId>>,
}

/// Process-wide set of live connections with a per-user index.
///
/// A single mutex serializes insertion, removal and the membership snapshot
/// taken by every fan-out. The lock is never held while enqueueing: fan-out
/// copies the eligible connections out first, then calls `Connection::send`
/// on each, so a teardown triggered by a full queue can re-enter `unregister`.
#[derive(Default)]
pub struct Registry {
    members: Mutex<Members>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the connection visible to every fan-out that starts after this returns.
    /// A connection already in teardown is not inserted.
    pub fn register(&self, connection: Arc<Connection>) {
        let mut members = self.lock();

        if connection.is_closing() {
            debug!(
                "Connection {} closed before registration, skipping",
                connection.id()
            );
            return;
        }

        connection.mark_active();
        members
            .user_index
            .entry(connection.user_id())
            .or_default()
            .insert(connection.id().clone());
        let user_id = connection.user_id();
        let id = connection.id().clone();
        members.connections.insert(id.clone(), connection);

        debug!(
            "Registered connection {id} for user {user_id} ({} live)",
            members.connections.len()
        );
    }

    /// Idempotent removal; unregistering an absent connection is a no-op.
    pub fn unregister(&self, connection: &Connection) {
        let mut members = self.lock();

        if members.connections.remove(connection.id()).is_none() {
            return;
        }

        let user_id = connection.user_id();
        if let Some(ids) = members.user_index.get_mut(&user_id) {
            ids.remove(connection.id());
            // Clean up empty user entries
            if ids.is_empty() {
                members.user_index.remove(&user_id);
            }
        }

        debug!(
            "Unregistered connection {} for user {user_id} ({} live)",
            connection.id(),
            members.connections.len()
        );
    }

    /// Delivers to every registered connection.
    pub fn broadcast(&self, payload: &Payload) -> Delivery {
        let snapshot: Vec<Arc<Connection>> = self.lock().connections.values().cloned().collect();
        Self::fan_out(&snapshot, payload)
    }

    /// Delivers to every connection of one user. Zero live connections is a no-op.
    pub fn send_to(&self, user_id: UserId, payload: &Payload) -> Delivery {
        let snapshot = self.connections_of(user_id);
        if snapshot.is_empty() {
            trace!("No live connections for user {user_id}");
        }
        Self::fan_out(&snapshot, payload)
    }

    pub fn connections_of(&self, user_id: UserId) -> Vec<Arc<Connection>> {
        let members = self.lock();
        members
            .user_index
            .get(&user_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| members.connections.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.lock().connections.contains_key(id)
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.lock().user_index.contains_key(&user_id)
    }

    pub fn len(&self) -> usize {
        self.lock().connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tears down every registered connection; used at process stop.
    pub fn close_all(&self) {
        let snapshot: Vec<Arc<Connection>> = self.lock().connections.values().cloned().collect();
        info!("Closing {} live connection(s)", snapshot.len());
        for connection in snapshot {
            connection.close(CloseReason::Shutdown);
        }
    }

    fn fan_out(snapshot: &[Arc<Connection>], payload: &Payload) -> Delivery {
        let mut delivery = Delivery {
            attempted: snapshot.len(),
            ..Delivery::default()
        };

        for connection in snapshot {
            match connection.send(payload.clone()) {
                SendOutcome::Enqueued => delivery.enqueued += 1,
                SendOutcome::Dropped => delivery.dropped += 1,
            }
        }

        delivery
    }

    fn lock(&self) -> MutexGuard<'_, Members> {
        self.members.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionState, OutboundQueue};
    use std::time::Duration;

    fn connect(registry: &Arc<Registry>, user_id: UserId, capacity: usize) -> (Arc<Connection>, OutboundQueue) {
        let (connection, queue) = Connection::new(user_id, capacity, registry);
        registry.register(connection.clone());
        (connection, queue)
    }

    #[tokio::test]
    async fn send_to_reaches_every_connection_of_the_user() {
        let registry = Arc::new(Registry::new());
        let (_a, mut queue_a) = connect(&registry, 7, 8);
        let (_b, mut queue_b) = connect(&registry, 7, 8);
        let (_other, mut queue_other) = connect(&registry, 8, 8);

        let delivery = registry.send_to(7, &Payload::from("hi"));

        assert_eq!(delivery, Delivery { attempted: 2, enqueued: 2, dropped: 0 });
        assert_eq!(queue_a.recv().await, Some(Payload::from("hi")));
        assert_eq!(queue_b.recv().await, Some(Payload::from("hi")));
        assert!(tokio::time::timeout(Duration::from_millis(20), queue_other.recv())
            .await
            .is_err());
    }

    #[test]
    fn send_to_offline_user_is_a_noop() {
        let registry = Registry::new();
        assert_eq!(registry.send_to(42, &Payload::from("hi")), Delivery::default());
    }

    #[tokio::test]
    async fn unregistered_connection_receives_nothing_while_sibling_does() {
        let registry = Arc::new(Registry::new());
        let (a, mut queue_a) = connect(&registry, 7, 8);
        let (_b, mut queue_b) = connect(&registry, 7, 8);

        registry.unregister(&a);
        let delivery = registry.send_to(7, &Payload::from("hi"));

        assert_eq!(delivery.enqueued, 1);
        assert_eq!(queue_b.recv().await, Some(Payload::from("hi")));
        assert!(tokio::time::timeout(Duration::from_millis(20), queue_a.recv())
            .await
            .is_err());
    }

    #[test]
    fn unregister_is_idempotent() {
        let registry = Arc::new(Registry::new());
        let (a, _queue) = connect(&registry, 1, 1);

        registry.unregister(&a);
        registry.unregister(&a);

        assert!(registry.is_empty());
        assert!(!registry.is_online(1));
    }

    #[tokio::test]
    async fn saturated_connection_is_removed_without_affecting_siblings() {
        let registry = Arc::new(Registry::new());
        let (slow, _slow_queue) = connect(&registry, 1, 2);
        let (fast, mut fast_queue) = connect(&registry, 2, 8);

        for _ in 0..3 {
            registry.broadcast(&Payload::from("tick"));
            // Keep the fast consumer drained
            assert_eq!(fast_queue.recv().await, Some(Payload::from("tick")));
        }

        assert_eq!(slow.state(), ConnectionState::Closing);
        assert!(!registry.contains(slow.id()));
        assert!(registry.contains(fast.id()));
        assert_eq!(fast.state(), ConnectionState::Active);
    }

    #[test]
    fn closed_connection_is_never_registered() {
        let registry = Arc::new(Registry::new());
        let (connection, _queue) = Connection::new(1, 1, &registry);
        connection.close(CloseReason::PeerClosed);

        registry.register(connection);
        assert!(registry.is_empty());
    }

    #[test]
    fn close_all_empties_the_registry() {
        let registry = Arc::new(Registry::new());
        let (a, _qa) = connect(&registry, 1, 1);
        let (b, _qb) = connect(&registry, 2, 1);

        registry.close_all();

        assert!(registry.is_empty());
        assert_eq!(a.close_reason(), Some(CloseReason::Shutdown));
        assert_eq!(b.close_reason(), Some(CloseReason::Shutdown));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_membership_changes_never_skip_stable_members() {
        let registry = Arc::new(Registry::new());
        let stable: Vec<_> = (0..4).map(|n| connect(&registry, n, 1024)).collect();

        let churn = {
            let registry = registry.clone();
            tokio::spawn(async move {
                for n in 0..200 {
                    let (connection, _queue) = Connection::new(100 + n, 4, &registry);
                    registry.register(connection.clone());
                    tokio::task::yield_now().await;
                    registry.unregister(&connection);
                }
            })
        };

        let calls = 300;
        for _ in 0..calls {
            let delivery = registry.broadcast(&Payload::from("x"));
            // At most the stable members plus one in-flight churn connection
            assert!(delivery.attempted <= stable.len() + 1);
            tokio::task::yield_now().await;
        }
        churn.await.unwrap();

        for (connection, mut queue) in stable {
            assert!(registry.contains(connection.id()));
            let mut received = 0;
            while let Ok(Some(_)) =
                tokio::time::timeout(Duration::from_millis(5), queue.recv()).await
            {
                received += 1;
            }
            assert_eq!(received, calls);
        }
    }
}
