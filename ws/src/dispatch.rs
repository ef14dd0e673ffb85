use crate::connection::Connection;
use crate::message::{
    ChatMessage, Destination, ErrorReason, EventType, Inbound, Message, MessageScope, Outbound,
    Payload,
};
use crate::registry::{Delivery, Registry};
use crate::store::MessageStore;
use chrono::Utc;
use log::*;
use std::sync::Arc;
use tokio_util::task::TaskTracker;

/// Maps inbound application messages to registry deliveries.
///
/// Nothing here awaits: persistence runs on its own task, concurrently with
/// delivery, so the sender's read pump is never held up by the message store.
/// Those tasks are tracked so shutdown can wait for them.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    store: Arc<dyn MessageStore>,
    persisting: TaskTracker,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, store: Arc<dyn MessageStore>) -> Self {
        Self {
            registry,
            store,
            persisting: TaskTracker::new(),
        }
    }

    /// Waits for every persistence write started so far.
    pub async fn drain(&self) {
        self.persisting.close();
        self.persisting.wait().await;
    }

    /// Handles one inbound data frame from `sender`.
    pub fn handle_frame(&self, sender: &Arc<Connection>, raw: &[u8]) {
        let inbound: Inbound = match serde_json::from_slice(raw) {
            Ok(inbound) => inbound,
            Err(e) => {
                debug!(
                    "Discarding unparseable frame from user {}: {e}",
                    sender.user_id()
                );
                reply(sender, None, ErrorReason::InvalidMessage);
                return;
            }
        };

        trace!(
            "Inbound {} from user {}",
            inbound.event_type(),
            sender.user_id()
        );

        match inbound {
            Inbound::DirectMessage {
                receiver_id,
                content,
                request_id,
            } => {
                self.route(sender, Destination::User(receiver_id), content, request_id);
            }
            Inbound::GroupMessage {
                chat_id,
                content,
                request_id,
            } => {
                self.route(sender, Destination::Chat(chat_id), content, request_id);
            }
            Inbound::ChatOpened { chat_id } => sender.open_chat(chat_id),
            Inbound::ChatClosed { chat_id } => sender.close_chat(chat_id),
        }
    }

    /// Persists `message` and delivers it to every reachable recipient.
    /// A persistence failure is reported back to `sender` only; copies already
    /// enqueued to recipients are not retracted.
    pub fn deliver(
        &self,
        sender: &Arc<Connection>,
        message: ChatMessage,
        request_id: Option<String>,
    ) -> Delivery {
        self.persist(sender.clone(), message.clone(), request_id);

        self.publish(Message {
            event: message.to_outbound(),
            scope: message.destination.into(),
        })
    }

    /// Sends a server-originated message according to its scope.
    pub fn publish(&self, message: Message) -> Delivery {
        let payload = match Payload::json(&message.event) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialize {} message: {e}", message.event.event_type());
                return Delivery::default();
            }
        };

        let delivery = match message.scope {
            MessageScope::User { user_id } => self.registry.send_to(user_id, &payload),
            MessageScope::Broadcast => self.registry.broadcast(&payload),
        };

        debug!(
            "Delivered {} to {}/{} connection(s)",
            message.event.event_type(),
            delivery.enqueued,
            delivery.attempted
        );
        delivery
    }

    fn route(
        &self,
        sender: &Arc<Connection>,
        destination: Destination,
        content: String,
        request_id: Option<String>,
    ) {
        if content.trim().is_empty() {
            reply(sender, request_id, ErrorReason::InvalidMessage);
            return;
        }

        let message = ChatMessage {
            sender_id: sender.user_id(),
            destination,
            content,
            sent_at: Utc::now(),
        };
        self.deliver(sender, message, request_id);
    }

    fn persist(&self, sender: Arc<Connection>, message: ChatMessage, request_id: Option<String>) {
        let store = self.store.clone();

        self.persisting.spawn(async move {
            if let Err(e) = store.store(&message).await {
                error!(
                    "Failed to persist message from user {} to {:?}: {e}",
                    message.sender_id, message.destination
                );
                reply(&sender, request_id, ErrorReason::PersistenceFailed);
            }
        });
    }
}

fn reply(connection: &Connection, request_id: Option<String>, reason: ErrorReason) {
    match Payload::json(&Outbound::Error { request_id, reason }) {
        Ok(payload) => {
            connection.send(payload);
        }
        Err(e) => error!("Failed to serialize error reply: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::OutboundQueue;
    use crate::error::{Error, Result};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Records stored messages, optionally failing every write.
    struct RecordingStore {
        stored: mpsc::UnboundedSender<ChatMessage>,
        fail: bool,
        latency: Duration,
    }

    #[async_trait]
    impl MessageStore for RecordingStore {
        async fn store(&self, message: &ChatMessage) -> Result<()> {
            tokio::time::sleep(self.latency).await;
            let _ = self.stored.send(message.clone());
            if self.fail {
                Err(Error::persistence("disk full"))
            } else {
                Ok(())
            }
        }
    }

    struct Fixture {
        registry: Arc<Registry>,
        dispatcher: Dispatcher,
        stored: mpsc::UnboundedReceiver<ChatMessage>,
    }

    fn fixture(fail: bool) -> Fixture {
        slow_fixture(fail, Duration::ZERO)
    }

    fn slow_fixture(fail: bool, latency: Duration) -> Fixture {
        let registry = Arc::new(Registry::new());
        let (tx, stored) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(
            registry.clone(),
            Arc::new(RecordingStore {
                stored: tx,
                fail,
                latency,
            }),
        );
        Fixture {
            registry,
            dispatcher,
            stored,
        }
    }

    fn connect(registry: &Arc<Registry>, user_id: i32) -> (Arc<Connection>, OutboundQueue) {
        let (connection, queue) = Connection::new(user_id, 16, registry);
        registry.register(connection.clone());
        (connection, queue)
    }

    async fn next_json(queue: &mut OutboundQueue) -> Value {
        let payload = tokio::time::timeout(Duration::from_secs(1), queue.recv())
            .await
            .expect("timed out waiting for payload")
            .expect("queue closed");
        serde_json::from_slice(payload.as_bytes()).unwrap()
    }

    #[tokio::test]
    async fn direct_message_is_persisted_and_delivered_to_recipient() {
        let mut fx = fixture(false);
        let (alice, _alice_queue) = connect(&fx.registry, 1);
        let (_bob, mut bob_queue) = connect(&fx.registry, 2);

        fx.dispatcher.handle_frame(
            &alice,
            br#"{"type":"direct_message","receiver_id":2,"content":"hello"}"#,
        );

        let delivered = next_json(&mut bob_queue).await;
        assert_eq!(delivered["type"], "direct_message");
        assert_eq!(delivered["sender_id"], 1);
        assert_eq!(delivered["receiver_id"], 2);
        assert_eq!(delivered["content"], "hello");

        let stored = fx.stored.recv().await.unwrap();
        assert_eq!(stored.sender_id, 1);
        assert_eq!(stored.destination, Destination::User(2));
    }

    #[tokio::test]
    async fn direct_message_to_offline_user_is_still_persisted() {
        let mut fx = fixture(false);
        let (alice, _queue) = connect(&fx.registry, 1);

        let message = ChatMessage {
            sender_id: 1,
            destination: Destination::User(99),
            content: "are you there?".to_string(),
            sent_at: Utc::now(),
        };
        let delivery = fx.dispatcher.deliver(&alice, message.clone(), None);

        assert_eq!(delivery, Delivery::default());
        let stored = tokio::time::timeout(Duration::from_secs(1), fx.stored.recv())
            .await
            .unwrap();
        assert_eq!(stored, Some(message));
    }

    #[tokio::test]
    async fn persistence_failure_is_reported_to_sender_only() {
        let fx = fixture(true);
        let (alice, mut alice_queue) = connect(&fx.registry, 1);
        let (_bob, mut bob_queue) = connect(&fx.registry, 2);

        fx.dispatcher.handle_frame(
            &alice,
            br#"{"type":"direct_message","receiver_id":2,"content":"hi","request_id":"r-1"}"#,
        );

        // Delivery is not retracted
        assert_eq!(next_json(&mut bob_queue).await["content"], "hi");

        let ack = next_json(&mut alice_queue).await;
        assert_eq!(ack["type"], "error");
        assert_eq!(ack["reason"], "persistence_failed");
        assert_eq!(ack["request_id"], "r-1");
    }

    #[tokio::test]
    async fn group_message_is_broadcast_to_everyone() {
        let mut fx = fixture(false);
        let (alice, mut alice_queue) = connect(&fx.registry, 1);
        let (_bob, mut bob_queue) = connect(&fx.registry, 2);

        fx.dispatcher.handle_frame(
            &alice,
            br#"{"type":"group_message","chat_id":5,"content":"hey all"}"#,
        );

        for queue in [&mut alice_queue, &mut bob_queue] {
            let delivered = next_json(queue).await;
            assert_eq!(delivered["type"], "group_message");
            assert_eq!(delivered["chat_id"], 5);
        }
        assert_eq!(
            fx.stored.recv().await.unwrap().destination,
            Destination::Chat(5)
        );
    }

    #[tokio::test]
    async fn invalid_frame_gets_error_reply_and_connection_stays_open() {
        let fx = fixture(false);
        let (alice, mut alice_queue) = connect(&fx.registry, 1);

        fx.dispatcher.handle_frame(&alice, b"not json");

        let reply = next_json(&mut alice_queue).await;
        assert_eq!(reply["reason"], "invalid_message");
        assert!(fx.registry.contains(alice.id()));
    }

    #[tokio::test]
    async fn blank_content_is_rejected_without_persisting() {
        let mut fx = fixture(false);
        let (alice, mut alice_queue) = connect(&fx.registry, 1);

        fx.dispatcher.handle_frame(
            &alice,
            br#"{"type":"direct_message","receiver_id":2,"content":"   "}"#,
        );

        assert_eq!(next_json(&mut alice_queue).await["reason"], "invalid_message");
        assert!(tokio::time::timeout(Duration::from_millis(20), fx.stored.recv())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn drain_waits_for_in_flight_writes() {
        let mut fx = slow_fixture(false, Duration::from_millis(100));
        let (alice, _alice_queue) = connect(&fx.registry, 1);

        fx.dispatcher.handle_frame(
            &alice,
            br#"{"type":"group_message","chat_id":5,"content":"before shutdown"}"#,
        );
        assert!(fx.stored.try_recv().is_err());

        fx.dispatcher.drain().await;

        let stored = fx.stored.try_recv().expect("write finished before drain returned");
        assert_eq!(stored.content, "before shutdown");
    }

    #[tokio::test]
    async fn chat_open_and_close_update_active_chats() {
        let fx = fixture(false);
        let (alice, _queue) = connect(&fx.registry, 1);

        fx.dispatcher
            .handle_frame(&alice, br#"{"type":"chat_opened","chat_id":3}"#);
        assert!(alice.has_active_chat(3));

        fx.dispatcher
            .handle_frame(&alice, br#"{"type":"chat_closed","chat_id":3}"#);
        assert!(!alice.has_active_chat(3));
    }
}
