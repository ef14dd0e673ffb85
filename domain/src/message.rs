//! Persistence of chat messages handed over by the real-time layer.

use async_trait::async_trait;
use entity_api::{group_message, message};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use ws::message::{ChatMessage, Destination};
use ws::store::MessageStore;

use crate::error::Error;

/// Writes direct messages to `messages` and room messages to `group_messages`.
pub struct DbMessageStore {
    db: Arc<DatabaseConnection>,
}

impl DbMessageStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn insert(&self, chat_message: &ChatMessage) -> Result<(), Error> {
        let db = self.db.as_ref();
        let content = chat_message.content.clone();

        match chat_message.destination {
            Destination::User(receiver_id) => {
                message::create(
                    db,
                    chat_message.sender_id,
                    receiver_id,
                    content,
                    chat_message.sent_at,
                )
                .await?;
            }
            Destination::Chat(chat_id) => {
                group_message::create(
                    db,
                    chat_message.sender_id,
                    chat_id,
                    content,
                    chat_message.sent_at,
                )
                .await?;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl MessageStore for DbMessageStore {
    async fn store(&self, chat_message: &ChatMessage) -> ws::Result<()> {
        self.insert(chat_message)
            .await
            .map_err(ws::Error::persistence)
    }
}

#[cfg(test)]
#[cfg(feature = "mock")]
mod tests {
    use super::*;
    use chrono::Utc;
    use entity_api::{group_messages, messages};
    use sea_orm::{DatabaseBackend, DbErr, MockDatabase};
    use ws::error::ErrorKind;

    fn chat_message(destination: Destination) -> ChatMessage {
        ChatMessage {
            sender_id: 1,
            destination,
            content: "hello".to_string(),
            sent_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn direct_messages_go_to_the_messages_table() {
        let message = chat_message(Destination::User(2));
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![vec![messages::Model {
                id: 1,
                sender_id: 1,
                receiver_id: 2,
                content: "hello".to_string(),
                created_at: message.sent_at.into(),
            }]])
            .into_connection();
        let db = Arc::new(db);

        DbMessageStore::new(db.clone()).store(&message).await.unwrap();

        let log = Arc::try_unwrap(db).unwrap().into_transaction_log();
        assert_eq!(log.len(), 1);
        let statement = format!("{:?}", log[0]);
        assert!(statement.contains("messages"));
        assert!(!statement.contains("group_messages"));
    }

    #[tokio::test]
    async fn room_messages_go_to_the_group_messages_table() {
        let message = chat_message(Destination::Chat(9));
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![vec![group_messages::Model {
                id: 1,
                sender_id: 1,
                chat_id: 9,
                content: "hello".to_string(),
                created_at: message.sent_at.into(),
            }]])
            .into_connection();
        let db = Arc::new(db);

        DbMessageStore::new(db.clone()).store(&message).await.unwrap();

        let log = Arc::try_unwrap(db).unwrap().into_transaction_log();
        assert!(format!("{:?}", log[0]).contains("group_messages"));
    }

    #[tokio::test]
    async fn insert_failure_is_reported_as_persistence_error() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_errors(vec![DbErr::Custom("disk full".to_string())])
            .into_connection();

        let err = DbMessageStore::new(Arc::new(db))
            .store(&chat_message(Destination::User(2)))
            .await
            .unwrap_err();

        assert_eq!(err.error_kind, ErrorKind::Persistence);
    }
}
