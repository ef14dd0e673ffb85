use super::error::Error;
use chrono::{DateTime, Utc};
use entity::group_messages::{ActiveModel, Model};
use entity::Id;
use log::*;
use sea_orm::{entity::prelude::*, ActiveValue::Set, DatabaseConnection};

/// Inserts a message posted to a group chat.
pub async fn create(
    db: &DatabaseConnection,
    sender_id: Id,
    chat_id: Id,
    content: String,
    sent_at: DateTime<Utc>,
) -> Result<Model, Error> {
    if content.trim().is_empty() {
        return Err(Error::validation());
    }

    debug!("Storing group message from user {sender_id} in chat {chat_id}");

    let active_model = ActiveModel {
        sender_id: Set(sender_id),
        chat_id: Set(chat_id),
        content: Set(content),
        created_at: Set(sent_at.into()),
        ..Default::default()
    };

    Ok(active_model.insert(db).await?)
}
