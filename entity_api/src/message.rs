use super::error::Error;
use chrono::{DateTime, Utc};
use entity::messages::{ActiveModel, Model};
use entity::Id;
use log::*;
use sea_orm::{entity::prelude::*, ActiveValue::Set, DatabaseConnection};

/// Inserts a direct message. The receiver does not need to be online.
pub async fn create(
    db: &DatabaseConnection,
    sender_id: Id,
    receiver_id: Id,
    content: String,
    sent_at: DateTime<Utc>,
) -> Result<Model, Error> {
    if content.trim().is_empty() {
        return Err(Error::validation());
    }

    debug!("Storing direct message from user {sender_id} to user {receiver_id}");

    let active_model = ActiveModel {
        sender_id: Set(sender_id),
        receiver_id: Set(receiver_id),
        content: Set(content),
        created_at: Set(sent_at.into()),
        ..Default::default()
    };

    Ok(active_model.insert(db).await?)
}
