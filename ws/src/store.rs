use crate::error::Result;
use crate::message::ChatMessage;
use async_trait::async_trait;

/// Durable storage for chat messages, written regardless of whether any
/// recipient is currently connected.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn store(&self, message: &ChatMessage) -> Result<()>;
}
