use crate::connection::{Connection, ConnectionSettings, UserId};
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::frame::{self, Frame};
use crate::message::Message;
use crate::registry::{Delivery, Registry};
use crate::session::{SessionGate, SessionValidator};
use crate::store::MessageStore;
use axum::extract::ws::WebSocket;
use futures::{Sink, Stream};
use log::*;
use std::sync::Arc;

/// Point-in-time view of one user's connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Presence {
    pub user_id: UserId,
    pub online: bool,
    pub connections: usize,
}

/// Process-wide entry point to the real-time layer, shared through application state.
pub struct Manager {
    registry: Arc<Registry>,
    gate: SessionGate,
    dispatcher: Dispatcher,
    settings: ConnectionSettings,
}

impl Manager {
    pub fn new(
        validator: Arc<dyn SessionValidator>,
        store: Arc<dyn MessageStore>,
        settings: ConnectionSettings,
    ) -> Self {
        let registry = Arc::new(Registry::new());
        Self {
            gate: SessionGate::new(validator),
            dispatcher: Dispatcher::new(registry.clone(), store),
            registry,
            settings,
        }
    }

    /// Resolves the session token of an upgrade request to its user.
    /// Must succeed before the handshake is allowed to complete.
    pub async fn authenticate(&self, token: Option<&str>) -> Result<UserId> {
        self.gate.authenticate(token).await
    }

    /// Runs an upgraded socket for `user_id` until it is torn down.
    pub async fn serve(&self, user_id: UserId, socket: WebSocket) {
        let (sink, stream) = frame::into_transport(socket);
        self.serve_transport(user_id, sink, stream).await;
    }

    /// Same as [`Manager::serve`] for any frame transport.
    pub async fn serve_transport<S, R>(&self, user_id: UserId, sink: S, stream: R)
    where
        S: Sink<Frame, Error = Error> + Send + Unpin + 'static,
        R: Stream<Item = Result<Frame>> + Send + Unpin,
    {
        let (connection, queue) =
            Connection::new(user_id, self.settings.queue_capacity, &self.registry);
        info!(
            "Opened WebSocket connection {} for user {user_id}",
            connection.id()
        );
        self.registry.register(connection.clone());

        crate::pump::run(
            connection.clone(),
            queue,
            sink,
            stream,
            self.dispatcher.clone(),
            self.settings,
        )
        .await;

        info!(
            "WebSocket connection {} for user {user_id} finished ({:?})",
            connection.id(),
            connection.close_reason()
        );
    }

    /// Send a message based on its scope
    pub fn publish(&self, message: Message) -> Delivery {
        self.dispatcher.publish(message)
    }

    pub fn presence(&self, user_id: UserId) -> Presence {
        let connections = self.registry.connections_of(user_id).len();
        Presence {
            user_id,
            online: connections > 0,
            connections,
        }
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn settings(&self) -> ConnectionSettings {
        self.settings
    }

    /// Tears down every live connection, then waits for in-flight message
    /// writes. Pumps flush what is already queued, send a going-away close
    /// frame and exit.
    pub async fn shutdown(&self) {
        info!("Shutting down real-time layer");
        self.registry.close_all();
        self.dispatcher.drain().await;
        debug!("Pending message writes finished");
    }
}
