//! Error types for the real-time layer.
use std::error::Error as StdError;
use std::fmt;

pub type Result<T> = core::result::Result<T, Error>;

/// Errors raised while authenticating, pumping or dispatching on a connection.
/// Failures local to one connection are resolved by tearing that connection
/// down; they are never propagated into a broadcast or direct send.
#[derive(Debug)]
pub struct Error {
    // Underlying error from the transport, session store or message store
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    // Enum representing which category of error
    pub error_kind: ErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    // Missing, unknown or expired session token at upgrade time
    AuthenticationFailure(AuthFailure),
    // The session store itself could not be queried
    SessionStore,
    // Transport receive failed
    TransportRead,
    // No frame and no pong arrived within the idle-read deadline
    IdleTimeout,
    // Transport send failed or did not complete within the write timeout
    TransportWrite,
    // Outbound queue full
    BackpressureOverflow,
    // Message store rejected a write
    Persistence,
    // Inbound frame could not be parsed into an application message
    InvalidMessage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    MissingToken,
    InvalidToken,
    ExpiredSession,
}

impl Error {
    pub fn new(error_kind: ErrorKind) -> Self {
        Self {
            source: None,
            error_kind,
        }
    }

    pub fn with_source<E>(error_kind: ErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Self {
            source: Some(source.into()),
            error_kind,
        }
    }

    pub fn unauthenticated(reason: AuthFailure) -> Self {
        Self::new(ErrorKind::AuthenticationFailure(reason))
    }

    pub fn session_store<E>(source: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Self::with_source(ErrorKind::SessionStore, source)
    }

    pub fn persistence<E>(source: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Self::with_source(ErrorKind::Persistence, source)
    }

    pub fn transport_read<E>(source: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Self::with_source(ErrorKind::TransportRead, source)
    }

    pub fn transport_write<E>(source: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Self::with_source(ErrorKind::TransportWrite, source)
    }

    pub fn is_authentication_failure(&self) -> bool {
        matches!(self.error_kind, ErrorKind::AuthenticationFailure(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "WebSocket Error: {:?} ({source})", self.error_kind),
            None => write!(f, "WebSocket Error: {:?}", self.error_kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(ErrorKind::InvalidMessage, err)
    }
}
