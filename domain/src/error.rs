//! Error types for the `domain` layer.
use entity_api::error::{EntityApiErrorKind, Error as EntityApiError};
use std::error::Error as StdError;
use std::fmt;
use ws::error::{Error as WsError, ErrorKind as WsErrorKind};

/// Top-level domain error type.
/// Errors in the Domain layer are modeled as a tree structure
/// with `domain::error::Error` as the root type holding a tree of `error_kind`
/// enums that represent the kinds of errors that can occur in the domain layer or
/// in lower layers. The `source` field is used to hold the original error that caused
/// the domain error. `web` depends on `domain` only, never directly on `entity_api`
/// or `ws`, and maps the `error_kind`s to HTTP status codes.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: DomainErrorKind,
}

/// Enum representing the major categories of errors that can occur in the `domain` layer.
#[derive(Debug, PartialEq)]
pub enum DomainErrorKind {
    Internal(InternalErrorKind),
    External(ExternalErrorKind),
}

#[derive(Debug, PartialEq)]
pub enum InternalErrorKind {
    Entity(EntityErrorKind),
    Other(String),
}

/// Entity errors reduced to the subset of kinds the layers above care about.
#[derive(Debug, PartialEq)]
pub enum EntityErrorKind {
    NotFound,
    Invalid,
    Unauthenticated,
    DbTransaction,
    Other(String),
}

/// Failures of things outside this process, as seen from the domain.
#[derive(Debug, PartialEq)]
pub enum ExternalErrorKind {
    // A client transport failed or went silent
    Transport,
    Other(String),
}

impl Error {
    pub fn is_unauthenticated(&self) -> bool {
        self.error_kind
            == DomainErrorKind::Internal(InternalErrorKind::Entity(
                EntityErrorKind::Unauthenticated,
            ))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Domain Error: {self:?}")
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

// This is where we translate errors from the `entity_api` layer to the `domain` layer.
impl From<EntityApiError> for Error {
    fn from(err: EntityApiError) -> Self {
        let entity_error_kind = match err.error_kind {
            EntityApiErrorKind::RecordNotFound => EntityErrorKind::NotFound,
            EntityApiErrorKind::ValidationError => EntityErrorKind::Invalid,
            EntityApiErrorKind::SystemError => EntityErrorKind::DbTransaction,
        };

        Error {
            source: Some(Box::new(err)),
            error_kind: DomainErrorKind::Internal(InternalErrorKind::Entity(entity_error_kind)),
        }
    }
}

// And from the real-time layer, whose session failures are authentication failures.
impl From<WsError> for Error {
    fn from(err: WsError) -> Self {
        let error_kind = match err.error_kind {
            WsErrorKind::AuthenticationFailure(_) => {
                DomainErrorKind::Internal(InternalErrorKind::Entity(EntityErrorKind::Unauthenticated))
            }
            WsErrorKind::SessionStore | WsErrorKind::Persistence => {
                DomainErrorKind::Internal(InternalErrorKind::Entity(EntityErrorKind::DbTransaction))
            }
            WsErrorKind::InvalidMessage => {
                DomainErrorKind::Internal(InternalErrorKind::Entity(EntityErrorKind::Invalid))
            }
            WsErrorKind::TransportRead
            | WsErrorKind::TransportWrite
            | WsErrorKind::IdleTimeout
            | WsErrorKind::BackpressureOverflow => {
                DomainErrorKind::External(ExternalErrorKind::Transport)
            }
        };

        Error {
            source: Some(Box::new(err)),
            error_kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ws::error::AuthFailure;

    #[test]
    fn expired_session_is_unauthenticated() {
        let err = Error::from(WsError::unauthenticated(AuthFailure::ExpiredSession));
        assert!(err.is_unauthenticated());
    }

    #[test]
    fn session_store_outage_is_not_unauthenticated() {
        let err = Error::from(WsError::session_store("timeout"));
        assert!(!err.is_unauthenticated());
        assert_eq!(
            err.error_kind,
            DomainErrorKind::Internal(InternalErrorKind::Entity(EntityErrorKind::DbTransaction))
        );
    }

    #[test]
    fn missing_record_maps_to_not_found() {
        let err = Error::from(EntityApiError {
            source: None,
            error_kind: EntityApiErrorKind::RecordNotFound,
        });
        assert_eq!(
            err.error_kind,
            DomainErrorKind::Internal(InternalErrorKind::Entity(EntityErrorKind::NotFound))
        );
    }
}
