//! Closed error surface for metalocker-core.
//!
//! REDESIGN FLAGS (spec.md §9) calls for a single closed enum in place of
//! type-identified sentinel errors, so callers can branch on `kind()`
//! instead of string-matching. Every public operation in this crate returns
//! [`Result<T>`].
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// The kind of entity that was not found, for [`Error::NotFound`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotFoundKind {
    Record,
    Identity,
    Did,
    Locker,
    Property,
    Blob,
    Operation,
    AssetHead,
    Dataset,
    RecordState,
    Revision,
}

impl NotFoundKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotFoundKind::Record => "record",
            NotFoundKind::Identity => "identity",
            NotFoundKind::Did => "did",
            NotFoundKind::Locker => "locker",
            NotFoundKind::Property => "property",
            NotFoundKind::Blob => "blob",
            NotFoundKind::Operation => "operation",
            NotFoundKind::AssetHead => "asset head",
            NotFoundKind::Dataset => "dataset",
            NotFoundKind::RecordState => "record state",
            NotFoundKind::Revision => "revision",
        }
    }
}

/// Backing errors for all data-wallet operations.
///
/// Propagation policy (spec.md §7): `Integrity` is fatal and never retried;
/// `Backend` is retried by the transport layer and only surfaced on
/// exhaustion (`retryable` carries that signal through); `NotFound` is never
/// retried.
#[derive(Clone, Debug, Error)]
pub enum Error {
    #[error("{kind:?} not found: {id}")]
    NotFound { kind: NotFoundKind, id: String },

    #[error("unauthorised: {reason}")]
    Unauthorised { reason: String },

    #[error("invalid input: {detail}")]
    InvalidInput { detail: String },

    #[error("integrity failure: {detail}")]
    Integrity { detail: String },

    #[error("state conflict: {detail}")]
    StateConflict { detail: String },

    #[error("backend error (retryable: {retryable}): {message}")]
    Backend { message: String, retryable: bool },
}

impl Error {
    pub fn not_found(kind: NotFoundKind, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn unauthorised(reason: impl Into<String>) -> Self {
        Error::Unauthorised {
            reason: reason.into(),
        }
    }

    pub fn invalid(detail: impl Into<String>) -> Self {
        Error::InvalidInput {
            detail: detail.into(),
        }
    }

    pub fn integrity(detail: impl Into<String>) -> Self {
        Error::Integrity {
            detail: detail.into(),
        }
    }

    pub fn conflict(detail: impl Into<String>) -> Self {
        Error::StateConflict {
            detail: detail.into(),
        }
    }

    pub fn backend(message: impl Into<String>, retryable: bool) -> Self {
        Error::Backend {
            message: message.into(),
            retryable,
        }
    }

    /// Returns true if the error is retryable, i.e. a transient backend
    /// failure. Every other kind is definitionally non-retryable.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(self, Error::Backend { retryable: true, .. })
    }
}
