use crate::{
    entity::EntityError,
    key::KeyError,
    schema::SchemaError,
    store::{StoreError, table::TableError},
    value::codec::CodecError,
};
use thiserror::Error as ThisError;

///
/// Error
///
/// Operation-level error taxonomy. Schema errors are raised only while a
/// registry is being constructed and never cross an operation boundary;
/// everything else is per-operation and leaves in-memory state intact
/// beyond the documented lock rollback.
///

#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Entity(#[from] EntityError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error("store request failed: {0}")]
    Store(#[from] StoreError),

    #[error("record invalid: {}", messages.join(", "))]
    RecordInvalid { messages: Vec<String> },

    #[error("record could not be saved")]
    RecordNotSaved,

    #[error("record was not destroyed")]
    RecordNotDestroyed,

    #[error("record not found: {entity} ({key})")]
    RecordNotFound { entity: String, key: String },

    #[error("stale object: {entity} ({key}) was modified by another writer")]
    StaleObject { entity: String, key: String },

    #[error("{op} is not allowed on an unsaved record")]
    NotPersisted { op: &'static str },
}

impl Error {
    /// True for the one error kind the non-raising lookup variant swallows.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::RecordNotFound { .. })
    }

    /// True for optimistic-lock conflicts, recoverable by reload-and-retry.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::StaleObject { .. })
    }

    /// True for validation failures surfaced to the caller.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::RecordInvalid { .. } | Self::RecordNotSaved | Self::RecordNotDestroyed
        )
    }

    /// True for errors raised only at schema-definition time.
    #[must_use]
    pub const fn is_schema(&self) -> bool {
        matches!(self, Self::Schema(_))
    }
}
