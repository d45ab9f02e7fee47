pub mod memory;
pub mod paginator;
pub mod table;

pub use paginator::{PageSpec, Paginator, QuerySpec, ScanSpec};
pub use table::TableAdministrator;

use crate::{key::PrimaryKey, value::{WireItem, WireValue}};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

///
/// ReadConsistency
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ReadConsistency {
    #[default]
    Eventual,
    Strong,
}

impl ReadConsistency {
    #[must_use]
    pub const fn is_strong(self) -> bool {
        matches!(self, Self::Strong)
    }
}

///
/// Condition
///
/// Conditional-write precondition. A missing row or missing attribute
/// counts as version 0, so guarded create, update, delete and touch all
/// share this one shape.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Condition {
    VersionIs { attribute: String, expected: i64 },
}

///
/// RangeOp
///
/// Comparison operators usable against a range key in a key condition.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RangeOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
    BeginsWith,
}

impl RangeOp {
    #[must_use]
    pub fn matches(self, candidate: &WireValue, bound: &WireValue) -> bool {
        use std::cmp::Ordering::*;
        match self {
            Self::Eq => candidate.key_cmp(bound) == Equal,
            Self::Lt => candidate.key_cmp(bound) == Less,
            Self::Le => candidate.key_cmp(bound) != Greater,
            Self::Gt => candidate.key_cmp(bound) == Greater,
            Self::Ge => candidate.key_cmp(bound) != Less,
            Self::BeginsWith => match (candidate, bound) {
                (WireValue::Str(c), WireValue::Str(b)) => c.starts_with(b.as_str()),
                _ => false,
            },
        }
    }
}

///
/// KeyCondition
///
/// `hash_attr = :h [AND range_attr <op> :r]`, against the table's
/// primary index or a named secondary index.
///

#[derive(Clone, Debug, PartialEq)]
pub struct KeyCondition {
    pub hash: (String, WireValue),
    pub range: Option<(String, RangeOp, WireValue)>,
}

impl KeyCondition {
    #[must_use]
    pub const fn hash_only(attribute: String, value: WireValue) -> Self {
        Self {
            hash: (attribute, value),
            range: None,
        }
    }
}

///
/// Cursor
///
/// Opaque continuation token from a paged query/scan call. Callers pass
/// it back verbatim to fetch the next page; only the store interprets it.
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Cursor(pub(crate) Vec<(String, WireValue)>);

///
/// Page
///

#[derive(Clone, Debug, Default)]
pub struct Page {
    pub items: Vec<WireItem>,
    pub next_cursor: Option<Cursor>,
}

///
/// StoreError
///
/// Failures surfaced by the store client. Retry/backoff policy belongs
/// to the client, not this layer; errors propagate unchanged.
///

#[derive(Debug, ThisError)]
pub enum StoreError {
    #[error("conditional write failed")]
    ConditionFailed,

    #[error("unknown table: {name}")]
    UnknownTable { name: String },

    #[error("store backend error: {0}")]
    Backend(String),
}

///
/// StoreClient
///
/// The reliable get/put/delete/query/scan primitives this engine
/// consumes. Transport, retries and backoff live behind this trait.
///

pub trait StoreClient {
    fn get_item(
        &self,
        table: &str,
        key: &PrimaryKey,
        consistency: ReadConsistency,
    ) -> Result<Option<WireItem>, StoreError>;

    fn put_item(
        &self,
        table: &str,
        item: WireItem,
        condition: Option<&Condition>,
    ) -> Result<(), StoreError>;

    fn delete_item(
        &self,
        table: &str,
        key: &PrimaryKey,
        condition: Option<&Condition>,
    ) -> Result<(), StoreError>;

    fn update_item(
        &self,
        table: &str,
        key: &PrimaryKey,
        updates: &[(String, WireValue)],
        condition: Option<&Condition>,
    ) -> Result<(), StoreError>;

    fn query(
        &self,
        table: &str,
        index: Option<&str>,
        key_condition: &KeyCondition,
        consistency: ReadConsistency,
        limit: Option<usize>,
        cursor: Option<&Cursor>,
    ) -> Result<Page, StoreError>;

    fn scan(
        &self,
        table: &str,
        consistency: ReadConsistency,
        limit: Option<usize>,
        cursor: Option<&Cursor>,
    ) -> Result<Page, StoreError>;
}
