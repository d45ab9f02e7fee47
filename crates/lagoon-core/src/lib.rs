//! Core runtime for lagoon: a fixed-schema, strongly-typed row abstraction
//! over a schemaless wide-column key-value store, with one-to-many
//! parent/child modeling folded into the composite primary key.

pub mod entity;
pub mod error;
pub mod key;
pub mod schema;
pub mod session;
pub mod store;
pub mod value;

pub use error::Error;

///
/// Prelude
///
/// Domain vocabulary only. No stores, paginator internals, or codec
/// helpers are re-exported here.
///

pub mod prelude {
    pub use crate::{
        entity::{Entity, hooks::{HookOutcome, HookPhase, HookRegistry, LifecycleHooks}},
        error::Error,
        schema::{
            Dependent, EntityType, LogicalType, SchemaRegistry,
            registry::SchemaRegistryBuilder,
        },
        session::Session,
        store::{RangeOp, ReadConsistency, StoreClient, TableAdministrator, memory::MemoryStore},
        value::{Reference, Value},
    };
}
