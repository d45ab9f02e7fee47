pub mod attribute;
pub mod entity_type;
pub mod index;
pub mod registry;

pub use attribute::{AttributeDescriptor, LogicalType};
pub use entity_type::{Dependent, EntityType, EntityTypeBuilder, HasMany, KeyKind};
pub use index::{GlobalIndexDescriptor, LocalIndexDescriptor, Projection};
pub use registry::SchemaRegistry;

use thiserror::Error as ThisError;

///
/// SchemaError
///
/// Raised only at schema-definition time. Fatal: construction of the
/// registry aborts entirely and nothing schema-invalid ever reaches an
/// operation.
///

#[derive(Debug, ThisError)]
pub enum SchemaError {
    #[error("unknown primary key attribute: '{name}'")]
    UnknownPrimaryKey { name: String },

    #[error("attribute name '{name}' is reserved by the engine")]
    DangerousAttribute { name: String },

    #[error("entity type '{entity}' already has a parent association")]
    AssociationMustBeUnique { entity: String },

    #[error("entity type '{entity}' declares a range key and cannot be a child schema")]
    RangeKeyMustNotBeSpecified { entity: String },

    #[error("the child hash key of '{entity}' may not be named 'id'")]
    HashKeyMayNotBeNamedId { entity: String },

    #[error("attribute '{attribute}' has unsupported type {logical_type} in this position")]
    UnsupportedType {
        attribute: String,
        logical_type: String,
    },

    #[error("entity type '{entity}' has no attribute '{attribute}'")]
    UnknownAttribute { entity: String, attribute: String },

    #[error("entity type '{entity}' has no index '{index}'")]
    UnknownIndex { entity: String, index: String },

    #[error("unknown entity type: '{name}'")]
    UnknownEntityType { name: String },

    #[error("entity type '{name}' is already registered")]
    DuplicateEntityType { name: String },

    #[error("'{child}' is not bound as a child of '{parent}'")]
    ChildNotBound { child: String, parent: String },
}
