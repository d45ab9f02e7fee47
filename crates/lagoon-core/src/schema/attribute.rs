use crate::value::{Value, WireType};
use std::fmt;

///
/// LogicalType
///
/// The typed-attribute vocabulary of the catalog. `SetOf` nests one level
/// of scalar element type; set-of-set is rejected at schema build time.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LogicalType {
    String,
    Integer,
    Float,
    Boolean,
    DateTime,
    Serialized,
    Reference,
    SetOf(Box<LogicalType>),
}

impl LogicalType {
    /// Wire kind a key or index declaration derives for this type.
    /// Returns `None` for types that cannot key an index (sets, blobs
    /// have a string wire form but sets have no scalar one).
    #[must_use]
    pub const fn wire_type(&self) -> Option<WireType> {
        match self {
            Self::String | Self::Serialized | Self::Reference => Some(WireType::String),
            Self::Integer | Self::Float | Self::DateTime => Some(WireType::Numeric),
            Self::Boolean => Some(WireType::Binary),
            Self::SetOf(_) => None,
        }
    }

    /// True for element types a `SetOf` may carry.
    #[must_use]
    pub const fn is_set_element(&self) -> bool {
        matches!(self, Self::String | Self::Integer | Self::Float | Self::DateTime)
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Integer => write!(f, "integer"),
            Self::Float => write!(f, "float"),
            Self::Boolean => write!(f, "boolean"),
            Self::DateTime => write!(f, "datetime"),
            Self::Serialized => write!(f, "serialized"),
            Self::Reference => write!(f, "reference"),
            Self::SetOf(inner) => write!(f, "set-of({inner})"),
        }
    }
}

///
/// AttributeDescriptor
///
/// Per-attribute schema metadata. Owned by the entity type and immutable
/// once the schema is finalized.
///

#[derive(Clone, Debug, PartialEq)]
pub struct AttributeDescriptor {
    pub name: String,
    pub logical_type: LogicalType,
    /// Declared default, cloned into each new instance.
    pub default: Option<Value>,
    /// Excluded from the persisted wire item.
    pub no_save: bool,
    /// Carries a local secondary index over this attribute.
    pub local_secondary_index: bool,
    /// Set on the hash-key attribute of a child schema: names the parent
    /// entity type whose key this attribute holds.
    pub foreign_key_of: Option<String>,
    /// Target entity type for reference attributes, when known.
    pub references: Option<String>,
}

impl AttributeDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            logical_type,
            default: None,
            no_save: false,
            local_secondary_index: false,
            foreign_key_of: None,
            references: None,
        }
    }

    #[must_use]
    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    #[must_use]
    pub const fn with_no_save(mut self) -> Self {
        self.no_save = true;
        self
    }

    #[must_use]
    pub const fn with_local_index(mut self) -> Self {
        self.local_secondary_index = true;
        self
    }

    /// Value a fresh instance starts with. Strings with no declared
    /// default start at the empty string; everything else starts null.
    #[must_use]
    pub fn default_value(&self) -> Value {
        match (&self.default, &self.logical_type) {
            (Some(v), _) => v.clone(),
            (None, LogicalType::String) => Value::Text(String::new()),
            (None, _) => Value::Null,
        }
    }
}

/// Names the engine itself occupies; declaring an attribute with one of
/// these shadows the generic accessor surface and is rejected.
pub const DANGEROUS_ATTRIBUTES: &[&str] = &[
    "id",
    "attributes",
    "persisted",
    "destroyed",
    "save",
    "create",
    "update",
    "destroy",
    "delete",
    "reload",
    "touch",
    "entity_type",
];

#[must_use]
pub fn is_dangerous(name: &str) -> bool {
    DANGEROUS_ATTRIBUTES.contains(&name)
}
