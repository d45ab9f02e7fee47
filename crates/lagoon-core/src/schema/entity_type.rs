use crate::{
    schema::{
        SchemaError,
        attribute::{self, AttributeDescriptor, LogicalType},
        index::{GlobalIndexDescriptor, LocalIndexDescriptor, Projection},
    },
    store::table::{AttributeDefinition, KeySchema, Throughput},
    value::Value,
};

/// Name of the generic identity accessor. A child schema's installed
/// hash key may never collide with it.
pub const GENERIC_ID: &str = "id";

/// Default hash-key attribute for plain schemas.
const DEFAULT_HASH_KEY: &str = "uuid";

/// Default optimistic-lock attribute.
const DEFAULT_LOCK_ATTRIBUTE: &str = "lock_version";

///
/// KeyKind
///
/// How the primary key is assembled. The association "kind" is a tagged
/// variant here, not a type hierarchy: a child schema folds its parent's
/// key into the hash key and keeps its own id in the range key.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum KeyKind {
    Plain,
    ChildOf { parent: String },
}

///
/// Dependent
///
/// What happens to child rows when their parent is destroyed.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Dependent {
    /// Load and recursively destroy each child (hooks and cascades run).
    Destroy,
    /// Delete each child's row directly, no recursion.
    Delete,
    /// Rewrite each child's hash key to the null sentinel, orphaning it.
    Nullify,
}

///
/// HasMany
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HasMany {
    pub child: String,
    pub dependent: Dependent,
}

///
/// EntityType
///
/// The finalized, immutable schema of one entity type: its ordered
/// attribute catalog, key layout, lock/timestamp configuration and
/// declared indexes. Built once and shared by reference.
///

#[derive(Clone, Debug)]
pub struct EntityType {
    name: String,
    table_name: String,
    attributes: Vec<AttributeDescriptor>,
    hash_key: String,
    range_key: Option<String>,
    lock_attribute: Option<String>,
    timestamps: Option<(String, String)>,
    key_kind: KeyKind,
    has_many: Vec<HasMany>,
    local_indexes: Vec<LocalIndexDescriptor>,
    global_indexes: Vec<GlobalIndexDescriptor>,
    throughput: Throughput,
    create_policy: bool,
}

impl EntityType {
    #[must_use]
    pub fn builder(name: impl Into<String>) -> EntityTypeBuilder {
        EntityTypeBuilder::new(name)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Attribute metadata by name, or `None` when undeclared.
    #[must_use]
    pub fn describe(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes.iter().find(|d| d.name == name)
    }

    pub fn describe_strict(&self, name: &str) -> Result<&AttributeDescriptor, SchemaError> {
        self.describe(name).ok_or_else(|| SchemaError::UnknownAttribute {
            entity: self.name.clone(),
            attribute: name.to_string(),
        })
    }

    /// Declaration-ordered attribute catalog.
    #[must_use]
    pub fn attributes(&self) -> &[AttributeDescriptor] {
        &self.attributes
    }

    #[must_use]
    pub fn hash_key(&self) -> &str {
        &self.hash_key
    }

    #[must_use]
    pub fn range_key(&self) -> Option<&str> {
        self.range_key.as_deref()
    }

    #[must_use]
    pub fn lock_attribute(&self) -> Option<&str> {
        self.lock_attribute.as_deref()
    }

    #[must_use]
    pub fn created_at_attribute(&self) -> Option<&str> {
        self.timestamps.as_ref().map(|(c, _)| c.as_str())
    }

    #[must_use]
    pub fn updated_at_attribute(&self) -> Option<&str> {
        self.timestamps.as_ref().map(|(_, u)| u.as_str())
    }

    #[must_use]
    pub const fn key_kind(&self) -> &KeyKind {
        &self.key_kind
    }

    #[must_use]
    pub const fn is_child(&self) -> bool {
        matches!(self.key_kind, KeyKind::ChildOf { .. })
    }

    #[must_use]
    pub fn parent(&self) -> Option<&str> {
        match &self.key_kind {
            KeyKind::ChildOf { parent } => Some(parent),
            KeyKind::Plain => None,
        }
    }

    #[must_use]
    pub fn has_many(&self) -> &[HasMany] {
        &self.has_many
    }

    #[must_use]
    pub fn local_indexes(&self) -> &[LocalIndexDescriptor] {
        &self.local_indexes
    }

    #[must_use]
    pub fn global_indexes(&self) -> &[GlobalIndexDescriptor] {
        &self.global_indexes
    }

    #[must_use]
    pub const fn throughput(&self) -> Throughput {
        self.throughput
    }

    #[must_use]
    pub const fn create_policy(&self) -> bool {
        self.create_policy
    }

    /// Wire-typed primary key schema for table provisioning.
    pub fn key_schema(&self) -> Result<KeySchema, SchemaError> {
        let hash = self.key_attribute_definition(&self.hash_key)?;
        let range = match &self.range_key {
            Some(name) => Some(self.key_attribute_definition(name)?),
            None => None,
        };
        Ok(KeySchema { hash, range })
    }

    fn key_attribute_definition(&self, name: &str) -> Result<AttributeDefinition, SchemaError> {
        let desc = self.describe_strict(name)?;
        let wire_type = desc
            .logical_type
            .wire_type()
            .ok_or_else(|| SchemaError::UnsupportedType {
                attribute: name.to_string(),
                logical_type: desc.logical_type.to_string(),
            })?;
        Ok(AttributeDefinition {
            name: name.to_string(),
            wire_type,
        })
    }
}

///
/// EntityTypeBuilder
///
/// Mutable pre-finalization schema. Declaring a schema injects the hash
/// key attribute, the timestamp pair and the lock attribute unless
/// opted out, mirroring the original's schema declaration.
///

#[derive(Clone, Debug)]
pub struct EntityTypeBuilder {
    name: String,
    table_name: Option<String>,
    table_name_prefix: Option<String>,
    table_name_suffix: Option<String>,
    hash_key: String,
    range_key: Option<String>,
    lock_attribute: Option<String>,
    timestamps: Option<(String, String)>,
    attributes: Vec<AttributeDescriptor>,
    key_kind: KeyKind,
    has_many: Vec<HasMany>,
    local_indexes: Vec<LocalIndexDescriptor>,
    global_indexes: Vec<GlobalIndexDescriptor>,
    throughput: Throughput,
    create_policy: bool,
}

impl EntityTypeBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table_name: None,
            table_name_prefix: None,
            table_name_suffix: None,
            hash_key: DEFAULT_HASH_KEY.to_string(),
            range_key: None,
            lock_attribute: Some(DEFAULT_LOCK_ATTRIBUTE.to_string()),
            timestamps: Some(("created_at".to_string(), "updated_at".to_string())),
            attributes: Vec::new(),
            key_kind: KeyKind::Plain,
            has_many: Vec::new(),
            local_indexes: Vec::new(),
            global_indexes: Vec::new(),
            throughput: Throughput::default(),
            create_policy: false,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn is_child(&self) -> bool {
        matches!(self.key_kind, KeyKind::ChildOf { .. })
    }

    #[must_use]
    pub fn table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn table_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_name_prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn table_name_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.table_name_suffix = Some(suffix.into());
        self
    }

    #[must_use]
    pub fn hash_key(mut self, name: impl Into<String>) -> Self {
        self.hash_key = name.into();
        self
    }

    #[must_use]
    pub fn range_key(mut self, name: impl Into<String>) -> Self {
        self.range_key = Some(name.into());
        self
    }

    #[must_use]
    pub fn lock_attribute(mut self, name: impl Into<String>) -> Self {
        self.lock_attribute = Some(name.into());
        self
    }

    #[must_use]
    pub fn no_locking(mut self) -> Self {
        self.lock_attribute = None;
        self
    }

    #[must_use]
    pub fn timestamps(mut self, created: impl Into<String>, updated: impl Into<String>) -> Self {
        self.timestamps = Some((created.into(), updated.into()));
        self
    }

    #[must_use]
    pub fn no_timestamps(mut self) -> Self {
        self.timestamps = None;
        self
    }

    #[must_use]
    pub const fn throughput(mut self, throughput: Throughput) -> Self {
        self.throughput = throughput;
        self
    }

    /// Allow connection establishment to create a missing table.
    #[must_use]
    pub const fn create_table(mut self) -> Self {
        self.create_policy = true;
        self
    }

    /// Declare one attribute. Redeclaring a name replaces the earlier
    /// descriptor, matching the original's last-wins field map.
    #[must_use]
    pub fn attribute(mut self, descriptor: AttributeDescriptor) -> Self {
        self.attributes.retain(|d| d.name != descriptor.name);
        self.attributes.push(descriptor);
        self
    }

    #[must_use]
    pub fn string(self, name: &str) -> Self {
        self.attribute(AttributeDescriptor::new(name, LogicalType::String))
    }

    #[must_use]
    pub fn integer(self, name: &str) -> Self {
        self.attribute(AttributeDescriptor::new(name, LogicalType::Integer))
    }

    #[must_use]
    pub fn float(self, name: &str) -> Self {
        self.attribute(AttributeDescriptor::new(name, LogicalType::Float))
    }

    #[must_use]
    pub fn boolean(self, name: &str) -> Self {
        self.attribute(AttributeDescriptor::new(name, LogicalType::Boolean))
    }

    #[must_use]
    pub fn datetime(self, name: &str) -> Self {
        self.attribute(AttributeDescriptor::new(name, LogicalType::DateTime))
    }

    #[must_use]
    pub fn serialized(self, name: &str) -> Self {
        self.attribute(AttributeDescriptor::new(name, LogicalType::Serialized))
    }

    #[must_use]
    pub fn reference(self, name: &str, target: &str) -> Self {
        let mut desc = AttributeDescriptor::new(name, LogicalType::Reference);
        desc.references = Some(target.to_string());
        self.attribute(desc)
    }

    #[must_use]
    pub fn set_of(self, name: &str, element: LogicalType) -> Self {
        self.attribute(AttributeDescriptor::new(
            name,
            LogicalType::SetOf(Box::new(element)),
        ))
    }

    /// Declare a local secondary index over a non-key attribute.
    #[must_use]
    pub fn local_index(mut self, range_attribute: &str) -> Self {
        if !self
            .local_indexes
            .iter()
            .any(|i| i.range_attribute == range_attribute)
        {
            self.local_indexes
                .push(LocalIndexDescriptor::for_attribute(range_attribute));
        }
        self
    }

    /// Declare a global secondary index.
    #[must_use]
    pub fn global_index(
        mut self,
        hash_attribute: &str,
        range_attribute: Option<&str>,
        projection: Projection,
    ) -> Self {
        let index_name = GlobalIndexDescriptor::name_for(hash_attribute, range_attribute);
        self.global_indexes.push(GlobalIndexDescriptor {
            index_name,
            hash_attribute: hash_attribute.to_string(),
            range_attribute: range_attribute.map(ToString::to_string),
            projection,
            throughput: self.throughput,
        });
        self
    }

    /// Declare a has-many collection of `child` rows with the given
    /// dependent policy. The child must be bound to this type before the
    /// registry finalizes.
    #[must_use]
    pub fn has_many_of(mut self, child: &str, dependent: Dependent) -> Self {
        self.has_many.push(HasMany {
            child: child.to_string(),
            dependent,
        });
        self
    }

    /// Rewire this schema as a child of `parent`: the declared primary
    /// key becomes the range key and a new reference hash key holding
    /// the parent's key is installed. Enforced once per type.
    pub fn bind_child_of(&mut self, parent: &str) -> Result<(), SchemaError> {
        if self.is_child() {
            return Err(SchemaError::AssociationMustBeUnique {
                entity: self.name.clone(),
            });
        }
        if self.range_key.is_some() {
            return Err(SchemaError::RangeKeyMustNotBeSpecified {
                entity: self.name.clone(),
            });
        }
        let foreign_key = format!("{parent}_id");
        if foreign_key == GENERIC_ID {
            return Err(SchemaError::HashKeyMayNotBeNamedId {
                entity: self.name.clone(),
            });
        }

        self.range_key = Some(std::mem::replace(&mut self.hash_key, foreign_key.clone()));

        let mut desc = AttributeDescriptor::new(&foreign_key, LogicalType::Reference);
        desc.foreign_key_of = Some(parent.to_string());
        desc.references = Some(parent.to_string());
        self.attributes.retain(|d| d.name != foreign_key);
        self.attributes.push(desc);

        self.key_kind = KeyKind::ChildOf {
            parent: parent.to_string(),
        };
        Ok(())
    }

    /// Finalize into an immutable `EntityType`, injecting the schema's
    /// automatic attributes and validating every invariant.
    pub fn build(mut self) -> Result<EntityType, SchemaError> {
        if self.hash_key.is_empty() {
            return Err(SchemaError::UnknownPrimaryKey {
                name: self.hash_key,
            });
        }

        // Auto-attributes, injected unless explicitly declared.
        if !self.declares(&self.hash_key) {
            let name = self.hash_key.clone();
            let mut desc = AttributeDescriptor::new(&name, LogicalType::String)
                .with_default(Value::Text(String::new()));
            if let KeyKind::ChildOf { parent } = &self.key_kind {
                desc.logical_type = LogicalType::Reference;
                desc.foreign_key_of = Some(parent.clone());
                desc.references = Some(parent.clone());
            }
            self.attributes.insert(0, desc);
        }
        if let Some(range) = self.range_key.clone() {
            if !self.declares(&range) {
                if self.is_child() {
                    // A child's range key is its own relabeled id.
                    self.attributes.insert(
                        1,
                        AttributeDescriptor::new(&range, LogicalType::String)
                            .with_default(Value::Text(String::new())),
                    );
                } else {
                    return Err(SchemaError::UnknownPrimaryKey { name: range });
                }
            }
        }
        if let Some((created, updated)) = self.timestamps.clone() {
            if !self.declares(&created) {
                self.attributes
                    .push(AttributeDescriptor::new(&created, LogicalType::DateTime));
            }
            if !self.declares(&updated) {
                self.attributes
                    .push(AttributeDescriptor::new(&updated, LogicalType::DateTime));
            }
        }
        if let Some(lock) = self.lock_attribute.clone() {
            if !self.declares(&lock) {
                self.attributes.push(
                    AttributeDescriptor::new(&lock, LogicalType::Integer)
                        .with_default(Value::Int(0)),
                );
            }
        }

        self.validate()?;

        // Attribute-level local index flags become index descriptors.
        let mut local_indexes = self.local_indexes;
        for desc in &self.attributes {
            if desc.local_secondary_index
                && !local_indexes.iter().any(|i| i.range_attribute == desc.name)
            {
                local_indexes.push(LocalIndexDescriptor::for_attribute(&desc.name));
            }
        }

        let table_name = {
            let base = self.table_name.unwrap_or_else(|| format!("{}s", self.name));
            format!(
                "{}{}{}",
                self.table_name_prefix.as_deref().unwrap_or(""),
                base,
                self.table_name_suffix.as_deref().unwrap_or(""),
            )
        };

        Ok(EntityType {
            name: self.name,
            table_name,
            attributes: self.attributes,
            hash_key: self.hash_key,
            range_key: self.range_key,
            lock_attribute: self.lock_attribute,
            timestamps: self.timestamps,
            key_kind: self.key_kind,
            has_many: self.has_many,
            local_indexes,
            global_indexes: self.global_indexes,
            throughput: self.throughput,
            create_policy: self.create_policy,
        })
    }

    fn declares(&self, name: &str) -> bool {
        self.attributes.iter().any(|d| d.name == name)
    }

    fn validate(&self) -> Result<(), SchemaError> {
        let mut foreign_keys = 0_usize;
        for desc in &self.attributes {
            if attribute::is_dangerous(&desc.name) {
                return Err(SchemaError::DangerousAttribute {
                    name: desc.name.clone(),
                });
            }
            if desc.foreign_key_of.is_some() {
                foreign_keys += 1;
            }
            if let LogicalType::SetOf(inner) = &desc.logical_type {
                if !inner.is_set_element() {
                    return Err(SchemaError::UnsupportedType {
                        attribute: desc.name.clone(),
                        logical_type: desc.logical_type.to_string(),
                    });
                }
            }
        }
        if foreign_keys > 1 {
            return Err(SchemaError::AssociationMustBeUnique {
                entity: self.name.clone(),
            });
        }

        // Key and index attributes must exist and be keyable.
        let mut keyed: Vec<&str> = vec![&self.hash_key];
        if let Some(range) = &self.range_key {
            keyed.push(range);
        }
        for lsi in &self.local_indexes {
            keyed.push(&lsi.range_attribute);
        }
        for gsi in &self.global_indexes {
            keyed.push(&gsi.hash_attribute);
            if let Some(range) = &gsi.range_attribute {
                keyed.push(range);
            }
        }
        for name in keyed {
            let desc = self
                .attributes
                .iter()
                .find(|d| d.name == name)
                .ok_or_else(|| SchemaError::UnknownAttribute {
                    entity: self.name.clone(),
                    attribute: name.to_string(),
                })?;
            if desc.logical_type.wire_type().is_none() {
                return Err(SchemaError::UnsupportedType {
                    attribute: name.to_string(),
                    logical_type: desc.logical_type.to_string(),
                });
            }
        }
        Ok(())
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_injects_auto_attributes() {
        let et = EntityType::builder("order")
            .float("total")
            .build()
            .expect("schema should build");

        assert_eq!(et.hash_key(), "uuid");
        assert!(et.describe("uuid").is_some());
        assert!(et.describe("created_at").is_some());
        assert!(et.describe("updated_at").is_some());
        let lock = et.describe("lock_version").expect("lock attribute");
        assert_eq!(lock.default, Some(Value::Int(0)));
        assert_eq!(et.table_name(), "orders");
    }

    #[test]
    fn dangerous_attribute_names_are_rejected() {
        let err = EntityType::builder("order").string("id").build().unwrap_err();
        assert!(matches!(err, SchemaError::DangerousAttribute { .. }));
    }

    #[test]
    fn undeclared_range_key_is_rejected() {
        let err = EntityType::builder("event")
            .range_key("at")
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownPrimaryKey { .. }));
    }

    #[test]
    fn child_binding_relabels_keys() {
        let mut b = EntityType::builder("line_item");
        b.bind_child_of("order").expect("bind");
        let et = b.build().expect("schema should build");

        assert_eq!(et.hash_key(), "order_id");
        assert_eq!(et.range_key(), Some("uuid"));
        assert!(et.is_child());
        let fk = et.describe("order_id").expect("foreign key attribute");
        assert_eq!(fk.foreign_key_of.as_deref(), Some("order"));
    }

    #[test]
    fn child_binding_is_unique_per_type() {
        let mut b = EntityType::builder("line_item");
        b.bind_child_of("order").expect("first bind");
        let err = b.bind_child_of("invoice").unwrap_err();
        assert!(matches!(err, SchemaError::AssociationMustBeUnique { .. }));
    }

    #[test]
    fn child_binding_rejects_explicit_range_key() {
        let mut b = EntityType::builder("line_item").string("seq").range_key("seq");
        let err = b.bind_child_of("order").unwrap_err();
        assert!(matches!(err, SchemaError::RangeKeyMustNotBeSpecified { .. }));
    }

    #[test]
    fn set_of_set_is_unsupported() {
        let err = EntityType::builder("m")
            .set_of("x", LogicalType::SetOf(Box::new(LogicalType::String)))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnsupportedType { .. }));
    }

    #[test]
    fn key_schema_derives_wire_types() {
        let et = EntityType::builder("event")
            .integer("seq")
            .range_key("seq")
            .build()
            .expect("schema should build");
        let ks = et.key_schema().expect("key schema");
        assert_eq!(ks.hash.wire_type, crate::value::WireType::String);
        assert_eq!(ks.range.unwrap().wire_type, crate::value::WireType::Numeric);
    }
}
