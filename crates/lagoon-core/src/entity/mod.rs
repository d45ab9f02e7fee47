pub mod hooks;

use crate::{
    schema::{EntityType, LogicalType},
    value::{
        Reference, Value,
        codec::{self, CodecError},
        wire::WireItem,
    },
};
use std::{collections::BTreeMap, sync::Arc};
use thiserror::Error as ThisError;

static NULL_VALUE: Value = Value::Null;

///
/// EntityError
///

#[derive(Debug, ThisError)]
pub enum EntityError {
    #[error("entity type '{entity}' has no attribute '{attribute}'")]
    UnknownAttribute { entity: String, attribute: String },

    #[error("'{entity}' record is destroyed and cannot be modified")]
    Destroyed { entity: String },
}

///
/// Entity
///
/// One typed row instance. The attribute map always holds exactly the
/// declared catalog; values outside the catalog cannot get in, and
/// every declared attribute reads back even when never assigned.
///

#[derive(Clone, Debug)]
pub struct Entity {
    entity_type: Arc<EntityType>,
    attributes: BTreeMap<String, Value>,
    persisted: bool,
    destroyed: bool,
}

impl Entity {
    /// A fresh, unpersisted instance with every attribute at its
    /// declared default.
    #[must_use]
    pub fn new(entity_type: Arc<EntityType>) -> Self {
        let attributes = entity_type
            .attributes()
            .iter()
            .map(|d| (d.name.clone(), d.default_value()))
            .collect();
        Self {
            entity_type,
            attributes,
            persisted: false,
            destroyed: false,
        }
    }

    #[must_use]
    pub fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    #[must_use]
    pub fn entity_type_arc(&self) -> Arc<EntityType> {
        Arc::clone(&self.entity_type)
    }

    #[must_use]
    pub const fn is_persisted(&self) -> bool {
        self.persisted
    }

    #[must_use]
    pub const fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    #[must_use]
    pub const fn is_new_record(&self) -> bool {
        !self.persisted
    }

    /// Read one attribute. Undeclared names are an error, not nil.
    pub fn get(&self, name: &str) -> Result<&Value, EntityError> {
        self.attributes
            .get(name)
            .ok_or_else(|| EntityError::UnknownAttribute {
                entity: self.entity_type.name().to_string(),
                attribute: name.to_string(),
            })
    }

    /// Assign one attribute. Coercion to the declared type happens at
    /// persist time, except that a key string assigned into a reference
    /// attribute is normalized to `Reference::Key` immediately, so the
    /// in-memory shape matches what a decoded row holds.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), EntityError> {
        if self.destroyed {
            return Err(EntityError::Destroyed {
                entity: self.entity_type.name().to_string(),
            });
        }
        let mut value = value.into();
        let is_reference = self
            .entity_type
            .describe(name)
            .is_some_and(|d| matches!(d.logical_type, LogicalType::Reference));
        if is_reference {
            if let Value::Text(s) = value {
                value = if s.is_empty() {
                    Value::Null
                } else {
                    Value::Reference(Reference::Key(s))
                };
            }
        }
        let slot = self
            .attributes
            .get_mut(name)
            .ok_or_else(|| EntityError::UnknownAttribute {
                entity: self.entity_type.name().to_string(),
                attribute: name.to_string(),
            })?;
        *slot = value;
        Ok(())
    }

    /// Unchecked read used on the key/codec paths, where the attribute
    /// is known to be declared. Absent names read as null.
    #[must_use]
    pub fn raw(&self, name: &str) -> &Value {
        self.attributes.get(name).unwrap_or(&NULL_VALUE)
    }

    pub(crate) fn put_raw(&mut self, name: &str, value: Value) {
        self.attributes.insert(name.to_string(), value);
    }

    pub(crate) fn set_persisted(&mut self, persisted: bool) {
        self.persisted = persisted;
    }

    pub(crate) fn set_destroyed(&mut self) {
        self.destroyed = true;
        self.persisted = false;
    }

    /// Current optimistic-lock version; 0 when unlocked or unset.
    #[must_use]
    pub fn version(&self) -> i64 {
        self.entity_type
            .lock_attribute()
            .and_then(|attr| self.raw(attr).as_int())
            .unwrap_or(0)
    }

    pub(crate) fn set_version(&mut self, version: i64) {
        if let Some(attr) = self.entity_type.lock_attribute().map(ToString::to_string) {
            self.put_raw(&attr, Value::Int(version));
        }
    }

    // Replace in-memory state with a freshly loaded copy of the same row.
    pub(crate) fn adopt(&mut self, loaded: Self) {
        self.attributes = loaded.attributes;
        self.persisted = true;
        self.destroyed = false;
    }

    /// Encode into the persisted wire form: every non-`no_save`
    /// attribute whose encoded value is non-omitted.
    pub fn to_wire(&self) -> Result<WireItem, CodecError> {
        let mut item = WireItem::new();
        for desc in self.entity_type.attributes() {
            if desc.no_save {
                continue;
            }
            if let Some(wire) = codec::encode(desc, self.raw(&desc.name))? {
                item.set(desc.name.clone(), wire);
            }
        }
        Ok(item)
    }

    /// Decode a stored row into a persisted instance. Attributes the
    /// row omits read back per their type's absent form.
    pub fn from_wire(entity_type: Arc<EntityType>, item: &WireItem) -> Result<Self, CodecError> {
        let mut attributes = BTreeMap::new();
        for desc in entity_type.attributes() {
            let value = codec::decode(desc, item.get(&desc.name))?;
            attributes.insert(desc.name.clone(), value);
        }
        Ok(Self {
            entity_type,
            attributes,
            persisted: true,
            destroyed: false,
        })
    }
}

// Two instances are equal when they are the same entity type and hold
// the same attribute values, regardless of persistence state.
impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.entity_type.name() == other.entity_type.name() && self.attributes == other.attributes
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::LogicalType;

    fn order_type() -> Arc<EntityType> {
        Arc::new(
            EntityType::builder("order")
                .string("status")
                .float("total")
                .build()
                .expect("schema"),
        )
    }

    #[test]
    fn new_instance_starts_at_defaults() {
        let e = Entity::new(order_type());
        assert!(e.is_new_record());
        assert_eq!(e.raw("status"), &Value::Text(String::new()));
        assert_eq!(e.raw("total"), &Value::Null);
        assert_eq!(e.version(), 0);
    }

    #[test]
    fn undeclared_attribute_is_an_error() {
        let mut e = Entity::new(order_type());
        assert!(matches!(
            e.get("nope").unwrap_err(),
            EntityError::UnknownAttribute { .. }
        ));
        assert!(matches!(
            e.set("nope", 1_i64).unwrap_err(),
            EntityError::UnknownAttribute { .. }
        ));
    }

    #[test]
    fn key_string_assignment_normalizes_to_a_reference() {
        let et = Arc::new(
            EntityType::builder("line_item")
                .reference("order_ref", "order")
                .build()
                .expect("schema"),
        );
        let mut e = Entity::new(et);

        e.set("order_ref", "ord-1").expect("set");
        assert_eq!(
            e.raw("order_ref"),
            &Value::Reference(Reference::Key("ord-1".into())),
            "the in-memory shape matches a decoded row"
        );

        e.set("order_ref", "").expect("set");
        assert_eq!(e.raw("order_ref"), &Value::Null);
    }

    #[test]
    fn destroyed_instance_rejects_assignment() {
        let mut e = Entity::new(order_type());
        e.set_destroyed();
        assert!(matches!(
            e.set("status", "open").unwrap_err(),
            EntityError::Destroyed { .. }
        ));
    }

    #[test]
    fn wire_round_trip_preserves_values() {
        let mut e = Entity::new(order_type());
        e.set("status", "open").expect("set");
        e.set("total", 12.5_f64).expect("set");
        e.put_raw("uuid", Value::from("k1"));
        let item = e.to_wire().expect("encode");
        let back = Entity::from_wire(e.entity_type_arc(), &item).expect("decode");
        assert!(back.is_persisted());
        assert_eq!(back.raw("status"), &Value::Text("open".into()));
        assert_eq!(back.raw("total"), &Value::Float(12.5));
    }

    #[test]
    fn no_save_attributes_stay_out_of_the_item() {
        let et = Arc::new(
            EntityType::builder("order")
                .attribute(
                    crate::schema::AttributeDescriptor::new("scratch", LogicalType::String)
                        .with_no_save(),
                )
                .build()
                .expect("schema"),
        );
        let mut e = Entity::new(et);
        e.set("scratch", "volatile").expect("set");
        e.put_raw("uuid", Value::from("k1"));
        let item = e.to_wire().expect("encode");
        assert!(item.get("scratch").is_none());
    }

    #[test]
    fn equality_ignores_persistence_state() {
        let et = order_type();
        let mut a = Entity::new(Arc::clone(&et));
        let mut b = Entity::new(et);
        a.set("status", "open").expect("set");
        b.set("status", "open").expect("set");
        b.set_persisted(true);
        assert_eq!(a, b);

        b.set("status", "closed").expect("set");
        assert_ne!(a, b);
    }
}
