use crate::{
    entity::Entity,
    schema::EntityType,
    value::{
        Value,
        codec::{self, CodecError},
        wire::WireValue,
    },
};
use thiserror::Error as ThisError;
use uuid::Uuid;

/// Separator between the hash and range parts of a rendered composite
/// key string.
pub const FOREIGN_KEY_SEPARATOR: char = ':';

/// Hash-key value written into orphaned child rows by the nullify
/// cascade. Such rows no longer belong to any parent partition.
pub const NULL_SENTINEL: &str = "NULL";

///
/// KeyError
///

#[derive(Debug, ThisError)]
pub enum KeyError {
    #[error("missing key attribute: '{attribute}'")]
    MissingKey { attribute: String },

    #[error("malformed key string: '{key}'")]
    MalformedKey { key: String },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

///
/// PrimaryKey
///
/// The wire-level identity of one row: the hash attribute and, for
/// composite tables, the range attribute.
///

#[derive(Clone, Debug, PartialEq)]
pub struct PrimaryKey {
    pub hash: (String, WireValue),
    pub range: Option<(String, WireValue)>,
}

impl PrimaryKey {
    /// Render as `hash` or `hash:range`.
    #[must_use]
    pub fn key_string(&self) -> String {
        match &self.range {
            Some((_, range)) => {
                format!("{}{FOREIGN_KEY_SEPARATOR}{range}", self.hash.1)
            }
            None => self.hash.1.to_string(),
        }
    }
}

/// Assemble the primary key from an entity's current attribute values.
/// Fails when the hash value (or a declared range value) is blank.
pub fn primary_key(entity: &Entity) -> Result<PrimaryKey, KeyError> {
    let et = entity.entity_type();
    primary_key_for(et, entity.raw(et.hash_key()), et.range_key().map(|r| entity.raw(r)))
}

/// Assemble a primary key for the given type from loose values.
pub fn primary_key_for(
    entity_type: &EntityType,
    hash: &Value,
    range: Option<&Value>,
) -> Result<PrimaryKey, KeyError> {
    let hash_attr = entity_type.hash_key();
    let hash_desc = entity_type
        .describe(hash_attr)
        .ok_or_else(|| KeyError::MissingKey {
            attribute: hash_attr.to_string(),
        })?;
    let hash_wire = codec::encode(hash_desc, hash)?.ok_or_else(|| KeyError::MissingKey {
        attribute: hash_attr.to_string(),
    })?;

    let range_pair = match entity_type.range_key() {
        None => None,
        Some(range_attr) => {
            let value = range.ok_or_else(|| KeyError::MissingKey {
                attribute: range_attr.to_string(),
            })?;
            let desc = entity_type
                .describe(range_attr)
                .ok_or_else(|| KeyError::MissingKey {
                    attribute: range_attr.to_string(),
                })?;
            let wire = codec::encode(desc, value)?.ok_or_else(|| KeyError::MissingKey {
                attribute: range_attr.to_string(),
            })?;
            Some((range_attr.to_string(), wire))
        }
    };

    Ok(PrimaryKey {
        hash: (hash_attr.to_string(), hash_wire),
        range: range_pair,
    })
}

/// Render an entity's key as `hash` or `hash:range`.
pub fn key_string(entity: &Entity) -> Result<String, KeyError> {
    Ok(primary_key(entity)?.key_string())
}

/// Split a rendered key string back into its hash and range parts. The
/// split is on the LAST separator, so a child hash key that itself holds
/// a composite parent key survives intact.
#[must_use]
pub fn split_key_string(key: &str, has_range: bool) -> (&str, Option<&str>) {
    if !has_range {
        return (key, None);
    }
    match key.rsplit_once(FOREIGN_KEY_SEPARATOR) {
        Some((hash, range)) => (hash, Some(range)),
        None => (key, None),
    }
}

/// Parse a rendered key string into a wire-level primary key for the
/// given type.
pub fn parse_key_string(entity_type: &EntityType, key: &str) -> Result<PrimaryKey, KeyError> {
    let (hash_text, range_text) = split_key_string(key, entity_type.range_key().is_some());
    if hash_text.is_empty() {
        return Err(KeyError::MalformedKey {
            key: key.to_string(),
        });
    }

    let hash_wire = wire_from_text(entity_type, entity_type.hash_key(), hash_text, key)?;
    let range = match entity_type.range_key() {
        None => None,
        Some(range_attr) => {
            let text = range_text.ok_or_else(|| KeyError::MalformedKey {
                key: key.to_string(),
            })?;
            Some((
                range_attr.to_string(),
                wire_from_text(entity_type, range_attr, text, key)?,
            ))
        }
    };

    Ok(PrimaryKey {
        hash: (entity_type.hash_key().to_string(), hash_wire),
        range,
    })
}

fn wire_from_text(
    entity_type: &EntityType,
    attribute: &str,
    text: &str,
    full_key: &str,
) -> Result<WireValue, KeyError> {
    let desc = entity_type
        .describe(attribute)
        .ok_or_else(|| KeyError::MissingKey {
            attribute: attribute.to_string(),
        })?;
    match desc.logical_type.wire_type() {
        Some(crate::value::WireType::Numeric) => {
            if text.parse::<f64>().is_err() {
                return Err(KeyError::MalformedKey {
                    key: full_key.to_string(),
                });
            }
            Ok(WireValue::Num(text.to_string()))
        }
        _ => Ok(WireValue::Str(text.to_string())),
    }
}

/// Fill in absent key parts before a create. Plain types generate the
/// hash key; child types require the foreign key to be present already
/// and generate the range key.
pub fn generate_missing_key(entity: &mut Entity) -> Result<(), KeyError> {
    let et = entity.entity_type_arc();

    if et.is_child() {
        if entity.raw(et.hash_key()).is_blank() {
            return Err(KeyError::MissingKey {
                attribute: et.hash_key().to_string(),
            });
        }
        if let Some(range_attr) = et.range_key() {
            if entity.raw(range_attr).is_blank() {
                entity.put_raw(range_attr, Value::Text(fresh_id()));
            }
        }
    } else if entity.raw(et.hash_key()).is_blank() {
        entity.put_raw(et.hash_key(), Value::Text(fresh_id()));
    }
    Ok(())
}

/// A 36-character random identifier.
#[must_use]
pub fn fresh_id() -> String {
    Uuid::new_v4().to_string()
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::EntityType;
    use std::sync::Arc;

    fn plain_type() -> Arc<EntityType> {
        Arc::new(EntityType::builder("order").build().expect("schema"))
    }

    fn child_type() -> Arc<EntityType> {
        let mut b = EntityType::builder("line_item");
        b.bind_child_of("order").expect("bind");
        Arc::new(b.build().expect("schema"))
    }

    #[test]
    fn fresh_id_is_36_chars() {
        assert_eq!(fresh_id().len(), 36);
    }

    #[test]
    fn plain_key_generates_hash() {
        let mut e = Entity::new(plain_type());
        generate_missing_key(&mut e).expect("generate");
        assert_eq!(e.raw("uuid").as_text().map(str::len), Some(36));
    }

    #[test]
    fn existing_hash_is_preserved() {
        let mut e = Entity::new(plain_type());
        e.put_raw("uuid", Value::from("abc"));
        generate_missing_key(&mut e).expect("generate");
        assert_eq!(e.raw("uuid").as_text(), Some("abc"));
    }

    #[test]
    fn child_without_parent_key_is_rejected() {
        let mut e = Entity::new(child_type());
        let err = generate_missing_key(&mut e).unwrap_err();
        assert!(matches!(err, KeyError::MissingKey { .. }));
    }

    #[test]
    fn child_generates_range_only() {
        let mut e = Entity::new(child_type());
        e.put_raw("order_id", Value::from("parent-key"));
        generate_missing_key(&mut e).expect("generate");
        assert_eq!(e.raw("uuid").as_text().map(str::len), Some(36));
    }

    #[test]
    fn key_string_renders_composite() {
        let mut e = Entity::new(child_type());
        e.put_raw("order_id", Value::from("p1"));
        e.put_raw("uuid", Value::from("c1"));
        assert_eq!(key_string(&e).expect("key"), "p1:c1");
    }

    #[test]
    fn split_uses_last_separator() {
        // A grandchild hash key already contains one separator.
        assert_eq!(split_key_string("a:b:c", true), ("a:b", Some("c")));
        assert_eq!(split_key_string("a", false), ("a", None));
    }

    #[test]
    fn parse_round_trips_plain_key() {
        let et = plain_type();
        let pk = parse_key_string(&et, "abc").expect("parse");
        assert_eq!(pk.hash.1, WireValue::Str("abc".to_string()));
        assert!(pk.range.is_none());
        assert_eq!(pk.key_string(), "abc");
    }

    #[test]
    fn parse_rejects_empty_hash() {
        let et = plain_type();
        assert!(matches!(
            parse_key_string(&et, "").unwrap_err(),
            KeyError::MalformedKey { .. }
        ));
    }
}
