use crate::{
    error::Error,
    key::KeyError,
    schema::{EntityType, SchemaError},
    store::{
        KeyCondition, RangeOp, ReadConsistency,
        paginator::QuerySpec,
        table::{AttributeDefinition, Throughput},
    },
    value::{Value, codec},
};

///
/// Projection
///
/// What a global secondary index stores per entry. Anything but `All`
/// forces a second primary-key lookup per result row, performed
/// transparently by the paginator.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Projection {
    KeysOnly,
    #[default]
    All,
}

///
/// LocalIndexDescriptor
///
/// An alternate sort order within the same hash-key partition.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LocalIndexDescriptor {
    pub index_name: String,
    pub range_attribute: String,
}

impl LocalIndexDescriptor {
    #[must_use]
    pub fn for_attribute(attribute: &str) -> Self {
        Self {
            index_name: format!("{attribute}_index"),
            range_attribute: attribute.to_string(),
        }
    }
}

///
/// GlobalIndexDescriptor
///
/// An alternate full partition+sort key pair over the same table.
/// Reads through it are eventually consistent.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GlobalIndexDescriptor {
    pub index_name: String,
    pub hash_attribute: String,
    pub range_attribute: Option<String>,
    pub projection: Projection,
    pub throughput: Throughput,
}

impl GlobalIndexDescriptor {
    #[must_use]
    pub fn name_for(hash_attribute: &str, range_attribute: Option<&str>) -> String {
        match range_attribute {
            Some(range) => format!("{hash_attribute}_{range}_global"),
            None => format!("{hash_attribute}_global"),
        }
    }
}

/// Wire-typed definitions for every attribute that participates in the
/// table's key schema or any declared index, deduplicated by name.
pub fn attribute_definitions(entity_type: &EntityType) -> Result<Vec<AttributeDefinition>, SchemaError> {
    let mut names: Vec<&str> = vec![entity_type.hash_key()];
    if let Some(range) = entity_type.range_key() {
        names.push(range);
    }
    for lsi in entity_type.local_indexes() {
        names.push(&lsi.range_attribute);
    }
    for gsi in entity_type.global_indexes() {
        names.push(&gsi.hash_attribute);
        if let Some(range) = &gsi.range_attribute {
            names.push(range);
        }
    }
    names.dedup_by(|a, b| a == b);

    let mut out = Vec::with_capacity(names.len());
    for name in names {
        if out.iter().any(|d: &AttributeDefinition| d.name == name) {
            continue;
        }
        let desc = entity_type.describe_strict(name)?;
        let wire_type =
            desc.logical_type
                .wire_type()
                .ok_or_else(|| SchemaError::UnsupportedType {
                    attribute: name.to_string(),
                    logical_type: desc.logical_type.to_string(),
                })?;
        out.push(AttributeDefinition {
            name: name.to_string(),
            wire_type,
        });
    }
    Ok(out)
}

/// Build the query spec `hash_attr = :h [AND range_attr <op> :r]` against
/// the named secondary index. Keys-only projections carry the table's
/// primary-key attribute names so the paginator can hydrate each row.
pub fn key_condition(
    entity_type: &EntityType,
    index_name: &str,
    hash_value: &Value,
    range: Option<(RangeOp, &Value)>,
    consistency: ReadConsistency,
    page_size: Option<usize>,
) -> Result<QuerySpec, Error> {
    let (hash_attr, range_attr, projection) = locate_index(entity_type, index_name)?;

    let hash_desc = entity_type.describe_strict(hash_attr)?;
    let hash_wire = codec::encode(hash_desc, hash_value)?.ok_or_else(|| KeyError::MissingKey {
        attribute: hash_attr.to_string(),
    })?;

    let range_cond = match range {
        None => None,
        Some((op, value)) => {
            let attr = range_attr.ok_or_else(|| SchemaError::UnknownIndex {
                entity: entity_type.name().to_string(),
                index: format!("{index_name} (no range attribute)"),
            })?;
            let desc = entity_type.describe_strict(attr)?;
            let wire = codec::encode(desc, value)?.ok_or_else(|| KeyError::MissingKey {
                attribute: attr.to_string(),
            })?;
            Some((attr.to_string(), op, wire))
        }
    };

    let hydrate_keys = if projection == Projection::All {
        None
    } else {
        Some((
            entity_type.hash_key().to_string(),
            entity_type.range_key().map(ToString::to_string),
        ))
    };

    Ok(QuerySpec {
        table: entity_type.table_name().to_string(),
        index: Some(index_name.to_string()),
        key_condition: KeyCondition {
            hash: (hash_attr.to_string(), hash_wire),
            range: range_cond,
        },
        consistency,
        page_size,
        hydrate_keys,
    })
}

fn locate_index<'a>(
    entity_type: &'a EntityType,
    index_name: &str,
) -> Result<(&'a str, Option<&'a str>, Projection), Error> {
    if let Some(lsi) = entity_type
        .local_indexes()
        .iter()
        .find(|i| i.index_name == index_name)
    {
        // Local indexes share the table's hash key and project all
        // attributes.
        return Ok((
            entity_type.hash_key(),
            Some(lsi.range_attribute.as_str()),
            Projection::All,
        ));
    }
    if let Some(gsi) = entity_type
        .global_indexes()
        .iter()
        .find(|i| i.index_name == index_name)
    {
        return Ok((
            gsi.hash_attribute.as_str(),
            gsi.range_attribute.as_deref(),
            gsi.projection,
        ));
    }
    Err(SchemaError::UnknownIndex {
        entity: entity_type.name().to_string(),
        index: index_name.to_string(),
    }
    .into())
}
