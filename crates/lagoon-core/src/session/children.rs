use crate::{
    entity::Entity,
    error::Error,
    key::{self, NULL_SENTINEL, PrimaryKey},
    schema::{Dependent, EntityType, SchemaError},
    session::Session,
    store::{PageSpec, Paginator, ReadConsistency},
    value::{WireItem, WireValue},
};
use std::sync::Arc;
use tracing::debug;

impl Session<'_> {
    /// Every child row of `parent` in the named child type, fetched via
    /// a single primary-index query on the child table (hash key =
    /// parent's key string). No secondary index is involved.
    pub fn find_children(
        &self,
        parent: &Entity,
        child_type: &str,
    ) -> Result<Vec<Entity>, Error> {
        let child = self.bound_child_type(parent, child_type)?;
        let parent_key = key::key_string(parent)?;
        self.children_of_key(&child, &parent_key)
    }

    /// Child rows under an arbitrary hash-key value, used for sentinel
    /// lookups of nullified orphans.
    pub fn find_children_by_parent_key(
        &self,
        child_type: &str,
        parent_key: &str,
    ) -> Result<Vec<Entity>, Error> {
        let child = Arc::clone(self.registry().get_strict(child_type)?);
        self.children_of_key(&child, parent_key)
    }

    fn children_of_key(
        &self,
        child: &Arc<EntityType>,
        parent_key: &str,
    ) -> Result<Vec<Entity>, Error> {
        let spec = Self::primary_index_query(
            child,
            WireValue::Str(parent_key.to_string()),
            ReadConsistency::Strong,
        );
        let mut out = Vec::new();
        Paginator::new(self.client()).for_each(&PageSpec::Query(spec), |item| {
            out.push(Entity::from_wire(Arc::clone(child), &item)?);
            Ok(())
        })?;
        Ok(out)
    }

    /// Apply each declared has-many cascade before the parent row is
    /// deleted. Children are always walked through the primary-index
    /// query above.
    pub(crate) fn cascade_children(&self, parent: &Entity) -> Result<(), Error> {
        let parent_type = parent.entity_type_arc();
        if parent_type.has_many().is_empty() {
            return Ok(());
        }
        let parent_key = key::key_string(parent)?;

        for assoc in parent_type.has_many() {
            let child = Arc::clone(self.registry().get_strict(&assoc.child)?);
            debug!(
                parent = parent_type.name(),
                child = child.name(),
                policy = ?assoc.dependent,
                "cascading children"
            );
            match assoc.dependent {
                Dependent::Destroy => self.cascade_destroy(&child, &parent_key)?,
                Dependent::Delete => self.cascade_delete(&child, &parent_key)?,
                Dependent::Nullify => self.cascade_nullify(&child, &parent_key)?,
            }
        }
        Ok(())
    }

    // Load each child and destroy it in full, so grandchild cascades
    // and destroy hooks run too. A child whose hook cancels stays.
    fn cascade_destroy(&self, child: &Arc<EntityType>, parent_key: &str) -> Result<(), Error> {
        for mut entity in self.children_of_key(child, parent_key)? {
            self.destroy(&mut entity)?;
        }
        Ok(())
    }

    // Row deletes only; no hooks, no recursion into grandchildren.
    fn cascade_delete(&self, child: &Arc<EntityType>, parent_key: &str) -> Result<(), Error> {
        for item in self.child_rows(child, parent_key)? {
            let pk = row_primary_key(child, &item)?;
            self.client().delete_item(child.table_name(), &pk, None)?;
        }
        Ok(())
    }

    // Orphan instead of delete: the store forbids empty key values, so
    // the hash key is rewritten to the sentinel.
    fn cascade_nullify(&self, child: &Arc<EntityType>, parent_key: &str) -> Result<(), Error> {
        for item in self.child_rows(child, parent_key)? {
            let pk = row_primary_key(child, &item)?;
            let mut orphan = item.clone();
            orphan.set(
                child.hash_key().to_string(),
                WireValue::Str(NULL_SENTINEL.to_string()),
            );
            self.client().delete_item(child.table_name(), &pk, None)?;
            self.client().put_item(child.table_name(), orphan, None)?;
        }
        Ok(())
    }

    fn child_rows(
        &self,
        child: &Arc<EntityType>,
        parent_key: &str,
    ) -> Result<Vec<WireItem>, Error> {
        let spec = Self::primary_index_query(
            child,
            WireValue::Str(parent_key.to_string()),
            ReadConsistency::Strong,
        );
        Paginator::new(self.client()).collect(&PageSpec::Query(spec))
    }

    fn bound_child_type(
        &self,
        parent: &Entity,
        child_type: &str,
    ) -> Result<Arc<EntityType>, Error> {
        let child = self.registry().get_strict(child_type)?;
        if child.parent() != Some(parent.entity_type().name()) {
            return Err(SchemaError::ChildNotBound {
                child: child_type.to_string(),
                parent: parent.entity_type().name().to_string(),
            }
            .into());
        }
        Ok(Arc::clone(child))
    }
}

fn row_primary_key(entity_type: &EntityType, item: &WireItem) -> Result<PrimaryKey, Error> {
    let hash_attr = entity_type.hash_key();
    let hash = item
        .get(hash_attr)
        .cloned()
        .ok_or_else(|| crate::key::KeyError::MissingKey {
            attribute: hash_attr.to_string(),
        })?;
    let range = match entity_type.range_key() {
        None => None,
        Some(attr) => Some((
            attr.to_string(),
            item.get(attr)
                .cloned()
                .ok_or_else(|| crate::key::KeyError::MissingKey {
                    attribute: attr.to_string(),
                })?,
        )),
    };
    Ok(PrimaryKey {
        hash: (hash_attr.to_string(), hash),
        range,
    })
}
