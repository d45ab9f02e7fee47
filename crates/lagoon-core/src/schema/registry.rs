use crate::schema::{
    SchemaError,
    entity_type::{Dependent, EntityType, EntityTypeBuilder, KeyKind},
};
use std::{collections::BTreeMap, sync::Arc};

///
/// SchemaRegistry
///
/// The finalized set of entity types a session operates over. Built once
/// up front; every cross-type declaration is validated before any
/// operation can run.
///

#[derive(Clone, Debug, Default)]
pub struct SchemaRegistry {
    entity_types: BTreeMap<String, Arc<EntityType>>,
}

impl SchemaRegistry {
    #[must_use]
    pub fn builder() -> SchemaRegistryBuilder {
        SchemaRegistryBuilder::default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<EntityType>> {
        self.entity_types.get(name)
    }

    pub fn get_strict(&self, name: &str) -> Result<&Arc<EntityType>, SchemaError> {
        self.get(name).ok_or_else(|| SchemaError::UnknownEntityType {
            name: name.to_string(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<EntityType>> {
        self.entity_types.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entity_types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entity_types.is_empty()
    }
}

///
/// SchemaRegistryBuilder
///
/// Collects entity-type builders and cross-type associations, then
/// finalizes them together. Association declarations mutate the child's
/// key layout, so they run against the still-mutable builders.
///

#[derive(Debug, Default)]
pub struct SchemaRegistryBuilder {
    builders: BTreeMap<String, EntityTypeBuilder>,
}

impl SchemaRegistryBuilder {
    pub fn register(&mut self, builder: EntityTypeBuilder) -> Result<&mut Self, SchemaError> {
        let name = builder.name().to_string();
        if self.builders.contains_key(&name) {
            return Err(SchemaError::DuplicateEntityType { name });
        }
        self.builders.insert(name, builder);
        Ok(self)
    }

    /// Bind `child` as a child schema of `parent`, relabeling its keys.
    pub fn belongs_to(&mut self, child: &str, parent: &str) -> Result<&mut Self, SchemaError> {
        if !self.builders.contains_key(parent) {
            return Err(SchemaError::UnknownEntityType {
                name: parent.to_string(),
            });
        }
        let builder = self
            .builders
            .get_mut(child)
            .ok_or_else(|| SchemaError::UnknownEntityType {
                name: child.to_string(),
            })?;
        builder.bind_child_of(parent)?;
        Ok(self)
    }

    /// Declare the parent side of the association, with its cascade
    /// policy.
    pub fn has_many(
        &mut self,
        parent: &str,
        child: &str,
        dependent: Dependent,
    ) -> Result<&mut Self, SchemaError> {
        if !self.builders.contains_key(child) {
            return Err(SchemaError::UnknownEntityType {
                name: child.to_string(),
            });
        }
        let builder = self
            .builders
            .remove(parent)
            .ok_or_else(|| SchemaError::UnknownEntityType {
                name: parent.to_string(),
            })?;
        self.builders
            .insert(parent.to_string(), builder.has_many_of(child, dependent));
        Ok(self)
    }

    /// Finalize every registered type and verify the association graph:
    /// each declared parent must exist, and each has-many child must be
    /// bound to exactly that parent.
    pub fn build(self) -> Result<SchemaRegistry, SchemaError> {
        let mut entity_types = BTreeMap::new();
        for (name, builder) in self.builders {
            entity_types.insert(name, Arc::new(builder.build()?));
        }

        for et in entity_types.values() {
            if let KeyKind::ChildOf { parent } = et.key_kind() {
                if !entity_types.contains_key(parent) {
                    return Err(SchemaError::UnknownEntityType {
                        name: parent.clone(),
                    });
                }
            }
            for assoc in et.has_many() {
                let child: &Arc<EntityType> = entity_types.get(&assoc.child).ok_or_else(|| {
                    SchemaError::UnknownEntityType {
                        name: assoc.child.clone(),
                    }
                })?;
                if child.parent() != Some(et.name()) {
                    return Err(SchemaError::ChildNotBound {
                        child: assoc.child.clone(),
                        parent: et.name().to_string(),
                    });
                }
            }
        }

        Ok(SchemaRegistry { entity_types })
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    fn order_and_line_item() -> SchemaRegistryBuilder {
        let mut b = SchemaRegistry::builder();
        b.register(EntityType::builder("order").float("total"))
            .expect("register order");
        b.register(EntityType::builder("line_item").integer("quantity"))
            .expect("register line_item");
        b
    }

    #[test]
    fn association_wires_both_sides() {
        let mut b = order_and_line_item();
        b.belongs_to("line_item", "order").expect("belongs_to");
        b.has_many("order", "line_item", Dependent::Destroy)
            .expect("has_many");
        let registry = b.build().expect("registry should build");

        let li = registry.get("line_item").expect("line_item");
        assert_eq!(li.parent(), Some("order"));
        assert_eq!(li.hash_key(), "order_id");

        let order = registry.get("order").expect("order");
        assert_eq!(order.has_many().len(), 1);
        assert_eq!(order.has_many()[0].dependent, Dependent::Destroy);
    }

    #[test]
    fn has_many_without_belongs_to_is_rejected() {
        let mut b = order_and_line_item();
        b.has_many("order", "line_item", Dependent::Delete)
            .expect("has_many");
        let err = b.build().unwrap_err();
        assert!(matches!(err, SchemaError::ChildNotBound { .. }));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut b = SchemaRegistry::builder();
        b.register(EntityType::builder("order")).expect("first");
        let err = b.register(EntityType::builder("order")).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateEntityType { .. }));
    }

    #[test]
    fn belongs_to_unknown_parent_is_rejected() {
        let mut b = SchemaRegistry::builder();
        b.register(EntityType::builder("line_item")).expect("register");
        let err = b.belongs_to("line_item", "order").unwrap_err();
        assert!(matches!(err, SchemaError::UnknownEntityType { .. }));
    }

    #[test]
    fn grandchild_chain_builds() {
        let mut b = SchemaRegistry::builder();
        b.register(EntityType::builder("forum")).expect("forum");
        b.register(EntityType::builder("topic")).expect("topic");
        b.register(EntityType::builder("post")).expect("post");
        b.belongs_to("topic", "forum").expect("topic -> forum");
        b.belongs_to("post", "topic").expect("post -> topic");
        b.has_many("forum", "topic", Dependent::Destroy).expect("has_many");
        b.has_many("topic", "post", Dependent::Destroy).expect("has_many");
        let registry = b.build().expect("registry should build");

        let post = registry.get("post").expect("post");
        assert_eq!(post.hash_key(), "topic_id");
        let fk = post.describe("topic_id").expect("fk");
        assert_eq!(fk.foreign_key_of.as_deref(), Some("topic"));
    }
}
