use crate::entity::Entity;
use std::collections::BTreeMap;
use std::fmt;

///
/// HookPhase
///
/// Every point in the persistence lifecycle at which user code can run.
/// Save phases wrap the create or update phases of the same operation.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HookPhase {
    AfterInitialize,
    BeforeValidation,
    AfterValidation,
    BeforeSave,
    AfterSave,
    BeforeCreate,
    AfterCreate,
    BeforeUpdate,
    AfterUpdate,
    BeforeDestroy,
    AfterDestroy,
    BeforeTouch,
    AfterTouch,
    /// After the store call of a save, destroy or touch has completed.
    AfterCommit,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::AfterInitialize => "after_initialize",
            Self::BeforeValidation => "before_validation",
            Self::AfterValidation => "after_validation",
            Self::BeforeSave => "before_save",
            Self::AfterSave => "after_save",
            Self::BeforeCreate => "before_create",
            Self::AfterCreate => "after_create",
            Self::BeforeUpdate => "before_update",
            Self::AfterUpdate => "after_update",
            Self::BeforeDestroy => "before_destroy",
            Self::AfterDestroy => "after_destroy",
            Self::BeforeTouch => "before_touch",
            Self::AfterTouch => "after_touch",
            Self::AfterCommit => "after_commit",
        };
        write!(f, "{label}")
    }
}

///
/// HookOutcome
///
/// A `Cancel` from a before-phase hook halts the operation; the write
/// never reaches the store.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum HookOutcome {
    #[default]
    Proceed,
    Cancel,
}

///
/// LifecycleHooks
///
/// Per-entity-type lifecycle callbacks and validation. Both default to
/// no-ops, so implementors override only the phases they care about.
///

pub trait LifecycleHooks {
    fn on(&self, _phase: HookPhase, _entity: &mut Entity) -> HookOutcome {
        HookOutcome::Proceed
    }

    /// Validation messages; non-empty means the record is invalid.
    fn validate(&self, _entity: &Entity) -> Vec<String> {
        Vec::new()
    }
}

///
/// HookRegistry
///
/// Hooks keyed by entity type name. Types without an entry proceed
/// through every phase unconditionally.
///

#[derive(Default)]
pub struct HookRegistry {
    hooks: BTreeMap<String, Box<dyn LifecycleHooks + Send + Sync>>,
}

impl HookRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        entity_type: impl Into<String>,
        hooks: Box<dyn LifecycleHooks + Send + Sync>,
    ) {
        self.hooks.insert(entity_type.into(), hooks);
    }

    #[must_use]
    pub fn dispatch(&self, phase: HookPhase, entity: &mut Entity) -> HookOutcome {
        match self.hooks.get(entity.entity_type().name()) {
            Some(hooks) => hooks.on(phase, entity),
            None => HookOutcome::Proceed,
        }
    }

    #[must_use]
    pub fn validate(&self, entity: &Entity) -> Vec<String> {
        match self.hooks.get(entity.entity_type().name()) {
            Some(hooks) => hooks.validate(entity),
            None => Vec::new(),
        }
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("entity_types", &self.hooks.keys().collect::<Vec<_>>())
            .finish()
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{schema::EntityType, value::Value};
    use std::sync::Arc;

    struct StampStatus;

    impl LifecycleHooks for StampStatus {
        fn on(&self, phase: HookPhase, entity: &mut Entity) -> HookOutcome {
            if phase == HookPhase::BeforeSave {
                entity.set("status", "stamped").expect("set");
            }
            HookOutcome::Proceed
        }

        fn validate(&self, entity: &Entity) -> Vec<String> {
            if entity.raw("status").is_blank() {
                vec!["status must be present".to_string()]
            } else {
                Vec::new()
            }
        }
    }

    fn order() -> Entity {
        Entity::new(Arc::new(
            EntityType::builder("order")
                .string("status")
                .build()
                .expect("schema"),
        ))
    }

    #[test]
    fn unregistered_types_proceed() {
        let registry = HookRegistry::new();
        let mut e = order();
        assert_eq!(registry.dispatch(HookPhase::BeforeSave, &mut e), HookOutcome::Proceed);
        assert!(registry.validate(&e).is_empty());
    }

    #[test]
    fn registered_hooks_run_and_validate() {
        let mut registry = HookRegistry::new();
        registry.register("order", Box::new(StampStatus));

        let mut e = order();
        assert_eq!(registry.validate(&e), vec!["status must be present".to_string()]);

        registry.dispatch(HookPhase::BeforeSave, &mut e);
        assert_eq!(e.raw("status"), &Value::Text("stamped".into()));
        assert!(registry.validate(&e).is_empty());
    }
}
