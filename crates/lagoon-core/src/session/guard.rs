use crate::{
    entity::Entity,
    error::Error,
    key,
    store::{Condition, StoreError},
};
use tracing::warn;

/// Run one write through the optimistic-lock protocol.
///
/// With a lock attribute configured the in-memory version is bumped to
/// `v + 1` before the store call, and the call carries the precondition
/// "stored version == v" (absent counts as 0). On `ConditionFailed` the
/// version is rolled back to exactly `v` and the conflict surfaces as
/// `StaleObject`; any other failure leaves the version alone. Without a
/// lock attribute the write is unconditional.
pub(crate) fn guarded_write(
    entity: &mut Entity,
    write: impl FnOnce(&Entity, Option<&Condition>) -> Result<(), Error>,
) -> Result<(), Error> {
    let Some(lock_attr) = entity.entity_type().lock_attribute().map(ToString::to_string) else {
        return write(entity, None);
    };

    let expected = entity.version();
    let key = key::key_string(entity).unwrap_or_default();
    entity.set_version(expected + 1);

    let condition = Condition::VersionIs {
        attribute: lock_attr,
        expected,
    };
    match write(entity, Some(&condition)) {
        Ok(()) => Ok(()),
        Err(Error::Store(StoreError::ConditionFailed)) => {
            entity.set_version(expected);
            let entity_name = entity.entity_type().name().to_string();
            warn!(entity = %entity_name, %key, "optimistic lock conflict");
            Err(Error::StaleObject {
                entity: entity_name,
                key,
            })
        }
        Err(other) => Err(other),
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::EntityType;
    use std::sync::Arc;

    fn entity(locking: bool) -> Entity {
        let b = EntityType::builder("order");
        let b = if locking { b } else { b.no_locking() };
        Entity::new(Arc::new(b.build().expect("schema")))
    }

    #[test]
    fn success_keeps_the_bumped_version() {
        let mut e = entity(true);
        guarded_write(&mut e, |written, cond| {
            assert_eq!(written.version(), 1, "item is built after the bump");
            assert!(matches!(
                cond,
                Some(Condition::VersionIs { expected: 0, .. })
            ));
            Ok(())
        })
        .expect("write");
        assert_eq!(e.version(), 1);
    }

    #[test]
    fn conflict_rolls_back_to_the_pre_attempt_version() {
        let mut e = entity(true);
        e.set_version(4);
        let err = guarded_write(&mut e, |_, _| {
            Err(StoreError::ConditionFailed.into())
        })
        .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(e.version(), 4, "rollback must restore the exact version");
    }

    #[test]
    fn other_errors_do_not_roll_back() {
        let mut e = entity(true);
        let err = guarded_write(&mut e, |_, _| {
            Err(StoreError::Backend("boom".to_string()).into())
        })
        .unwrap_err();
        assert!(!err.is_conflict());
        assert_eq!(e.version(), 1);
    }

    #[test]
    fn no_lock_attribute_writes_unconditionally() {
        let mut e = entity(false);
        guarded_write(&mut e, |_, cond| {
            assert!(cond.is_none());
            Ok(())
        })
        .expect("write");
        assert_eq!(e.version(), 0);
    }
}
