use crate::{entity::Entity, key, key::KeyError};

///
/// Reference
///
/// A reference attribute holds either the related entity itself or just
/// its key string. The two states are explicit: decoding always yields
/// `Key`, and `resolve` on the session fetches once and memoizes into
/// `Loaded`. One field never doubles for both meanings implicitly.
///

#[derive(Clone, Debug, PartialEq)]
pub enum Reference {
    /// The raw key string: `hash` or `hash:range` for composite targets.
    Key(String),
    /// The fetched related entity.
    Loaded(Box<Entity>),
}

impl Reference {
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }

    #[must_use]
    pub fn entity(&self) -> Option<&Entity> {
        match self {
            Self::Loaded(e) => Some(e),
            Self::Key(_) => None,
        }
    }

    /// Key string of the referenced row. For a loaded entity this is
    /// `hash_key` plus `:range_key` when the target type declares one.
    pub fn key_string(&self) -> Result<String, KeyError> {
        match self {
            Self::Key(k) => Ok(k.clone()),
            Self::Loaded(e) => key::key_string(e),
        }
    }

    /// Entity type name of a loaded reference, if loaded.
    #[must_use]
    pub fn entity_type_name(&self) -> Option<&str> {
        self.entity().map(|e| e.entity_type().name())
    }
}

impl From<Entity> for Reference {
    fn from(entity: Entity) -> Self {
        Self::Loaded(Box::new(entity))
    }
}
