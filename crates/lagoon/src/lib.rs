//! Facade crate for lagoon: a fixed-schema, strongly-typed row layer
//! over a schemaless wide-column key-value store.
//!
//! ## Crate layout
//! - `core`: the whole engine — schema, codec, keys, store access and
//!   the session orchestrator.
//!
//! The `prelude` module mirrors the surface application code needs:
//! declare entity types, build a registry, open a session, go.

pub use lagoon_core as core;

pub use lagoon_core::{Error, prelude};
