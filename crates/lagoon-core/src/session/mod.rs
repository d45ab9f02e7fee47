mod children;
mod guard;

use crate::{
    entity::{
        Entity, EntityError,
        hooks::{HookOutcome, HookPhase, HookRegistry},
    },
    error::Error,
    key::{self, PrimaryKey},
    schema::{EntityType, SchemaRegistry, index},
    store::{
        PageSpec, Paginator, QuerySpec, RangeOp, ReadConsistency, ScanSpec, StoreClient,
        table::{self, TableAdministrator},
    },
    value::{Reference, Value, WireValue, codec},
};
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use tracing::debug;

///
/// Session
///
/// The single orchestrator every operation goes through: schema
/// registry + store client + lifecycle hooks, composed flat. Holds no
/// caches; all state lives in the entities and the store.
///

pub struct Session<'a> {
    registry: &'a SchemaRegistry,
    client: &'a dyn StoreClient,
    hooks: HookRegistry,
}

impl<'a> Session<'a> {
    #[must_use]
    pub fn new(registry: &'a SchemaRegistry, client: &'a dyn StoreClient) -> Self {
        Self {
            registry,
            client,
            hooks: HookRegistry::new(),
        }
    }

    #[must_use]
    pub fn with_hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = hooks;
        self
    }

    #[must_use]
    pub const fn registry(&self) -> &SchemaRegistry {
        self.registry
    }

    #[must_use]
    pub const fn client(&self) -> &'a dyn StoreClient {
        self.client
    }

    // ------------------------------------------------------------------
    // construction
    // ------------------------------------------------------------------

    /// A fresh unpersisted instance of the named type, at its declared
    /// defaults.
    pub fn new_entity(&self, type_name: &str) -> Result<Entity, Error> {
        let et = self.registry.get_strict(type_name)?;
        let mut entity = Entity::new(Arc::clone(et));
        self.hooks.dispatch(HookPhase::AfterInitialize, &mut entity);
        Ok(entity)
    }

    /// Build, assign and persist in one step; validation failures raise.
    pub fn create(&self, type_name: &str, attrs: &[(&str, Value)]) -> Result<Entity, Error> {
        let mut entity = self.new_entity(type_name)?;
        for (name, value) in attrs {
            entity.set(name, value.clone())?;
        }
        self.save_strict(&mut entity)?;
        Ok(entity)
    }

    // ------------------------------------------------------------------
    // save
    // ------------------------------------------------------------------

    /// Persist the entity, creating or updating on `persisted`. Returns
    /// `Ok(false)` when validation fails or a hook cancels; everything
    /// else propagates as an error.
    pub fn save(&self, entity: &mut Entity) -> Result<bool, Error> {
        match self.persist(entity) {
            Ok(()) => Ok(true),
            Err(e) if e.is_validation() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Persist the entity; validation failures and hook cancellations
    /// raise `RecordInvalid` / `RecordNotSaved`.
    pub fn save_strict(&self, entity: &mut Entity) -> Result<(), Error> {
        self.persist(entity)
    }

    /// Assign the given attributes, then save.
    pub fn update_attributes(
        &self,
        entity: &mut Entity,
        attrs: &[(&str, Value)],
    ) -> Result<bool, Error> {
        for (name, value) in attrs {
            entity.set(name, value.clone())?;
        }
        self.save(entity)
    }

    fn persist(&self, entity: &mut Entity) -> Result<(), Error> {
        if entity.is_destroyed() {
            return Err(EntityError::Destroyed {
                entity: entity.entity_type().name().to_string(),
            }
            .into());
        }
        self.run_validation(entity)?;
        if self.cancelled(HookPhase::BeforeSave, entity) {
            return Err(Error::RecordNotSaved);
        }

        if entity.is_new_record() {
            self.create_record(entity)?;
        } else {
            self.update_record(entity)?;
        }

        self.hooks.dispatch(HookPhase::AfterSave, entity);
        self.hooks.dispatch(HookPhase::AfterCommit, entity);
        Ok(())
    }

    fn create_record(&self, entity: &mut Entity) -> Result<(), Error> {
        if self.cancelled(HookPhase::BeforeCreate, entity) {
            return Err(Error::RecordNotSaved);
        }

        // Key completion: plain types generate a blank hash key, child
        // types a blank range key. What cannot be generated must have
        // been assigned by the caller.
        if let Err(e) = key::generate_missing_key(entity) {
            return Err(Error::RecordInvalid {
                messages: vec![e.to_string()],
            });
        }
        let et = entity.entity_type_arc();
        if let Some(range) = et.range_key() {
            if !et.is_child() && entity.raw(range).is_blank() {
                return Err(Error::RecordInvalid {
                    messages: vec![format!("{range} must be present")],
                });
            }
        }

        let now = clock_now();
        if let Some(created) = et.created_at_attribute() {
            if entity.raw(created).is_null() {
                entity.put_raw(created, Value::DateTime(now));
            }
        }
        if let Some(updated) = et.updated_at_attribute() {
            entity.put_raw(updated, Value::DateTime(now));
        }

        let table = et.table_name();
        guard::guarded_write(entity, |written, condition| {
            let item = written.to_wire()?;
            self.client.put_item(table, item, condition)?;
            Ok(())
        })?;

        entity.set_persisted(true);
        debug!(entity = et.name(), "created");
        self.hooks.dispatch(HookPhase::AfterCreate, entity);
        Ok(())
    }

    fn update_record(&self, entity: &mut Entity) -> Result<(), Error> {
        if self.cancelled(HookPhase::BeforeUpdate, entity) {
            return Err(Error::RecordNotSaved);
        }

        let et = entity.entity_type_arc();
        if let Some(updated) = et.updated_at_attribute() {
            entity.put_raw(updated, Value::DateTime(clock_now()));
        }

        let table = et.table_name();
        guard::guarded_write(entity, |written, condition| {
            let item = written.to_wire()?;
            self.client.put_item(table, item, condition)?;
            Ok(())
        })?;

        debug!(entity = et.name(), "updated");
        self.hooks.dispatch(HookPhase::AfterUpdate, entity);
        Ok(())
    }

    fn run_validation(&self, entity: &mut Entity) -> Result<(), Error> {
        if self.cancelled(HookPhase::BeforeValidation, entity) {
            return Err(Error::RecordNotSaved);
        }
        let messages = self.hooks.validate(entity);
        if !messages.is_empty() {
            return Err(Error::RecordInvalid { messages });
        }
        self.hooks.dispatch(HookPhase::AfterValidation, entity);
        Ok(())
    }

    fn cancelled(&self, phase: HookPhase, entity: &mut Entity) -> bool {
        self.hooks.dispatch(phase, entity) == HookOutcome::Cancel
    }

    // ------------------------------------------------------------------
    // lookup
    // ------------------------------------------------------------------

    /// Fetch one row by primary key; `RecordNotFound` when absent.
    pub fn find(
        &self,
        type_name: &str,
        hash: &Value,
        range: Option<&Value>,
        consistency: ReadConsistency,
    ) -> Result<Entity, Error> {
        let et = self.registry.get_strict(type_name)?;
        let pk = key::primary_key_for(et, hash, range)?;
        self.fetch(et, &pk, consistency)
    }

    /// Non-raising lookup: swallows `RecordNotFound` only.
    pub fn find_by_key(
        &self,
        type_name: &str,
        hash: &Value,
        range: Option<&Value>,
        consistency: ReadConsistency,
    ) -> Result<Option<Entity>, Error> {
        match self.find(type_name, hash, range, consistency) {
            Ok(entity) => Ok(Some(entity)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Re-fetch the entity's own row (strongly) and overwrite in-memory
    /// state with it.
    pub fn reload(&self, entity: &mut Entity) -> Result<(), Error> {
        if entity.is_new_record() {
            return Err(Error::NotPersisted { op: "reload" });
        }
        let et = entity.entity_type_arc();
        let pk = key::primary_key(entity)?;
        let loaded = self.fetch(&et, &pk, ReadConsistency::Strong)?;
        entity.adopt(loaded);
        Ok(())
    }

    fn fetch(
        &self,
        entity_type: &Arc<EntityType>,
        pk: &PrimaryKey,
        consistency: ReadConsistency,
    ) -> Result<Entity, Error> {
        let item = self
            .client
            .get_item(entity_type.table_name(), pk, consistency)?
            .ok_or_else(|| Error::RecordNotFound {
                entity: entity_type.name().to_string(),
                key: pk.key_string(),
            })?;
        Ok(Entity::from_wire(Arc::clone(entity_type), &item)?)
    }

    // ------------------------------------------------------------------
    // destroy / delete
    // ------------------------------------------------------------------

    /// Destroy with hooks and cascades. Returns `Ok(false)` when a
    /// `before_destroy` hook cancels.
    pub fn destroy(&self, entity: &mut Entity) -> Result<bool, Error> {
        if entity.is_new_record() {
            return Err(Error::NotPersisted { op: "destroy" });
        }
        if self.cancelled(HookPhase::BeforeDestroy, entity) {
            return Ok(false);
        }

        self.cascade_children(entity)?;

        let et = entity.entity_type_arc();
        let table = et.table_name();
        guard::guarded_write(entity, |written, condition| {
            let pk = key::primary_key(written)?;
            self.client.delete_item(table, &pk, condition)?;
            Ok(())
        })?;

        entity.set_destroyed();
        debug!(entity = et.name(), "destroyed");
        self.hooks.dispatch(HookPhase::AfterDestroy, entity);
        self.hooks.dispatch(HookPhase::AfterCommit, entity);
        Ok(true)
    }

    /// Destroy; a hook cancellation raises `RecordNotDestroyed`.
    pub fn destroy_strict(&self, entity: &mut Entity) -> Result<(), Error> {
        if self.destroy(entity)? {
            Ok(())
        } else {
            Err(Error::RecordNotDestroyed)
        }
    }

    /// Row-level delete by key, without loading, hooks or cascades.
    /// Returns whether the row existed.
    pub fn delete_row(
        &self,
        type_name: &str,
        hash: &Value,
        range: Option<&Value>,
    ) -> Result<bool, Error> {
        let et = self.registry.get_strict(type_name)?;
        let pk = key::primary_key_for(et, hash, range)?;
        let existed = self
            .client
            .get_item(et.table_name(), &pk, ReadConsistency::Strong)?
            .is_some();
        self.client.delete_item(et.table_name(), &pk, None)?;
        Ok(existed)
    }

    // ------------------------------------------------------------------
    // touch
    // ------------------------------------------------------------------

    /// Attribute-level conditional update of the updated-at timestamp
    /// plus an optional named extra attribute.
    pub fn touch(&self, entity: &mut Entity, extra: Option<(&str, Value)>) -> Result<(), Error> {
        if entity.is_new_record() {
            return Err(Error::NotPersisted { op: "touch" });
        }
        if self.cancelled(HookPhase::BeforeTouch, entity) {
            return Err(Error::RecordNotSaved);
        }

        let et = entity.entity_type_arc();
        let now = clock_now();
        let mut touched: Vec<String> = Vec::with_capacity(2);
        if let Some(updated) = et.updated_at_attribute() {
            entity.put_raw(updated, Value::DateTime(now));
            touched.push(updated.to_string());
        }
        if let Some((name, value)) = extra {
            entity.set(name, value)?;
            touched.push(name.to_string());
        }

        let table = et.table_name();
        guard::guarded_write(entity, |written, condition| {
            let pk = key::primary_key(written)?;
            let mut updates: Vec<(String, WireValue)> = Vec::with_capacity(touched.len() + 1);
            for attr in &touched {
                let desc = et.describe_strict(attr)?;
                if let Some(wire) = codec::encode(desc, written.raw(attr))? {
                    updates.push((attr.clone(), wire));
                }
            }
            if let Some(lock) = et.lock_attribute() {
                updates.push((lock.to_string(), WireValue::num_from_i64(written.version())));
            }
            self.client.update_item(table, &pk, &updates, condition)?;
            Ok(())
        })?;

        debug!(entity = et.name(), "touched");
        self.hooks.dispatch(HookPhase::AfterTouch, entity);
        self.hooks.dispatch(HookPhase::AfterCommit, entity);
        Ok(())
    }

    // ------------------------------------------------------------------
    // references
    // ------------------------------------------------------------------

    /// Resolve a reference attribute: a raw key string is fetched once
    /// and memoized as the loaded entity; further calls return the
    /// memoized copy. `Ok(None)` when the attribute is nil.
    pub fn resolve<'e>(
        &self,
        entity: &'e mut Entity,
        attribute: &str,
    ) -> Result<Option<&'e Entity>, Error> {
        let et = entity.entity_type_arc();
        let desc = et.describe_strict(attribute)?;
        let target_name = desc
            .references
            .clone()
            .ok_or_else(|| crate::schema::SchemaError::UnknownEntityType {
                name: format!("target of reference attribute '{attribute}'"),
            })?;

        let key_str = match entity.raw(attribute) {
            Value::Null => return Ok(None),
            Value::Text(s) if s.is_empty() => return Ok(None),
            Value::Text(s) => s.clone(),
            Value::Reference(Reference::Loaded(_)) => {
                return Ok(entity.raw(attribute).as_reference().and_then(Reference::entity));
            }
            Value::Reference(Reference::Key(k)) => k.clone(),
            other => {
                return Err(codec::CodecError::TypeMismatch {
                    attribute: attribute.to_string(),
                    expected: "reference".to_string(),
                    found: other.kind().to_string(),
                }
                .into());
            }
        };

        let target = self.registry.get_strict(&target_name)?;
        let pk = key::parse_key_string(target, &key_str)?;
        let loaded = self.fetch(target, &pk, ReadConsistency::Eventual)?;
        entity.put_raw(attribute, Value::Reference(Reference::from(loaded)));
        Ok(entity.raw(attribute).as_reference().and_then(Reference::entity))
    }

    // ------------------------------------------------------------------
    // queries
    // ------------------------------------------------------------------

    /// Query a declared local or global secondary index.
    pub fn query_index(
        &self,
        type_name: &str,
        index_name: &str,
        hash: &Value,
        range: Option<(RangeOp, &Value)>,
        consistency: ReadConsistency,
        limit: Option<usize>,
    ) -> Result<Vec<Entity>, Error> {
        let et = self.registry.get_strict(type_name)?;
        let spec = index::key_condition(et, index_name, hash, range, consistency, None)?;
        self.collect_entities(et, &PageSpec::Query(spec), limit)
    }

    /// Full-table scan in primary-key order.
    pub fn scan(
        &self,
        type_name: &str,
        consistency: ReadConsistency,
        page_size: Option<usize>,
        limit: Option<usize>,
    ) -> Result<Vec<Entity>, Error> {
        let et = self.registry.get_strict(type_name)?;
        let spec = PageSpec::Scan(ScanSpec {
            table: et.table_name().to_string(),
            consistency,
            page_size,
        });
        self.collect_entities(et, &spec, limit)
    }

    /// Exact row count, paged through the whole table.
    pub fn count(&self, type_name: &str) -> Result<usize, Error> {
        let et = self.registry.get_strict(type_name)?;
        let spec = PageSpec::Scan(ScanSpec {
            table: et.table_name().to_string(),
            consistency: ReadConsistency::Eventual,
            page_size: None,
        });
        Paginator::new(self.client).count(&spec)
    }

    /// The store's maintained item count, without reading rows.
    pub fn approximate_count(
        &self,
        admin: &dyn TableAdministrator,
        type_name: &str,
    ) -> Result<u64, Error> {
        let et = self.registry.get_strict(type_name)?;
        Ok(admin.describe(et.table_name())?.item_count)
    }

    fn collect_entities(
        &self,
        entity_type: &Arc<EntityType>,
        spec: &PageSpec,
        limit: Option<usize>,
    ) -> Result<Vec<Entity>, Error> {
        let mut out = Vec::new();
        Paginator::new(self.client)
            .with_row_limit(limit)
            .for_each(spec, |item| {
                out.push(Entity::from_wire(Arc::clone(entity_type), &item)?);
                Ok(())
            })?;
        Ok(out)
    }

    pub(crate) fn primary_index_query(
        entity_type: &EntityType,
        hash: WireValue,
        consistency: ReadConsistency,
    ) -> QuerySpec {
        QuerySpec {
            table: entity_type.table_name().to_string(),
            index: None,
            key_condition: crate::store::KeyCondition::hash_only(
                entity_type.hash_key().to_string(),
                hash,
            ),
            consistency,
            page_size: None,
            hydrate_keys: None,
        }
    }

    // ------------------------------------------------------------------
    // tables
    // ------------------------------------------------------------------

    /// Bring the named type's table to ACTIVE, creating it when the
    /// type's create policy allows.
    pub fn establish(
        &self,
        admin: &dyn TableAdministrator,
        type_name: &str,
    ) -> Result<(), Error> {
        let et = self.registry.get_strict(type_name)?;
        let definitions = index::attribute_definitions(et)?;
        let key_schema = et.key_schema()?;
        table::establish(
            admin,
            et.table_name(),
            &definitions,
            &key_schema,
            et.local_indexes(),
            et.global_indexes(),
            et.throughput(),
            et.create_policy(),
        )?;
        Ok(())
    }

    /// Establish every registered type's table.
    pub fn establish_all(&self, admin: &dyn TableAdministrator) -> Result<(), Error> {
        for et in self.registry.iter() {
            self.establish(admin, et.name())?;
        }
        Ok(())
    }
}

// One clock reading per operation, at the second precision the wire
// format persists.
fn clock_now() -> DateTime<Utc> {
    let now = Utc::now().timestamp();
    Utc.timestamp_opt(now, 0)
        .single()
        .unwrap_or_else(Utc::now)
}
