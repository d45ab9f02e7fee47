use crate::{
    key::PrimaryKey,
    schema::index::{GlobalIndexDescriptor, LocalIndexDescriptor, Projection},
    store::{
        Condition, Cursor, KeyCondition, Page, ReadConsistency, StoreClient, StoreError,
        table::{
            AttributeDefinition, KeySchema, TableAdministrator, TableDescription, TableError,
            TableStatus, Throughput,
        },
    },
    value::{WireItem, WireValue},
};
use std::{
    cmp::Ordering,
    collections::BTreeMap,
    sync::RwLock,
};

///
/// MemoryStore
///
/// In-process store double with the same observable semantics as the
/// real backend: conditional writes, hash/range queries, secondary
/// indexes with projections, cursors and limits. Tables are ACTIVE the
/// moment they are created.
///

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<BTreeMap<String, Table>>,
}

#[derive(Debug)]
struct Table {
    key_schema: KeySchema,
    local_indexes: Vec<LocalIndexDescriptor>,
    global_indexes: Vec<GlobalIndexDescriptor>,
    rows: Vec<WireItem>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read_tables(&self) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<String, Table>>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("store lock poisoned".to_string()))
    }

    fn write_tables(&self) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<String, Table>>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("store lock poisoned".to_string()))
    }
}

impl Table {
    fn position_of(&self, hash_attr: &str, hash: &WireValue, range: Option<(&str, &WireValue)>) -> Option<usize> {
        self.rows.iter().position(|row| {
            let hash_matches = row
                .get(hash_attr)
                .is_some_and(|v| v.key_cmp(hash) == Ordering::Equal);
            if !hash_matches {
                return false;
            }
            match range {
                None => true,
                Some((attr, bound)) => row
                    .get(attr)
                    .is_some_and(|v| v.key_cmp(bound) == Ordering::Equal),
            }
        })
    }

    fn position_of_key(&self, key: &PrimaryKey) -> Option<usize> {
        self.position_of(
            &key.hash.0,
            &key.hash.1,
            key.range.as_ref().map(|(a, v)| (a.as_str(), v)),
        )
    }

    // Precondition check against whatever row the key currently maps to.
    // A missing row or missing attribute counts as version 0.
    fn check_condition(&self, row: Option<&WireItem>, condition: Option<&Condition>) -> Result<(), StoreError> {
        let Some(Condition::VersionIs { attribute, expected }) = condition else {
            return Ok(());
        };
        let current = row
            .and_then(|r| r.get(attribute))
            .and_then(WireValue::as_i64)
            .unwrap_or(0);
        if current == *expected {
            Ok(())
        } else {
            Err(StoreError::ConditionFailed)
        }
    }

    /// The primary-key tuple of one row, used both for ordering and as
    /// the cursor token.
    fn row_key(&self, row: &WireItem) -> Vec<(String, WireValue)> {
        let mut out = Vec::with_capacity(2);
        if let Some(v) = row.get(&self.key_schema.hash.name) {
            out.push((self.key_schema.hash.name.clone(), v.clone()));
        }
        if let Some(range) = &self.key_schema.range {
            if let Some(v) = row.get(&range.name) {
                out.push((range.name.clone(), v.clone()));
            }
        }
        out
    }
}

impl StoreClient for MemoryStore {
    fn get_item(
        &self,
        table: &str,
        key: &PrimaryKey,
        _consistency: ReadConsistency,
    ) -> Result<Option<WireItem>, StoreError> {
        let tables = self.read_tables()?;
        let t = tables.get(table).ok_or_else(|| StoreError::UnknownTable {
            name: table.to_string(),
        })?;
        Ok(t.position_of_key(key).map(|i| t.rows[i].clone()))
    }

    fn put_item(
        &self,
        table: &str,
        item: WireItem,
        condition: Option<&Condition>,
    ) -> Result<(), StoreError> {
        let mut tables = self.write_tables()?;
        let t = tables.get_mut(table).ok_or_else(|| StoreError::UnknownTable {
            name: table.to_string(),
        })?;

        let hash_attr = t.key_schema.hash.name.clone();
        let hash = item
            .get(&hash_attr)
            .cloned()
            .ok_or_else(|| StoreError::Backend(format!("item missing hash key '{hash_attr}'")))?;
        let range = t.key_schema.range.as_ref().map(|r| {
            (r.name.clone(), item.get(&r.name).cloned())
        });
        if let Some((name, None)) = &range {
            return Err(StoreError::Backend(format!("item missing range key '{name}'")));
        }
        let range_ref = range
            .as_ref()
            .and_then(|(n, v)| v.as_ref().map(|v| (n.as_str(), v)));

        let existing = t.position_of(&hash_attr, &hash, range_ref);
        t.check_condition(existing.map(|i| &t.rows[i]), condition)?;

        match existing {
            Some(i) => t.rows[i] = item,
            None => t.rows.push(item),
        }
        Ok(())
    }

    fn delete_item(
        &self,
        table: &str,
        key: &PrimaryKey,
        condition: Option<&Condition>,
    ) -> Result<(), StoreError> {
        let mut tables = self.write_tables()?;
        let t = tables.get_mut(table).ok_or_else(|| StoreError::UnknownTable {
            name: table.to_string(),
        })?;
        let existing = t.position_of_key(key);
        t.check_condition(existing.map(|i| &t.rows[i]), condition)?;
        if let Some(i) = existing {
            t.rows.remove(i);
        }
        Ok(())
    }

    fn update_item(
        &self,
        table: &str,
        key: &PrimaryKey,
        updates: &[(String, WireValue)],
        condition: Option<&Condition>,
    ) -> Result<(), StoreError> {
        let mut tables = self.write_tables()?;
        let t = tables.get_mut(table).ok_or_else(|| StoreError::UnknownTable {
            name: table.to_string(),
        })?;
        let existing = t.position_of_key(key);
        t.check_condition(existing.map(|i| &t.rows[i]), condition)?;

        let i = match existing {
            Some(i) => i,
            None => {
                // Upsert semantics: an update against an absent key
                // materializes a row holding just the key attributes.
                let mut row = WireItem::default();
                row.set(key.hash.0.clone(), key.hash.1.clone());
                if let Some((attr, value)) = &key.range {
                    row.set(attr.clone(), value.clone());
                }
                t.rows.push(row);
                t.rows.len() - 1
            }
        };
        for (attr, value) in updates {
            t.rows[i].set(attr.clone(), value.clone());
        }
        Ok(())
    }

    fn query(
        &self,
        table: &str,
        index: Option<&str>,
        key_condition: &KeyCondition,
        _consistency: ReadConsistency,
        limit: Option<usize>,
        cursor: Option<&Cursor>,
    ) -> Result<Page, StoreError> {
        let tables = self.read_tables()?;
        let t = tables.get(table).ok_or_else(|| StoreError::UnknownTable {
            name: table.to_string(),
        })?;

        // Resolve which attribute orders the result set and what the
        // index projects.
        let (sort_attr, projection) = match index {
            None => (
                t.key_schema.range.as_ref().map(|r| r.name.clone()),
                Projection::All,
            ),
            Some(name) => {
                if let Some(lsi) = t.local_indexes.iter().find(|i| i.index_name == name) {
                    (Some(lsi.range_attribute.clone()), Projection::All)
                } else if let Some(gsi) = t.global_indexes.iter().find(|i| i.index_name == name) {
                    (gsi.range_attribute.clone(), gsi.projection)
                } else {
                    return Err(StoreError::Backend(format!("unknown index '{name}'")));
                }
            }
        };

        let (hash_attr, hash_value) = &key_condition.hash;
        let mut matched: Vec<&WireItem> = t
            .rows
            .iter()
            .filter(|row| {
                let hash_ok = row
                    .get(hash_attr)
                    .is_some_and(|v| v.key_cmp(hash_value) == Ordering::Equal);
                if !hash_ok {
                    return false;
                }
                // Sparse-index semantics: rows without the sort
                // attribute are invisible through that index.
                if let Some(attr) = &sort_attr {
                    if index.is_some() && row.get(attr).is_none() {
                        return false;
                    }
                }
                match &key_condition.range {
                    None => true,
                    Some((attr, op, bound)) => row
                        .get(attr)
                        .is_some_and(|v| op.matches(v, bound)),
                }
            })
            .collect();

        matched.sort_by(|a, b| {
            let by_sort = match &sort_attr {
                Some(attr) => match (a.get(attr), b.get(attr)) {
                    (Some(av), Some(bv)) => av.key_cmp(bv),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                },
                None => Ordering::Equal,
            };
            by_sort.then_with(|| cmp_row_keys(&t.row_key(a), &t.row_key(b)))
        });

        Ok(paginate(t, matched, projection, index, sort_attr.as_deref(), limit, cursor))
    }

    fn scan(
        &self,
        table: &str,
        _consistency: ReadConsistency,
        limit: Option<usize>,
        cursor: Option<&Cursor>,
    ) -> Result<Page, StoreError> {
        let tables = self.read_tables()?;
        let t = tables.get(table).ok_or_else(|| StoreError::UnknownTable {
            name: table.to_string(),
        })?;

        let mut all: Vec<&WireItem> = t.rows.iter().collect();
        all.sort_by(|a, b| cmp_row_keys(&t.row_key(a), &t.row_key(b)));

        Ok(paginate(t, all, Projection::All, None, None, limit, cursor))
    }
}

fn cmp_row_keys(a: &[(String, WireValue)], b: &[(String, WireValue)]) -> Ordering {
    for ((_, av), (_, bv)) in a.iter().zip(b.iter()) {
        let ord = av.key_cmp(bv);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

// The ordering key of one row under the active sort: the sort attribute
// (when the traversal has one) followed by the table's primary key.
// Cursors hold this key, so a resume lands on the first row ordered
// strictly after the boundary even when that row has since vanished.
fn order_key(t: &Table, sort_attr: Option<&str>, row: &WireItem) -> Vec<(String, WireValue)> {
    let mut out = Vec::with_capacity(3);
    if let Some(attr) = sort_attr {
        if let Some(v) = row.get(attr) {
            out.push((attr.to_string(), v.clone()));
        }
    }
    out.extend(t.row_key(row));
    out
}

fn paginate(
    t: &Table,
    ordered: Vec<&WireItem>,
    projection: Projection,
    index: Option<&str>,
    sort_attr: Option<&str>,
    limit: Option<usize>,
    cursor: Option<&Cursor>,
) -> Page {
    let start = match cursor {
        None => 0,
        Some(Cursor(last_key)) => ordered
            .iter()
            .position(|row| {
                cmp_row_keys(&order_key(t, sort_attr, row), last_key) == Ordering::Greater
            })
            .unwrap_or(ordered.len()),
    };

    let remaining = &ordered[start..];
    let take = limit.unwrap_or(remaining.len()).min(remaining.len());
    let page: Vec<&WireItem> = remaining[..take].to_vec();

    let next_cursor = if take < remaining.len() {
        page.last().map(|row| Cursor(order_key(t, sort_attr, row)))
    } else {
        None
    };

    let items = page
        .into_iter()
        .map(|row| project(t, row, projection, index))
        .collect();

    Page { items, next_cursor }
}

// A keys-only projection strips everything but the table's primary key
// and the index's own key attributes.
fn project(t: &Table, row: &WireItem, projection: Projection, index: Option<&str>) -> WireItem {
    if projection == Projection::All {
        return row.clone();
    }

    let mut keep: Vec<&str> = vec![&t.key_schema.hash.name];
    if let Some(range) = &t.key_schema.range {
        keep.push(&range.name);
    }
    if let Some(gsi) = index.and_then(|name| t.global_indexes.iter().find(|i| i.index_name == name)) {
        keep.push(&gsi.hash_attribute);
        if let Some(range) = &gsi.range_attribute {
            keep.push(range);
        }
    }

    row.iter()
        .filter(|(name, _)| keep.contains(&name.as_str()))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

impl TableAdministrator for MemoryStore {
    fn exists(&self, name: &str) -> bool {
        self.read_tables().map(|t| t.contains_key(name)).unwrap_or(false)
    }

    fn describe(&self, name: &str) -> Result<TableDescription, TableError> {
        let tables = self.read_tables().map_err(|_| TableError::TableNotFound {
            name: name.to_string(),
        })?;
        let t = tables.get(name).ok_or_else(|| TableError::TableNotFound {
            name: name.to_string(),
        })?;
        let mut index_names: Vec<String> =
            t.local_indexes.iter().map(|i| i.index_name.clone()).collect();
        index_names.extend(t.global_indexes.iter().map(|i| i.index_name.clone()));
        Ok(TableDescription {
            status: TableStatus::Active,
            key_schema: t.key_schema.clone(),
            index_names,
            item_count: t.rows.len() as u64,
        })
    }

    fn create(
        &self,
        name: &str,
        _attribute_definitions: &[AttributeDefinition],
        key_schema: &KeySchema,
        local_indexes: &[LocalIndexDescriptor],
        global_indexes: &[GlobalIndexDescriptor],
        _throughput: Throughput,
    ) -> Result<(), TableError> {
        let mut tables = self.write_tables().map_err(|_| TableError::TableNotFound {
            name: name.to_string(),
        })?;
        tables.insert(
            name.to_string(),
            Table {
                key_schema: key_schema.clone(),
                local_indexes: local_indexes.to_vec(),
                global_indexes: global_indexes.to_vec(),
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<(), TableError> {
        let mut tables = self.write_tables().map_err(|_| TableError::TableNotFound {
            name: name.to_string(),
        })?;
        tables
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| TableError::TableNotFound {
                name: name.to_string(),
            })
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{store::RangeOp, value::WireType};

    fn store_with_table(range: bool) -> MemoryStore {
        let store = MemoryStore::new();
        let key_schema = KeySchema {
            hash: AttributeDefinition {
                name: "uuid".to_string(),
                wire_type: WireType::String,
            },
            range: range.then(|| AttributeDefinition {
                name: "seq".to_string(),
                wire_type: WireType::Numeric,
            }),
        };
        store
            .create("things", &[], &key_schema, &[], &[], Throughput::default())
            .expect("create table");
        store
    }

    fn row(uuid: &str, seq: i64) -> WireItem {
        [
            ("uuid".to_string(), WireValue::Str(uuid.to_string())),
            ("seq".to_string(), WireValue::num_from_i64(seq)),
        ]
        .into_iter()
        .collect()
    }

    fn key(uuid: &str, seq: Option<i64>) -> PrimaryKey {
        PrimaryKey {
            hash: ("uuid".to_string(), WireValue::Str(uuid.to_string())),
            range: seq.map(|n| ("seq".to_string(), WireValue::num_from_i64(n))),
        }
    }

    #[test]
    fn put_then_get_round_trips() {
        let store = store_with_table(false);
        let mut item = WireItem::default();
        item.set("uuid".to_string(), WireValue::Str("a".to_string()));
        store.put_item("things", item.clone(), None).expect("put");
        let got = store
            .get_item("things", &key("a", None), ReadConsistency::Strong)
            .expect("get");
        assert_eq!(got, Some(item));
    }

    #[test]
    fn version_condition_treats_absent_as_zero() {
        let store = store_with_table(false);
        let cond = Condition::VersionIs {
            attribute: "lock_version".to_string(),
            expected: 0,
        };
        let mut item = WireItem::default();
        item.set("uuid".to_string(), WireValue::Str("a".to_string()));
        item.set("lock_version".to_string(), WireValue::num_from_i64(1));
        store.put_item("things", item.clone(), Some(&cond)).expect("first put");

        // Row now holds version 1; expecting 0 again must fail.
        let err = store.put_item("things", item, Some(&cond)).unwrap_err();
        assert!(matches!(err, StoreError::ConditionFailed));
    }

    #[test]
    fn query_orders_by_range_and_honors_operator() {
        let store = store_with_table(true);
        for seq in [30, 10, 20] {
            store.put_item("things", row("p", seq), None).expect("put");
        }
        store.put_item("things", row("other", 5), None).expect("put");

        let cond = KeyCondition {
            hash: ("uuid".to_string(), WireValue::Str("p".to_string())),
            range: Some((
                "seq".to_string(),
                RangeOp::Ge,
                WireValue::num_from_i64(20),
            )),
        };
        let page = store
            .query("things", None, &cond, ReadConsistency::Eventual, None, None)
            .expect("query");
        let seqs: Vec<i64> = page
            .items
            .iter()
            .map(|i| i.get("seq").and_then(WireValue::as_i64).unwrap())
            .collect();
        assert_eq!(seqs, vec![20, 30]);
    }

    #[test]
    fn cursor_resumes_where_the_page_ended() {
        let store = store_with_table(true);
        for seq in 1..=5 {
            store.put_item("things", row("p", seq), None).expect("put");
        }
        let cond = KeyCondition::hash_only("uuid".to_string(), WireValue::Str("p".to_string()));

        let first = store
            .query("things", None, &cond, ReadConsistency::Eventual, Some(2), None)
            .expect("page 1");
        assert_eq!(first.items.len(), 2);
        let cursor = first.next_cursor.expect("more pages");

        let second = store
            .query("things", None, &cond, ReadConsistency::Eventual, Some(2), Some(&cursor))
            .expect("page 2");
        let seqs: Vec<i64> = second
            .items
            .iter()
            .map(|i| i.get("seq").and_then(WireValue::as_i64).unwrap())
            .collect();
        assert_eq!(seqs, vec![3, 4]);
    }

    #[test]
    fn cursor_survives_deletion_of_the_boundary_row() {
        let store = store_with_table(true);
        for seq in 1..=5 {
            store.put_item("things", row("p", seq), None).expect("put");
        }
        let cond = KeyCondition::hash_only("uuid".to_string(), WireValue::Str("p".to_string()));

        let first = store
            .query("things", None, &cond, ReadConsistency::Eventual, Some(2), None)
            .expect("page 1");
        let cursor = first.next_cursor.expect("more pages");

        // The row the cursor points at vanishes between requests. The
        // next page must still start after it, not from the top.
        store
            .delete_item("things", &key("p", Some(2)), None)
            .expect("delete boundary row");

        let second = store
            .query("things", None, &cond, ReadConsistency::Eventual, Some(2), Some(&cursor))
            .expect("page 2");
        let seqs: Vec<i64> = second
            .items
            .iter()
            .map(|i| i.get("seq").and_then(WireValue::as_i64).unwrap())
            .collect();
        assert_eq!(seqs, vec![3, 4], "no row is ever delivered twice");
    }

    #[test]
    fn final_page_has_no_cursor() {
        let store = store_with_table(true);
        for seq in 1..=4 {
            store.put_item("things", row("p", seq), None).expect("put");
        }
        let cond = KeyCondition::hash_only("uuid".to_string(), WireValue::Str("p".to_string()));
        let page = store
            .query("things", None, &cond, ReadConsistency::Eventual, Some(4), None)
            .expect("query");
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn delete_of_absent_row_is_ok() {
        let store = store_with_table(false);
        store
            .delete_item("things", &key("missing", None), None)
            .expect("delete");
    }

    #[test]
    fn unknown_table_is_reported() {
        let store = MemoryStore::new();
        let err = store
            .get_item("nope", &key("a", None), ReadConsistency::Eventual)
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownTable { .. }));
    }
}
