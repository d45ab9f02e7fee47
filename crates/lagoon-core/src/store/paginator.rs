use crate::{
    error::Error,
    key::{KeyError, PrimaryKey},
    store::{Cursor, KeyCondition, Page, ReadConsistency, StoreClient},
    value::WireItem,
};

///
/// QuerySpec
///
/// One fully-resolved key-condition read: table, optional secondary
/// index, encoded condition, and how to page through it. When the index
/// projects keys only, `hydrate_keys` names the table's primary-key
/// attributes so each result row can be re-fetched in full.
///

#[derive(Clone, Debug)]
pub struct QuerySpec {
    pub table: String,
    pub index: Option<String>,
    pub key_condition: KeyCondition,
    pub consistency: ReadConsistency,
    pub page_size: Option<usize>,
    pub hydrate_keys: Option<(String, Option<String>)>,
}

///
/// ScanSpec
///

#[derive(Clone, Debug)]
pub struct ScanSpec {
    pub table: String,
    pub consistency: ReadConsistency,
    pub page_size: Option<usize>,
}

///
/// PageSpec
///

#[derive(Clone, Debug)]
pub enum PageSpec {
    Query(QuerySpec),
    Scan(ScanSpec),
}

impl From<QuerySpec> for PageSpec {
    fn from(spec: QuerySpec) -> Self {
        Self::Query(spec)
    }
}

impl From<ScanSpec> for PageSpec {
    fn from(spec: ScanSpec) -> Self {
        Self::Scan(spec)
    }
}

///
/// Paginator
///
/// Sequential page-by-page traversal. Each page is fetched with the
/// spec's page size; `row_limit` stops further page requests once
/// enough rows have been delivered, but a page already fetched is
/// always delivered whole.
///

pub struct Paginator<'a> {
    client: &'a dyn StoreClient,
    row_limit: Option<usize>,
}

impl<'a> Paginator<'a> {
    #[must_use]
    pub const fn new(client: &'a dyn StoreClient) -> Self {
        Self {
            client,
            row_limit: None,
        }
    }

    #[must_use]
    pub const fn with_row_limit(mut self, limit: Option<usize>) -> Self {
        self.row_limit = limit;
        self
    }

    /// Walk every row the spec matches, in key order, invoking `f` per
    /// row. Returns the number of rows delivered.
    pub fn for_each(
        &self,
        spec: &PageSpec,
        mut f: impl FnMut(WireItem) -> Result<(), Error>,
    ) -> Result<usize, Error> {
        let mut delivered = 0_usize;
        let mut cursor: Option<Cursor> = None;

        loop {
            let page = self.fetch_page(spec, cursor.as_ref())?;
            let next = page.next_cursor;

            for item in page.items {
                let item = self.hydrate(spec, item)?;
                f(item)?;
                delivered += 1;
            }

            let done = next.is_none()
                || self.row_limit.is_some_and(|limit| delivered >= limit);
            if done {
                return Ok(delivered);
            }
            cursor = next;
        }
    }

    /// Collect matching rows into memory.
    pub fn collect(&self, spec: &PageSpec) -> Result<Vec<WireItem>, Error> {
        let mut out = Vec::new();
        self.for_each(spec, |item| {
            out.push(item);
            Ok(())
        })?;
        Ok(out)
    }

    /// Count matching rows without hydrating keys-only projections.
    pub fn count(&self, spec: &PageSpec) -> Result<usize, Error> {
        let mut count = 0_usize;
        let mut cursor: Option<Cursor> = None;
        loop {
            let page = self.fetch_page(spec, cursor.as_ref())?;
            count += page.items.len();
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(count),
            }
        }
    }

    fn fetch_page(&self, spec: &PageSpec, cursor: Option<&Cursor>) -> Result<Page, Error> {
        let page = match spec {
            PageSpec::Query(q) => self.client.query(
                &q.table,
                q.index.as_deref(),
                &q.key_condition,
                q.consistency,
                q.page_size,
                cursor,
            )?,
            PageSpec::Scan(s) => {
                self.client.scan(&s.table, s.consistency, s.page_size, cursor)?
            }
        };
        Ok(page)
    }

    // Keys-only index rows carry just key attributes; fetch the full
    // row through the table's primary index.
    fn hydrate(&self, spec: &PageSpec, item: WireItem) -> Result<WireItem, Error> {
        let PageSpec::Query(q) = spec else {
            return Ok(item);
        };
        let Some((hash_attr, range_attr)) = &q.hydrate_keys else {
            return Ok(item);
        };

        let hash = item
            .get(hash_attr)
            .cloned()
            .ok_or_else(|| KeyError::MissingKey {
                attribute: hash_attr.clone(),
            })?;
        let range = match range_attr {
            None => None,
            Some(attr) => Some((
                attr.clone(),
                item.get(attr).cloned().ok_or_else(|| KeyError::MissingKey {
                    attribute: attr.clone(),
                })?,
            )),
        };
        let key = PrimaryKey {
            hash: (hash_attr.clone(), hash),
            range,
        };

        let full = self
            .client
            .get_item(&q.table, &key, q.consistency)?
            .ok_or_else(|| Error::RecordNotFound {
                entity: q.table.clone(),
                key: key.key_string(),
            })?;
        Ok(full)
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        store::{
            memory::MemoryStore,
            table::{AttributeDefinition, KeySchema, TableAdministrator, Throughput},
        },
        value::{WireType, WireValue},
    };

    fn seeded(rows: usize) -> MemoryStore {
        let store = MemoryStore::new();
        let key_schema = KeySchema {
            hash: AttributeDefinition {
                name: "uuid".to_string(),
                wire_type: WireType::String,
            },
            range: Some(AttributeDefinition {
                name: "seq".to_string(),
                wire_type: WireType::Numeric,
            }),
        };
        store
            .create("rows", &[], &key_schema, &[], &[], Throughput::default())
            .expect("create table");
        for seq in 1..=rows {
            let item: WireItem = [
                ("uuid".to_string(), WireValue::Str("p".to_string())),
                ("seq".to_string(), WireValue::num_from_i64(seq as i64)),
            ]
            .into_iter()
            .collect();
            store.put_item("rows", item, None).expect("put");
        }
        store
    }

    fn query_all() -> PageSpec {
        PageSpec::Query(QuerySpec {
            table: "rows".to_string(),
            index: None,
            key_condition: KeyCondition::hash_only(
                "uuid".to_string(),
                WireValue::Str("p".to_string()),
            ),
            consistency: ReadConsistency::Eventual,
            page_size: Some(3),
            hydrate_keys: None,
        })
    }

    #[test]
    fn walks_every_page_in_order() {
        let store = seeded(7);
        let rows = Paginator::new(&store).collect(&query_all()).expect("collect");
        let seqs: Vec<i64> = rows
            .iter()
            .map(|r| r.get("seq").and_then(WireValue::as_i64).unwrap())
            .collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn row_limit_finishes_the_current_page() {
        let store = seeded(7);
        // Limit 4 with page size 3: two pages are fetched and all six of
        // their rows delivered; a seventh row is never requested.
        let mut seen = 0;
        let delivered = Paginator::new(&store)
            .with_row_limit(Some(4))
            .for_each(&query_all(), |_| {
                seen += 1;
                Ok(())
            })
            .expect("for_each");
        assert_eq!(delivered, 6);
        assert_eq!(seen, 6);
    }

    #[test]
    fn count_sums_pages() {
        let store = seeded(7);
        assert_eq!(Paginator::new(&store).count(&query_all()).expect("count"), 7);
    }
}
