#![allow(dead_code)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use soft_cascade::{
    AccessorKind, CascadeConfig, CascadeError, Clock, DeleteMode, EntityRef, EntityStore,
    RelationSet, Result,
};

/// Clock that ticks forward one millisecond per reading, so tests can tell
/// session-synced stamps from fresh clock reads.
pub struct StepClock {
    next: Mutex<i64>,
}

impl StepClock {
    pub fn new(start: i64) -> Self {
        Self {
            next: Mutex::new(start),
        }
    }
}

impl Clock for StepClock {
    fn now_ms(&self) -> i64 {
        let mut next = self.next.lock().unwrap();
        let value = *next;
        *next += 1;
        value
    }
}

#[derive(Debug, Clone)]
pub enum MemAccessor {
    Relation { target: String, through: bool },
    Attribute,
}

#[derive(Debug, Default)]
pub struct MemTable {
    pub soft_delete: bool,
    pub cascade: Option<CascadeConfig>,
    pub accessors: HashMap<String, MemAccessor>,
}

/// Every collaborator call the engine made, in order of kind.
#[derive(Debug, Default, Clone)]
pub struct CallLog {
    pub resolves: Vec<(String, String)>,
    pub counts: usize,
    pub fetch_alls: usize,
    pub fetch_pages: usize,
    /// Key count per bulk page.
    pub bulk_deletes: Vec<usize>,
    pub delete_alls: usize,
    pub applied: Vec<(EntityRef, DeleteMode, i64)>,
}

#[derive(Default)]
struct Inner {
    tables: HashMap<String, MemTable>,
    // entity type -> id -> soft-delete marker
    rows: HashMap<String, BTreeMap<String, Option<i64>>>,
    // (parent type, relation, parent id) -> deletion-unit ids
    links: HashMap<(String, String, String), Vec<String>>,
    fail_bulk_for: Option<String>,
    log: CallLog,
}

impl Inner {
    fn live_unit_ids(&self, key: &(String, String, String), target: &str) -> Vec<String> {
        let Some(ids) = self.links.get(key) else {
            return Vec::new();
        };
        let rows = self.rows.get(target);
        let mut live: Vec<String> = ids
            .iter()
            .filter(|id| {
                rows.and_then(|r| r.get(id.as_str()))
                    .is_some_and(|marker| marker.is_none())
            })
            .cloned()
            .collect();
        live.sort();
        live
    }

    fn remove_or_mark(
        &mut self,
        target: &str,
        ids: &[String],
        mode: DeleteMode,
        deleted_at: i64,
    ) -> u64 {
        let soft_capable = self
            .tables
            .get(target)
            .is_some_and(|table| table.soft_delete);
        let Some(rows) = self.rows.get_mut(target) else {
            return 0;
        };
        let mut affected = 0;
        for id in ids {
            if mode.is_force() || !soft_capable {
                if rows.remove(id).is_some() {
                    affected += 1;
                }
            } else if let Some(marker) = rows.get_mut(id) {
                if marker.is_none() {
                    *marker = Some(deleted_at);
                    affected += 1;
                }
            }
        }
        affected
    }
}

/// In-memory `EntityStore` that records every collaborator call, in the
/// spirit of the progress-collector fixtures in the household cascade tests.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, name: &str, soft_delete: bool, cascade: Option<CascadeConfig>) -> &Self {
        self.inner.lock().unwrap().tables.insert(
            name.to_string(),
            MemTable {
                soft_delete,
                cascade,
                accessors: HashMap::new(),
            },
        );
        self
    }

    pub fn relation(&self, parent: &str, name: &str, target: &str) -> &Self {
        self.accessor(
            parent,
            name,
            MemAccessor::Relation {
                target: target.to_string(),
                through: false,
            },
        )
    }

    pub fn through_relation(&self, parent: &str, name: &str, pivot: &str) -> &Self {
        self.accessor(
            parent,
            name,
            MemAccessor::Relation {
                target: pivot.to_string(),
                through: true,
            },
        )
    }

    pub fn attribute(&self, parent: &str, name: &str) -> &Self {
        self.accessor(parent, name, MemAccessor::Attribute)
    }

    fn accessor(&self, parent: &str, name: &str, accessor: MemAccessor) -> &Self {
        let mut inner = self.inner.lock().unwrap();
        let table = inner.tables.entry(parent.to_string()).or_default();
        table.accessors.insert(name.to_string(), accessor);
        self
    }

    pub fn insert(&self, entity_type: &str, id: &str) -> &Self {
        self.inner
            .lock()
            .unwrap()
            .rows
            .entry(entity_type.to_string())
            .or_default()
            .insert(id.to_string(), None);
        self
    }

    pub fn link(&self, parent_type: &str, relation: &str, parent_id: &str, unit_id: &str) -> &Self {
        self.inner
            .lock()
            .unwrap()
            .links
            .entry((
                parent_type.to_string(),
                relation.to_string(),
                parent_id.to_string(),
            ))
            .or_default()
            .push(unit_id.to_string());
        self
    }

    /// Make every bulk operation against `target` fail.
    pub fn fail_bulk_deletes_for(&self, target: &str) -> &Self {
        self.inner.lock().unwrap().fail_bulk_for = Some(target.to_string());
        self
    }

    pub fn log(&self) -> CallLog {
        self.inner.lock().unwrap().log.clone()
    }

    /// `None` when the row is gone, `Some(marker)` otherwise.
    pub fn marker(&self, entity_type: &str, id: &str) -> Option<Option<i64>> {
        self.inner
            .lock()
            .unwrap()
            .rows
            .get(entity_type)
            .and_then(|rows| rows.get(id))
            .copied()
    }

    pub fn live_count(&self, entity_type: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .rows
            .get(entity_type)
            .map(|rows| rows.values().filter(|marker| marker.is_none()).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    fn supports_soft_delete(&self, entity_type: &str) -> bool {
        self.inner
            .lock()
            .unwrap()
            .tables
            .get(entity_type)
            .is_some_and(|table| table.soft_delete)
    }

    fn cascade_config(&self, entity_type: &str) -> Option<CascadeConfig> {
        self.inner
            .lock()
            .unwrap()
            .tables
            .get(entity_type)
            .and_then(|table| table.cascade.clone())
    }

    fn describe_accessor(&self, entity_type: &str, name: &str) -> Option<AccessorKind> {
        self.inner
            .lock()
            .unwrap()
            .tables
            .get(entity_type)
            .and_then(|table| table.accessors.get(name))
            .map(|accessor| match accessor {
                MemAccessor::Relation { .. } => AccessorKind::Relation,
                MemAccessor::Attribute => AccessorKind::Attribute,
            })
    }

    async fn resolve(&self, entity: &EntityRef, name: &str) -> Result<Box<dyn RelationSet>> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .log
            .resolves
            .push((entity.entity_type.clone(), name.to_string()));
        let accessor = inner
            .tables
            .get(&entity.entity_type)
            .and_then(|table| table.accessors.get(name))
            .cloned()
            .ok_or_else(|| {
                CascadeError::collaborator(anyhow::anyhow!(
                    "unknown relationship `{name}` on `{}`",
                    entity.entity_type
                ))
            })?;
        let MemAccessor::Relation { target, through } = accessor else {
            return Err(CascadeError::collaborator(anyhow::anyhow!(
                "accessor `{name}` is not a relationship"
            )));
        };
        Ok(Box::new(MemRelationSet {
            inner: self.inner.clone(),
            key: (
                entity.entity_type.clone(),
                name.to_string(),
                entity.id.clone(),
            ),
            target,
            through,
        }))
    }

    async fn apply_delete(
        &self,
        entity: &EntityRef,
        mode: DeleteMode,
        deleted_at: i64,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.log.applied.push((entity.clone(), mode, deleted_at));
        inner.remove_or_mark(&entity.entity_type, &[entity.id.clone()], mode, deleted_at);
        Ok(())
    }
}

struct MemRelationSet {
    inner: Arc<Mutex<Inner>>,
    key: (String, String, String),
    target: String,
    through: bool,
}

#[async_trait]
impl RelationSet for MemRelationSet {
    fn deletion_target(&self) -> &str {
        &self.target
    }

    fn is_through(&self) -> bool {
        self.through
    }

    async fn count(&self) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        inner.log.counts += 1;
        Ok(inner.live_unit_ids(&self.key, &self.target).len() as u64)
    }

    async fn fetch_all(&self) -> Result<Vec<EntityRef>> {
        let mut inner = self.inner.lock().unwrap();
        inner.log.fetch_alls += 1;
        Ok(inner
            .live_unit_ids(&self.key, &self.target)
            .into_iter()
            .map(|id| EntityRef::new(self.target.clone(), id))
            .collect())
    }

    async fn fetch_page(&self, after: Option<&str>, limit: usize) -> Result<Vec<String>> {
        let mut inner = self.inner.lock().unwrap();
        inner.log.fetch_pages += 1;
        Ok(inner
            .live_unit_ids(&self.key, &self.target)
            .into_iter()
            .filter(|id| after.map_or(true, |cursor| id.as_str() > cursor))
            .take(limit)
            .collect())
    }

    async fn bulk_delete(&self, ids: &[String], mode: DeleteMode, deleted_at: i64) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_bulk_for.as_deref() == Some(self.target.as_str()) {
            return Err(CascadeError::collaborator(anyhow::anyhow!(
                "injected bulk failure for `{}`",
                self.target
            )));
        }
        inner.log.bulk_deletes.push(ids.len());
        Ok(inner.remove_or_mark(&self.target, ids, mode, deleted_at))
    }

    async fn delete_all(&self, mode: DeleteMode, deleted_at: i64) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_bulk_for.as_deref() == Some(self.target.as_str()) {
            return Err(CascadeError::collaborator(anyhow::anyhow!(
                "injected bulk failure for `{}`",
                self.target
            )));
        }
        inner.log.delete_alls += 1;
        let ids = inner.live_unit_ids(&self.key, &self.target);
        Ok(inner.remove_or_mark(&self.target, &ids, mode, deleted_at))
    }
}
