//! `EntityStore` over a SQLite pool, driven by a declarative table registry.
//!
//! Soft-capable tables carry nullable `deleted_at` plus `updated_at`
//! millisecond columns; soft deletes set both, force deletes remove the row.
//! Relationship queries always filter to live rows.

use std::collections::{HashMap, HashSet};

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::error::{CascadeError, Result};
use crate::model::{CascadeConfig, DeleteMode, EntityRef};
use crate::store::{AccessorKind, EntityStore, RelationSet};

/// How a declared relation reaches its rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationKind {
    /// Child rows hold a foreign key back to the parent.
    HasMany {
        table: String,
        foreign_key: String,
    },
    /// Parent joined to a target through a pivot table; the pivot row is the
    /// deletion unit, the target is never touched.
    Through {
        pivot_table: String,
        pivot_foreign_key: String,
        target_table: String,
    },
}

/// Registry entry for one declared accessor name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accessor {
    Relation(RelationKind),
    Attribute,
}

/// Declared shape of one table: key column, soft-delete capability, cascade
/// declaration, and its accessor registry.
#[derive(Debug, Clone)]
pub struct TableMeta {
    name: String,
    primary_key: String,
    soft_delete: bool,
    cascade: Option<CascadeConfig>,
    accessors: HashMap<String, Accessor>,
}

impl TableMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: "id".into(),
            soft_delete: false,
            cascade: None,
            accessors: HashMap::new(),
        }
    }

    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    pub fn soft_delete(mut self) -> Self {
        self.soft_delete = true;
        self
    }

    pub fn cascade(mut self, config: CascadeConfig) -> Self {
        self.cascade = Some(config);
        self
    }

    pub fn has_many(
        mut self,
        name: impl Into<String>,
        table: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.accessors.insert(
            name.into(),
            Accessor::Relation(RelationKind::HasMany {
                table: table.into(),
                foreign_key: foreign_key.into(),
            }),
        );
        self
    }

    pub fn through(
        mut self,
        name: impl Into<String>,
        pivot_table: impl Into<String>,
        pivot_foreign_key: impl Into<String>,
        target_table: impl Into<String>,
    ) -> Self {
        self.accessors.insert(
            name.into(),
            Accessor::Relation(RelationKind::Through {
                pivot_table: pivot_table.into(),
                pivot_foreign_key: pivot_foreign_key.into(),
                target_table: target_table.into(),
            }),
        );
        self
    }

    /// Register a plain attribute accessor; declaring it in a cascade is a
    /// validation error, with a better message than an unknown name.
    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.accessors.insert(name.into(), Accessor::Attribute);
        self
    }
}

#[derive(Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
    tables: HashMap<String, TableMeta>,
}

impl SqliteStore {
    /// Build the store, cross-checking the registry: every table a relation
    /// points at must itself be registered, and every name a cascade declares
    /// must resolve to a registered relation accessor.
    pub fn new(pool: SqlitePool, tables: Vec<TableMeta>) -> anyhow::Result<Self> {
        let known: HashSet<String> = tables.iter().map(|meta| meta.name.clone()).collect();
        for meta in &tables {
            if let Some(cascade) = &meta.cascade {
                for name in &cascade.relationships {
                    match meta.accessors.get(name) {
                        Some(Accessor::Relation(_)) => {}
                        Some(Accessor::Attribute) => bail!(
                            "cascade on `{}` declares `{name}`, which is an attribute",
                            meta.name
                        ),
                        None => bail!(
                            "cascade on `{}` declares unregistered accessor `{name}`",
                            meta.name
                        ),
                    }
                }
            }
            for (name, accessor) in &meta.accessors {
                let Accessor::Relation(kind) = accessor else {
                    continue;
                };
                let referenced: Vec<&str> = match kind {
                    RelationKind::HasMany { table, .. } => vec![table.as_str()],
                    RelationKind::Through {
                        pivot_table,
                        target_table,
                        ..
                    } => vec![pivot_table.as_str(), target_table.as_str()],
                };
                for table in referenced {
                    if !known.contains(table) {
                        bail!(
                            "relation `{}` on `{}` references unregistered table `{table}`",
                            name,
                            meta.name
                        );
                    }
                }
            }
        }
        let tables = tables
            .into_iter()
            .map(|meta| (meta.name.clone(), meta))
            .collect();
        Ok(Self { pool, tables })
    }

    fn meta(&self, entity_type: &str) -> Result<&TableMeta> {
        self.tables.get(entity_type).ok_or_else(|| {
            CascadeError::Collaborator(anyhow!("unregistered entity type `{entity_type}`"))
        })
    }
}

#[async_trait]
impl EntityStore for SqliteStore {
    fn supports_soft_delete(&self, entity_type: &str) -> bool {
        self.tables
            .get(entity_type)
            .map(|meta| meta.soft_delete)
            .unwrap_or(false)
    }

    fn cascade_config(&self, entity_type: &str) -> Option<CascadeConfig> {
        self.tables
            .get(entity_type)
            .and_then(|meta| meta.cascade.clone())
    }

    fn describe_accessor(&self, entity_type: &str, name: &str) -> Option<AccessorKind> {
        self.tables
            .get(entity_type)
            .and_then(|meta| meta.accessors.get(name))
            .map(|accessor| match accessor {
                Accessor::Relation(_) => AccessorKind::Relation,
                Accessor::Attribute => AccessorKind::Attribute,
            })
    }

    async fn resolve(&self, entity: &EntityRef, name: &str) -> Result<Box<dyn RelationSet>> {
        let meta = self.meta(&entity.entity_type)?;
        let accessor = meta.accessors.get(name).ok_or_else(|| {
            CascadeError::Collaborator(anyhow!(
                "unknown relationship `{name}` on `{}`",
                entity.entity_type
            ))
        })?;
        let Accessor::Relation(kind) = accessor else {
            return Err(CascadeError::Collaborator(anyhow!(
                "accessor `{name}` on `{}` is not a relationship",
                entity.entity_type
            )));
        };

        let (unit_table, foreign_key, is_through) = match kind {
            RelationKind::HasMany { table, foreign_key } => (table, foreign_key, false),
            RelationKind::Through {
                pivot_table,
                pivot_foreign_key,
                ..
            } => (pivot_table, pivot_foreign_key, true),
        };
        let unit = self.meta(unit_table)?;
        Ok(Box::new(SqliteRelationSet {
            pool: self.pool.clone(),
            parent_id: entity.id.clone(),
            target: unit.name.clone(),
            primary_key: unit.primary_key.clone(),
            foreign_key: foreign_key.clone(),
            soft_delete: unit.soft_delete,
            is_through,
        }))
    }

    async fn apply_delete(
        &self,
        entity: &EntityRef,
        mode: DeleteMode,
        deleted_at: i64,
    ) -> Result<()> {
        let meta = self.meta(&entity.entity_type)?;
        // Tables without a marker fall back to hard deletes.
        let sql = if mode.is_force() || !meta.soft_delete {
            format!(
                "DELETE FROM {} WHERE {} = ?",
                meta.name, meta.primary_key
            )
        } else {
            format!(
                "UPDATE {} SET deleted_at = ?1, updated_at = ?1 WHERE {} = ?2 AND deleted_at IS NULL",
                meta.name, meta.primary_key
            )
        };
        let query = if mode.is_force() || !meta.soft_delete {
            sqlx::query(&sql).bind(&entity.id)
        } else {
            sqlx::query(&sql).bind(deleted_at).bind(&entity.id)
        };
        let res = query.execute(&self.pool).await?;
        if res.rows_affected() == 0 {
            warn!(
                target: "soft_cascade",
                event = "apply_delete_noop",
                entity = %entity,
                mode = ?mode
            );
        }
        Ok(())
    }
}

struct SqliteRelationSet {
    pool: SqlitePool,
    parent_id: String,
    target: String,
    primary_key: String,
    foreign_key: String,
    soft_delete: bool,
    is_through: bool,
}

impl SqliteRelationSet {
    fn active_filter(&self) -> &'static str {
        if self.soft_delete {
            " AND deleted_at IS NULL"
        } else {
            ""
        }
    }
}

#[async_trait]
impl RelationSet for SqliteRelationSet {
    fn deletion_target(&self) -> &str {
        &self.target
    }

    fn is_through(&self) -> bool {
        self.is_through
    }

    async fn count(&self) -> Result<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ?{}",
            self.target,
            self.foreign_key,
            self.active_filter()
        );
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(&self.parent_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn fetch_all(&self) -> Result<Vec<EntityRef>> {
        let sql = format!(
            "SELECT {pk} FROM {table} WHERE {fk} = ?{filter} ORDER BY {pk}",
            pk = self.primary_key,
            table = self.target,
            fk = self.foreign_key,
            filter = self.active_filter()
        );
        let ids: Vec<String> = sqlx::query_scalar(&sql)
            .bind(&self.parent_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids
            .into_iter()
            .map(|id| EntityRef::new(self.target.clone(), id))
            .collect())
    }

    async fn fetch_page(&self, after: Option<&str>, limit: usize) -> Result<Vec<String>> {
        let mut sql = format!(
            "SELECT {pk} FROM {table} WHERE {fk} = ?{filter}",
            pk = self.primary_key,
            table = self.target,
            fk = self.foreign_key,
            filter = self.active_filter()
        );
        if after.is_some() {
            sql.push_str(&format!(" AND {} > ?", self.primary_key));
        }
        sql.push_str(&format!(" ORDER BY {} LIMIT ?", self.primary_key));

        let mut query = sqlx::query_scalar(&sql).bind(&self.parent_id);
        if let Some(cursor) = after {
            query = query.bind(cursor.to_string());
        }
        let ids: Vec<String> = query.bind(limit as i64).fetch_all(&self.pool).await?;
        Ok(ids)
    }

    async fn bulk_delete(&self, ids: &[String], mode: DeleteMode, deleted_at: i64) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; ids.len()].join(",");
        let soft = !mode.is_force() && self.soft_delete;
        let sql = if soft {
            format!(
                "UPDATE {table} SET deleted_at = ?, updated_at = ? WHERE {pk} IN ({placeholders}) AND deleted_at IS NULL",
                table = self.target,
                pk = self.primary_key
            )
        } else {
            format!(
                "DELETE FROM {table} WHERE {pk} IN ({placeholders})",
                table = self.target,
                pk = self.primary_key
            )
        };
        let mut query = sqlx::query(&sql);
        if soft {
            query = query.bind(deleted_at).bind(deleted_at);
        }
        for id in ids {
            query = query.bind(id);
        }
        let res = query.execute(&self.pool).await?;
        debug!(
            target: "soft_cascade",
            event = "relation_bulk_delete",
            entity_type = %self.target,
            keys = ids.len(),
            affected = res.rows_affected()
        );
        Ok(res.rows_affected())
    }

    async fn delete_all(&self, mode: DeleteMode, deleted_at: i64) -> Result<u64> {
        let soft = !mode.is_force() && self.soft_delete;
        let sql = if soft {
            format!(
                "UPDATE {table} SET deleted_at = ?1, updated_at = ?1 WHERE {fk} = ?2 AND deleted_at IS NULL",
                table = self.target,
                fk = self.foreign_key
            )
        } else {
            format!(
                "DELETE FROM {table} WHERE {fk} = ?{filter}",
                table = self.target,
                fk = self.foreign_key,
                filter = self.active_filter()
            )
        };
        let query = if soft {
            sqlx::query(&sql).bind(deleted_at).bind(&self.parent_id)
        } else {
            sqlx::query(&sql).bind(&self.parent_id)
        };
        let res = query.execute(&self.pool).await?;
        Ok(res.rows_affected())
    }
}
