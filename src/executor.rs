use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, info};

use crate::error::Result;
use crate::model::{DeleteMode, EntityRef};
use crate::session::DeleteSession;
use crate::store::{EntityStore, RelationSet};
use crate::time::{Clock, SystemClock};
use crate::{validate, walker};

/// Coordinates validation, the shared deletion timestamp, and relationship
/// traversal for one persistence layer.
///
/// The traversal is a synchronous depth-first walk: every collaborator call
/// completes before the next relationship or page is touched, so later bulk
/// filters always see the effects of earlier deletions.
pub struct CascadeEngine {
    store: Arc<dyn EntityStore>,
    session: DeleteSession,
    clock: Arc<dyn Clock>,
}

impl CascadeEngine {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn EntityStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            session: DeleteSession::new(),
            clock,
        }
    }

    pub fn store(&self) -> &dyn EntityStore {
        self.store.as_ref()
    }

    pub fn session(&self) -> &DeleteSession {
        &self.session
    }

    /// Pre-delete half of the protocol: validate, establish or join the
    /// shared timestamp, then cascade every active relationship in declared
    /// order. Types without a cascade declaration pass through untouched.
    pub async fn on_deleting(&self, entity: &EntityRef, mode: DeleteMode) -> Result<()> {
        let Some(config) = self.store.cascade_config(&entity.entity_type) else {
            return Ok(());
        };
        validate::validate(self.store.as_ref(), entity, &config)?;

        let deleted_at = self.session.begin(self.clock.as_ref(), entity);
        debug!(
            target: "soft_cascade",
            event = "cascade_begin",
            entity = %entity,
            mode = ?mode,
            deleted_at
        );

        // Existence probe for every declared relationship up front; empty
        // ones cost one count and are never fetched.
        let mut active: Vec<(&str, Box<dyn RelationSet>, u64)> = Vec::new();
        for name in &config.relationships {
            let set = self.store.resolve(entity, name).await?;
            let related = set.count().await?;
            if related == 0 {
                debug!(
                    target: "soft_cascade",
                    event = "cascade_relationship_skipped",
                    entity = %entity,
                    relationship = %name
                );
                continue;
            }
            active.push((name.as_str(), set, related));
        }

        for (name, set, related) in active {
            walker::process(self, entity, name, set, related, &config, mode).await?;
        }
        Ok(())
    }

    /// Post-delete half: tears the shared session down at the cascade root.
    pub fn on_deleted(&self, entity: &EntityRef) {
        self.session.end_if_originator(entity);
    }

    /// Delete one entity and everything its cascade declaration reaches.
    ///
    /// A failure partway through propagates immediately: already-processed
    /// relationships stay deleted, the rest are untouched, and the session
    /// is left standing. Callers wanting atomicity wrap this in a
    /// transaction of their own.
    pub async fn delete(&self, entity: &EntityRef, mode: DeleteMode) -> Result<()> {
        self.delete_boxed(entity, mode).await
    }

    /// Boxed form of [`delete`](Self::delete); the iterate path recurses
    /// through this, which keeps the future type finite.
    pub(crate) fn delete_boxed<'a>(
        &'a self,
        entity: &'a EntityRef,
        mode: DeleteMode,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            self.on_deleting(entity, mode).await?;
            let deleted_at = self.deletion_stamp(&entity.entity_type);
            self.store.apply_delete(entity, mode, deleted_at).await?;
            info!(
                target: "soft_cascade",
                event = "entity_deleted",
                entity = %entity,
                mode = ?mode,
                deleted_at
            );
            self.on_deleted(entity);
            Ok(())
        }
        .boxed()
    }

    /// Marker value for a record of this type deleted right now: the session
    /// instant when the type opts into timestamp sync, else the clock.
    pub(crate) fn deletion_stamp(&self, entity_type: &str) -> i64 {
        let synced = self
            .store
            .cascade_config(entity_type)
            .is_some_and(|config| config.sync_timestamp);
        if synced {
            self.session.current_or_now(self.clock.as_ref())
        } else {
            self.clock.now_ms()
        }
    }
}
