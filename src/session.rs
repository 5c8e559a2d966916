use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::model::EntityRef;
use crate::time::Clock;

#[derive(Debug)]
struct ActiveSession {
    deleted_at: i64,
    originator: EntityRef,
}

/// Shared deletion timestamp for one in-flight cascade tree.
///
/// The first entity deleted in a tree opens the session; nested cascades
/// join it and read the same instant; only the opening entity's post-delete
/// tears it down. Matching is by (entity type, primary key), never by
/// reference. The mutex guards the single-active-session invariant if the
/// host runs unrelated deletes on other threads.
#[derive(Debug, Default)]
pub struct DeleteSession {
    inner: Mutex<Option<ActiveSession>>,
}

impl DeleteSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the active session, or open one stamped with the current clock.
    ///
    /// Idempotent under nesting: an active session keeps its timestamp and
    /// originator no matter how many descendants call this.
    pub fn begin(&self, clock: &dyn Clock, originator: &EntityRef) -> i64 {
        let mut guard = self.lock();
        match guard.as_ref() {
            Some(active) => active.deleted_at,
            None => {
                let deleted_at = clock.now_ms();
                *guard = Some(ActiveSession {
                    deleted_at,
                    originator: originator.clone(),
                });
                debug!(
                    target: "soft_cascade",
                    event = "cascade_session_begin",
                    originator = %originator,
                    deleted_at
                );
                deleted_at
            }
        }
    }

    /// The session timestamp when a cascade is in flight, else the clock.
    pub fn current_or_now(&self, clock: &dyn Clock) -> i64 {
        self.lock()
            .as_ref()
            .map(|active| active.deleted_at)
            .unwrap_or_else(|| clock.now_ms())
    }

    /// Clear the session if `entity` is the record that opened it.
    pub fn end_if_originator(&self, entity: &EntityRef) {
        let mut guard = self.lock();
        let ours = guard
            .as_ref()
            .is_some_and(|active| active.originator.same_record(entity));
        if ours {
            *guard = None;
            debug!(
                target: "soft_cascade",
                event = "cascade_session_end",
                originator = %entity
            );
        }
    }

    pub fn is_active(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
