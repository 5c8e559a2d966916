use tracing::warn;

use crate::error::{CascadeError, Result};
use crate::model::{CascadeConfig, EntityRef};
use crate::store::{AccessorKind, EntityStore};

/// Reject a misconfigured cascade before anything is mutated.
///
/// The relationship check is exhaustive: every offending name is collected,
/// not just the first.
pub(crate) fn validate(
    store: &dyn EntityStore,
    entity: &EntityRef,
    config: &CascadeConfig,
) -> Result<()> {
    if !store.supports_soft_delete(&entity.entity_type) {
        warn!(
            target: "soft_cascade",
            event = "cascade_validation_rejected",
            entity = %entity,
            reason = "soft_delete_not_supported"
        );
        return Err(CascadeError::SoftDeleteNotSupported {
            entity_type: entity.entity_type.clone(),
        });
    }

    let offenders: Vec<String> = config
        .relationships
        .iter()
        .filter(|name| {
            !matches!(
                store.describe_accessor(&entity.entity_type, name),
                Some(AccessorKind::Relation)
            )
        })
        .cloned()
        .collect();

    if !offenders.is_empty() {
        warn!(
            target: "soft_cascade",
            event = "cascade_validation_rejected",
            entity = %entity,
            reason = "invalid_relationships",
            names = ?offenders
        );
        return Err(CascadeError::InvalidRelationships { names: offenders });
    }

    Ok(())
}
