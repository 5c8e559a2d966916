use tracing::debug;

use crate::error::Result;
use crate::executor::CascadeEngine;
use crate::model::{CascadeConfig, DeleteMode, EntityRef, FetchMode};
use crate::store::RelationSet;

/// A relationship whose target type declares its own cascade must be walked
/// record by record so each descendant's lifecycle fires; everything else
/// can be handled with bulk statements.
fn has_descendant_cascades(engine: &CascadeEngine, target_type: &str) -> bool {
    engine
        .store()
        .cascade_config(target_type)
        .is_some_and(|config| config.declares_cascades())
}

/// Apply one relationship of `parent`'s cascade declaration.
pub(crate) async fn process(
    engine: &CascadeEngine,
    parent: &EntityRef,
    name: &str,
    set: Box<dyn RelationSet>,
    related: u64,
    config: &CascadeConfig,
    mode: DeleteMode,
) -> Result<()> {
    let target = set.deletion_target().to_string();
    let iterate = has_descendant_cascades(engine, &target);
    debug!(
        target: "soft_cascade",
        event = "cascade_relationship",
        parent = %parent,
        relationship = %name,
        related_type = %target,
        related,
        through = set.is_through(),
        path = if iterate { "iterate" } else { "bulk" },
        fetch = ?config.fetch_mode
    );

    match (config.fetch_mode, iterate) {
        (FetchMode::Direct, false) => bulk_all(engine, set.as_ref(), &target, mode).await,
        (FetchMode::Chunked, false) => {
            bulk_chunked(engine, set.as_ref(), &target, config.chunk_size.get(), mode).await
        }
        (FetchMode::Direct, true) => iterate_all(engine, set.as_ref(), mode).await,
        (FetchMode::Chunked, true) => {
            iterate_chunked(engine, set.as_ref(), &target, config.chunk_size.get(), mode).await
        }
    }
}

async fn bulk_all(
    engine: &CascadeEngine,
    set: &dyn RelationSet,
    target: &str,
    mode: DeleteMode,
) -> Result<()> {
    // One statement over the entire filtered set.
    let deleted_at = engine.deletion_stamp(target);
    let affected = set.delete_all(mode, deleted_at).await?;
    debug!(
        target: "soft_cascade",
        event = "cascade_bulk_delete",
        entity_type = %target,
        affected
    );
    Ok(())
}

async fn bulk_chunked(
    engine: &CascadeEngine,
    set: &dyn RelationSet,
    target: &str,
    chunk_size: usize,
    mode: DeleteMode,
) -> Result<()> {
    let deleted_at = engine.deletion_stamp(target);
    let mut after: Option<String> = None;
    loop {
        let ids = set.fetch_page(after.as_deref(), chunk_size).await?;
        let Some(last) = ids.last().cloned() else {
            break;
        };
        let affected = set.bulk_delete(&ids, mode, deleted_at).await?;
        debug!(
            target: "soft_cascade",
            event = "cascade_bulk_page",
            entity_type = %target,
            page_len = ids.len(),
            affected
        );
        after = Some(last);
    }
    Ok(())
}

async fn iterate_all(
    engine: &CascadeEngine,
    set: &dyn RelationSet,
    mode: DeleteMode,
) -> Result<()> {
    for record in set.fetch_all().await? {
        engine.delete_boxed(&record, mode).await?;
    }
    Ok(())
}

async fn iterate_chunked(
    engine: &CascadeEngine,
    set: &dyn RelationSet,
    target: &str,
    chunk_size: usize,
    mode: DeleteMode,
) -> Result<()> {
    let mut after: Option<String> = None;
    loop {
        let ids = set.fetch_page(after.as_deref(), chunk_size).await?;
        let Some(last) = ids.last().cloned() else {
            break;
        };
        for id in ids {
            let record = EntityRef::new(target, id);
            engine.delete_boxed(&record, mode).await?;
        }
        after = Some(last);
    }
    Ok(())
}
