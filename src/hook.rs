use async_trait::async_trait;

use crate::error::Result;
use crate::executor::CascadeEngine;
use crate::model::{DeleteMode, EntityRef};

/// The two call sites a host persistence layer must wire into its delete
/// lifecycle when it performs the row mutation itself: `deleting` before the
/// record is touched, `deleted` after.
#[async_trait]
pub trait DeleteLifecycle: Send + Sync {
    async fn deleting(&self, entity: &EntityRef, mode: DeleteMode) -> Result<()>;
    async fn deleted(&self, entity: &EntityRef) -> Result<()>;
}

#[async_trait]
impl DeleteLifecycle for CascadeEngine {
    async fn deleting(&self, entity: &EntityRef, mode: DeleteMode) -> Result<()> {
        self.on_deleting(entity, mode).await
    }

    async fn deleted(&self, entity: &EntityRef) -> Result<()> {
        self.on_deleted(entity);
        Ok(())
    }
}
