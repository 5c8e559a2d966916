use std::fmt;
use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

/// Default page size for chunked relationship fetches.
pub const DEFAULT_CHUNK_SIZE: NonZeroUsize = match NonZeroUsize::new(500) {
    Some(n) => n,
    None => panic!("default chunk size must be non-zero"),
};

/// A logical record address: entity type plus primary key.
///
/// Identity is by value, never by in-memory reference; recursive dispatch may
/// hand the engine distinct instances that name the same record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_type: String,
    pub id: String,
}

impl EntityRef {
    pub fn new(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// True when both refs name the same stored record.
    pub fn same_record(&self, other: &EntityRef) -> bool {
        self.entity_type == other.entity_type && self.id == other.id
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.id)
    }
}

/// Whether the current delete is reversible or permanent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteMode {
    Soft,
    Force,
}

impl DeleteMode {
    pub fn is_force(self) -> bool {
        matches!(self, DeleteMode::Force)
    }
}

/// How related records are pulled from the store during a cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    #[default]
    Direct,
    Chunked,
}

/// Per-entity-type cascade declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeConfig {
    /// Relationship names to cascade, processed in this order.
    pub relationships: Vec<String>,
    pub fetch_mode: FetchMode,
    pub chunk_size: NonZeroUsize,
    /// When set, this type's own deletion marker is taken from the active
    /// cascade session instead of the wall clock.
    pub sync_timestamp: bool,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            relationships: Vec::new(),
            fetch_mode: FetchMode::Direct,
            chunk_size: DEFAULT_CHUNK_SIZE,
            sync_timestamp: false,
        }
    }
}

impl CascadeConfig {
    pub fn relationships<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            relationships: names.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Switch to chunked fetches; sizes of zero keep the previous page size.
    pub fn chunked(mut self, chunk_size: usize) -> Self {
        self.fetch_mode = FetchMode::Chunked;
        if let Some(size) = NonZeroUsize::new(chunk_size) {
            self.chunk_size = size;
        }
        self
    }

    pub fn synced(mut self) -> Self {
        self.sync_timestamp = true;
        self
    }

    pub fn declares_cascades(&self) -> bool {
        !self.relationships.is_empty()
    }
}
