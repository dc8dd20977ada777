use thiserror::Error;

use crate::model::PlanId;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document {0} not found")]
    NotFound(String),
    #[error("store rejected the write: {0}")]
    Rejected(String),
    #[error("backend failure: {0}")]
    Backend(String),
    #[error("document encoding failed: {0}")]
    Codec(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Backend(value.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Codec(value.to_string())
    }
}

/// A document that cannot take part in reconstruction and is repaired by deletion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityError {
    #[error("document {0} has no date")]
    MissingDate(PlanId),
    #[error("document {id} has unparseable date {raw:?}")]
    InvalidDate { id: PlanId, raw: String },
    #[error("document {0} has empty content")]
    MissingContent(PlanId),
}

impl IntegrityError {
    pub fn id(&self) -> &PlanId {
        match self {
            Self::MissingDate(id) | Self::MissingContent(id) => id,
            Self::InvalidDate { id, .. } => id,
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no drag gesture in progress")]
    NoDragSession,
    #[error("a drag gesture is already in progress")]
    DragInProgress,
    #[error("drag gesture has no items")]
    EmptyDrag,
    #[error("plan {0} is not loaded")]
    UnknownPlan(PlanId),
}

pub type EngineResult<T> = Result<T, EngineError>;
