use strum::{AsRefStr, Display, EnumString};

use crate::error::StoreError;
use crate::model::{fields, DateRange, Fields, PlanId};

mod hub;
mod memory;
mod schema;
mod sqlite;

pub use hub::{SubscriberHub, Subscription, SubscriptionId, Touch};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, AsRefStr, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Collection {
    Plans,
    Labels,
    Styles,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteDocument {
    pub id: PlanId,
    pub fields: Fields,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreOp {
    /// Create or fully replace a document under a known id.
    Put {
        collection: Collection,
        id: PlanId,
        fields: Fields,
    },
    /// Merge fields into an existing document.
    Patch {
        collection: Collection,
        id: PlanId,
        fields: Fields,
    },
    Delete {
        collection: Collection,
        id: PlanId,
    },
}

impl StoreOp {
    pub fn collection(&self) -> Collection {
        match self {
            Self::Put { collection, .. }
            | Self::Patch { collection, .. }
            | Self::Delete { collection, .. } => *collection,
        }
    }

    pub fn id(&self) -> &PlanId {
        match self {
            Self::Put { id, .. } | Self::Patch { id, .. } | Self::Delete { id, .. } => id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub subscription: SubscriptionId,
    pub collection: Collection,
    pub range: Option<DateRange>,
    pub documents: Vec<RemoteDocument>,
}

pub trait RemoteStore: Send + Sync {
    fn write(&self, collection: Collection, fields: Fields) -> Result<PlanId, StoreError>;

    fn update(&self, collection: Collection, id: &PlanId, fields: Fields)
        -> Result<(), StoreError>;

    /// Deleting a missing document succeeds.
    fn delete(&self, collection: Collection, id: &PlanId) -> Result<(), StoreError>;

    /// Apply every op or none of them.
    fn commit(&self, ops: &[StoreOp]) -> Result<(), StoreError>;

    /// Open a snapshot stream. `range` filters by the documents' `date` field.
    fn subscribe(
        &self,
        collection: Collection,
        range: Option<DateRange>,
    ) -> Result<Subscription, StoreError>;
}

/// Range filter on the stored date string. Malformed dates can still fall inside.
pub(crate) fn range_matches(range: &DateRange, raw: &str) -> bool {
    let start = range.start.to_string();
    let end = range.end.to_string();
    start.as_str() <= raw && raw <= end.as_str()
}

pub(crate) fn raw_date(fields: &Fields) -> Option<String> {
    fields
        .get(fields::DATE)
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PlanDate;

    #[test]
    fn collection_names_are_snake_case() {
        assert_eq!(Collection::Plans.as_ref(), "plans");
        assert_eq!("labels".parse::<Collection>().unwrap(), Collection::Labels);
    }

    #[test]
    fn range_filter_compares_stored_strings() {
        let range = DateRange::new(
            PlanDate::from_ymd(2024, 5, 1).unwrap(),
            PlanDate::from_ymd(2024, 5, 7).unwrap(),
        );
        assert!(range_matches(&range, "2024-05-01"));
        assert!(range_matches(&range, "2024-05-07"));
        assert!(range_matches(&range, "2024-05-01x"));
        assert!(!range_matches(&range, "2024-05-08"));
        assert!(!range_matches(&range, ""));
    }
}
