use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{
    range_matches, raw_date, Collection, RemoteDocument, RemoteStore, StoreOp, SubscriberHub,
    Subscription, Touch,
};
use crate::error::StoreError;
use crate::model::{DateRange, Fields, PlanId};

type Documents = HashMap<Collection, BTreeMap<PlanId, Fields>>;

/// In-process store. Writes publish synchronously to every touched subscriber.
pub struct MemoryStore {
    documents: Mutex<Documents>,
    hub: Arc<SubscriberHub>,
    fail_writes: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            documents: Mutex::new(HashMap::new()),
            hub: SubscriberHub::new(),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make every mutation fail with `StoreError::Rejected` until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn document(&self, collection: Collection, id: &PlanId) -> Option<Fields> {
        self.documents
            .lock()
            .get(&collection)
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    pub fn len(&self, collection: Collection) -> usize {
        self.documents
            .lock()
            .get(&collection)
            .map_or(0, BTreeMap::len)
    }

    pub fn subscriber_count(&self) -> usize {
        self.hub.len()
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected("writes are disabled".into()));
        }
        Ok(())
    }

    fn query(
        &self,
        collection: Collection,
        range: Option<DateRange>,
    ) -> Result<Vec<RemoteDocument>, StoreError> {
        let documents = self.documents.lock();
        let Some(docs) = documents.get(&collection) else {
            return Ok(Vec::new());
        };
        Ok(docs
            .iter()
            .filter(|(_, fields)| match &range {
                None => true,
                Some(range) => raw_date(fields).is_some_and(|raw| range_matches(range, &raw)),
            })
            .map(|(id, fields)| RemoteDocument {
                id: id.clone(),
                fields: fields.clone(),
            })
            .collect())
    }

    fn publish(&self, touched: &[Touch]) {
        self.hub
            .publish(touched, |collection, range| self.query(collection, range));
    }
}

fn apply_op(documents: &mut Documents, op: &StoreOp, touched: &mut Vec<Touch>) -> Result<(), StoreError> {
    let docs = documents.entry(op.collection()).or_default();
    match op {
        StoreOp::Put {
            collection,
            id,
            fields,
        } => {
            if let Some(old) = docs.get(id) {
                touched.push((*collection, raw_date(old)));
            }
            touched.push((*collection, raw_date(fields)));
            docs.insert(id.clone(), fields.clone());
        }
        StoreOp::Patch {
            collection,
            id,
            fields,
        } => {
            let existing = docs
                .get_mut(id)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            touched.push((*collection, raw_date(existing)));
            for (name, value) in fields {
                existing.insert(name.clone(), value.clone());
            }
            touched.push((*collection, raw_date(existing)));
        }
        StoreOp::Delete { collection, id } => {
            if let Some(old) = docs.remove(id) {
                touched.push((*collection, raw_date(&old)));
            }
        }
    }
    Ok(())
}

impl RemoteStore for MemoryStore {
    fn write(&self, collection: Collection, fields: Fields) -> Result<PlanId, StoreError> {
        let id = PlanId::generate();
        self.commit(&[StoreOp::Put {
            collection,
            id: id.clone(),
            fields,
        }])?;
        Ok(id)
    }

    fn update(&self, collection: Collection, id: &PlanId, fields: Fields) -> Result<(), StoreError> {
        self.commit(&[StoreOp::Patch {
            collection,
            id: id.clone(),
            fields,
        }])
    }

    fn delete(&self, collection: Collection, id: &PlanId) -> Result<(), StoreError> {
        self.commit(&[StoreOp::Delete {
            collection,
            id: id.clone(),
        }])
    }

    fn commit(&self, ops: &[StoreOp]) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut touched = Vec::new();
        {
            let mut documents = self.documents.lock();
            let mut staged = documents.clone();
            for op in ops {
                apply_op(&mut staged, op, &mut touched)?;
            }
            *documents = staged;
        }
        self.publish(&touched);
        Ok(())
    }

    fn subscribe(
        &self,
        collection: Collection,
        range: Option<DateRange>,
    ) -> Result<Subscription, StoreError> {
        self.hub
            .subscribe(collection, range, |collection, range| self.query(collection, range))
    }
}
