use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use super::{Collection, RemoteDocument, Snapshot};
use crate::error::StoreError;
use crate::model::DateRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A store mutation as seen by subscribers: the collection and raw date it touched.
pub type Touch = (Collection, Option<String>);

struct Slot {
    id: SubscriptionId,
    collection: Collection,
    range: Option<DateRange>,
    sender: Sender<Snapshot>,
}

impl Slot {
    fn is_touched_by(&self, touched: &[Touch]) -> bool {
        touched.iter().any(|(collection, date)| {
            if *collection != self.collection {
                return false;
            }
            match (&self.range, date) {
                (None, _) | (_, None) => true,
                (Some(range), Some(raw)) => super::range_matches(range, raw),
            }
        })
    }
}

#[derive(Default)]
pub struct SubscriberHub {
    next_id: AtomicU64,
    slots: Mutex<Vec<Slot>>,
}

impl SubscriberHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a subscriber and deliver its initial snapshot.
    ///
    /// The initial query runs under the registry lock, so no mutation published
    /// afterwards can be missed.
    pub fn subscribe<Q>(
        self: &Arc<Self>,
        collection: Collection,
        range: Option<DateRange>,
        query: Q,
    ) -> Result<Subscription, StoreError>
    where
        Q: FnOnce(Collection, Option<DateRange>) -> Result<Vec<RemoteDocument>, StoreError>,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = crossbeam_channel::unbounded();
        let mut slots = self.slots.lock();
        let documents = query(collection, range)?;
        // The receiver is still held locally, so this send cannot fail.
        let _ = sender.send(Snapshot {
            subscription: id,
            collection,
            range,
            documents,
        });
        slots.push(Slot {
            id,
            collection,
            range,
            sender,
        });
        tracing::debug!(subscription = %id, collection = collection.as_ref(), "subscription opened");
        Ok(Subscription {
            id,
            hub: Arc::downgrade(self),
            receiver,
            cancelled: false,
        })
    }

    pub fn publish<Q>(&self, touched: &[Touch], mut query: Q)
    where
        Q: FnMut(Collection, Option<DateRange>) -> Result<Vec<RemoteDocument>, StoreError>,
    {
        if touched.is_empty() {
            return;
        }
        let mut slots = self.slots.lock();
        slots.retain(|slot| {
            if !slot.is_touched_by(touched) {
                return true;
            }
            let documents = match query(slot.collection, slot.range) {
                Ok(documents) => documents,
                Err(err) => {
                    tracing::warn!(subscription = %slot.id, ?err, "snapshot query failed");
                    return true;
                }
            };
            let snapshot = Snapshot {
                subscription: slot.id,
                collection: slot.collection,
                range: slot.range,
                documents,
            };
            slot.sender.send(snapshot).is_ok()
        });
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, id: SubscriptionId) {
        self.slots.lock().retain(|slot| slot.id != id);
    }
}

/// Handle on a push-based snapshot stream. Dropping it unsubscribes.
pub struct Subscription {
    id: SubscriptionId,
    hub: Weak<SubscriberHub>,
    receiver: Receiver<Snapshot>,
    cancelled: bool,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn is_active(&self) -> bool {
        !self.cancelled
    }

    /// Most recent pending snapshot; older pending ones are superseded.
    pub fn latest(&self) -> Option<Snapshot> {
        if self.cancelled {
            return None;
        }
        self.receiver.try_iter().last()
    }

    pub fn cancel(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;
        if let Some(hub) = self.hub.upgrade() {
            hub.remove(self.id);
        }
        // Anything delivered before removal is discarded.
        while self.receiver.try_recv().is_ok() {}
        tracing::debug!(subscription = %self.id, "subscription cancelled");
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("cancelled", &self.cancelled)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}
