use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::drag::DatePlansUpdate;
use crate::model::{DateEntry, DateLabel, DateRange, PlanDate, PlanId, PlanRecord, PlanStyle};
use crate::reconcile::Reconciled;

mod persist;

pub use persist::CachePersister;

/// `shadow` mirrors the latest remote state. `rendered` follows it unless paused.
#[derive(Debug, Default)]
pub struct SyncController {
    rendered: BTreeMap<PlanDate, DateEntry>,
    shadow: BTreeMap<PlanDate, DateEntry>,
    dirty: BTreeSet<PlanDate>,
    styles: BTreeMap<String, PlanStyle>,
    paused: bool,
    persister: Option<CachePersister>,
}

impl SyncController {
    pub fn new(persister: Option<CachePersister>) -> Self {
        let (dates, styles) = match &persister {
            Some(persister) => (persister.load_dates(), persister.load_styles()),
            None => Default::default(),
        };
        Self {
            rendered: dates.clone(),
            shadow: dates,
            dirty: BTreeSet::new(),
            styles,
            paused: false,
            persister,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self, sync_now: bool) -> usize {
        self.paused = false;
        let dirty = std::mem::take(&mut self.dirty);
        if !sync_now {
            return 0;
        }
        let mut copied = 0;
        for date in dirty {
            if let Some(entry) = self.shadow.get(&date) {
                self.rendered.insert(date, entry.clone());
                copied += 1;
            }
        }
        copied
    }

    /// Resume after an optimistic commit. Dates in `committed` keep their optimistic
    /// order until their own echo arrives; every other dirty date is synced now.
    pub fn resume_committed(&mut self, committed: &DatePlansUpdate) -> usize {
        self.dirty.retain(|date| !committed.contains_key(date));
        self.resume(true)
    }

    pub fn accept_plans(&mut self, reconciled: Reconciled) {
        for (date, plans) in reconciled.dates {
            let entry = self
                .shadow
                .entry(date)
                .or_insert_with(|| DateEntry::empty(date));
            entry.plans = plans;
            self.publish(date);
        }
        self.persist_dates();
    }

    pub fn accept_labels(&mut self, range: DateRange, mut labels: BTreeMap<PlanDate, DateLabel>) {
        for date in range.days() {
            let label = labels.remove(&date);
            let entry = self
                .shadow
                .entry(date)
                .or_insert_with(|| DateEntry::empty(date));
            if entry.label == label {
                continue;
            }
            entry.label = label;
            self.publish(date);
        }
        self.persist_dates();
    }

    pub fn accept_styles(&mut self, styles: BTreeMap<String, PlanStyle>) {
        self.styles = styles;
        if let Some(persister) = &self.persister {
            if let Err(err) = persister.save_styles(&self.styles) {
                tracing::warn!(?err, "persisting style cache failed");
            }
        }
    }

    pub fn apply_order(&mut self, update: &DatePlansUpdate) {
        let mut records: HashMap<PlanId, PlanRecord> = update
            .keys()
            .filter_map(|date| self.rendered.get(date))
            .flat_map(|entry| entry.plans.iter())
            .map(|plan| (plan.id.clone(), plan.clone()))
            .collect();
        for (date, ids) in update {
            let mut prev: Option<PlanId> = None;
            let mut plans = Vec::with_capacity(ids.len());
            for id in ids {
                let Some(mut record) = records.remove(id) else {
                    tracing::warn!(plan_id = %id, %date, "optimistic order names an unloaded plan");
                    continue;
                };
                record.date = *date;
                record.prev_id = prev.replace(id.clone());
                plans.push(record);
            }
            self.rendered
                .entry(*date)
                .or_insert_with(|| DateEntry::empty(*date))
                .plans = plans;
        }
    }

    pub fn entry(&self, date: PlanDate) -> Option<&DateEntry> {
        self.rendered.get(&date)
    }

    pub fn plan_ids(&self, date: PlanDate) -> Vec<PlanId> {
        self.entry(date).map(DateEntry::plan_ids).unwrap_or_default()
    }

    pub fn find_plan(&self, id: &PlanId) -> Option<&PlanRecord> {
        self.rendered
            .values()
            .flat_map(|entry| entry.plans.iter())
            .find(|plan| &plan.id == id)
    }

    pub fn styles(&self) -> &BTreeMap<String, PlanStyle> {
        &self.styles
    }

    pub fn dirty_dates(&self) -> impl Iterator<Item = &PlanDate> {
        self.dirty.iter()
    }

    fn publish(&mut self, date: PlanDate) {
        if self.paused {
            self.dirty.insert(date);
            return;
        }
        if let Some(entry) = self.shadow.get(&date) {
            self.rendered.insert(date, entry.clone());
        }
    }

    fn persist_dates(&self) {
        if let Some(persister) = &self.persister {
            if let Err(err) = persister.save_dates(&self.shadow) {
                tracing::warn!(?err, "persisting date cache failed");
            }
        }
    }
}
