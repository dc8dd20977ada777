use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::model::{PlanDate, PlanId};

pub type DatePlansUpdate = BTreeMap<PlanDate, Vec<PlanId>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraggedItem {
    pub id: PlanId,
    pub origin_date: PlanDate,
    pub origin_prev: Option<PlanId>,
    pub origin_next: Option<PlanId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemBox {
    pub id: PlanId,
    pub top: f64,
    pub height: f64,
}

impl ItemBox {
    pub fn midpoint(&self) -> f64 {
        self.top + self.height / 2.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropTarget {
    pub date: PlanDate,
    pub pointer_y: f64,
    pub layout: Vec<ItemBox>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkPatch {
    pub id: PlanId,
    pub date: PlanDate,
    pub prev: Option<PlanId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReorderPlan {
    pub forward: Vec<LinkPatch>,
    /// Exactly the links `forward` overwrites, as they were.
    pub inverse: Vec<LinkPatch>,
    pub after: DatePlansUpdate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct NeighborKey {
    date: PlanDate,
    prev: Option<PlanId>,
    next: Option<PlanId>,
}

#[derive(Debug)]
pub struct DragSession {
    items: Vec<DraggedItem>,
    dragged: HashSet<PlanId>,
    baseline: DatePlansUpdate,
    current: DatePlansUpdate,
    last_key: Option<NeighborKey>,
}

impl DragSession {
    pub fn new<F>(items: Vec<DraggedItem>, lookup: F) -> Self
    where
        F: Fn(PlanDate) -> Vec<PlanId>,
    {
        let dragged = items.iter().map(|item| item.id.clone()).collect();
        let mut baseline = DatePlansUpdate::new();
        for item in &items {
            let origin = baseline
                .entry(item.origin_date)
                .or_insert_with(|| lookup(item.origin_date));
            anchor_at_origin(origin, item);
        }
        Self {
            items,
            dragged,
            baseline,
            current: DatePlansUpdate::new(),
            last_key: None,
        }
    }

    pub fn items(&self) -> &[DraggedItem] {
        &self.items
    }

    pub fn is_dragged(&self, id: &PlanId) -> bool {
        self.dragged.contains(id)
    }

    /// `None` when the drop lands between the same neighbours as the previous
    /// emission. A `None` target reverts every date touched so far.
    pub fn update<F>(&mut self, target: Option<&DropTarget>, lookup: F) -> Option<DatePlansUpdate>
    where
        F: Fn(PlanDate) -> Vec<PlanId>,
    {
        let Some(target) = target else {
            if self.current.is_empty() {
                return None;
            }
            let reverted = self.revert();
            self.current.clear();
            self.last_key = None;
            return Some(reverted);
        };

        let destination = self
            .baseline
            .entry(target.date)
            .or_insert_with(|| lookup(target.date))
            .clone();
        let candidates: Vec<PlanId> = destination
            .into_iter()
            .filter(|id| !self.dragged.contains(id))
            .collect();
        let index = self.insertion_index(target, &candidates);
        let key = NeighborKey {
            date: target.date,
            prev: index.checked_sub(1).map(|i| candidates[i].clone()),
            next: candidates.get(index).cloned(),
        };
        if self.last_key.as_ref() == Some(&key) {
            return None;
        }

        let touched: BTreeSet<PlanDate> = self
            .items
            .iter()
            .map(|item| item.origin_date)
            .chain(self.current.keys().copied())
            .chain(std::iter::once(target.date))
            .collect();
        let mut next = DatePlansUpdate::new();
        for date in touched {
            let mut ids: Vec<PlanId> = self
                .baseline
                .get(&date)
                .map(|ids| {
                    ids.iter()
                        .filter(|id| !self.dragged.contains(*id))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            if date == target.date {
                let at = index.min(ids.len());
                ids.splice(at..at, self.items.iter().map(|item| item.id.clone()));
            }
            next.insert(date, ids);
        }
        self.current = next.clone();
        self.last_key = Some(key);
        Some(next)
    }

    /// Layout entries missing from `candidates` are skipped.
    fn insertion_index(&self, target: &DropTarget, candidates: &[PlanId]) -> usize {
        target
            .layout
            .iter()
            .filter(|item| item.midpoint() > target.pointer_y)
            .find_map(|item| candidates.iter().position(|id| *id == item.id))
            .unwrap_or(candidates.len())
    }

    pub fn revert(&self) -> DatePlansUpdate {
        let dates: BTreeSet<PlanDate> = self
            .current
            .keys()
            .chain(self.items.iter().map(|item| &item.origin_date))
            .copied()
            .collect();
        dates
            .into_iter()
            .map(|date| (date, self.baseline.get(&date).cloned().unwrap_or_default()))
            .collect()
    }

    pub fn finish(self) -> Option<ReorderPlan> {
        if self.last_key.is_none() || self.current.is_empty() {
            return None;
        }
        let before = self.link_set(&self.baseline);
        let after = self.link_set(&self.current);
        let forward: Vec<LinkPatch> = links(&self.current)
            .filter(|link| !before.contains(link))
            .collect();
        if forward.is_empty() {
            return None;
        }
        let inverse: Vec<LinkPatch> = links(&self.baseline)
            .filter(|link| self.current.contains_key(&link.date))
            .filter(|link| !after.contains(link))
            .collect();
        Some(ReorderPlan {
            forward,
            inverse,
            after: self.current,
        })
    }

    fn link_set(&self, sequences: &DatePlansUpdate) -> HashSet<LinkPatch> {
        links(sequences)
            .filter(|link| self.current.contains_key(&link.date))
            .collect()
    }
}

/// Put a dragged item back between its origin neighbours when the cached
/// sequence has lost it.
fn anchor_at_origin(sequence: &mut Vec<PlanId>, item: &DraggedItem) {
    if sequence.contains(&item.id) {
        return;
    }
    let after_prev = item
        .origin_prev
        .as_ref()
        .and_then(|prev| sequence.iter().position(|id| id == prev))
        .map(|index| index + 1);
    let before_next = item
        .origin_next
        .as_ref()
        .and_then(|next| sequence.iter().position(|id| id == next));
    let at = after_prev.or(before_next).unwrap_or(match item.origin_prev {
        None => 0,
        Some(_) => sequence.len(),
    });
    tracing::debug!(plan_id = %item.id, date = %item.origin_date, at, "restoring dragged item into its origin");
    sequence.insert(at, item.id.clone());
}

fn links(sequences: &DatePlansUpdate) -> impl Iterator<Item = LinkPatch> + '_ {
    sequences.iter().flat_map(|(date, ids)| {
        ids.iter().enumerate().map(move |(index, id)| LinkPatch {
            id: id.clone(),
            date: *date,
            prev: index.checked_sub(1).map(|prev| ids[prev].clone()),
        })
    })
}
