use std::collections::BTreeMap;

use indexmap::IndexMap;

use crate::model::{DateRange, PlanDate, PlanId, PlanRecord};

mod decode;

pub use decode::{decode_label, decode_plan, decode_style};

#[derive(Debug, Clone, Default)]
pub struct Reconciled {
    pub dates: BTreeMap<PlanDate, Vec<PlanRecord>>,
    pub broken_links: Vec<BrokenLink>,
}

impl Reconciled {
    pub fn ids(&self, date: PlanDate) -> Vec<PlanId> {
        self.dates
            .get(&date)
            .map(|plans| plans.iter().map(|plan| plan.id.clone()).collect())
            .unwrap_or_default()
    }
}

/// A record whose predecessor never appeared on its date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokenLink {
    pub id: PlanId,
    pub date: PlanDate,
    pub missing_prev: PlanId,
    /// The record now preceding it locally, if any.
    pub adopted_prev: Option<PlanId>,
}

type Bucket = IndexMap<PlanId, PlanRecord>;

/// Records outside `range` are dropped. Records are visited in id order, so the
/// result depends only on the set of records, never on delivery order.
pub fn reconstruct<I>(records: I, range: DateRange) -> Reconciled
where
    I: IntoIterator<Item = PlanRecord>,
{
    let mut records: Vec<PlanRecord> = records
        .into_iter()
        .filter(|record| range.contains(record.date))
        .collect();
    records.sort_by(|a, b| a.id.cmp(&b.id));

    let mut buckets: BTreeMap<PlanDate, Bucket> =
        range.days().map(|date| (date, Bucket::new())).collect();
    let mut reserves: BTreeMap<(PlanDate, PlanId), Vec<PlanRecord>> = BTreeMap::new();

    for record in records {
        let Some(bucket) = buckets.get_mut(&record.date) else {
            continue;
        };
        match record.prev_id.clone() {
            None => {
                if bucket.values().any(|held| held.is_head() && held.id != record.id) {
                    tracing::error!(
                        date = %record.date,
                        plan_id = %record.id,
                        "multiple head records on one date"
                    );
                }
                bucket.insert(record.id.clone(), record);
            }
            Some(prev) => {
                if let Err(record) = place_after(bucket, &prev, record) {
                    reserves.entry((record.date, prev)).or_default().push(record);
                }
            }
        }
    }

    resolve_reserves(&mut buckets, &mut reserves);

    let mut broken_links = Vec::new();
    for ((date, missing_prev), held) in reserves {
        let Some(bucket) = buckets.get_mut(&date) else {
            continue;
        };
        for mut record in held {
            let adopted_prev = bucket.last().map(|(id, _)| id.clone());
            tracing::error!(
                date = %date,
                plan_id = %record.id,
                missing_prev = %missing_prev,
                "plan has no resolvable predecessor, treating as head"
            );
            broken_links.push(BrokenLink {
                id: record.id.clone(),
                date,
                missing_prev: missing_prev.clone(),
                adopted_prev,
            });
            record.prev_id = None;
            bucket.insert(record.id.clone(), record);
        }
    }

    let dates = buckets
        .into_iter()
        .map(|(date, bucket)| (date, bucket.into_values().collect()))
        .collect();
    Reconciled {
        dates,
        broken_links,
    }
}

fn resolve_reserves(
    buckets: &mut BTreeMap<PlanDate, Bucket>,
    reserves: &mut BTreeMap<(PlanDate, PlanId), Vec<PlanRecord>>,
) {
    let mut unresolved = Vec::new();
    loop {
        let mut progressed = false;
        let keys: Vec<(PlanDate, PlanId)> = reserves.keys().cloned().collect();
        for key in keys {
            let Some(bucket) = buckets.get_mut(&key.0) else {
                continue;
            };
            if !bucket.contains_key(&key.1) {
                continue;
            }
            let held = reserves.remove(&key).unwrap_or_default();
            for record in held.into_iter().rev() {
                if let Err(record) = place_after(bucket, &key.1, record) {
                    // Only a self-referencing record can lose its predecessor here.
                    unresolved.push(((key.0, key.1.clone()), record));
                }
            }
            progressed = true;
        }
        if !progressed || reserves.is_empty() {
            break;
        }
    }
    for (key, record) in unresolved {
        reserves.entry(key).or_default().push(record);
    }
}

fn place_after(bucket: &mut Bucket, prev: &PlanId, record: PlanRecord) -> Result<(), PlanRecord> {
    bucket.shift_remove(&record.id);
    match bucket.get_index_of(prev) {
        Some(index) => {
            bucket.shift_insert(index + 1, record.id.clone(), record);
            Ok(())
        }
        None => Err(record),
    }
}
