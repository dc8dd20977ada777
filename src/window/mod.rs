use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use crate::dates::{week_ranges, week_start_of, WeekStart};
use crate::model::{DateRange, PlanDate};
use crate::remote::{Collection, RemoteStore, Snapshot, Subscription};

#[derive(Debug)]
pub struct RangeListener {
    pub range: DateRange,
    pub on_screen: bool,
    plans: Option<Subscription>,
    labels: Option<Subscription>,
}

impl RangeListener {
    fn open(range: DateRange, store: &dyn RemoteStore) -> Self {
        let mut listener = Self {
            range,
            on_screen: true,
            plans: None,
            labels: None,
        };
        listener.ensure_subscribed(store);
        listener
    }

    /// Acquire whichever subscriptions are missing. Failures are retried on the next cover.
    fn ensure_subscribed(&mut self, store: &dyn RemoteStore) {
        for (collection, slot) in [
            (Collection::Plans, &mut self.plans),
            (Collection::Labels, &mut self.labels),
        ] {
            if slot.is_some() {
                continue;
            }
            match store.subscribe(collection, Some(self.range)) {
                Ok(subscription) => *slot = Some(subscription),
                Err(err) => tracing::warn!(
                    range = %self.range,
                    collection = collection.as_ref(),
                    ?err,
                    "subscribing range failed"
                ),
            }
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.plans.is_some() && self.labels.is_some()
    }

    fn close(&mut self) {
        for subscription in [self.plans.as_mut(), self.labels.as_mut()].into_iter().flatten() {
            subscription.cancel();
        }
    }
}

#[derive(Debug)]
pub struct WindowManager {
    week_start: WeekStart,
    sweep_interval: Duration,
    sweep_due: Option<Instant>,
    listeners: BTreeMap<PlanDate, RangeListener>,
}

impl WindowManager {
    pub fn new(week_start: WeekStart, sweep_interval: Duration) -> Self {
        Self {
            week_start,
            sweep_interval,
            sweep_due: None,
            listeners: BTreeMap::new(),
        }
    }

    pub fn cover(&mut self, render: DateRange, store: &dyn RemoteStore, now: Instant) -> usize {
        let weeks = week_ranges(render, self.week_start);
        let needed: BTreeSet<PlanDate> = weeks.iter().map(|week| week.start).collect();
        let mut created = 0;
        for week in weeks {
            match self.listeners.get_mut(&week.start) {
                Some(listener) => {
                    listener.on_screen = true;
                    listener.ensure_subscribed(store);
                }
                None => {
                    tracing::debug!(range = %week, "opening range listener");
                    self.listeners
                        .insert(week.start, RangeListener::open(week, store));
                    created += 1;
                }
            }
        }
        for (start, listener) in self.listeners.iter_mut() {
            if !needed.contains(start) {
                listener.on_screen = false;
            }
        }
        self.sweep_due = Some(now + self.sweep_interval);
        created
    }

    pub fn sweep_due(&self, now: Instant) -> bool {
        self.sweep_due.is_some_and(|due| due <= now)
    }

    pub fn tick(&mut self, now: Instant) -> usize {
        if !self.sweep_due(now) {
            return 0;
        }
        self.sweep_due = Some(now + self.sweep_interval);
        self.sweep()
    }

    pub fn sweep(&mut self) -> usize {
        let before = self.listeners.len();
        self.listeners.retain(|_, listener| {
            if listener.on_screen {
                return true;
            }
            tracing::debug!(range = %listener.range, "closing idle range listener");
            listener.close();
            false
        });
        before - self.listeners.len()
    }

    /// Keep the `weeks` tracked weeks starting `weeks_before` ahead of today's week.
    pub fn retain_around(&mut self, today: PlanDate, weeks_before: u32, weeks: u32) -> usize {
        let today_week = week_start_of(today, self.week_start);
        let position = self.listeners.keys().position(|start| *start == today_week);
        let (floor, roof) = match position {
            Some(index) => {
                let floor = index.saturating_sub(weeks_before as usize);
                (floor, floor + weeks as usize)
            }
            None => (0, 0),
        };
        let before = self.listeners.len();
        let mut index = 0;
        self.listeners.retain(|_, listener| {
            let keep = (floor..roof).contains(&index);
            index += 1;
            if !keep {
                listener.close();
            }
            keep
        });
        let dropped = before - self.listeners.len();
        if dropped > 0 {
            tracing::debug!(dropped, %today, "dropped listeners outside today's window");
        }
        dropped
    }

    pub fn listeners(&self) -> impl Iterator<Item = &RangeListener> {
        self.listeners.values()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn covers(&self, range: DateRange) -> bool {
        week_ranges(range, self.week_start)
            .iter()
            .all(|week| self.listeners.contains_key(&week.start))
    }

    pub fn drain(&self) -> Vec<Snapshot> {
        self.listeners
            .values()
            .flat_map(|listener| [listener.plans.as_ref(), listener.labels.as_ref()])
            .flatten()
            .filter_map(Subscription::latest)
            .collect()
    }
}
