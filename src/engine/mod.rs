use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use crate::config::EngineConfig;
use crate::drag::{DragSession, DraggedItem};
use crate::error::{EngineError, EngineResult};
use crate::model::{
    fields, DateEntry, DateRange, PlanDate, PlanId, PlanRecord, PlanStyle, DEFAULT_STYLE_ID,
};
use crate::reconcile::{decode_label, decode_plan, decode_style, reconstruct};
use crate::remote::{Collection, RemoteStore, Snapshot, Subscription};
use crate::render::RenderRange;
use crate::sync::{CachePersister, SyncController};
use crate::undo::{UndoAction, UndoKind, UndoStack};
use crate::window::{RangeListener, WindowManager};

mod actions;

pub use actions::EngineAction;
use actions::ActionDispatcher;

pub struct Engine {
    store: Arc<dyn RemoteStore>,
    config: EngineConfig,
    cache: SyncController,
    window: WindowManager,
    render: RenderRange,
    undo: UndoStack,
    drag: Option<DragSession>,
    styles: Option<Subscription>,
}

impl Engine {
    /// Load the persisted cache and subscribe the initial window around `today`.
    pub fn new(store: Arc<dyn RemoteStore>, config: EngineConfig, today: PlanDate) -> Self {
        let cache = SyncController::new(CachePersister::from_config(&config.cache));
        let render = RenderRange::new(today, &config.render);
        let window = WindowManager::new(config.render.week_start, config.window.sweep_interval());
        let undo = UndoStack::new(&config.undo);
        let mut engine = Self {
            store,
            config,
            cache,
            window,
            render,
            undo,
            drag: None,
            styles: None,
        };
        engine.ensure_styles_subscription();
        engine.cover(Instant::now());
        engine
    }

    pub fn dispatch(&mut self, action: EngineAction) -> EngineResult<()> {
        self.dispatch_at(action, Instant::now())
    }

    pub fn dispatch_at(&mut self, action: EngineAction, now: Instant) -> EngineResult<()> {
        let name: &'static str = (&action).into();
        tracing::trace!(action = name, "dispatch");
        match action {
            EngineAction::SetRenderRange(range) => {
                self.render.set(range);
                self.cover(now);
            }
            EngineAction::ScrollEdge { edge, distance_px } => {
                if self.render.on_edge(edge, distance_px).is_some() {
                    self.cover(now);
                }
            }
            EngineAction::MoveRenderRange { direction, weeks } => {
                self.render.scroll(direction, weeks);
                self.cover(now);
            }
            EngineAction::JumpToToday(today) => {
                self.render.jump_to_today(today);
                self.window.retain_around(
                    today,
                    self.render.weeks_before_today(),
                    self.render.initial_weeks(),
                );
                self.cover(now);
            }
            EngineAction::SweepListeners => {
                self.window.sweep();
            }
            EngineAction::PauseSync => self.cache.pause(),
            EngineAction::ResumeSync { sync_now } => {
                self.cache.resume(sync_now);
            }
            EngineAction::DragStart { ids } => self.drag_start(&ids)?,
            EngineAction::DragMove { target } => {
                let session = self.drag.as_mut().ok_or(EngineError::NoDragSession)?;
                let cache = &self.cache;
                if let Some(update) = session.update(target.as_ref(), |date| cache.plan_ids(date)) {
                    self.cache.apply_order(&update);
                }
            }
            EngineAction::DragRelease => self.drag_release(now)?,
            EngineAction::DragCancel => {
                let session = self.drag.take().ok_or(EngineError::NoDragSession)?;
                self.cache.apply_order(&session.revert());
                self.cache.resume(true);
            }
            EngineAction::Undo => {
                if let Some(action) = self.undo.undo(now) {
                    let ops = action.undo.clone();
                    let kind: &'static str = action.kind.into();
                    tracing::info!(kind, "undo");
                    ActionDispatcher::new(self.store.as_ref()).commit("undo", &ops);
                }
            }
            EngineAction::Redo => {
                if let Some(action) = self.undo.redo(now) {
                    let ops = action.redo.clone();
                    let kind: &'static str = action.kind.into();
                    tracing::info!(kind, "redo");
                    ActionDispatcher::new(self.store.as_ref()).commit("redo", &ops);
                }
            }
            EngineAction::AddPlan {
                date,
                content,
                style_id,
            } => {
                let after = self.cache.entry(date).and_then(|entry| entry.plans.last());
                let action = actions::add_plan_action(
                    date,
                    after.map(|plan| &plan.id),
                    content,
                    style_id.unwrap_or_else(|| DEFAULT_STYLE_ID.to_string()),
                );
                self.commit_and_record(action, now);
            }
            EngineAction::DeletePlan { id } => {
                let record = self
                    .cache
                    .find_plan(&id)
                    .ok_or_else(|| EngineError::UnknownPlan(id.clone()))?;
                let next = self.cache.entry(record.date).and_then(|entry| {
                    let index = entry.position_of(&id)?;
                    entry.plans.get(index + 1)
                });
                let action = actions::delete_plan_action(record, next);
                self.commit_and_record(action, now);
            }
            EngineAction::SetDone { id, done } => {
                let before = self.plan_field(&id, |plan| Value::Bool(plan.done))?;
                let action = actions::field_action(
                    UndoKind::SetDone,
                    &id,
                    fields::DONE,
                    before,
                    Value::Bool(done),
                );
                self.commit_and_record(action, now);
            }
            EngineAction::EditContent { id, content } => {
                let before = self.plan_field(&id, |plan| plan.content.clone())?;
                let action =
                    actions::field_action(UndoKind::EditContent, &id, fields::CONTENT, before, content);
                self.commit_and_record(action, now);
            }
            EngineAction::SetStyle { id, style_id } => {
                let before = self.plan_field(&id, |plan| Value::String(plan.style_id.clone()))?;
                let action = actions::field_action(
                    UndoKind::SetStyle,
                    &id,
                    fields::STYLE_ID,
                    before,
                    Value::String(style_id),
                );
                self.commit_and_record(action, now);
            }
            EngineAction::SetLabel { date, content } => self.set_label(date, content, now),
        }
        Ok(())
    }

    /// Apply the newest pending snapshot of every subscription. Returns how many were applied.
    pub fn pump(&mut self) -> usize {
        self.ensure_styles_subscription();
        let mut applied = 0;
        if let Some(snapshot) = self.styles.as_ref().and_then(Subscription::latest) {
            self.apply_styles(snapshot);
            applied += 1;
        }
        for snapshot in self.window.drain() {
            match snapshot.collection {
                Collection::Plans => self.apply_plans(snapshot),
                Collection::Labels => self.apply_labels(snapshot),
                Collection::Styles => continue,
            }
            applied += 1;
        }
        applied
    }

    pub fn tick(&mut self, now: Instant) {
        let closed = self.window.tick(now);
        if closed > 0 {
            tracing::debug!(closed, "idle sweep closed listeners");
        }
        self.undo.expire(now);
    }

    pub fn dates(&self) -> Vec<DateEntry> {
        self.render.materialize(&self.cache)
    }

    pub fn render_range(&self) -> DateRange {
        self.render.range()
    }

    pub fn listeners(&self) -> impl Iterator<Item = &RangeListener> {
        self.window.listeners()
    }

    pub fn styles(&self) -> &BTreeMap<String, PlanStyle> {
        self.cache.styles()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.undo_depth()
    }

    pub fn redo_depth(&self) -> usize {
        self.undo.redo_depth()
    }

    pub fn is_paused(&self) -> bool {
        self.cache.is_paused()
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn cover(&mut self, now: Instant) {
        let range = self.render.range();
        let created = self.window.cover(range, self.store.as_ref(), now);
        if created > 0 {
            tracing::debug!(%range, created, "extended listener window");
        }
    }

    fn ensure_styles_subscription(&mut self) {
        if self.styles.is_some() {
            return;
        }
        match self.store.subscribe(Collection::Styles, None) {
            Ok(subscription) => self.styles = Some(subscription),
            Err(err) => tracing::warn!(?err, "subscribing styles failed"),
        }
    }

    fn plan_field<F>(&self, id: &PlanId, read: F) -> EngineResult<Value>
    where
        F: FnOnce(&PlanRecord) -> Value,
    {
        self.cache
            .find_plan(id)
            .map(read)
            .ok_or_else(|| EngineError::UnknownPlan(id.clone()))
    }

    fn commit_and_record(&mut self, action: UndoAction, now: Instant) {
        let kind: &'static str = action.kind.into();
        if ActionDispatcher::new(self.store.as_ref()).commit(kind, &action.redo) {
            self.undo.push(action, now);
        }
    }

    fn drag_start(&mut self, ids: &[PlanId]) -> EngineResult<()> {
        if self.drag.is_some() {
            return Err(EngineError::DragInProgress);
        }
        if ids.is_empty() {
            return Err(EngineError::EmptyDrag);
        }
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            let record = self
                .cache
                .find_plan(id)
                .ok_or_else(|| EngineError::UnknownPlan(id.clone()))?;
            let next = self.cache.entry(record.date).and_then(|entry| {
                let index = entry.position_of(id)?;
                entry.plans.get(index + 1).map(|plan| plan.id.clone())
            });
            items.push(DraggedItem {
                id: id.clone(),
                origin_date: record.date,
                origin_prev: record.prev_id.clone(),
                origin_next: next,
            });
        }
        self.cache.pause();
        let cache = &self.cache;
        self.drag = Some(DragSession::new(items, |date| cache.plan_ids(date)));
        Ok(())
    }

    fn drag_release(&mut self, now: Instant) -> EngineResult<()> {
        let session = self.drag.take().ok_or(EngineError::NoDragSession)?;
        let revert = session.revert();
        let Some(plan) = session.finish() else {
            self.cache.apply_order(&revert);
            self.cache.resume(true);
            return Ok(());
        };
        let action = actions::reorder_action(&plan);
        if ActionDispatcher::new(self.store.as_ref()).commit("reorder", &action.redo) {
            tracing::info!(links = action.redo.len(), "reorder committed");
            self.cache.apply_order(&plan.after);
            self.cache.resume_committed(&plan.after);
            self.undo.push(action, now);
        } else {
            self.cache.apply_order(&revert);
            self.cache.resume(true);
        }
        Ok(())
    }

    fn set_label(&mut self, date: PlanDate, content: Option<Value>, now: Instant) {
        let content = content.filter(|value| match value {
            Value::Null => false,
            Value::String(text) => !text.is_empty(),
            _ => true,
        });
        let existing = self.cache.entry(date).and_then(|entry| entry.label.clone());
        let action = match (existing, content) {
            (Some(label), Some(content)) => actions::update_label_action(&label, content),
            (Some(label), None) => actions::remove_label_action(date, &label),
            (None, Some(content)) => {
                match ActionDispatcher::new(self.store.as_ref()).create_label(date, content) {
                    Ok(action) => self.undo.push(action, now),
                    Err(err) => tracing::warn!(%date, ?err, "creating label failed"),
                }
                return;
            }
            (None, None) => return,
        };
        self.commit_and_record(action, now);
    }

    fn apply_plans(&mut self, snapshot: Snapshot) {
        let Some(range) = snapshot.range else {
            return;
        };
        let dispatcher = ActionDispatcher::new(self.store.as_ref());
        let mut records = Vec::with_capacity(snapshot.documents.len());
        for doc in &snapshot.documents {
            match decode_plan(doc) {
                Ok(record) => records.push(record),
                Err(err) => {
                    tracing::error!(%err, "deleting plan that fails integrity checks");
                    dispatcher.delete_document(Collection::Plans, err.id());
                }
            }
        }
        let reconciled = reconstruct(records, range);
        if self.config.integrity.repair_broken_links {
            for broken in &reconciled.broken_links {
                dispatcher.relink(&broken.id, broken.date, broken.adopted_prev.as_ref());
            }
        }
        self.cache.accept_plans(reconciled);
    }

    fn apply_labels(&mut self, snapshot: Snapshot) {
        let Some(range) = snapshot.range else {
            return;
        };
        let dispatcher = ActionDispatcher::new(self.store.as_ref());
        let mut labels = BTreeMap::new();
        for doc in &snapshot.documents {
            match decode_label(doc) {
                Ok((date, label)) if range.contains(date) => {
                    if labels.contains_key(&date) {
                        tracing::warn!(%date, label_id = %label.label_id, "ignoring second label on date");
                        continue;
                    }
                    labels.insert(date, label);
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::error!(%err, "deleting label that fails integrity checks");
                    dispatcher.delete_document(Collection::Labels, err.id());
                }
            }
        }
        self.cache.accept_labels(range, labels);
    }

    fn apply_styles(&mut self, snapshot: Snapshot) {
        let styles = snapshot.documents.iter().map(decode_style).collect();
        self.cache.accept_styles(styles);
    }
}
