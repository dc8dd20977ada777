use serde_json::Value;
use strum::IntoStaticStr;

use crate::dates::ScrollDirection;
use crate::drag::{DropTarget, LinkPatch, ReorderPlan};
use crate::error::StoreError;
use crate::model::{fields, DateLabel, DateRange, Fields, PlanDate, PlanId, PlanRecord};
use crate::remote::{Collection, RemoteStore, StoreOp};
use crate::render::ScrollEdge;
use crate::undo::{UndoAction, UndoKind};

/// Every input the engine reacts to.
#[derive(Debug, Clone, PartialEq, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum EngineAction {
    SetRenderRange(DateRange),
    ScrollEdge { edge: ScrollEdge, distance_px: f64 },
    MoveRenderRange { direction: ScrollDirection, weeks: u32 },
    JumpToToday(PlanDate),
    SweepListeners,
    PauseSync,
    ResumeSync { sync_now: bool },
    DragStart { ids: Vec<PlanId> },
    /// `None` while the pointer is over no valid date.
    DragMove { target: Option<DropTarget> },
    DragRelease,
    DragCancel,
    Undo,
    Redo,
    AddPlan {
        date: PlanDate,
        content: Value,
        style_id: Option<String>,
    },
    DeletePlan { id: PlanId },
    SetDone { id: PlanId, done: bool },
    EditContent { id: PlanId, content: Value },
    SetStyle { id: PlanId, style_id: String },
    /// `None` or empty content removes the label.
    SetLabel { date: PlanDate, content: Option<Value> },
}

/// Issues store batches, logging and swallowing failures.
pub(crate) struct ActionDispatcher<'a> {
    store: &'a dyn RemoteStore,
}

impl<'a> ActionDispatcher<'a> {
    pub fn new(store: &'a dyn RemoteStore) -> Self {
        Self { store }
    }

    pub fn commit(&self, what: &'static str, ops: &[StoreOp]) -> bool {
        if ops.is_empty() {
            return true;
        }
        match self.store.commit(ops) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(action = what, ops = ops.len(), ?err, "store batch failed");
                false
            }
        }
    }

    pub fn create_label(&self, date: PlanDate, content: Value) -> Result<UndoAction, StoreError> {
        let mut body = fields::single(fields::DATE, Value::String(date.to_string()));
        body.insert(fields::CONTENT.into(), content);
        let id = self.store.write(Collection::Labels, body.clone())?;
        Ok(UndoAction {
            kind: UndoKind::SetLabel,
            undo: vec![StoreOp::Delete {
                collection: Collection::Labels,
                id: id.clone(),
            }],
            redo: vec![StoreOp::Put {
                collection: Collection::Labels,
                id,
                fields: body,
            }],
        })
    }

    pub fn delete_document(&self, collection: Collection, id: &PlanId) {
        if let Err(err) = self.store.delete(collection, id) {
            tracing::warn!(collection = collection.as_ref(), %id, ?err, "repair delete failed");
        }
    }

    pub fn relink(&self, id: &PlanId, date: PlanDate, prev: Option<&PlanId>) {
        if let Err(err) = self.store.update(Collection::Plans, id, fields::link(date, prev)) {
            tracing::warn!(plan_id = %id, ?err, "link repair failed");
        }
    }
}

fn patch(id: &PlanId, fields: Fields) -> StoreOp {
    StoreOp::Patch {
        collection: Collection::Plans,
        id: id.clone(),
        fields,
    }
}

pub(crate) fn reorder_action(plan: &ReorderPlan) -> UndoAction {
    let ops = |links: &[LinkPatch]| -> Vec<StoreOp> {
        links
            .iter()
            .map(|link| patch(&link.id, fields::link(link.date, link.prev.as_ref())))
            .collect()
    };
    UndoAction {
        kind: UndoKind::Reorder,
        undo: ops(&plan.inverse[..]),
        redo: ops(&plan.forward[..]),
    }
}

pub(crate) fn add_plan_action(
    date: PlanDate,
    after: Option<&PlanId>,
    content: Value,
    style_id: String,
) -> UndoAction {
    let id = PlanId::generate();
    let mut body = fields::link(date, after);
    body.insert(fields::CONTENT.into(), content);
    body.insert(fields::DONE.into(), Value::Bool(false));
    body.insert(fields::STYLE_ID.into(), Value::String(style_id));
    UndoAction {
        kind: UndoKind::AddPlan,
        undo: vec![StoreOp::Delete {
            collection: Collection::Plans,
            id: id.clone(),
        }],
        redo: vec![StoreOp::Put {
            collection: Collection::Plans,
            id,
            fields: body,
        }],
    }
}

/// Remove `record` and hand its predecessor to `next`.
pub(crate) fn delete_plan_action(record: &PlanRecord, next: Option<&PlanRecord>) -> UndoAction {
    let mut redo = vec![StoreOp::Delete {
        collection: Collection::Plans,
        id: record.id.clone(),
    }];
    let mut undo = vec![StoreOp::Put {
        collection: Collection::Plans,
        id: record.id.clone(),
        fields: restorable_body(record),
    }];
    if let Some(next) = next {
        redo.push(patch(
            &next.id,
            fields::single(fields::PREV, fields::prev_value(record.prev_id.as_ref())),
        ));
        undo.push(patch(
            &next.id,
            fields::single(fields::PREV, fields::prev_value(Some(&record.id))),
        ));
    }
    UndoAction {
        kind: UndoKind::DeletePlan,
        undo,
        redo,
    }
}

/// Raw body as last seen remotely, with the reconciled link on top.
fn restorable_body(record: &PlanRecord) -> Fields {
    let mut body = record.snapshot.clone();
    body.extend(fields::link(record.date, record.prev_id.as_ref()));
    body.entry(fields::CONTENT)
        .or_insert_with(|| record.content.clone());
    body.entry(fields::DONE)
        .or_insert(Value::Bool(record.done));
    body.entry(fields::STYLE_ID)
        .or_insert_with(|| Value::String(record.style_id.clone()));
    body
}

pub(crate) fn field_action(
    kind: UndoKind,
    id: &PlanId,
    field: &str,
    before: Value,
    after: Value,
) -> UndoAction {
    UndoAction {
        kind,
        undo: vec![patch(id, fields::single(field, before))],
        redo: vec![patch(id, fields::single(field, after))],
    }
}

pub(crate) fn update_label_action(label: &DateLabel, content: Value) -> UndoAction {
    let op = |value: Value| StoreOp::Patch {
        collection: Collection::Labels,
        id: label.label_id.clone(),
        fields: fields::single(fields::CONTENT, value),
    };
    UndoAction {
        kind: UndoKind::SetLabel,
        undo: vec![op(label.content.clone())],
        redo: vec![op(content)],
    }
}

pub(crate) fn remove_label_action(date: PlanDate, label: &DateLabel) -> UndoAction {
    let mut body = fields::single(fields::DATE, Value::String(date.to_string()));
    body.insert(fields::CONTENT.into(), label.content.clone());
    UndoAction {
        kind: UndoKind::SetLabel,
        undo: vec![StoreOp::Put {
            collection: Collection::Labels,
            id: label.label_id.clone(),
            fields: body,
        }],
        redo: vec![StoreOp::Delete {
            collection: Collection::Labels,
            id: label.label_id.clone(),
        }],
    }
}
