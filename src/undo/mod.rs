use std::collections::VecDeque;
use std::time::{Duration, Instant};

use strum::IntoStaticStr;

use crate::config::UndoConfig;
use crate::remote::StoreOp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum UndoKind {
    Reorder,
    AddPlan,
    DeletePlan,
    SetDone,
    EditContent,
    SetStyle,
    SetLabel,
}

/// Paired store batches: `undo` reverts what `redo` applies.
#[derive(Debug, Clone, PartialEq)]
pub struct UndoAction {
    pub kind: UndoKind,
    pub undo: Vec<StoreOp>,
    pub redo: Vec<StoreOp>,
}

#[derive(Debug)]
pub struct UndoStack {
    undo: VecDeque<UndoAction>,
    redo: Vec<UndoAction>,
    max_entries: usize,
    session_timeout: Duration,
    last_activity: Option<Instant>,
}

impl UndoStack {
    pub fn new(config: &UndoConfig) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            max_entries: config.max_entries.max(1),
            session_timeout: config.session_timeout(),
            last_activity: None,
        }
    }

    /// Record a committed mutation. Any redo history is discarded.
    pub fn push(&mut self, action: UndoAction, now: Instant) {
        self.expire(now);
        self.redo.clear();
        self.undo.push_back(action);
        while self.undo.len() > self.max_entries {
            self.undo.pop_front();
        }
        self.last_activity = Some(now);
    }

    /// Move the newest action onto the redo stack and return it for execution of its `undo` ops.
    pub fn undo(&mut self, now: Instant) -> Option<&UndoAction> {
        self.expire(now);
        let action = self.undo.pop_back()?;
        self.last_activity = Some(now);
        self.redo.push(action);
        self.redo.last()
    }

    pub fn redo(&mut self, now: Instant) -> Option<&UndoAction> {
        self.expire(now);
        let action = self.redo.pop()?;
        self.last_activity = Some(now);
        self.undo.push_back(action);
        self.undo.back()
    }

    pub fn expire(&mut self, now: Instant) -> bool {
        let Some(last) = self.last_activity else {
            return false;
        };
        if now.saturating_duration_since(last) < self.session_timeout {
            return false;
        }
        let had_entries = !self.undo.is_empty() || !self.redo.is_empty();
        self.undo.clear();
        self.redo.clear();
        self.last_activity = None;
        if had_entries {
            tracing::debug!("undo session expired");
        }
        had_entries
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }

    pub fn peek_redo(&self) -> Option<&UndoAction> {
        self.redo.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PlanId;
    use crate::remote::Collection;

    fn action(id: &str) -> UndoAction {
        let op = StoreOp::Delete {
            collection: Collection::Plans,
            id: PlanId::from(id),
        };
        UndoAction {
            kind: UndoKind::AddPlan,
            undo: vec![op.clone()],
            redo: vec![op],
        }
    }

    fn stack() -> UndoStack {
        UndoStack::new(&UndoConfig::default())
    }

    #[test]
    fn undo_moves_the_newest_action_to_redo() {
        let now = Instant::now();
        let mut undo = stack();
        undo.push(action("a"), now);
        undo.push(action("b"), now);
        let undone = undo.undo(now).cloned().unwrap();
        assert_eq!(undone, action("b"));
        assert_eq!(undo.peek_redo(), Some(&action("b")));

        undo.push(action("c"), now);
        assert_eq!(undo.redo_depth(), 0);
        assert!(undo.redo(now).is_none());
        assert_eq!(undo.undo_depth(), 2);
    }

    #[test]
    fn empty_stacks_are_no_ops() {
        let now = Instant::now();
        let mut undo = stack();
        assert!(undo.undo(now).is_none());
        assert!(undo.redo(now).is_none());
        assert_eq!((undo.undo_depth(), undo.redo_depth()), (0, 0));
    }

    #[test]
    fn redo_is_symmetric() {
        let now = Instant::now();
        let mut undo = stack();
        undo.push(action("a"), now);
        undo.undo(now);
        assert_eq!(undo.redo(now), Some(&action("a")));
        assert_eq!((undo.undo_depth(), undo.redo_depth()), (1, 0));
    }

    #[test]
    fn idle_sessions_are_cleared() {
        let start = Instant::now();
        let mut undo = stack();
        undo.push(action("a"), start);
        undo.push(action("b"), start);
        undo.undo(start);
        assert!(!undo.expire(start + Duration::from_secs(60)));
        assert!(undo.expire(start + Duration::from_secs(31 * 60)));
        assert_eq!((undo.undo_depth(), undo.redo_depth()), (0, 0));
    }

    #[test]
    fn oldest_entries_fall_off_past_the_limit() {
        let now = Instant::now();
        let mut undo = UndoStack::new(&UndoConfig {
            max_entries: 2,
            ..UndoConfig::default()
        });
        for id in ["a", "b", "c"] {
            undo.push(action(id), now);
        }
        assert_eq!(undo.undo_depth(), 2);
        assert_eq!(undo.undo(now), Some(&action("c")));
        assert_eq!(undo.undo(now), Some(&action("b")));
        assert!(undo.undo(now).is_none());
    }
}
