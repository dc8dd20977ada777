use std::sync::Arc;
use std::time::{Duration, Instant};

use planner_sync::dates::ScrollDirection;
use planner_sync::drag::{DropTarget, ItemBox};
use planner_sync::remote::{Collection, StoreOp};
use planner_sync::render::ScrollEdge;
use planner_sync::{
    ConfigLoader, ConfigPaths, Engine, EngineAction, EngineConfig, EngineError, MemoryStore,
    PlanDate, PlanId, PlanRecord, RemoteStore,
};
use assert_matches::assert_matches;
use serde_json::{json, Value};
use tempfile::TempDir;

fn today() -> PlanDate {
    PlanDate::from_ymd(2024, 5, 15).unwrap()
}

fn body(value: Value) -> planner_sync::model::Fields {
    match value {
        Value::Object(fields) => fields,
        other => panic!("expected object, got {other}"),
    }
}

fn put_plan(store: &MemoryStore, id: &str, date: PlanDate, prev: &str) {
    store
        .commit(&[StoreOp::Put {
            collection: Collection::Plans,
            id: PlanId::from(id),
            fields: body(json!({
                "date": date.to_string(),
                "prev": prev,
                "content": format!("plan {id}"),
            })),
        }])
        .unwrap();
}

fn seeded() -> (Arc<MemoryStore>, Engine) {
    let store = Arc::new(MemoryStore::new());
    put_plan(&store, "3", today(), "2");
    put_plan(&store, "2", today(), "1");
    put_plan(&store, "1", today(), "");
    let mut engine = Engine::new(store.clone(), EngineConfig::default(), today());
    engine.pump();
    (store, engine)
}

fn order(engine: &Engine, date: PlanDate) -> Vec<String> {
    engine
        .dates()
        .into_iter()
        .find(|entry| entry.date == date)
        .map(|entry| {
            entry
                .plans
                .iter()
                .map(|plan| plan.id.as_str().to_string())
                .collect()
        })
        .unwrap_or_default()
}

fn plan(engine: &Engine, id: &str) -> PlanRecord {
    engine
        .dates()
        .into_iter()
        .flat_map(|entry| entry.plans)
        .find(|plan| plan.id.as_str() == id)
        .expect("plan is rendered")
}

fn prev_of(store: &MemoryStore, id: &str) -> Option<Value> {
    store
        .document(Collection::Plans, &PlanId::from(id))
        .and_then(|doc| doc.get("prev").cloned())
}

fn target(engine: &Engine, date: PlanDate, pointer_y: f64) -> DropTarget {
    let layout = order(engine, date)
        .into_iter()
        .enumerate()
        .map(|(i, id)| ItemBox {
            id: PlanId::from(id),
            top: i as f64 * 40.0,
            height: 40.0,
        })
        .collect();
    DropTarget {
        date,
        pointer_y,
        layout,
    }
}

fn ids(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|id| id.to_string()).collect()
}

fn drag_two_to_head(engine: &mut Engine) {
    engine
        .dispatch(EngineAction::DragStart {
            ids: vec![PlanId::from("2")],
        })
        .unwrap();
    let target = target(engine, today(), 5.0);
    engine
        .dispatch(EngineAction::DragMove {
            target: Some(target),
        })
        .unwrap();
}

fn assert_render_range_covered(engine: &Engine) {
    for day in engine.render_range().days() {
        assert!(
            engine.listeners().any(|listener| listener.range.contains(day)),
            "{day} is rendered but not subscribed"
        );
    }
}

#[test]
fn reverse_delivery_is_rendered_in_link_order() {
    let (_store, engine) = seeded();
    assert_eq!(order(&engine, today()), ids(&["1", "2", "3"]));
    assert_eq!(engine.dates().len(), 35);
}

#[test]
fn drag_to_head_commits_the_patch_and_is_undoable() {
    let (store, mut engine) = seeded();
    drag_two_to_head(&mut engine);
    assert!(engine.is_paused());
    assert_eq!(order(&engine, today()), ids(&["2", "1", "3"]));

    engine.dispatch(EngineAction::DragRelease).unwrap();
    assert!(!engine.is_paused());
    assert_eq!(prev_of(&store, "2"), Some(json!("")));
    assert_eq!(prev_of(&store, "1"), Some(json!("2")));
    assert_eq!(prev_of(&store, "3"), Some(json!("1")));
    engine.pump();
    assert_eq!(order(&engine, today()), ids(&["2", "1", "3"]));
    assert_eq!(engine.undo_depth(), 1);

    engine.dispatch(EngineAction::Undo).unwrap();
    engine.pump();
    assert_eq!(order(&engine, today()), ids(&["1", "2", "3"]));
    assert_eq!(engine.redo_depth(), 1);

    engine.dispatch(EngineAction::Redo).unwrap();
    engine.pump();
    assert_eq!(order(&engine, today()), ids(&["2", "1", "3"]));
}

#[test]
fn remote_echo_during_a_drag_does_not_overwrite_the_preview() {
    let (store, mut engine) = seeded();
    drag_two_to_head(&mut engine);

    put_plan(&store, "4", today(), "3");
    engine.pump();
    assert_eq!(order(&engine, today()), ids(&["2", "1", "3"]));

    engine.dispatch(EngineAction::DragCancel).unwrap();
    assert!(!engine.is_paused());
    assert_eq!(order(&engine, today()), ids(&["1", "2", "3", "4"]));
    assert_eq!(engine.undo_depth(), 0);
}

#[test]
fn updates_to_other_dates_during_a_drag_show_after_the_commit() {
    let (store, mut engine) = seeded();
    let other = today().add_days(14);
    drag_two_to_head(&mut engine);

    put_plan(&store, "x", other, "");
    engine.pump();
    assert!(order(&engine, other).is_empty());

    engine.dispatch(EngineAction::DragRelease).unwrap();
    assert_eq!(order(&engine, other), ids(&["x"]));
    assert_eq!(order(&engine, today()), ids(&["2", "1", "3"]));
    engine.pump();
    assert_eq!(order(&engine, other), ids(&["x"]));
    assert_eq!(order(&engine, today()), ids(&["2", "1", "3"]));
}

#[test]
fn dragging_two_plans_to_the_head_is_undoable() {
    let store = Arc::new(MemoryStore::new());
    put_plan(&store, "a", today(), "");
    put_plan(&store, "b", today(), "a");
    put_plan(&store, "c", today(), "b");
    put_plan(&store, "d", today(), "c");
    let mut engine = Engine::new(store.clone(), EngineConfig::default(), today());
    engine.pump();

    engine
        .dispatch(EngineAction::DragStart {
            ids: vec![PlanId::from("b"), PlanId::from("d")],
        })
        .unwrap();
    let target = target(&engine, today(), 5.0);
    engine
        .dispatch(EngineAction::DragMove {
            target: Some(target),
        })
        .unwrap();
    assert_eq!(order(&engine, today()), ids(&["b", "d", "a", "c"]));

    engine.dispatch(EngineAction::DragRelease).unwrap();
    assert_eq!(prev_of(&store, "b"), Some(json!("")));
    assert_eq!(prev_of(&store, "d"), Some(json!("b")));
    assert_eq!(prev_of(&store, "a"), Some(json!("d")));
    assert_eq!(prev_of(&store, "c"), Some(json!("a")));
    engine.pump();
    assert_eq!(order(&engine, today()), ids(&["b", "d", "a", "c"]));

    engine.dispatch(EngineAction::Undo).unwrap();
    engine.pump();
    assert_eq!(order(&engine, today()), ids(&["a", "b", "c", "d"]));
}

#[test]
fn failed_commit_reverts_to_the_reconciled_order() {
    let (store, mut engine) = seeded();
    drag_two_to_head(&mut engine);
    store.set_fail_writes(true);
    engine.dispatch(EngineAction::DragRelease).unwrap();
    assert!(!engine.is_paused());
    assert_eq!(order(&engine, today()), ids(&["1", "2", "3"]));
    assert_eq!(engine.undo_depth(), 0);
    assert_eq!(prev_of(&store, "2"), Some(json!("1")));
}

#[test]
fn release_without_a_target_is_a_no_op() {
    let (store, mut engine) = seeded();
    drag_two_to_head(&mut engine);
    engine
        .dispatch(EngineAction::DragMove { target: None })
        .unwrap();
    assert_eq!(order(&engine, today()), ids(&["1", "2", "3"]));
    engine.dispatch(EngineAction::DragRelease).unwrap();
    assert_eq!(engine.undo_depth(), 0);
    assert_eq!(prev_of(&store, "2"), Some(json!("1")));
}

#[test]
fn drag_actions_require_a_session() {
    let (_store, mut engine) = seeded();
    assert_matches!(
        engine.dispatch(EngineAction::DragRelease),
        Err(EngineError::NoDragSession)
    );
    assert_matches!(
        engine.dispatch(EngineAction::DragStart { ids: Vec::new() }),
        Err(EngineError::EmptyDrag)
    );
    assert_matches!(
        engine.dispatch(EngineAction::DragStart {
            ids: vec![PlanId::from("nope")]
        }),
        Err(EngineError::UnknownPlan(_))
    );
    drag_two_to_head(&mut engine);
    assert_matches!(
        engine.dispatch(EngineAction::DragStart {
            ids: vec![PlanId::from("1")]
        }),
        Err(EngineError::DragInProgress)
    );
}

#[test]
fn listeners_always_cover_the_render_range() {
    let (_store, mut engine) = seeded();
    let start = Instant::now();
    let steps = [
        EngineAction::ScrollEdge {
            edge: ScrollEdge::Top,
            distance_px: 10.0,
        },
        EngineAction::ScrollEdge {
            edge: ScrollEdge::Top,
            distance_px: 66.0,
        },
        EngineAction::ScrollEdge {
            edge: ScrollEdge::Bottom,
            distance_px: 69.0,
        },
        EngineAction::MoveRenderRange {
            direction: ScrollDirection::Down,
            weeks: 12,
        },
        EngineAction::JumpToToday(today()),
        EngineAction::ScrollEdge {
            edge: ScrollEdge::Bottom,
            distance_px: 0.0,
        },
        EngineAction::JumpToToday(today().add_days(400)),
    ];
    for (i, step) in steps.into_iter().enumerate() {
        engine
            .dispatch_at(step, start + Duration::from_secs(i as u64))
            .unwrap();
        assert_render_range_covered(&engine);
    }
    assert!(engine.render_range().contains(today().add_days(400)));
}

#[test]
fn idle_listeners_are_swept_after_the_interval() {
    let (store, mut engine) = seeded();
    let start = Instant::now();
    engine
        .dispatch_at(
            EngineAction::MoveRenderRange {
                direction: ScrollDirection::Down,
                weeks: 10,
            },
            start,
        )
        .unwrap();
    let total = engine.listeners().count();
    let on_screen = engine.listeners().filter(|l| l.on_screen).count();
    assert!(on_screen < total);

    engine.tick(start + Duration::from_secs(59));
    assert_eq!(engine.listeners().count(), total);
    engine.tick(start + Duration::from_secs(60));
    assert_eq!(engine.listeners().count(), on_screen);
    assert_render_range_covered(&engine);
    // Two per week plus the style feed.
    assert_eq!(store.subscriber_count(), on_screen * 2 + 1);
}

#[test]
fn jump_to_today_drops_far_listeners_immediately() {
    let (store, mut engine) = seeded();
    let before = store.subscriber_count();
    engine
        .dispatch(EngineAction::MoveRenderRange {
            direction: ScrollDirection::Up,
            weeks: 8,
        })
        .unwrap();
    assert!(store.subscriber_count() > before);
    engine.dispatch(EngineAction::JumpToToday(today())).unwrap();
    assert_eq!(engine.listeners().count(), 5);
    assert_eq!(store.subscriber_count(), before);
}

#[test]
fn integrity_violations_are_deleted_remotely() {
    let store = Arc::new(MemoryStore::new());
    put_plan(&store, "1", today(), "");
    store
        .commit(&[
            StoreOp::Put {
                collection: Collection::Plans,
                id: PlanId::from("empty"),
                fields: body(json!({"date": today().to_string(), "prev": "1", "content": ""})),
            },
            StoreOp::Put {
                collection: Collection::Plans,
                id: PlanId::from("baddate"),
                fields: body(json!({"date": "2024-05-15x", "content": "x"})),
            },
            StoreOp::Put {
                collection: Collection::Labels,
                id: PlanId::from("blank-label"),
                fields: body(json!({"date": today().to_string()})),
            },
        ])
        .unwrap();
    let mut engine = Engine::new(store.clone(), EngineConfig::default(), today());
    engine.pump();
    assert_eq!(order(&engine, today()), ids(&["1"]));
    assert!(store.document(Collection::Plans, &PlanId::from("empty")).is_none());
    assert!(store.document(Collection::Plans, &PlanId::from("baddate")).is_none());
    assert!(store
        .document(Collection::Labels, &PlanId::from("blank-label"))
        .is_none());
}

#[test]
fn broken_links_are_repaired_only_when_enabled() {
    for repair in [false, true] {
        let store = Arc::new(MemoryStore::new());
        put_plan(&store, "1", today(), "");
        put_plan(&store, "2", today(), "ghost");
        put_plan(&store, "3", today(), "1");
        let mut config = EngineConfig::default();
        config.integrity.repair_broken_links = repair;
        let mut engine = Engine::new(store.clone(), config, today());
        engine.pump();
        assert_eq!(order(&engine, today()), ids(&["1", "3", "2"]));
        let expected = if repair { json!("3") } else { json!("ghost") };
        assert_eq!(prev_of(&store, "2"), Some(expected));
        engine.pump();
        assert_eq!(order(&engine, today()), ids(&["1", "3", "2"]));
    }
}

#[test]
fn plan_mutations_round_trip_through_undo() {
    let (store, mut engine) = seeded();
    engine
        .dispatch(EngineAction::AddPlan {
            date: today(),
            content: json!("new"),
            style_id: None,
        })
        .unwrap();
    engine.pump();
    let added = order(&engine, today());
    assert_eq!(added.len(), 4);
    assert_eq!(prev_of(&store, &added[3]), Some(json!("3")));

    engine.dispatch(EngineAction::Undo).unwrap();
    engine.pump();
    assert_eq!(order(&engine, today()), ids(&["1", "2", "3"]));

    engine
        .dispatch(EngineAction::DeletePlan {
            id: PlanId::from("2"),
        })
        .unwrap();
    engine.pump();
    assert_eq!(order(&engine, today()), ids(&["1", "3"]));
    assert_eq!(prev_of(&store, "3"), Some(json!("1")));
    engine.dispatch(EngineAction::Undo).unwrap();
    engine.pump();
    assert_eq!(order(&engine, today()), ids(&["1", "2", "3"]));

    engine
        .dispatch(EngineAction::SetDone {
            id: PlanId::from("1"),
            done: true,
        })
        .unwrap();
    engine.pump();
    assert!(plan(&engine, "1").done);
    engine.dispatch(EngineAction::Undo).unwrap();
    engine.pump();
    assert!(!plan(&engine, "1").done);

    assert_matches!(
        engine.dispatch(EngineAction::SetStyle {
            id: PlanId::from("missing"),
            style_id: "work".into(),
        }),
        Err(EngineError::UnknownPlan(_))
    );
}

#[test]
fn labels_and_styles_follow_their_collections() {
    let (store, mut engine) = seeded();
    store
        .write(
            Collection::Styles,
            body(json!({"label": "Work", "color": "#00f", "colorDone": "#88f"})),
        )
        .unwrap();
    engine
        .dispatch(EngineAction::SetLabel {
            date: today(),
            content: Some(json!("Deadline")),
        })
        .unwrap();
    engine.pump();
    assert_eq!(engine.styles().len(), 1);
    let label = |engine: &Engine| {
        engine
            .dates()
            .into_iter()
            .find(|e| e.date == today())
            .and_then(|e| e.label)
            .map(|label| label.content)
    };
    assert_eq!(label(&engine), Some(json!("Deadline")));

    engine
        .dispatch(EngineAction::SetLabel {
            date: today(),
            content: None,
        })
        .unwrap();
    engine.pump();
    assert_eq!(label(&engine), None);

    engine.dispatch(EngineAction::Undo).unwrap();
    engine.pump();
    assert_eq!(label(&engine), Some(json!("Deadline")));
}

#[test]
fn undo_history_expires_after_inactivity() {
    let (_store, mut engine) = seeded();
    let start = Instant::now();
    engine
        .dispatch_at(
            EngineAction::SetDone {
                id: PlanId::from("3"),
                done: true,
            },
            start,
        )
        .unwrap();
    assert_eq!(engine.undo_depth(), 1);
    engine.tick(start + Duration::from_secs(29 * 60));
    assert_eq!(engine.undo_depth(), 1);
    engine.tick(start + Duration::from_secs(30 * 60));
    assert_eq!(engine.undo_depth(), 0);
}

#[test]
fn persisted_cache_renders_before_the_first_snapshot() {
    let dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_paths(ConfigPaths::rooted_at(dir.path()));
    let config = loader.load_or_init().unwrap();

    let store = Arc::new(MemoryStore::new());
    put_plan(&store, "2", today(), "1");
    put_plan(&store, "1", today(), "");
    let mut engine = Engine::new(store, config.clone(), today());
    engine.pump();
    drop(engine);

    let offline = Arc::new(MemoryStore::new());
    let engine = Engine::new(offline, config, today());
    assert_eq!(order(&engine, today()), ids(&["1", "2"]));
}
