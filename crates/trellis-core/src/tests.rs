use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use crate::node::{CommittedNode, Node};
use crate::prelude::*;
use crate::{ComponentDef, deps};

struct Recording(Rc<RefCell<Vec<CommittedNode>>>);

impl Renderer for Recording {
    fn commit(&mut self, root: &CommittedNode) {
        self.0.borrow_mut().push(root.clone());
    }
}

fn recording_runtime() -> (Runtime, Rc<RefCell<Vec<CommittedNode>>>) {
    let commits = Rc::new(RefCell::new(Vec::new()));
    let rt = Runtime::with_renderer(Box::new(Recording(commits.clone())));
    (rt, commits)
}

fn warnings_hook(rt: &Runtime) -> Rc<RefCell<Vec<String>>> {
    let sink = Rc::new(RefCell::new(Vec::new()));
    let s2 = sink.clone();
    rt.set_warning_hook(move |msg| s2.borrow_mut().push(msg.to_string()));
    sink
}

type HandleSlot = Rc<RefCell<Option<StateHandle>>>;

/// One int slot rendered as text; the update handle escapes through `slot`.
fn counter_def(slot: &HandleSlot) -> Rc<ComponentDef> {
    let slot = slot.clone();
    ComponentDef::new("Counter", move |ctx| {
        let (n, h) = ctx.use_state(|| Value::Int(0));
        *slot.borrow_mut() = Some(h);
        Ok(vec![Node::text(format!("{}", n.as_int().unwrap_or(0)))])
    })
}

#[test]
fn plain_set_last_value_wins_in_batch() {
    let slot: HandleSlot = Rc::new(RefCell::new(None));
    let (rt, commits) = recording_runtime();
    rt.mount(Node::component(&counter_def(&slot), Props::new()))
        .unwrap();
    assert_eq!(commits.borrow().len(), 1);

    let h = slot.borrow().clone().unwrap();
    rt.batch(|| {
        h.set(1);
        h.set(2);
        h.set(7);
    });

    assert_eq!(rt.committed().unwrap().texts(), vec!["7".to_string()]);
    // Exactly one cycle for the whole batch.
    assert_eq!(commits.borrow().len(), 2);
}

#[test]
fn updater_form_folds_over_previous_value() {
    let slot: HandleSlot = Rc::new(RefCell::new(None));
    let (rt, commits) = recording_runtime();
    rt.mount(Node::component(&counter_def(&slot), Props::new()))
        .unwrap();

    let h = slot.borrow().clone().unwrap();
    let incr = |prev: &Value, _: &Props| Value::Int(prev.as_int().unwrap_or(0) + 1);
    rt.batch(|| {
        h.set_with(incr);
        h.set_with(incr);
        h.set_with(incr);
    });

    assert_eq!(rt.committed().unwrap().texts(), vec!["3".to_string()]);
    assert_eq!(commits.borrow().len(), 2);
}

#[test]
fn mixed_set_and_updater_apply_in_call_order() {
    let slot: HandleSlot = Rc::new(RefCell::new(None));
    let (rt, _) = recording_runtime();
    rt.mount(Node::component(&counter_def(&slot), Props::new()))
        .unwrap();

    let h = slot.borrow().clone().unwrap();
    rt.batch(|| {
        h.set(5);
        h.set_with(|prev, _| Value::Int(prev.as_int().unwrap_or(0) + 1));
    });

    assert_eq!(rt.committed().unwrap().texts(), vec!["6".to_string()]);
}

#[test]
fn updater_sees_current_props_at_apply_time() {
    let slot: HandleSlot = Rc::new(RefCell::new(None));
    let def = {
        let slot = slot.clone();
        ComponentDef::new("Stepper", move |ctx| {
            let (n, h) = ctx.use_state(|| Value::Int(0));
            *slot.borrow_mut() = Some(h);
            Ok(vec![Node::text(format!("{}", n.as_int().unwrap_or(0)))])
        })
    };
    let (rt, _) = recording_runtime();
    rt.mount(Node::component(&def, Props::new().with("step", 5)))
        .unwrap();

    let h = slot.borrow().clone().unwrap();
    h.set_with(|prev, props| {
        Value::Int(prev.as_int().unwrap_or(0) + props.int("step").unwrap_or(1))
    });

    assert_eq!(rt.committed().unwrap().texts(), vec!["5".to_string()]);
}

#[test]
fn redundant_set_does_not_rerender() {
    let slot: HandleSlot = Rc::new(RefCell::new(None));
    let (rt, commits) = recording_runtime();
    rt.mount(Node::component(&counter_def(&slot), Props::new()))
        .unwrap();

    let h = slot.borrow().clone().unwrap();
    h.set(0);
    assert_eq!(commits.borrow().len(), 1);

    // Round trip inside one batch lands on the starting value: still clean.
    rt.batch(|| {
        h.set(3);
        h.set(0);
    });
    assert_eq!(commits.borrow().len(), 1);
}

#[test]
fn aggregate_merge_keeps_absent_keys() {
    let slot: HandleSlot = Rc::new(RefCell::new(None));
    let def = {
        let slot = slot.clone();
        ComponentDef::new("Profile", move |ctx| {
            let (state, h) = ctx.use_aggregate_state(|| {
                BTreeMap::from([
                    ("a".to_string(), Value::Int(1)),
                    ("b".to_string(), Value::Int(3)),
                ])
            });
            *slot.borrow_mut() = Some(h);
            let m = state.as_map().cloned().unwrap_or_default();
            Ok(vec![Node::text(format!(
                "a={} b={}",
                m.get("a").and_then(Value::as_int).unwrap_or(0),
                m.get("b").and_then(Value::as_int).unwrap_or(0),
            ))])
        })
    };
    let (rt, _) = recording_runtime();
    rt.mount(Node::component(&def, Props::new())).unwrap();
    assert_eq!(rt.committed().unwrap().texts(), vec!["a=1 b=3".to_string()]);

    let h = slot.borrow().clone().unwrap();
    h.merge(BTreeMap::from([("a".to_string(), Value::Int(2))]));
    assert_eq!(rt.committed().unwrap().texts(), vec!["a=2 b=3".to_string()]);
}

#[test]
fn merge_replaces_nested_values_wholesale() {
    let base = Value::Map(BTreeMap::from([(
        "user".to_string(),
        Value::Map(BTreeMap::from([
            ("name".to_string(), Value::from("jane")),
            ("age".to_string(), Value::Int(40)),
        ])),
    )]));
    let patch = BTreeMap::from([(
        "user".to_string(),
        Value::Map(BTreeMap::from([("name".to_string(), Value::from("joe"))])),
    )]);
    let merged = base.merge_shallow(&patch);
    let user = merged.as_map().unwrap().get("user").unwrap();
    // No deep merge: "age" is gone.
    assert_eq!(user.as_map().unwrap().get("age"), None);
}

#[test]
fn dispatch_batches_handler_updates_into_one_cycle() {
    let def = ComponentDef::new("Clicker", |ctx| {
        let (n, h) = ctx.use_state(|| Value::Int(0));
        let n = n.as_int().unwrap_or(0);
        Ok(vec![
            Node::element("button")
                .prop(
                    "on_click",
                    Value::handler(move |_| {
                        for _ in 0..3 {
                            h.set_with(|prev, _| Value::Int(prev.as_int().unwrap_or(0) + 1));
                        }
                    }),
                )
                .child(Node::text(format!("{n}"))),
        ])
    });
    let (rt, commits) = recording_runtime();
    rt.mount(Node::component(&def, Props::new())).unwrap();

    let button = rt.committed().unwrap().find_by_tag("button").unwrap().id;
    assert!(rt.dispatch(button, "on_click", Value::Null));

    assert_eq!(rt.committed().unwrap().texts(), vec!["3".to_string()]);
    assert_eq!(commits.borrow().len(), 2);

    assert!(!rt.dispatch(button, "no_such_event", Value::Null));
}

/// Builds a component with one dep-gated effect and one run-once effect,
/// both journaling into `log`.
fn effect_def(log: &Rc<RefCell<Vec<String>>>, slot: &HandleSlot) -> Rc<ComponentDef> {
    let log = log.clone();
    let slot = slot.clone();
    ComponentDef::new("Effects", move |ctx| {
        let (n, h) = ctx.use_state(|| Value::Int(0));
        *slot.borrow_mut() = Some(h);
        let n = n.as_int().unwrap_or(0);
        ctx.use_effect(deps![n], {
            let log = log.clone();
            move || {
                log.borrow_mut().push(format!("dep-run:{n}"));
                let log = log.clone();
                Ok(Some(Box::new(move || {
                    log.borrow_mut().push(format!("dep-clean:{n}"));
                }) as Cleanup))
            }
        });
        ctx.use_effect(deps!(), {
            let log = log.clone();
            move || {
                log.borrow_mut().push("once-run".to_string());
                let log = log.clone();
                Ok(Some(Box::new(move || {
                    log.borrow_mut().push("once-clean".to_string());
                }) as Cleanup))
            }
        });
        Ok(vec![Node::text(format!("{n}"))])
    })
}

#[test]
fn effect_lifecycle_cleanup_before_rerun_and_reverse_on_unmount() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let slot: HandleSlot = Rc::new(RefCell::new(None));
    let rt = Runtime::new();
    rt.mount(Node::component(&effect_def(&log, &slot), Props::new()))
        .unwrap();
    assert_eq!(*log.borrow(), vec!["dep-run:0", "once-run"]);

    let h = slot.borrow().clone().unwrap();
    h.set(1);
    // Cleanup from pass N strictly before the body of pass N+1; the
    // run-once effect stays quiet.
    assert_eq!(
        *log.borrow(),
        vec!["dep-run:0", "once-run", "dep-clean:0", "dep-run:1"]
    );

    h.set(2);
    h.set(2);
    let runs = log.borrow().iter().filter(|l| *l == "once-run").count();
    assert_eq!(runs, 1);

    rt.unmount();
    let tail: Vec<_> = log.borrow().iter().rev().take(2).cloned().collect();
    // Reverse declaration order at unmount.
    assert_eq!(tail, vec!["dep-clean:2", "once-clean"]);
}

#[test]
fn child_mount_effects_run_before_parents() {
    let log = Rc::new(RefCell::new(Vec::<String>::new()));
    let child = {
        let log = log.clone();
        ComponentDef::new("Child", move |ctx| {
            ctx.use_effect(deps!(), {
                let log = log.clone();
                move || {
                    log.borrow_mut().push("child".to_string());
                    Ok(None)
                }
            });
            Ok(vec![Node::text("child")])
        })
    };
    let parent = {
        let log = log.clone();
        let child = child.clone();
        ComponentDef::new("Parent", move |ctx| {
            ctx.use_effect(deps!(), {
                let log = log.clone();
                move || {
                    log.borrow_mut().push("parent".to_string());
                    Ok(None)
                }
            });
            Ok(vec![Node::component(&child, Props::new())])
        })
    };
    let rt = Runtime::new();
    rt.mount(Node::component(&parent, Props::new())).unwrap();
    assert_eq!(*log.borrow(), vec!["child", "parent"]);
}

#[test]
fn effect_error_does_not_block_other_slots() {
    let log = Rc::new(RefCell::new(Vec::<String>::new()));
    let def = {
        let log = log.clone();
        ComponentDef::new("Flaky", move |ctx| {
            ctx.use_effect(deps!(), || Err(EffectError::new("boom")));
            ctx.use_effect(deps!(), {
                let log = log.clone();
                move || {
                    log.borrow_mut().push("ran".to_string());
                    Ok(None)
                }
            });
            Ok(vec![Node::text("x")])
        })
    };
    let rt = Runtime::new();
    let warnings = warnings_hook(&rt);
    rt.mount(Node::component(&def, Props::new())).unwrap();

    assert_eq!(*log.borrow(), vec!["ran"]);
    assert!(
        warnings
            .borrow()
            .iter()
            .any(|w| w.contains("effect failed"))
    );
}

#[test]
fn update_after_unmount_is_reported_noop() {
    let slot: HandleSlot = Rc::new(RefCell::new(None));
    let rt = Runtime::new();
    let warnings = warnings_hook(&rt);
    rt.mount(Node::component(&counter_def(&slot), Props::new()))
        .unwrap();

    let h = slot.borrow().clone().unwrap();
    rt.unmount();
    h.set(5);

    assert!(
        warnings
            .borrow()
            .iter()
            .any(|w| w.contains("state update after unmount"))
    );
    assert!(rt.committed().is_none());
}

#[test]
fn update_after_runtime_drop_is_a_quiet_noop() {
    let slot: HandleSlot = Rc::new(RefCell::new(None));
    let rt = Runtime::new();
    rt.mount(Node::component(&counter_def(&slot), Props::new()))
        .unwrap();

    let h = slot.borrow().clone().unwrap();
    drop(rt);

    // The handle outlives the runtime; every update form is a no-op.
    h.set(5);
    h.set_with(|prev, _| Value::Int(prev.as_int().unwrap_or(0) + 1));
    h.merge(BTreeMap::new());
}

#[test]
fn shrinking_slot_declarations_warns_and_keeps_prior_slots() {
    let slot: HandleSlot = Rc::new(RefCell::new(None));
    let def = {
        let slot = slot.clone();
        ComponentDef::new("Shrinker", move |ctx| {
            let (n, h) = ctx.use_state(|| Value::Int(0));
            *slot.borrow_mut() = Some(h);
            let n = n.as_int().unwrap_or(0);
            // The extra slots vanish after the first pass.
            if n == 0 {
                let (_, _) = ctx.use_state(|| Value::from("spare"));
                ctx.use_effect(deps!(), || Ok(None));
            }
            Ok(vec![Node::text(format!("{n}"))])
        })
    };
    let rt = Runtime::new();
    let warnings = warnings_hook(&rt);
    rt.mount(Node::component(&def, Props::new())).unwrap();

    let h = slot.borrow().clone().unwrap();
    h.set(1);
    assert!(
        warnings
            .borrow()
            .iter()
            .any(|w| w.contains("declared fewer slots"))
    );
    assert_eq!(rt.committed().unwrap().texts(), vec!["1".to_string()]);

    // Slot 0 did not shift; the handle still lands on the counter.
    h.set(2);
    assert_eq!(rt.committed().unwrap().texts(), vec!["2".to_string()]);
}

#[test]
fn vanished_positions_release_their_committed_ids() {
    let slot: HandleSlot = Rc::new(RefCell::new(None));
    let def = {
        let slot = slot.clone();
        ComponentDef::new("Toggle", move |ctx| {
            let (show, h) = ctx.use_state(|| Value::Bool(true));
            *slot.borrow_mut() = Some(h);
            let mut nodes = vec![Node::text("head")];
            if show.as_bool().unwrap_or(false) {
                nodes.push(Node::element("panel"));
            }
            Ok(nodes)
        })
    };
    let (rt, _) = recording_runtime();
    rt.mount(Node::component(&def, Props::new())).unwrap();

    let head_id = rt.committed().unwrap().children[0].id;
    let first = rt.committed().unwrap().find_by_tag("panel").unwrap().id;

    let h = slot.borrow().clone().unwrap();
    h.set(false);
    assert!(rt.committed().unwrap().find_by_tag("panel").is_none());

    h.set(true);
    let second = rt.committed().unwrap().find_by_tag("panel").unwrap().id;
    // The position was dropped in between, so it comes back under a new id;
    // the surviving position keeps its id throughout.
    assert_ne!(first, second);
    assert_eq!(rt.committed().unwrap().children[0].id, head_id);
}

#[test]
fn keyed_children_keep_slots_across_reorder() {
    let handles: Rc<RefCell<HashMap<String, StateHandle>>> =
        Rc::new(RefCell::new(HashMap::new()));
    let mounts = Rc::new(RefCell::new(Vec::<String>::new()));

    let item = {
        let handles = handles.clone();
        let mounts = mounts.clone();
        ComponentDef::new("Item", move |ctx| {
            let label = ctx.props().str("label").unwrap_or("?").to_string();
            let (v, h) = ctx.use_state(|| Value::Int(0));
            handles.borrow_mut().insert(label.clone(), h);
            ctx.use_effect(deps!(), {
                let mounts = mounts.clone();
                let label = label.clone();
                move || {
                    mounts.borrow_mut().push(label.clone());
                    Ok(None)
                }
            });
            Ok(vec![Node::text(format!(
                "{label}:{}",
                v.as_int().unwrap_or(0)
            ))])
        })
    };
    let rev_slot: HandleSlot = Rc::new(RefCell::new(None));
    let list = {
        let item = item.clone();
        let rev_slot = rev_slot.clone();
        ComponentDef::new("List", move |ctx| {
            let (rev, h) = ctx.use_state(|| Value::Bool(false));
            *rev_slot.borrow_mut() = Some(h);
            let mut labels = vec!["A", "B"];
            if rev.as_bool().unwrap_or(false) {
                labels.reverse();
            }
            Ok(labels
                .into_iter()
                .map(|l| {
                    Node::component(&item, Props::new().with("label", l)).keyed(l)
                })
                .collect())
        })
    };

    let rt = Runtime::new();
    rt.mount(Node::component(&list, Props::new())).unwrap();
    assert_eq!(
        rt.committed().unwrap().texts(),
        vec!["A:0".to_string(), "B:0".to_string()]
    );

    let h = handles.borrow().get("A").unwrap().clone();
    h.set(99);
    assert_eq!(
        rt.committed().unwrap().texts(),
        vec!["A:99".to_string(), "B:0".to_string()]
    );

    let h = rev_slot.borrow().clone().unwrap();
    h.set(true);
    // Reordered, state moved with the key, nothing remounted.
    assert_eq!(
        rt.committed().unwrap().texts(),
        vec!["B:0".to_string(), "A:99".to_string()]
    );
    assert_eq!(*mounts.borrow(), vec!["A".to_string(), "B".to_string()]);
}

#[test]
fn type_change_at_position_remounts() {
    let log = Rc::new(RefCell::new(Vec::<String>::new()));
    let first = {
        let log = log.clone();
        ComponentDef::new("First", move |ctx| {
            ctx.use_effect(deps!(), {
                let log = log.clone();
                move || {
                    log.borrow_mut().push("first-mount".to_string());
                    let log = log.clone();
                    Ok(Some(Box::new(move || {
                        log.borrow_mut().push("first-clean".to_string());
                    }) as Cleanup))
                }
            });
            Ok(vec![Node::text("first")])
        })
    };
    let second = ComponentDef::new("Second", |_| Ok(vec![Node::text("second")]));

    let slot: HandleSlot = Rc::new(RefCell::new(None));
    let parent = {
        let first = first.clone();
        let second = second.clone();
        let slot = slot.clone();
        ComponentDef::new("Parent", move |ctx| {
            let (use_second, h) = ctx.use_state(|| Value::Bool(false));
            *slot.borrow_mut() = Some(h);
            let def = if use_second.as_bool().unwrap_or(false) {
                &second
            } else {
                &first
            };
            Ok(vec![Node::component(def, Props::new())])
        })
    };

    let rt = Runtime::new();
    rt.mount(Node::component(&parent, Props::new())).unwrap();
    assert_eq!(rt.committed().unwrap().texts(), vec!["first".to_string()]);

    let h = slot.borrow().clone().unwrap();
    h.set(true);
    assert_eq!(rt.committed().unwrap().texts(), vec!["second".to_string()]);
    // The dropped child cleaned up before the pass committed.
    assert_eq!(
        *log.borrow(),
        vec!["first-mount".to_string(), "first-clean".to_string()]
    );
}

#[test]
fn props_gate_child_rerenders() {
    let child_renders = Rc::new(RefCell::new(0u32));
    let child = {
        let child_renders = child_renders.clone();
        ComponentDef::new("Label", move |ctx| {
            *child_renders.borrow_mut() += 1;
            Ok(vec![Node::text(
                ctx.props().str("text").unwrap_or("").to_string(),
            )])
        })
    };
    let slot: HandleSlot = Rc::new(RefCell::new(None));
    let parent = {
        let child = child.clone();
        let slot = slot.clone();
        ComponentDef::new("Parent", move |ctx| {
            let (n, h) = ctx.use_state(|| Value::Int(0));
            *slot.borrow_mut() = Some(h);
            let n = n.as_int().unwrap_or(0);
            // Child props only change every second update.
            let text = format!("{}", n / 2);
            Ok(vec![
                Node::text(format!("n={n}")),
                Node::component(&child, Props::new().with("text", text)),
            ])
        })
    };

    let rt = Runtime::new();
    rt.mount(Node::component(&parent, Props::new())).unwrap();
    assert_eq!(*child_renders.borrow(), 1);

    let h = slot.borrow().clone().unwrap();
    h.set(1); // text stays "0"
    assert_eq!(*child_renders.borrow(), 1);
    h.set(2); // text becomes "1"
    assert_eq!(*child_renders.borrow(), 2);
}

#[test]
fn rerender_with_same_inputs_is_idempotent() {
    let slot: HandleSlot = Rc::new(RefCell::new(None));
    let def = {
        let slot = slot.clone();
        ComponentDef::new("Pure", move |ctx| {
            // Two slots; output depends only on the second.
            let (_, ha) = ctx.use_state(|| Value::Int(0));
            let (b, _) = ctx.use_state(|| Value::from("stable"));
            *slot.borrow_mut() = Some(ha);
            Ok(vec![
                Node::element("section")
                    .prop("title", b.as_str().unwrap_or("").to_string())
                    .child(Node::text(b.as_str().unwrap_or("").to_string())),
            ])
        })
    };
    let (rt, commits) = recording_runtime();
    rt.mount(Node::component(&def, Props::new())).unwrap();

    // Dirty the instance via the output-irrelevant slot.
    let h = slot.borrow().clone().unwrap();
    h.set(1);

    let commits = commits.borrow();
    assert_eq!(commits.len(), 2);
    assert_eq!(commits[0], commits[1]);
}

#[test]
fn handle_ref_attaches_on_commit_and_detaches_on_unmount() {
    let ref_slot: Rc<RefCell<Option<NodeRef>>> = Rc::new(RefCell::new(None));
    let def = {
        let ref_slot = ref_slot.clone();
        ComponentDef::new("Focusable", move |ctx| {
            let r = ctx.use_ref(|| Value::Null);
            *ref_slot.borrow_mut() = Some(r.clone());
            Ok(vec![
                Node::element("input").node_ref(RefBinding::handle(&r)),
            ])
        })
    };
    let rt = Runtime::new();
    rt.mount(Node::component(&def, Props::new())).unwrap();

    let input_id = rt.committed().unwrap().find_by_tag("input").unwrap().id;
    let r = ref_slot.borrow().clone().unwrap();
    assert_eq!(r.get(), Value::from(input_id));

    rt.unmount();
    assert_eq!(r.get(), Value::Null);
}

#[test]
fn imperative_ref_survives_rerenders() {
    let slot: HandleSlot = Rc::new(RefCell::new(None));
    let seen = Rc::new(RefCell::new(Vec::<Value>::new()));
    let def = {
        let slot = slot.clone();
        let seen = seen.clone();
        ComponentDef::new("Imperative", move |ctx| {
            let (n, h) = ctx.use_state(|| Value::Int(0));
            *slot.borrow_mut() = Some(h);
            let r = ctx.use_ref(|| Value::Int(7));
            seen.borrow_mut().push(r.get());
            if n.as_int() == Some(1) {
                r.set(Value::Int(42));
            }
            Ok(vec![Node::text(format!("{}", n.as_int().unwrap_or(0)))])
        })
    };
    let rt = Runtime::new();
    rt.mount(Node::component(&def, Props::new())).unwrap();

    let h = slot.borrow().clone().unwrap();
    h.set(1); // render writes 42 into the ref
    h.set(2);

    assert_eq!(
        *seen.borrow(),
        vec![Value::Int(7), Value::Int(7), Value::Int(42)]
    );
}

#[test]
fn callback_ref_identity_change_detaches_and_warns() {
    let events = Rc::new(RefCell::new(Vec::<Value>::new()));
    let slot: HandleSlot = Rc::new(RefCell::new(None));
    let def = {
        let events = events.clone();
        let slot = slot.clone();
        ComponentDef::new("CbRef", move |ctx| {
            let (n, h) = ctx.use_state(|| Value::Int(0));
            *slot.borrow_mut() = Some(h);
            let events = events.clone();
            // Fresh closure every pass: the documented churn case.
            let binding = RefBinding::callback(move |v| events.borrow_mut().push(v));
            Ok(vec![
                Node::element("canvas").node_ref(binding),
                Node::text(format!("{}", n.as_int().unwrap_or(0))),
            ])
        })
    };
    let rt = Runtime::new();
    let warnings = warnings_hook(&rt);
    rt.mount(Node::component(&def, Props::new())).unwrap();

    let canvas_id = rt.committed().unwrap().find_by_tag("canvas").unwrap().id;
    assert_eq!(*events.borrow(), vec![Value::from(canvas_id)]);

    let h = slot.borrow().clone().unwrap();
    h.set(1);
    // Detach with Null, then reattach with the live target.
    assert_eq!(
        *events.borrow(),
        vec![
            Value::from(canvas_id),
            Value::Null,
            Value::from(canvas_id)
        ]
    );
    assert!(
        warnings
            .borrow()
            .iter()
            .any(|w| w.contains("callback ref identity changed"))
    );
}

fn exploding_child(log: &Rc<RefCell<Vec<String>>>) -> Rc<ComponentDef> {
    let log = log.clone();
    ComponentDef::new("Exploder", move |ctx| {
        ctx.use_effect(deps!(), {
            let log = log.clone();
            move || {
                let log = log.clone();
                Ok(Some(Box::new(move || {
                    log.borrow_mut().push("exploder-clean".to_string());
                }) as Cleanup))
            }
        });
        if ctx.props().bool("explode").unwrap_or(false) {
            return Err(RenderError::new("boom"));
        }
        Ok(vec![Node::text("calm")])
    })
}

#[test]
fn error_boundary_renders_fallback() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let child = exploding_child(&log);
    let slot: HandleSlot = Rc::new(RefCell::new(None));
    let boundary = {
        let child = child.clone();
        let slot = slot.clone();
        ComponentDef::with_boundary(
            "Guard",
            move |ctx| {
                let (explode, h) = ctx.use_state(|| Value::Bool(false));
                *slot.borrow_mut() = Some(h);
                Ok(vec![Node::component(
                    &child,
                    Props::new().with("explode", explode.as_bool().unwrap_or(false)),
                )])
            },
            |err| vec![Node::text(format!("fallback: {}", err.message))],
        )
    };

    let rt = Runtime::new();
    rt.mount(Node::component(&boundary, Props::new())).unwrap();
    assert_eq!(rt.committed().unwrap().texts(), vec!["calm".to_string()]);

    let h = slot.borrow().clone().unwrap();
    h.set(true);
    assert_eq!(
        rt.committed().unwrap().texts(),
        vec!["fallback: boom".to_string()]
    );
    // The failed child was torn down, cleanups included.
    assert_eq!(*log.borrow(), vec!["exploder-clean".to_string()]);
}

#[test]
fn unhandled_render_error_keeps_previous_tree_and_unmounts_subtree() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let child = exploding_child(&log);
    let slot: HandleSlot = Rc::new(RefCell::new(None));
    let parent = {
        let child = child.clone();
        let slot = slot.clone();
        ComponentDef::new("Plain", move |ctx| {
            let (explode, h) = ctx.use_state(|| Value::Bool(false));
            *slot.borrow_mut() = Some(h);
            Ok(vec![
                Node::text("sibling"),
                Node::component(
                    &child,
                    Props::new().with("explode", explode.as_bool().unwrap_or(false)),
                ),
            ])
        })
    };

    let (rt, commits) = recording_runtime();
    let warnings = warnings_hook(&rt);
    rt.mount(Node::component(&parent, Props::new())).unwrap();
    assert_eq!(commits.borrow().len(), 1);

    let h = slot.borrow().clone().unwrap();
    h.set(true);

    // No commit for the aborted pass; last good tree still stands.
    assert_eq!(commits.borrow().len(), 1);
    assert_eq!(
        rt.committed().unwrap().texts(),
        vec!["sibling".to_string(), "calm".to_string()]
    );
    assert_eq!(*log.borrow(), vec!["exploder-clean".to_string()]);
    assert!(
        warnings
            .borrow()
            .iter()
            .any(|w| w.contains("unhandled render error"))
    );
}

#[test]
fn runaway_effect_loop_hits_pass_limit() {
    let slot: HandleSlot = Rc::new(RefCell::new(None));
    let def = {
        let slot = slot.clone();
        ComponentDef::new("Runaway", move |ctx| {
            let (n, h) = ctx.use_state(|| Value::Int(0));
            *slot.borrow_mut() = Some(h.clone());
            let n = n.as_int().unwrap_or(0);
            ctx.use_effect(Deps::Always, {
                let h = h.clone();
                move || {
                    h.set_with(|prev, _| Value::Int(prev.as_int().unwrap_or(0) + 1));
                    Ok(None)
                }
            });
            Ok(vec![Node::text(format!("{n}"))])
        })
    };
    let rt = Runtime::new();
    let warnings = warnings_hook(&rt);
    rt.mount(Node::component(&def, Props::new())).unwrap();

    assert!(
        warnings
            .borrow()
            .iter()
            .any(|w| w.contains("render pass limit"))
    );
}

#[test]
fn deps_comparison_rules() {
    let a = Deps::list([Value::Int(1), Value::from("x")]);
    let same = Deps::list([Value::Int(1), Value::from("x")]);
    let diff = Deps::list([Value::Int(2), Value::from("x")]);

    assert!(a.changed_from(None));
    assert!(!same.changed_from(Some(&a)));
    assert!(diff.changed_from(Some(&a)));
    assert!(Deps::Always.changed_from(Some(&Deps::Always)));
    assert!(!Deps::Once.changed_from(Some(&Deps::Once)));
    assert!(Deps::list([Value::Int(1)]).changed_from(Some(&Deps::list([]))));
}
