use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use crate::runtime::{self, Ctx, Inner, InstanceId};
use crate::value::{Props, Value};

pub(crate) struct StateSlot {
    pub value: Value,
}

/// A queued state mutation. Applied at flush time, in call order, against a
/// monotonically advancing previous value — not at the moment the handle
/// method was called.
pub(crate) enum StateUpdate {
    /// Replace the slot wholesale. Within one batch the last `Set` wins.
    Set(Value),
    /// Fold over the previous value and the instance's current props.
    With(Rc<dyn Fn(&Value, &Props) -> Value>),
    /// Shallow-merge into an aggregate (map) slot.
    Merge(BTreeMap<String, Value>),
}

pub(crate) struct Pending {
    pub owner: InstanceId,
    pub slot: usize,
    pub update: StateUpdate,
}

/// Update entry point for one state slot.
///
/// Cloneable into event handlers and effects. Calling it after the owning
/// instance has unmounted is a reported no-op.
#[derive(Clone)]
pub struct StateHandle {
    pub(crate) rt: Weak<RefCell<Inner>>,
    pub(crate) owner: InstanceId,
    pub(crate) slot: usize,
}

impl StateHandle {
    pub fn set(&self, value: impl Into<Value>) {
        self.enqueue(StateUpdate::Set(value.into()));
    }

    pub fn set_with(&self, f: impl Fn(&Value, &Props) -> Value + 'static) {
        self.enqueue(StateUpdate::With(Rc::new(f)));
    }

    /// Aggregate-state update: merges only the top-level keys present in
    /// `patch`; absent keys keep their previous values.
    pub fn merge(&self, patch: BTreeMap<String, Value>) {
        self.enqueue(StateUpdate::Merge(patch));
    }

    fn enqueue(&self, update: StateUpdate) {
        let Some(rt) = self.rt.upgrade() else {
            log::warn!("state update after runtime teardown; ignored");
            return;
        };

        let flush_now = {
            let mut inner = rt.borrow_mut();
            let alive = inner
                .arena
                .get(self.owner)
                .is_some_and(|inst| inst.mounted);
            if !alive {
                runtime::note(&mut inner, "state update after unmount; ignored".to_string());
                false
            } else {
                inner.pending.push(Pending {
                    owner: self.owner,
                    slot: self.slot,
                    update,
                });
                inner.batch_depth == 0 && !inner.in_flush
            }
        };

        if flush_now {
            runtime::flush(&rt);
        } else {
            runtime::drain_warnings_if_idle(&rt);
        }
    }
}

impl Ctx {
    /// Positional state slot. Returns the current value and its update
    /// handle. Slot order must be stable across renders of this instance.
    pub fn use_state(&mut self, init: impl FnOnce() -> Value) -> (Value, StateHandle) {
        let idx = self.state_cursor;
        self.state_cursor += 1;

        let handle = StateHandle {
            rt: self.rt.clone(),
            owner: self.id,
            slot: idx,
        };

        let Some(rt) = self.rt.upgrade() else {
            return (init(), handle);
        };

        let existing = rt
            .borrow()
            .arena
            .get(self.id)
            .and_then(|inst| inst.state.get(idx).map(|s| s.value.clone()));

        let value = match existing {
            Some(v) => v,
            None => {
                // init may read other state; keep the runtime unborrowed.
                let v = init();
                if let Some(inst) = rt.borrow_mut().arena.get_mut(self.id) {
                    inst.state.push(StateSlot { value: v.clone() });
                }
                v
            }
        };

        (value, handle)
    }

    /// One composite map slot per instance, for components that keep a
    /// single aggregate value instead of many slots. Use the handle's
    /// `merge` for partial updates.
    pub fn use_aggregate_state(
        &mut self,
        init: impl FnOnce() -> BTreeMap<String, Value>,
    ) -> (Value, StateHandle) {
        self.use_state(|| Value::Map(init()))
    }
}
