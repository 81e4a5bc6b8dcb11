use std::rc::Rc;

use smallvec::SmallVec;

use crate::error::EffectError;
use crate::runtime::Ctx;
use crate::value::Value;

/// Cleanup returned by an effect body; runs before the body re-runs and on
/// unmount. The sole cancellation mechanism for work the body started.
pub type Cleanup = Box<dyn FnOnce()>;

pub type EffectBody = Rc<dyn Fn() -> Result<Option<Cleanup>, EffectError>>;

pub type DepList = SmallVec<[Value; 4]>;

/// Dependency list an effect is compared against to decide whether to
/// re-run after a commit.
#[derive(Clone, Debug, PartialEq)]
pub enum Deps {
    /// No list given: re-run after every pass.
    Always,
    /// Empty list: run at mount only.
    Once,
    /// Re-run when any positional element differs from the previous pass.
    List(DepList),
}

impl Deps {
    pub fn list(values: impl IntoIterator<Item = Value>) -> Deps {
        Deps::List(values.into_iter().collect())
    }

    pub(crate) fn changed_from(&self, last: Option<&Deps>) -> bool {
        let Some(last) = last else {
            // First mount always runs.
            return true;
        };
        match (self, last) {
            (Deps::Always, _) => true,
            (Deps::Once, Deps::Once) => false,
            (Deps::List(new), Deps::List(old)) => new.len() != old.len() || new != old,
            // Shape changed between passes; treat as changed.
            _ => true,
        }
    }
}

/// Builds a `Deps` list from anything `Value: From`. `deps!()` is the
/// run-once (empty) list.
#[macro_export]
macro_rules! deps {
    () => {
        $crate::Deps::Once
    };
    ($($v:expr),+ $(,)?) => {
        $crate::Deps::List($crate::DepList::from_vec(vec![$($crate::Value::from($v)),+]))
    };
}

pub(crate) struct EffectSlot {
    /// `None` until the body has run at least once.
    pub last: Option<Deps>,
    /// Declaration from the current render pass, consumed at flush.
    pub declared: Option<(Deps, EffectBody)>,
    pub cleanup: Option<Cleanup>,
    pub due: bool,
}

impl EffectSlot {
    pub fn new() -> Self {
        Self {
            last: None,
            declared: None,
            cleanup: None,
            due: false,
        }
    }
}

impl Ctx {
    /// Positional effect slot. The body is queued and flushed after the
    /// current pass commits — never synchronously inside render — and only
    /// when `deps` differ from the previous pass.
    pub fn use_effect(
        &mut self,
        deps: Deps,
        body: impl Fn() -> Result<Option<Cleanup>, EffectError> + 'static,
    ) {
        let idx = self.effect_cursor;
        self.effect_cursor += 1;

        let Some(rt) = self.rt.upgrade() else {
            return;
        };

        let mut inner = rt.borrow_mut();
        let Some(inst) = inner.arena.get_mut(self.id) else {
            return;
        };
        if idx >= inst.effects.len() {
            inst.effects.push(EffectSlot::new());
        }
        let slot = &mut inst.effects[idx];
        let due = deps.changed_from(slot.last.as_ref());
        slot.declared = Some((deps, Rc::new(body)));
        // An effect already due from an aborted pass stays due.
        slot.due = slot.due || due;
    }
}
