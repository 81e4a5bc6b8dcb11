use std::cell::RefCell;
use std::rc::Rc;

use crate::runtime::Ctx;
use crate::value::{Handler, Value};

/// Mutable, render-independent handle.
///
/// `current` is mutated by the reconciler when it commits a tree position
/// (attach/detach), or manually by an instance's own code for imperative
/// handles. Render logic never writes it directly.
///
/// A `NodeRef` can travel down through props (`Value::Ref`) across any
/// number of forwarding hops; the registry does not care how it got to the
/// element that finally binds it.
#[derive(Clone)]
pub struct NodeRef {
    inner: Rc<RefCell<Value>>,
}

impl NodeRef {
    pub fn new(initial: Value) -> Self {
        Self {
            inner: Rc::new(RefCell::new(initial)),
        }
    }

    /// Current target, `Value::Null` while detached.
    pub fn get(&self) -> Value {
        self.inner.borrow().clone()
    }

    pub fn set(&self, v: Value) {
        *self.inner.borrow_mut() = v;
    }

    pub fn same(&self, other: &NodeRef) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl std::fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NodeRef({:?})", self.inner.borrow())
    }
}

/// How an element node exposes its committed target.
///
/// Callback bindings are invoked with the live target id on attach and with
/// `Value::Null` on detach. If the callback identity changes between passes
/// the old one is detached and the new one attached; keep the handler
/// identity stable to avoid the churn. The runtime fires its warning hook
/// when it sees that happen rather than silently memoizing.
#[derive(Clone)]
pub enum RefBinding {
    Handle(NodeRef),
    Callback(Handler),
}

impl RefBinding {
    pub fn handle(r: &NodeRef) -> Self {
        RefBinding::Handle(r.clone())
    }

    pub fn callback(f: impl Fn(Value) + 'static) -> Self {
        RefBinding::Callback(Handler::new(f))
    }

    pub(crate) fn same_identity(&self, other: &RefBinding) -> bool {
        match (self, other) {
            (RefBinding::Handle(a), RefBinding::Handle(b)) => a.same(b),
            (RefBinding::Callback(a), RefBinding::Callback(b)) => a.same(b),
            _ => false,
        }
    }

    pub(crate) fn attach(&self, target: Value) {
        match self {
            RefBinding::Handle(h) => h.set(target),
            RefBinding::Callback(cb) => cb.call(target),
        }
    }

    pub(crate) fn detach(&self) {
        self.attach(Value::Null);
    }
}

impl std::fmt::Debug for RefBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefBinding::Handle(_) => write!(f, "RefBinding::Handle"),
            RefBinding::Callback(_) => write!(f, "RefBinding::Callback"),
        }
    }
}

impl Ctx {
    /// Positional ref slot; the same handle comes back on every render of
    /// this instance.
    pub fn use_ref(&mut self, init: impl FnOnce() -> Value) -> NodeRef {
        let idx = self.ref_cursor;
        self.ref_cursor += 1;

        let Some(rt) = self.rt.upgrade() else {
            return NodeRef::new(init());
        };

        let existing = rt
            .borrow()
            .arena
            .get(self.id)
            .and_then(|inst| inst.refs.get(idx).cloned());
        if let Some(r) = existing {
            return r;
        }

        let r = NodeRef::new(init());
        if let Some(inst) = rt.borrow_mut().arena.get_mut(self.id) {
            inst.refs.push(r.clone());
        }
        r
    }
}
