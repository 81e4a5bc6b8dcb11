use std::cell::RefCell;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};

use crate::Location;

/// What a navigation call is about to do, as seen by blockers and listeners.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryAction {
    Push,
    Replace,
    Go,
}

/// Returns true to allow the transition.
type BlockFn = Rc<dyn Fn(&Location, HistoryAction) -> bool>;
type ListenFn = Rc<dyn Fn(&Location, HistoryAction)>;

struct HistoryInner {
    entries: Vec<Location>,
    cursor: usize,
    blockers: Vec<(u64, BlockFn)>,
    listeners: Vec<(u64, ListenFn)>,
    next_id: u64,
}

/// Process-scoped navigation context: an entry stack with a cursor.
///
/// Passed explicitly to whoever needs it — there is no ambient global
/// location. `push` truncates any forward entries, `replace` overwrites in
/// place, `go` moves the cursor within bounds. Every transition is offered
/// to registered blockers first; a veto leaves the cursor untouched and is
/// not an error.
#[derive(Clone)]
pub struct History {
    inner: Rc<RefCell<HistoryInner>>,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    entries: Vec<Location>,
    cursor: usize,
}

impl History {
    pub fn new() -> Self {
        Self::with_initial(Location::new("/"))
    }

    pub fn with_initial(start: Location) -> Self {
        Self {
            inner: Rc::new(RefCell::new(HistoryInner {
                entries: vec![start],
                cursor: 0,
                blockers: Vec::new(),
                listeners: Vec::new(),
                next_id: 1,
            })),
        }
    }

    pub fn location(&self) -> Location {
        let inner = self.inner.borrow();
        inner.entries[inner.cursor].clone()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().entries.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.inner.borrow().cursor
    }

    pub fn can_go(&self, delta: i64) -> bool {
        let inner = self.inner.borrow();
        let target = inner.cursor as i64 + delta;
        target >= 0 && (target as usize) < inner.entries.len()
    }

    /// Appends `to` after the cursor, discarding any forward entries.
    /// Returns false when a blocker vetoed the transition.
    pub fn push(&self, to: Location) -> bool {
        if !self.allowed(&to, HistoryAction::Push) {
            log::debug!("navigation to {:?} blocked", to.pathname);
            return false;
        }
        {
            let mut inner = self.inner.borrow_mut();
            let at = inner.cursor + 1;
            inner.entries.truncate(at);
            inner.entries.push(to.clone());
            inner.cursor = at;
        }
        self.notify(&to, HistoryAction::Push);
        true
    }

    /// Overwrites the entry at the cursor. Returns false when blocked.
    pub fn replace(&self, to: Location) -> bool {
        if !self.allowed(&to, HistoryAction::Replace) {
            log::debug!("navigation to {:?} blocked", to.pathname);
            return false;
        }
        {
            let mut inner = self.inner.borrow_mut();
            let at = inner.cursor;
            inner.entries[at] = to.clone();
        }
        self.notify(&to, HistoryAction::Replace);
        true
    }

    /// Moves the cursor by `delta`, clamped to the stack bounds. A move that
    /// resolves to the current entry is a no-op and returns false.
    pub fn go(&self, delta: i64) -> bool {
        let (target, pending) = {
            let inner = self.inner.borrow();
            let last = inner.entries.len() as i64 - 1;
            let target = (inner.cursor as i64 + delta).clamp(0, last) as usize;
            if target == inner.cursor {
                return false;
            }
            (target, inner.entries[target].clone())
        };
        if !self.allowed(&pending, HistoryAction::Go) {
            log::debug!("navigation to {:?} blocked", pending.pathname);
            return false;
        }
        self.inner.borrow_mut().cursor = target;
        self.notify(&pending, HistoryAction::Go);
        true
    }

    pub fn back(&self) -> bool {
        self.go(-1)
    }

    pub fn forward(&self) -> bool {
        self.go(1)
    }

    /// Registers a transition predicate. The predicate sees the pending
    /// location and the attempted action, and returns true to allow it.
    /// Dropping the returned guard unblocks.
    pub fn block(&self, pred: impl Fn(&Location, HistoryAction) -> bool + 'static) -> Blocker {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.blockers.push((id, Rc::new(pred)));
        Blocker {
            inner: Rc::downgrade(&self.inner),
            id,
        }
    }

    /// Registers a change listener, called after every completed transition.
    /// Dropping the returned guard unsubscribes.
    pub fn listen(&self, f: impl Fn(&Location, HistoryAction) + 'static) -> Subscription {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.push((id, Rc::new(f)));
        Subscription {
            inner: Rc::downgrade(&self.inner),
            id,
        }
    }

    /// Serializes the entry stack and cursor.
    pub fn snapshot(&self) -> String {
        let inner = self.inner.borrow();
        let snap = Snapshot {
            entries: inner.entries.clone(),
            cursor: inner.cursor,
        };
        serde_json::to_string(&snap).unwrap_or_else(|_| "{}".into())
    }

    /// Restores a stack produced by `snapshot`. Returns false (leaving the
    /// stack untouched) on malformed input or an empty entry list.
    pub fn restore(&self, json: &str) -> bool {
        let Ok(snap) = serde_json::from_str::<Snapshot>(json) else {
            log::warn!("history restore failed: malformed snapshot");
            return false;
        };
        if snap.entries.is_empty() {
            log::warn!("history restore failed: empty entry list");
            return false;
        }
        let current = {
            let mut inner = self.inner.borrow_mut();
            inner.cursor = snap.cursor.min(snap.entries.len() - 1);
            inner.entries = snap.entries;
            inner.entries[inner.cursor].clone()
        };
        self.notify(&current, HistoryAction::Go);
        true
    }

    fn allowed(&self, pending: &Location, action: HistoryAction) -> bool {
        // Predicates run with the stack unborrowed; they may read it.
        let blockers: Vec<BlockFn> = self
            .inner
            .borrow()
            .blockers
            .iter()
            .map(|(_, f)| f.clone())
            .collect();
        blockers.iter().all(|pred| pred(pending, action))
    }

    fn notify(&self, current: &Location, action: HistoryAction) {
        let listeners: Vec<ListenFn> = self
            .inner
            .borrow()
            .listeners
            .iter()
            .map(|(_, f)| f.clone())
            .collect();
        for f in listeners {
            f(current, action);
        }
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for History {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("History")
            .field("entries", &inner.entries)
            .field("cursor", &inner.cursor)
            .finish()
    }
}

/// Guard returned by [`History::block`]; dropping it removes the predicate.
pub struct Blocker {
    inner: Weak<RefCell<HistoryInner>>,
    id: u64,
}

impl Drop for Blocker {
    fn drop(&mut self) {
        if let Some(rc) = self.inner.upgrade() {
            rc.borrow_mut().blockers.retain(|(id, _)| *id != self.id);
        }
    }
}

/// Guard returned by [`History::listen`]; dropping it unsubscribes.
pub struct Subscription {
    inner: Weak<RefCell<HistoryInner>>,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(rc) = self.inner.upgrade() {
            rc.borrow_mut().listeners.retain(|(id, _)| *id != self.id);
        }
    }
}
