use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

use slotmap::{SlotMap, new_key_type};

use crate::component::ComponentDef;
use crate::effects::{Cleanup, EffectSlot};
use crate::error::{RenderError, RuntimeError};
use crate::node::{CommittedKind, CommittedNode, Node, NodeId};
use crate::refs::{NodeRef, RefBinding};
use crate::state::{Pending, StateSlot, StateUpdate};
use crate::value::{Handler, Props, Value};

new_key_type! {
    /// Arena key of one component instance.
    pub struct InstanceId;
}

/// Flush passes allowed before the runtime assumes an update loop.
const MAX_PASSES: u32 = 64;

/// Receives the committed tree once per commit. The runtime never touches a
/// display surface itself; producing the visible artifact is entirely the
/// renderer's job.
pub trait Renderer {
    fn commit(&mut self, root: &CommittedNode);
}

/// Discards every commit. Default when no renderer is installed.
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn commit(&mut self, _root: &CommittedNode) {}
}

pub(crate) struct Instance {
    pub def: Rc<ComponentDef>,
    pub props: Props,
    pub key: Option<String>,
    pub parent: Option<InstanceId>,
    pub state: Vec<StateSlot>,
    pub effects: Vec<EffectSlot>,
    pub refs: Vec<NodeRef>,
    /// Node forest from the most recent render of this instance.
    pub rendered: Vec<Node>,
    /// Child instances, aligned with the component nodes of `rendered` in
    /// traversal order. A slot goes `None` when its subtree was torn down by
    /// an error without a parent re-render.
    pub children: Vec<Option<InstanceId>>,
    /// Committed ids per element path within this instance. An id is
    /// allocated when its position first commits and dropped when the
    /// position vanishes, so long-lived instances with churning child
    /// shapes do not accumulate stale paths.
    pub element_ids: HashMap<String, NodeId>,
    /// Ref bindings currently attached, per element path.
    pub attached: HashMap<String, (RefBinding, NodeId)>,
    pub dirty: bool,
    pub mounted: bool,
}

pub(crate) struct Inner {
    pub arena: SlotMap<InstanceId, Instance>,
    pub root: Option<InstanceId>,
    pub pending: Vec<Pending>,
    pub batch_depth: u32,
    pub in_flush: bool,
    pub committed: Option<CommittedNode>,
    pub handlers: HashMap<(NodeId, String), Handler>,
    pub renderer: Box<dyn Renderer>,
    pub warn_hook: Option<Rc<dyn Fn(&str)>>,
    pub warnings: Vec<String>,
    pub next_node_id: NodeId,
}

/// Per-render view of one instance, handed to the component's render
/// function. Slot declarations (`use_state`, `use_effect`, `use_ref`) go
/// through it and must keep a stable order across renders.
pub struct Ctx {
    pub(crate) rt: Weak<RefCell<Inner>>,
    pub(crate) id: InstanceId,
    pub(crate) state_cursor: usize,
    pub(crate) effect_cursor: usize,
    pub(crate) ref_cursor: usize,
}

impl Ctx {
    pub(crate) fn new(rt: &Rc<RefCell<Inner>>, id: InstanceId) -> Self {
        Ctx {
            rt: Rc::downgrade(rt),
            id,
            state_cursor: 0,
            effect_cursor: 0,
            ref_cursor: 0,
        }
    }

    /// Props supplied by the parent for this pass.
    pub fn props(&self) -> Props {
        self.rt
            .upgrade()
            .and_then(|rt| rt.borrow().arena.get(self.id).map(|i| i.props.clone()))
            .unwrap_or_default()
    }
}

/// The instance tree plus everything needed to turn state changes into
/// commits: pending update queue, effect flush queue, committed tree,
/// handler table, renderer.
///
/// Single-threaded and cooperative: render passes, commits, and effect
/// flushes never overlap.
pub struct Runtime {
    inner: Rc<RefCell<Inner>>,
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_renderer(Box::new(NullRenderer))
    }

    pub fn with_renderer(renderer: Box<dyn Renderer>) -> Self {
        Runtime {
            inner: Rc::new(RefCell::new(Inner {
                arena: SlotMap::with_key(),
                root: None,
                pending: Vec::new(),
                batch_depth: 0,
                in_flush: false,
                committed: None,
                handlers: HashMap::new(),
                renderer,
                warn_hook: None,
                warnings: Vec::new(),
                next_node_id: 1,
            })),
        }
    }

    pub fn set_renderer(&self, renderer: Box<dyn Renderer>) {
        self.inner.borrow_mut().renderer = renderer;
    }

    /// Diagnostics collaborator. Receives every reported recoverable
    /// problem (update-after-unmount, callback-ref churn, render/effect
    /// failures) after they have been logged.
    pub fn set_warning_hook(&self, f: impl Fn(&str) + 'static) {
        self.inner.borrow_mut().warn_hook = Some(Rc::new(f));
    }

    /// Mounts `root` as the tree, replacing any previous one. Errors out
    /// only when the initial render fails with no boundary to catch it.
    pub fn mount(&self, root: Node) -> Result<(), RenderError> {
        self.unmount();
        let def = ComponentDef::new("#root", move |_ctx| Ok(vec![root.clone()]));

        self.inner.borrow_mut().in_flush = true;
        let mut queue = Vec::new();
        let out = match mount_instance(&self.inner, None, def, None, Props::new(), &mut queue) {
            Ok(id) => {
                self.inner.borrow_mut().root = Some(id);
                commit(&self.inner);
                run_effects(&self.inner, queue);
                Ok(())
            }
            Err((e, _)) => Err(e),
        };
        self.inner.borrow_mut().in_flush = false;
        drain_warnings(&self.inner);
        // Mount effects may have queued state updates.
        flush(&self.inner);
        out
    }

    /// Tears the whole tree down: every effect cleanup runs (reverse
    /// declaration order per instance, descendants first) and all refs
    /// detach.
    pub fn unmount(&self) {
        let root = {
            let mut inner = self.inner.borrow_mut();
            inner.in_flush = true;
            inner.root.take()
        };
        if let Some(r) = root {
            unmount_subtree(&self.inner, r);
        }
        {
            let mut inner = self.inner.borrow_mut();
            inner.committed = None;
            inner.handlers.clear();
            inner.pending.clear();
            inner.in_flush = false;
        }
        drain_warnings(&self.inner);
    }

    /// Batches state updates issued inside `f` into exactly one
    /// render+commit+effect cycle.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.borrow_mut().batch_depth += 1;
        let out = f();
        self.inner.borrow_mut().batch_depth -= 1;
        flush(&self.inner);
        out
    }

    /// Delivers an external event to the handler prop of a committed node.
    /// The handler runs batched. Returns false when no handler is attached.
    pub fn dispatch(&self, target: NodeId, event: &str, payload: Value) -> bool {
        let handler = {
            self.inner
                .borrow()
                .handlers
                .get(&(target, event.to_string()))
                .cloned()
        };
        let Some(h) = handler else {
            return false;
        };
        self.batch(|| h.call(payload));
        true
    }

    /// Latest committed tree, if any pass has committed.
    pub fn committed(&self) -> Option<CommittedNode> {
        self.inner.borrow().committed.clone()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.unmount();
    }
}

pub(crate) fn note(inner: &mut Inner, msg: String) {
    log::warn!("{msg}");
    inner.warnings.push(msg);
}

fn report_error(inner: &mut Inner, msg: String) {
    log::error!("{msg}");
    inner.warnings.push(msg);
}

pub(crate) fn drain_warnings_if_idle(rt: &Rc<RefCell<Inner>>) {
    let idle = {
        let inner = rt.borrow();
        !inner.in_flush && inner.batch_depth == 0
    };
    if idle {
        drain_warnings(rt);
    }
}

fn drain_warnings(rt: &Rc<RefCell<Inner>>) {
    let (hook, msgs) = {
        let mut inner = rt.borrow_mut();
        (inner.warn_hook.clone(), std::mem::take(&mut inner.warnings))
    };
    if let Some(h) = hook {
        for m in msgs {
            h(&m);
        }
    }
}

/// Drains the pending queue and runs render+commit+effect cycles until the
/// tree settles. No-op while batched or already flushing.
pub(crate) fn flush(rt: &Rc<RefCell<Inner>>) {
    {
        let mut inner = rt.borrow_mut();
        if inner.in_flush || inner.batch_depth > 0 {
            return;
        }
        inner.in_flush = true;
    }

    let mut passes = 0u32;
    loop {
        if rt.borrow().pending.is_empty() {
            break;
        }
        passes += 1;
        if passes > MAX_PASSES {
            let mut inner = rt.borrow_mut();
            inner.pending.clear();
            report_error(&mut inner, RuntimeError::PassLimit(MAX_PASSES).to_string());
            break;
        }
        if !apply_pending(rt) {
            // Redundant updates: nothing became dirty, no re-render.
            continue;
        }
        let root = rt.borrow().root;
        let Some(root) = root else {
            continue;
        };
        let mut queue = Vec::new();
        match render_instance(rt, root, false, &mut queue) {
            Ok(()) => {
                commit(rt);
                run_effects(rt, queue);
            }
            Err((e, origin)) => handle_unhandled(rt, e, origin),
        }
    }

    rt.borrow_mut().in_flush = false;
    drain_warnings(rt);
}

/// Applies queued updates in call order. Returns whether any slot ended the
/// batch with a value different from where it started.
fn apply_pending(rt: &Rc<RefCell<Inner>>) -> bool {
    let pending = std::mem::take(&mut rt.borrow_mut().pending);
    if pending.is_empty() {
        return false;
    }

    let mut originals: HashMap<(InstanceId, usize), Value> = HashMap::new();
    for p in pending {
        let target = {
            let inner = rt.borrow();
            inner
                .arena
                .get(p.owner)
                .filter(|inst| inst.mounted)
                .and_then(|inst| {
                    inst.state
                        .get(p.slot)
                        .map(|s| (s.value.clone(), inst.props.clone()))
                })
        };
        let Some((prev, props)) = target else {
            let mut inner = rt.borrow_mut();
            note(&mut inner, "state update targeted a freed slot; dropped".to_string());
            continue;
        };

        // Updaters see the monotonically advancing previous value and the
        // instance's current props, at apply time.
        let next = match p.update {
            StateUpdate::Set(v) => v,
            StateUpdate::With(f) => f(&prev, &props),
            StateUpdate::Merge(patch) => {
                if prev.as_map().is_none() && !prev.is_null() {
                    let mut inner = rt.borrow_mut();
                    note(
                        &mut inner,
                        "aggregate merge on non-map state; replacing with patch".to_string(),
                    );
                }
                prev.merge_shallow(&patch)
            }
        };

        originals.entry((p.owner, p.slot)).or_insert(prev);
        if let Some(inst) = rt.borrow_mut().arena.get_mut(p.owner)
            && let Some(slot) = inst.state.get_mut(p.slot)
        {
            slot.value = next;
        }
    }

    let mut any = false;
    let mut inner = rt.borrow_mut();
    for ((owner, slot), orig) in originals {
        if let Some(inst) = inner.arena.get_mut(owner) {
            let differs = inst.state.get(slot).is_some_and(|s| s.value != orig);
            if differs {
                inst.dirty = true;
                any = true;
            }
        }
    }
    any
}

type RenderFailure = (RenderError, Option<InstanceId>);

/// Re-renders `id` when dirty or forced, otherwise descends looking for
/// dirty descendants. `force` is set when fresh props arrived.
fn render_instance(
    rt: &Rc<RefCell<Inner>>,
    id: InstanceId,
    force: bool,
    queue: &mut Vec<(InstanceId, usize)>,
) -> Result<(), RenderFailure> {
    let decision = {
        let mut inner = rt.borrow_mut();
        let Some(inst) = inner.arena.get_mut(id) else {
            return Ok(());
        };
        let needs = force || inst.dirty;
        inst.dirty = false;
        (needs, inst.def.clone())
    };
    let (needs, def) = decision;

    if !needs {
        let kids: Vec<InstanceId> = rt
            .borrow()
            .arena
            .get(id)
            .map(|i| i.children.iter().flatten().copied().collect())
            .unwrap_or_default();
        for k in kids {
            render_instance(rt, k, false, queue)?;
        }
        return Ok(());
    }

    let mut ctx = Ctx::new(rt, id);
    match (def.render)(&mut ctx) {
        Ok(nodes) => {
            check_slot_shape(rt, id, &ctx, def.name);
            finish_render(rt, id, &def, nodes, queue)
        }
        Err(e) => {
            let mut inner = rt.borrow_mut();
            note(
                &mut inner,
                format!("component `{}` failed to render: {e}", def.name),
            );
            Err((e, Some(id)))
        }
    }
}

fn check_slot_shape(rt: &Rc<RefCell<Inner>>, id: InstanceId, ctx: &Ctx, name: &str) {
    let mut inner = rt.borrow_mut();
    let shrunk = inner.arena.get(id).is_some_and(|inst| {
        ctx.state_cursor < inst.state.len()
            || ctx.effect_cursor < inst.effects.len()
            || ctx.ref_cursor < inst.refs.len()
    });
    if shrunk {
        note(
            &mut inner,
            format!("component `{name}` declared fewer slots than a previous pass; keeping prior slots"),
        );
    }
}

/// Stores the render output, reconciles children, catches descendant
/// failures at this instance's boundary, and queues due effects (children
/// first — this runs post-order).
fn finish_render(
    rt: &Rc<RefCell<Inner>>,
    id: InstanceId,
    def: &Rc<ComponentDef>,
    nodes: Vec<Node>,
    queue: &mut Vec<(InstanceId, usize)>,
) -> Result<(), RenderFailure> {
    if let Some(inst) = rt.borrow_mut().arena.get_mut(id) {
        inst.rendered = nodes;
    }

    let result = match reconcile_children(rt, id, queue) {
        Ok(()) => Ok(()),
        Err((e, _origin)) => {
            if let Some(b) = def.boundary.clone() {
                {
                    let mut inner = rt.borrow_mut();
                    note(
                        &mut inner,
                        format!("boundary `{}` caught render error: {e}", def.name),
                    );
                }
                let fallback = b(&e);
                if let Some(inst) = rt.borrow_mut().arena.get_mut(id) {
                    inst.rendered = fallback;
                }
                // The failed subtree unmounts as an unclaimed child here.
                reconcile_children(rt, id, queue)
            } else {
                Err((e, _origin))
            }
        }
    };

    if result.is_ok() {
        let due: Vec<usize> = rt
            .borrow()
            .arena
            .get(id)
            .map(|inst| {
                inst.effects
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| s.due)
                    .map(|(i, _)| i)
                    .collect()
            })
            .unwrap_or_default();
        for idx in due {
            queue.push((id, idx));
        }
    }
    result
}

enum Plan {
    Update {
        cid: InstanceId,
        props: Props,
        changed: bool,
    },
    Mount {
        def: Rc<ComponentDef>,
        key: Option<String>,
        props: Props,
    },
}

/// Diffs the previous child instances against the component nodes of the
/// new render output. Keyed children match by key, the rest by position and
/// definition identity. Dropped children unmount before the pass commits.
fn reconcile_children(
    rt: &Rc<RefCell<Inner>>,
    id: InstanceId,
    queue: &mut Vec<(InstanceId, usize)>,
) -> Result<(), RenderFailure> {
    let (rendered, old) = {
        let inner = rt.borrow();
        match inner.arena.get(id) {
            Some(inst) => (inst.rendered.clone(), inst.children.clone()),
            None => return Ok(()),
        }
    };

    let mut specs = Vec::new();
    collect_components(&rendered, &mut specs);

    let mut by_key: HashMap<String, usize> = HashMap::new();
    {
        let inner = rt.borrow();
        for (i, slot) in old.iter().enumerate() {
            if let Some(cid) = slot
                && let Some(inst) = inner.arena.get(*cid)
                && let Some(k) = &inst.key
            {
                by_key.insert(k.clone(), i);
            }
        }
    }

    let mut claimed = vec![false; old.len()];
    let mut plans = Vec::with_capacity(specs.len());
    {
        let inner = rt.borrow();
        for (i, (key, def, props)) in specs.into_iter().enumerate() {
            let candidate = match &key {
                Some(k) => by_key.get(k).copied(),
                None => (i < old.len()).then_some(i),
            };
            let candidate = candidate
                .filter(|ci| !claimed[*ci])
                .and_then(|ci| old[ci].map(|cid| (ci, cid)))
                .filter(|(_, cid)| {
                    inner.arena.get(*cid).is_some_and(|inst| {
                        Rc::ptr_eq(&inst.def, &def) && inst.key.is_some() == key.is_some()
                    })
                });
            match candidate {
                Some((ci, cid)) => {
                    claimed[ci] = true;
                    let changed = inner.arena[cid].props != props;
                    plans.push(Plan::Update { cid, props, changed });
                }
                None => plans.push(Plan::Mount { def, key, props }),
            }
        }
    }

    let dropped: Vec<InstanceId> = old
        .iter()
        .enumerate()
        .filter(|(i, _)| !claimed[*i])
        .filter_map(|(_, s)| *s)
        .collect();
    for cid in dropped {
        unmount_subtree(rt, cid);
    }

    let mut new_children: Vec<Option<InstanceId>> = Vec::with_capacity(plans.len());
    let mut failure: Option<RenderFailure> = None;
    let mut iter = plans.into_iter();
    for plan in iter.by_ref() {
        match plan {
            Plan::Update { cid, props, changed } => {
                if changed && let Some(inst) = rt.borrow_mut().arena.get_mut(cid) {
                    inst.props = props;
                }
                match render_instance(rt, cid, changed, queue) {
                    Ok(()) => new_children.push(Some(cid)),
                    Err(f) => {
                        // Still mounted; an ancestor boundary (or the top
                        // level handler) decides its fate.
                        new_children.push(Some(cid));
                        failure = Some(f);
                        break;
                    }
                }
            }
            Plan::Mount { def, key, props } => {
                match mount_instance(rt, Some(id), def, key, props, queue) {
                    Ok(cid) => new_children.push(Some(cid)),
                    Err(f) => {
                        new_children.push(None);
                        failure = Some(f);
                        break;
                    }
                }
            }
        }
    }
    if failure.is_some() {
        // Keep the still-mounted remainder reachable for later teardown.
        for plan in iter {
            match plan {
                Plan::Update { cid, .. } => new_children.push(Some(cid)),
                Plan::Mount { .. } => new_children.push(None),
            }
        }
    }

    if let Some(inst) = rt.borrow_mut().arena.get_mut(id) {
        inst.children = new_children;
    }
    match failure {
        Some(f) => Err(f),
        None => Ok(()),
    }
}

fn collect_components(
    nodes: &[Node],
    out: &mut Vec<(Option<String>, Rc<ComponentDef>, Props)>,
) {
    for n in nodes {
        match n {
            Node::Component { def, key, props } => {
                out.push((key.clone(), def.clone(), props.clone()));
            }
            Node::Element { children, .. } => collect_components(children, out),
            Node::Text(_) => {}
        }
    }
}

fn mount_instance(
    rt: &Rc<RefCell<Inner>>,
    parent: Option<InstanceId>,
    def: Rc<ComponentDef>,
    key: Option<String>,
    props: Props,
    queue: &mut Vec<(InstanceId, usize)>,
) -> Result<InstanceId, RenderFailure> {
    let id = rt.borrow_mut().arena.insert(Instance {
        def: def.clone(),
        props,
        key,
        parent,
        state: Vec::new(),
        effects: Vec::new(),
        refs: Vec::new(),
        rendered: Vec::new(),
        children: Vec::new(),
        element_ids: HashMap::new(),
        attached: HashMap::new(),
        dirty: false,
        mounted: true,
    });

    let mut ctx = Ctx::new(rt, id);
    match (def.render)(&mut ctx) {
        Ok(nodes) => match finish_render(rt, id, &def, nodes, queue) {
            Ok(()) => Ok(id),
            Err((e, _)) => {
                unmount_subtree(rt, id);
                Err((e, None))
            }
        },
        Err(e) => {
            {
                let mut inner = rt.borrow_mut();
                note(
                    &mut inner,
                    format!("component `{}` failed to render: {e}", def.name),
                );
            }
            unmount_subtree(rt, id);
            Err((e, None))
        }
    }
}

/// Tears down `id` and everything below it: descendants first, then this
/// instance's cleanups in reverse declaration order, then ref detach.
/// The instance is marked dead before any cleanup runs, so state updates
/// issued from cleanups are the documented no-op.
fn unmount_subtree(rt: &Rc<RefCell<Inner>>, id: InstanceId) {
    let kids: Vec<InstanceId> = {
        let mut inner = rt.borrow_mut();
        let Some(inst) = inner.arena.get_mut(id) else {
            return;
        };
        inst.mounted = false;
        inst.children.iter().flatten().copied().collect()
    };
    for k in kids {
        unmount_subtree(rt, k);
    }

    let cleanups: Vec<Cleanup> = {
        let mut inner = rt.borrow_mut();
        match inner.arena.get_mut(id) {
            Some(inst) => inst
                .effects
                .iter_mut()
                .rev()
                .filter_map(|s| s.cleanup.take())
                .collect(),
            None => Vec::new(),
        }
    };
    for c in cleanups {
        c();
    }

    let attached: Vec<RefBinding> = {
        let mut inner = rt.borrow_mut();
        inner
            .arena
            .get_mut(id)
            .map(|inst| {
                std::mem::take(&mut inst.attached)
                    .into_values()
                    .map(|(b, _)| b)
                    .collect()
            })
            .unwrap_or_default()
    };
    for b in attached {
        b.detach();
    }

    rt.borrow_mut().arena.remove(id);
}

fn handle_unhandled(rt: &Rc<RefCell<Inner>>, e: RenderError, origin: Option<InstanceId>) {
    {
        let mut inner = rt.borrow_mut();
        report_error(
            &mut inner,
            format!("unhandled render error: {e}; unmounting affected subtree"),
        );
    }
    // The previously committed tree stays visible; this pass does not
    // commit.
    let Some(oid) = origin else {
        return;
    };
    let parent = rt.borrow().arena.get(oid).and_then(|i| i.parent);
    unmount_subtree(rt, oid);
    if let Some(pid) = parent
        && let Some(inst) = rt.borrow_mut().arena.get_mut(pid)
    {
        for slot in inst.children.iter_mut() {
            if *slot == Some(oid) {
                *slot = None;
            }
        }
    }
    if rt.borrow().root == Some(oid) {
        rt.borrow_mut().root = None;
    }
}

struct RefOp {
    binding: RefBinding,
    /// `None` detaches.
    target: Option<NodeId>,
}

/// Builds the committed tree from the instance arena, rebuilds the handler
/// table, applies ref attach/detach, and hands the tree to the renderer.
fn commit(rt: &Rc<RefCell<Inner>>) {
    let root = rt.borrow().root;
    let Some(root) = root else {
        return;
    };

    let mut handlers = HashMap::new();
    let mut ops: Vec<RefOp> = Vec::new();
    let forest = {
        let mut inner = rt.borrow_mut();
        commit_instance(&mut inner, root, &mut handlers, &mut ops)
    };
    let tree = CommittedNode {
        id: 0,
        kind: CommittedKind::Element {
            tag: "#root".into(),
        },
        props: Props::new(),
        children: forest,
    };

    // Ref callbacks are user code; run them with the runtime unborrowed.
    for op in ops {
        match op.target {
            Some(t) => op.binding.attach(Value::from(t)),
            None => op.binding.detach(),
        }
    }

    {
        let mut inner = rt.borrow_mut();
        inner.handlers = handlers;
        inner.committed = Some(tree.clone());
    }

    // The renderer may call back into the runtime; move it out for the call.
    let mut renderer = std::mem::replace(
        &mut rt.borrow_mut().renderer,
        Box::new(NullRenderer),
    );
    renderer.commit(&tree);
    rt.borrow_mut().renderer = renderer;
}

fn commit_instance(
    inner: &mut Inner,
    id: InstanceId,
    handlers: &mut HashMap<(NodeId, String), Handler>,
    ops: &mut Vec<RefOp>,
) -> Vec<CommittedNode> {
    let rendered = match inner.arena.get(id) {
        Some(inst) => inst.rendered.clone(),
        None => return Vec::new(),
    };
    let mut comp_cursor = 0usize;
    let mut visited: HashSet<String> = HashSet::new();
    let out = commit_nodes(
        inner,
        id,
        &rendered,
        "",
        &mut comp_cursor,
        handlers,
        ops,
        &mut visited,
    );

    // Positions that disappeared this pass release their ids; bindings
    // attached at them detach.
    if let Some(inst) = inner.arena.get_mut(id) {
        inst.element_ids.retain(|p, _| visited.contains(p));
        let stale: Vec<String> = inst
            .attached
            .keys()
            .filter(|p| !visited.contains(*p))
            .cloned()
            .collect();
        for p in stale {
            if let Some((binding, _)) = inst.attached.remove(&p) {
                ops.push(RefOp {
                    binding,
                    target: None,
                });
            }
        }
    }
    out
}

#[allow(clippy::too_many_arguments)]
fn commit_nodes(
    inner: &mut Inner,
    owner: InstanceId,
    nodes: &[Node],
    prefix: &str,
    comp_cursor: &mut usize,
    handlers: &mut HashMap<(NodeId, String), Handler>,
    ops: &mut Vec<RefOp>,
    visited: &mut HashSet<String>,
) -> Vec<CommittedNode> {
    let mut out = Vec::new();
    for (i, n) in nodes.iter().enumerate() {
        let path = format!("{prefix}{i}");
        match n {
            Node::Text(s) => {
                visited.insert(path.clone());
                let nid = element_id(inner, owner, &path);
                out.push(CommittedNode {
                    id: nid,
                    kind: CommittedKind::Text { text: s.clone() },
                    props: Props::new(),
                    children: Vec::new(),
                });
            }
            Node::Element {
                tag,
                props,
                node_ref,
                children,
                ..
            } => {
                visited.insert(path.clone());
                let nid = element_id(inner, owner, &path);
                for (k, v) in props.iter() {
                    if let Value::Handler(h) = v {
                        handlers.insert((nid, k.clone()), h.clone());
                    }
                }
                if let Some(binding) = node_ref {
                    bind_ref(inner, owner, &path, binding, nid, ops);
                }
                let kids = commit_nodes(
                    inner,
                    owner,
                    children,
                    &format!("{path}/"),
                    comp_cursor,
                    handlers,
                    ops,
                    visited,
                );
                out.push(CommittedNode {
                    id: nid,
                    kind: CommittedKind::Element { tag: tag.clone() },
                    props: props.clone(),
                    children: kids,
                });
            }
            Node::Component { .. } => {
                let idx = *comp_cursor;
                *comp_cursor += 1;
                let child = inner
                    .arena
                    .get(owner)
                    .and_then(|inst| inst.children.get(idx).copied().flatten());
                if let Some(cid) = child {
                    out.extend(commit_instance(inner, cid, handlers, ops));
                }
            }
        }
    }
    out
}

fn element_id(inner: &mut Inner, owner: InstanceId, path: &str) -> NodeId {
    if let Some(inst) = inner.arena.get(owner)
        && let Some(&id) = inst.element_ids.get(path)
    {
        return id;
    }
    let id = inner.next_node_id;
    inner.next_node_id += 1;
    if let Some(inst) = inner.arena.get_mut(owner) {
        inst.element_ids.insert(path.to_string(), id);
    }
    id
}

fn bind_ref(
    inner: &mut Inner,
    owner: InstanceId,
    path: &str,
    binding: &RefBinding,
    nid: NodeId,
    ops: &mut Vec<RefOp>,
) {
    let prev = inner
        .arena
        .get(owner)
        .and_then(|i| i.attached.get(path).cloned());
    match prev {
        None => ops.push(RefOp {
            binding: binding.clone(),
            target: Some(nid),
        }),
        Some((old, old_id)) => {
            if old.same_identity(binding) {
                if old_id != nid {
                    ops.push(RefOp {
                        binding: old,
                        target: None,
                    });
                    ops.push(RefOp {
                        binding: binding.clone(),
                        target: Some(nid),
                    });
                }
            } else {
                if matches!(
                    (&old, binding),
                    (RefBinding::Callback(_), RefBinding::Callback(_))
                ) {
                    note(
                        inner,
                        "callback ref identity changed between passes; detaching and reattaching"
                            .to_string(),
                    );
                }
                ops.push(RefOp {
                    binding: old,
                    target: None,
                });
                ops.push(RefOp {
                    binding: binding.clone(),
                    target: Some(nid),
                });
            }
        }
    }
    if let Some(inst) = inner.arena.get_mut(owner) {
        inst.attached.insert(path.to_string(), (binding.clone(), nid));
    }
}

/// Flushes the queued effects of one committed pass. For each due slot the
/// previous cleanup runs strictly before the new body; a failing body is
/// reported without disturbing the instance's other slots.
fn run_effects(rt: &Rc<RefCell<Inner>>, queue: Vec<(InstanceId, usize)>) {
    for (id, idx) in queue {
        let work = {
            let mut inner = rt.borrow_mut();
            let Some(inst) = inner.arena.get_mut(id) else {
                continue;
            };
            if !inst.mounted {
                continue;
            }
            let Some(slot) = inst.effects.get_mut(idx) else {
                continue;
            };
            if !slot.due {
                continue;
            }
            slot.due = false;
            (slot.cleanup.take(), slot.declared.take())
        };
        let (cleanup, declared) = work;
        if let Some(c) = cleanup {
            c();
        }
        let Some((deps, body)) = declared else {
            continue;
        };
        let outcome = body();

        let mut inner = rt.borrow_mut();
        let Some(inst) = inner.arena.get_mut(id) else {
            continue;
        };
        let Some(slot) = inst.effects.get_mut(idx) else {
            continue;
        };
        slot.last = Some(deps);
        match outcome {
            Ok(new_cleanup) => slot.cleanup = new_cleanup,
            Err(e) => {
                slot.cleanup = None;
                report_error(&mut inner, format!("effect failed: {e}"));
            }
        }
    }
}
