//! # Components, state slots, and the reconciler
//!
//! Trellis is a small component runtime: a tree of stateful instances that
//! re-render in response to state changes, plus a dependency-gated effect
//! scheduler and an imperative-reference escape hatch. It emits a committed
//! tree to a renderer collaborator and never touches a display surface
//! itself.
//!
//! The main pieces:
//!
//! - `Value` / `Props` — dynamic prop and state values.
//! - `ComponentDef` — a plain render record; no lifecycle inheritance.
//! - `Ctx::use_state` / `use_effect` / `use_ref` — positional slots owned
//!   by one instance, surviving across renders.
//! - `Runtime` — owns the instance arena and drives
//!   mount → update → unmount.
//!
//! ## A counter
//!
//! ```rust
//! use trellis_core::*;
//!
//! let counter = ComponentDef::new("Counter", |ctx| {
//!     let (count, set_count) = ctx.use_state(|| Value::Int(0));
//!     let n = count.as_int().unwrap_or(0);
//!     Ok(vec![
//!         Node::element("button")
//!             .prop("on_click", Value::handler(move |_| {
//!                 set_count.set_with(|prev, _| {
//!                     Value::Int(prev.as_int().unwrap_or(0) + 1)
//!                 });
//!             }))
//!             .child(Node::text(format!("Count = {n}"))),
//!     ])
//! });
//!
//! let rt = Runtime::new();
//! rt.mount(Node::component(&counter, Props::new())).unwrap();
//! let tree = rt.committed().unwrap();
//! assert_eq!(tree.texts(), vec!["Count = 0".to_string()]);
//!
//! let button = tree.find_by_tag("button").unwrap().id;
//! rt.dispatch(button, "on_click", Value::Null);
//! assert_eq!(rt.committed().unwrap().texts(), vec!["Count = 1".to_string()]);
//! ```
//!
//! ## Updates and batching
//!
//! `StateHandle::set` replaces a slot; the last value in a batch wins.
//! `set_with` folds over the previous value at apply time, so several
//! queued increments each see the prior one's result. `merge` shallow-
//! merges into an aggregate map slot. Updates issued inside one event
//! handler (or an explicit `Runtime::batch`) produce exactly one
//! render+commit+effect cycle.
//!
//! ## Effects and cleanup
//!
//! ```rust
//! use trellis_core::*;
//!
//! let subscriber = ComponentDef::new("Subscriber", |ctx| {
//!     ctx.use_effect(deps!(), || {
//!         log::info!("mounted");
//!         Ok(Some(Box::new(|| log::info!("unmounted"))))
//!     });
//!     Ok(vec![Node::text("ready")])
//! });
//! # let _ = subscriber;
//! ```
//!
//! Effects never run inside render; they are queued and flushed once the
//! pass has committed, descendants before ancestors. A cleanup runs
//! strictly before its body re-runs and once more at unmount, in reverse
//! declaration order.

pub mod component;
pub mod effects;
pub mod error;
pub mod node;
pub mod prelude;
pub mod refs;
pub mod runtime;
pub mod state;
pub mod value;

#[cfg(test)]
mod tests;

pub use component::*;
pub use effects::*;
pub use error::*;
pub use node::*;
pub use prelude::*;
pub use refs::*;
pub use runtime::{Ctx, InstanceId, NullRenderer, Renderer, Runtime};
pub use state::StateHandle;
pub use value::*;
