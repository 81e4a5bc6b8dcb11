pub use crate::component::ComponentDef;
pub use crate::deps;
pub use crate::effects::{Cleanup, DepList, Deps};
pub use crate::error::{EffectError, RenderError};
pub use crate::node::{CommittedKind, CommittedNode, Node, NodeId};
pub use crate::refs::{NodeRef, RefBinding};
pub use crate::runtime::{Ctx, Renderer, Runtime};
pub use crate::state::StateHandle;
pub use crate::value::{Handler, Props, Value};
