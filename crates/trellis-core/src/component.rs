use std::rc::Rc;

use crate::error::RenderError;
use crate::node::Node;
use crate::runtime::Ctx;

pub type RenderFn = Rc<dyn Fn(&mut Ctx) -> Result<Vec<Node>, RenderError>>;
pub type BoundaryFn = Rc<dyn Fn(&RenderError) -> Vec<Node>>;

/// A component definition: a plain data/behavior record, no inheritance.
///
/// The render function declares state, effect, and ref slots through `Ctx`
/// in a stable order and returns the node forest for this pass. Lifecycle is
/// expressed entirely through those slots — there are no mount/unmount
/// methods to override.
pub struct ComponentDef {
    pub name: &'static str,
    pub(crate) render: RenderFn,
    pub(crate) boundary: Option<BoundaryFn>,
}

impl ComponentDef {
    pub fn new(
        name: &'static str,
        render: impl Fn(&mut Ctx) -> Result<Vec<Node>, RenderError> + 'static,
    ) -> Rc<Self> {
        Rc::new(Self {
            name,
            render: Rc::new(render),
            boundary: None,
        })
    }

    /// Error boundary: when a descendant's render fails, this component
    /// swaps its children for the fallback forest instead of letting the
    /// error propagate further up.
    pub fn with_boundary(
        name: &'static str,
        render: impl Fn(&mut Ctx) -> Result<Vec<Node>, RenderError> + 'static,
        boundary: impl Fn(&RenderError) -> Vec<Node> + 'static,
    ) -> Rc<Self> {
        Rc::new(Self {
            name,
            render: Rc::new(render),
            boundary: Some(Rc::new(boundary)),
        })
    }
}

impl std::fmt::Debug for ComponentDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ComponentDef({})", self.name)
    }
}
