use thiserror::Error;

/// A component's render logic failed.
///
/// Returned from a render function instead of panicking; the reconciler
/// routes it to the nearest ancestor error boundary, or reports it and
/// unmounts the affected subtree when no boundary is declared.
#[derive(Debug, Clone, Error)]
#[error("render failed: {message}")]
pub struct RenderError {
    pub message: String,
}

impl RenderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// An effect body failed.
///
/// Reported, but does not stop cleanup/re-run bookkeeping for the other
/// effect slots of the same instance.
#[derive(Debug, Clone, Error)]
#[error("effect failed: {message}")]
pub struct EffectError {
    pub message: String,
}

impl EffectError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Render-pass level failures.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    /// The flush loop did not settle; usually an effect that
    /// unconditionally writes the state it depends on.
    #[error("render pass limit ({0}) exceeded; a state update loop is likely")]
    PassLimit(u32),
}
