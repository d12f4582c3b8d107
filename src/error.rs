//! Typed error hierarchy for the GL bridge.
//!
//! `GlContextError` and `BufferPoolError` are deliberately never handed to the host: they get
//! folded into `BridgeError::Hardware` at the `VideoOutput` boundary and drive the software
//! fallback rather than propagating as a hard failure.

use thiserror::Error;

/// Failure obtaining or activating the producer EGL context.
#[derive(Debug, Error)]
pub enum GlContextError {
    #[error("no EGL display available")]
    NoDisplay,

    #[error("failed to bind the OpenGL ES API: {0}")]
    BindApi(String),

    #[error("no EGL config matched (tried: {attempted:?})")]
    ConfigSelection { attempted: Vec<String> },

    #[error("failed to create a drawable ({kind}): {reason}")]
    DrawableCreation { kind: &'static str, reason: String },

    #[error("failed to create a GL context (tried APIs: {attempted_apis:?}): {reason}")]
    ContextCreation {
        attempted_apis: Vec<&'static str>,
        reason: String,
    },

    #[error("make_current failed: {0}")]
    Activation(String),

    #[error(transparent)]
    BufferPool(#[from] BufferPoolError),
}

/// Failure allocating or resizing the triple-buffered slot pool.
#[derive(Debug, Error)]
pub enum BufferPoolError {
    #[error("no free slot available (all {total} slots in use)")]
    OutOfSlots { total: usize },

    #[error("GL allocation failed for a {width}x{height} slot: {reason}")]
    Allocation {
        width: u32,
        height: u32,
        reason: String,
    },
}

/// Failure reported by the decoder during a render call or a property query.
#[derive(Debug, Error)]
pub enum DecoderError {
    #[error("decoder render call returned non-zero code {code}")]
    RenderFailed { code: i32 },

    #[error("missing decoder property: {0}")]
    MissingProperty(&'static str),
}

/// Crate-level error surfaced to the host by `VideoOutput`.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Hardware path failed; the bridge has fallen back (or is falling back) to software.
    /// This variant is logged, never returned as a hard failure to the host.
    #[error("hardware path unavailable: {0}")]
    Hardware(String),

    #[error("decoder error: {0}")]
    Decoder(#[from] DecoderError),

    #[error("the bridge has already been disposed")]
    Disposed,
}

impl From<GlContextError> for BridgeError {
    fn from(err: GlContextError) -> Self {
        BridgeError::Hardware(err.to_string())
    }
}

impl From<BufferPoolError> for BridgeError {
    fn from(err: BufferPoolError) -> Self {
        BridgeError::Hardware(err.to_string())
    }
}
