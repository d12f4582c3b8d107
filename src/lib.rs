//! `mpv_flutter_gl_bridge` crate root.
//!
//! Zero-copy hand-off of decoded video frames from an external decoder's OpenGL render context
//! to a host UI compositor polling for a texture, across a dedicated render thread. See
//! [`video_output::VideoOutput`] for the orchestrator and [`ffi`] for the C ABI surface.

mod buffer_pool;
mod cache;
mod config;
mod decoder;
mod error;
mod ffi;
mod frame;
mod gl;
mod host;
mod render_thread;
mod software_fallback;
mod video_output;

pub use config::{BridgeConfig, SoftwareLimits};
pub use decoder::{Decoder, RenderTarget, VideoOutParams};
pub use error::{BridgeError, BufferPoolError, DecoderError, GlContextError};
pub use host::{PolledTexture, TextureHost};
pub use video_output::VideoOutput;
