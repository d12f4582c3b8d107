//! Abstraction over the decoder's render-context ABI (libmpv, in production).

use crate::error::DecoderError;

/// Reported video dimensions and rotation, as read from the decoder's "video-out-params".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoOutParams {
    pub dw: u32,
    pub dh: u32,
    pub rotate: u32,
}

impl VideoOutParams {
    /// Width/height after swapping for a 90/270 degree rotation.
    pub fn display_size(&self) -> (u32, u32) {
        match self.rotate {
            90 | 270 => (self.dh, self.dw),
            _ => (self.dw, self.dh),
        }
    }
}

/// Where the decoder should render this frame.
pub enum RenderTarget {
    /// Hardware path: render into the given FBO at `(width, height)`.
    Fbo {
        fbo: glow::Framebuffer,
        width: u32,
        height: u32,
    },
    /// Software path: render `rgb0` pixels into `pointer`, `stride` bytes per row.
    Software {
        width: u32,
        height: u32,
        stride: u32,
        pointer: *mut u8,
    },
}

/// Object-safe abstraction over the decoder's render-context ABI.
///
/// Production code backs this with libmpv's render API; tests use [`FakeDecoder`].
pub trait Decoder: Send + Sync {
    /// Renders the current frame into `target`. Returns `Ok(())` on success; a non-zero
    /// decoder return code becomes `DecoderError::RenderFailed` and the caller must discard the
    /// frame without advancing any sequence counter.
    fn render(&self, target: RenderTarget) -> Result<(), DecoderError>;

    /// Reads the decoder's reported output dimensions and rotation.
    fn video_out_params(&self) -> Result<VideoOutParams, DecoderError>;

    /// Registers a callback invoked (from a decoder-owned thread) whenever a new frame is
    /// ready. Passing `None` clears it.
    fn set_update_callback(&self, callback: Option<Box<dyn Fn() + Send + Sync>>);
}

/// Deterministic `Decoder` double: reports a fixed size and "renders" by touching nothing, so
/// the test suite can drive `VideoOutput` without linking against libmpv.
#[cfg(test)]
pub(crate) mod fake {
    use std::sync::Mutex;

    use super::*;

    pub(crate) struct FakeDecoder {
        params: Mutex<VideoOutParams>,
        callback: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
        fail_next_render: std::sync::atomic::AtomicBool,
    }

    impl FakeDecoder {
        pub(crate) fn new(dw: u32, dh: u32, rotate: u32) -> Self {
            Self {
                params: Mutex::new(VideoOutParams { dw, dh, rotate }),
                callback: Mutex::new(None),
                fail_next_render: std::sync::atomic::AtomicBool::new(false),
            }
        }

        pub(crate) fn set_params(&self, dw: u32, dh: u32, rotate: u32) {
            *self.params.lock().expect("lock poisoned") = VideoOutParams { dw, dh, rotate };
        }

        pub(crate) fn signal_frame_available(&self) {
            if let Some(cb) = self.callback.lock().expect("lock poisoned").as_ref() {
                cb();
            }
        }

        pub(crate) fn fail_next_render(&self) {
            self.fail_next_render
                .store(true, std::sync::atomic::Ordering::SeqCst);
        }
    }

    impl Decoder for FakeDecoder {
        fn render(&self, _target: RenderTarget) -> Result<(), DecoderError> {
            if self
                .fail_next_render
                .swap(false, std::sync::atomic::Ordering::SeqCst)
            {
                return Err(DecoderError::RenderFailed { code: -1 });
            }
            Ok(())
        }

        fn video_out_params(&self) -> Result<VideoOutParams, DecoderError> {
            Ok(*self.params.lock().expect("lock poisoned"))
        }

        fn set_update_callback(&self, callback: Option<Box<dyn Fn() + Send + Sync>>) {
            *self.callback.lock().expect("lock poisoned") = callback;
        }
    }
}
