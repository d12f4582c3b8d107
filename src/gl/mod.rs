//! GL context management and the GPU-abstraction seam used to keep tests GPU-free.

pub mod egl_context;
pub mod egl_image;
pub mod fence;

#[cfg(test)]
pub(crate) mod test_support;

use std::rc::Rc;

/// Thin seam over the GL calls this crate actually needs.
///
/// Production code drives this through `glow::Context` (see [`GlowApi`]); tests substitute
/// `FakeGl` so `FrameExchange`/`BufferPool` bookkeeping can be exercised without a display.
pub trait GlApi {
    fn gen_framebuffer(&self) -> glow::Framebuffer;
    fn delete_framebuffer(&self, fb: glow::Framebuffer);
    fn gen_texture(&self) -> glow::Texture;
    fn delete_texture(&self, tex: glow::Texture);
    fn bind_texture_2d(&self, tex: Option<glow::Texture>);
    fn tex_image_2d_rgba8(&self, width: i32, height: i32);
    fn tex_parameters_linear_clamp(&self);
    fn bind_framebuffer(&self, fb: Option<glow::Framebuffer>);
    fn framebuffer_texture_2d(&self, fb: glow::Framebuffer, tex: glow::Texture);
    fn flush(&self);
    fn fence_sync(&self) -> Option<glow::Fence>;
    fn client_wait_sync_timeout(&self, fence: glow::Fence, timeout_ns: u64) -> FenceWaitResult;
    fn delete_sync(&self, fence: glow::Fence);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceWaitResult {
    AlreadySignaled,
    ConditionSatisfied,
    TimeoutExpired,
    WaitFailed,
}

/// Production `GlApi` backed by a real `glow::Context`.
pub struct GlowApi {
    gl: Rc<glow::Context>,
}

impl GlowApi {
    pub fn new(gl: Rc<glow::Context>) -> Self {
        Self { gl }
    }
}

impl GlApi for GlowApi {
    fn gen_framebuffer(&self) -> glow::Framebuffer {
        use glow::HasContext as _;
        unsafe { self.gl.create_framebuffer() }.expect("glCreateFramebuffer failed")
    }

    fn delete_framebuffer(&self, fb: glow::Framebuffer) {
        use glow::HasContext as _;
        unsafe { self.gl.delete_framebuffer(fb) };
    }

    fn gen_texture(&self) -> glow::Texture {
        use glow::HasContext as _;
        unsafe { self.gl.create_texture() }.expect("glGenTextures failed")
    }

    fn delete_texture(&self, tex: glow::Texture) {
        use glow::HasContext as _;
        unsafe { self.gl.delete_texture(tex) };
    }

    fn bind_texture_2d(&self, tex: Option<glow::Texture>) {
        use glow::HasContext as _;
        unsafe { self.gl.bind_texture(glow::TEXTURE_2D, tex) };
    }

    fn tex_image_2d_rgba8(&self, width: i32, height: i32) {
        use glow::HasContext as _;
        unsafe {
            self.gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGBA8 as i32,
                width,
                height,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelUnpackData::Slice(None),
            );
        }
    }

    fn tex_parameters_linear_clamp(&self) {
        use glow::HasContext as _;
        unsafe {
            self.gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_MIN_FILTER,
                glow::LINEAR as i32,
            );
            self.gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_MAG_FILTER,
                glow::LINEAR as i32,
            );
            self.gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_WRAP_S,
                glow::CLAMP_TO_EDGE as i32,
            );
            self.gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_WRAP_T,
                glow::CLAMP_TO_EDGE as i32,
            );
        }
    }

    fn bind_framebuffer(&self, fb: Option<glow::Framebuffer>) {
        use glow::HasContext as _;
        unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, fb) };
    }

    fn framebuffer_texture_2d(&self, fb: glow::Framebuffer, tex: glow::Texture) {
        use glow::HasContext as _;
        unsafe {
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, Some(fb));
            self.gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                Some(tex),
                0,
            );
        }
    }

    fn flush(&self) {
        use glow::HasContext as _;
        unsafe { self.gl.flush() };
    }

    fn fence_sync(&self) -> Option<glow::Fence> {
        use glow::HasContext as _;
        unsafe { self.gl.fence_sync(glow::SYNC_GPU_COMMANDS_COMPLETE, 0) }.ok()
    }

    fn client_wait_sync_timeout(&self, fence: glow::Fence, timeout_ns: u64) -> FenceWaitResult {
        use glow::HasContext as _;
        let status = unsafe { self.gl.client_wait_sync(fence, glow::SYNC_FLUSH_COMMANDS_BIT, timeout_ns as i32) };
        match status {
            glow::ALREADY_SIGNALED => FenceWaitResult::AlreadySignaled,
            glow::CONDITION_SATISFIED => FenceWaitResult::ConditionSatisfied,
            glow::TIMEOUT_EXPIRED => FenceWaitResult::TimeoutExpired,
            _ => FenceWaitResult::WaitFailed,
        }
    }

    fn delete_sync(&self, fence: glow::Fence) {
        use glow::HasContext as _;
        unsafe { self.gl.delete_sync(fence) };
    }
}
