//! GPU-free `GlApi` double used by the frame-exchange and buffer-pool unit tests.

use std::cell::Cell;

use super::{FenceWaitResult, GlApi};

fn fake_handle<T>(id: u64) -> T {
    unsafe { std::mem::transmute_copy(&id) }
}

/// Hands out monotonically increasing fake object names and always reports fences as already
/// signaled, so tests never block on a real GPU.
pub(crate) struct FakeGl {
    next_id: Cell<u64>,
    pub(crate) fences_pending: Cell<bool>,
}

impl FakeGl {
    pub(crate) fn new() -> Self {
        Self {
            next_id: Cell::new(1),
            fences_pending: Cell::new(false),
        }
    }

    fn next(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }
}

impl GlApi for FakeGl {
    fn gen_framebuffer(&self) -> glow::Framebuffer {
        fake_handle(self.next())
    }

    fn delete_framebuffer(&self, _fb: glow::Framebuffer) {}

    fn gen_texture(&self) -> glow::Texture {
        fake_handle(self.next())
    }

    fn delete_texture(&self, _tex: glow::Texture) {}

    fn bind_texture_2d(&self, _tex: Option<glow::Texture>) {}

    fn tex_image_2d_rgba8(&self, _width: i32, _height: i32) {}

    fn tex_parameters_linear_clamp(&self) {}

    fn bind_framebuffer(&self, _fb: Option<glow::Framebuffer>) {}

    fn framebuffer_texture_2d(&self, _fb: glow::Framebuffer, _tex: glow::Texture) {}

    fn flush(&self) {}

    fn fence_sync(&self) -> Option<glow::Fence> {
        Some(fake_handle(self.next()))
    }

    fn client_wait_sync_timeout(&self, _fence: glow::Fence, _timeout_ns: u64) -> FenceWaitResult {
        if self.fences_pending.get() {
            FenceWaitResult::TimeoutExpired
        } else {
            FenceWaitResult::AlreadySignaled
        }
    }

    fn delete_sync(&self, _fence: glow::Fence) {}
}
