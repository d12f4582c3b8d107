//! N framebuffer slots (FBO + RGBA8 color texture + shareable image), (re)allocated on resize.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use khronos_egl as egl;
use log::debug;

use crate::error::BufferPoolError;
use crate::frame::SLOT_COUNT;
use crate::gl::GlApi;
use crate::gl::egl_image::{EglImage, EglImageFns, EglImageHandle};

/// The producer-side context an image is created in/against. Absent when the driver lacks the
/// `KHR_image_base`/`OES_EGL_image` entry points, in which case slots fall back to sharing their
/// GL object name directly within the EGL share group.
pub(crate) type ImageContext<'a> = (&'a EglImageFns, egl::Display, egl::Context);

struct GlSlot {
    fbo: glow::Framebuffer,
    texture: glow::Texture,
    image: Option<EglImage>,
}

/// Fixed-size pool of `SLOT_COUNT` FBO/texture/image triples, all the same size.
///
/// `ensure` is the only entry point that allocates or reallocates; it must run on the render
/// thread. `resizing` is readable from the consumer without taking the resize lock, so the
/// consumer can cheaply fall back to the placeholder while a resize is in flight. `generation`
/// lets the host invalidate its own per-slot texture-binding cache after a resize.
pub(crate) struct BufferPool {
    resizing: AtomicBool,
    generation: AtomicU64,
    resize_lock: Mutex<()>,
    slots: Mutex<PoolSlots>,
}

struct PoolSlots {
    gl_slots: Vec<GlSlot>,
    width: u32,
    height: u32,
    initialized: bool,
}

impl BufferPool {
    pub(crate) fn new() -> Self {
        Self {
            resizing: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            resize_lock: Mutex::new(()),
            slots: Mutex::new(PoolSlots {
                gl_slots: Vec::new(),
                width: 0,
                height: 0,
                initialized: false,
            }),
        }
    }

    /// Whether a resize is currently in flight; safe to call from any thread without blocking.
    pub(crate) fn is_resizing(&self) -> bool {
        self.resizing.load(Ordering::Acquire)
    }

    /// Bumped every time slots are (re)allocated. The host uses this to invalidate its
    /// per-slot bound-texture cache, since a resize destroys every prior image.
    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Allocates or reallocates all slots to `(width, height)`. A no-op if already allocated at
    /// that size. Must be called on the render thread.
    pub(crate) fn ensure(
        &self,
        gl: &dyn GlApi,
        width: u32,
        height: u32,
        pending_fences: impl Fn(usize) -> Option<glow::Fence>,
        on_epoch_reset: impl FnOnce(),
        image_ctx: Option<ImageContext<'_>>,
    ) -> Result<(), BufferPoolError> {
        {
            let slots = self.slots.lock().expect("lock poisoned");
            if slots.initialized && slots.width == width && slots.height == height {
                return Ok(());
            }
        }

        self.resizing.store(true, Ordering::Release);
        let _resize_guard = self.resize_lock.lock().expect("lock poisoned");

        let mut slots = self.slots.lock().expect("lock poisoned");

        debug!(
            "resizing buffer pool: {}x{} -> {width}x{height}",
            slots.width, slots.height
        );

        for (i, slot) in slots.gl_slots.drain(..).enumerate() {
            if let Some(fence) = pending_fences(i) {
                crate::gl::fence::wait_forever_then_delete(gl, fence);
            }
            if let Some(image) = slot.image {
                image.destroy();
            }
            gl.delete_texture(slot.texture);
            gl.delete_framebuffer(slot.fbo);
        }

        let mut gl_slots = Vec::with_capacity(SLOT_COUNT);
        for _ in 0..SLOT_COUNT {
            gl_slots.push(self.alloc_slot(gl, width, height, image_ctx)?);
        }
        gl.flush();

        slots.gl_slots = gl_slots;
        slots.width = width;
        slots.height = height;
        slots.initialized = true;

        on_epoch_reset();
        self.generation.fetch_add(1, Ordering::Release);

        drop(slots);
        self.resizing.store(false, Ordering::Release);
        debug!("buffer pool resize complete: {width}x{height}");
        Ok(())
    }

    fn alloc_slot(
        &self,
        gl: &dyn GlApi,
        width: u32,
        height: u32,
        image_ctx: Option<ImageContext<'_>>,
    ) -> Result<GlSlot, BufferPoolError> {
        let fbo = gl.gen_framebuffer();
        let texture = gl.gen_texture();

        gl.bind_texture_2d(Some(texture));
        gl.tex_image_2d_rgba8(width as i32, height as i32);
        gl.tex_parameters_linear_clamp();
        gl.bind_texture_2d(None);

        gl.framebuffer_texture_2d(fbo, texture);
        gl.bind_framebuffer(None);

        let image = image_ctx.and_then(|(fns, display, context)| {
            let image = fns.create_from_texture(display, context, texture);
            if image.is_none() {
                debug!("eglCreateImageKHR failed for a {width}x{height} slot texture");
            }
            image
        });

        Ok(GlSlot { fbo, texture, image })
    }

    /// Binds slot `index`'s FBO for rendering.
    pub(crate) fn bind_for_write(&self, gl: &dyn GlApi, index: usize) {
        let slots = self.slots.lock().expect("lock poisoned");
        gl.bind_framebuffer(Some(slots.gl_slots[index].fbo));
    }

    /// Returns the texture name backing slot `index`, for the host to sample directly when no
    /// shareable image is available.
    pub(crate) fn texture_for(&self, index: usize) -> glow::Texture {
        self.slots.lock().expect("lock poisoned").gl_slots[index].texture
    }

    /// Returns the FBO backing slot `index`, for the decoder to render into.
    pub(crate) fn fbo_for(&self, index: usize) -> glow::Framebuffer {
        self.slots.lock().expect("lock poisoned").gl_slots[index].fbo
    }

    /// Returns slot `index`'s shareable image handle, if the driver supports
    /// `KHR_image_base`/`OES_EGL_image`. The host binds a texture name against this instead of
    /// sampling the producer's texture name directly.
    pub(crate) fn image_for(&self, index: usize) -> Option<EglImageHandle> {
        self.slots.lock().expect("lock poisoned").gl_slots[index]
            .image
            .as_ref()
            .map(EglImage::handle)
    }

    /// Tears down every slot. Must be called on the render thread during shutdown, after every
    /// outstanding fence has already been waited on by the caller.
    pub(crate) fn destroy_all(&self, gl: &dyn GlApi) {
        let mut slots = self.slots.lock().expect("lock poisoned");
        for slot in slots.gl_slots.drain(..) {
            if let Some(image) = slot.image {
                image.destroy();
            }
            gl.delete_texture(slot.texture);
            gl.delete_framebuffer(slot.fbo);
        }
        slots.initialized = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gl::test_support::FakeGl;

    #[test]
    fn ensure_is_a_no_op_at_the_same_size() {
        let pool = BufferPool::new();
        let gl = FakeGl::new();
        pool.ensure(&gl, 640, 360, |_| None, || {}, None).unwrap();
        let texture_before = pool.texture_for(0);
        pool.ensure(&gl, 640, 360, |_| None, || {}, None).unwrap();
        assert_eq!(pool.texture_for(0), texture_before);
    }

    #[test]
    fn resize_reallocates_all_slots_and_clears_resizing_flag() {
        let pool = BufferPool::new();
        let gl = FakeGl::new();
        pool.ensure(&gl, 640, 360, |_| None, || {}, None).unwrap();
        let before = pool.texture_for(0);

        pool.ensure(&gl, 1280, 720, |_| None, || {}, None).unwrap();
        assert!(!pool.is_resizing());
        assert_ne!(pool.texture_for(0), before);
    }

    #[test]
    fn resize_bumps_the_generation_counter() {
        let pool = BufferPool::new();
        let gl = FakeGl::new();
        pool.ensure(&gl, 640, 360, |_| None, || {}, None).unwrap();
        let gen1 = pool.generation();
        pool.ensure(&gl, 1280, 720, |_| None, || {}, None).unwrap();
        assert!(pool.generation() > gen1);
    }
}
