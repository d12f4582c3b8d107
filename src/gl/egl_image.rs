//! Shareable image handles: `KHR_image_base`/`OES_EGL_image` wrap a slot's texture so the host
//! context can bind its own texture name against the same pixels without copying. Neither
//! extension is part of `khronos-egl`'s safe EGL 1.4 surface, so the three entry points involved
//! are resolved directly through `eglGetProcAddress`.

use std::ffi::c_void;

use khronos_egl as egl;

const EGL_GL_TEXTURE_2D_KHR: u32 = 0x30B1;
const EGL_IMAGE_PRESERVED_KHR: egl::Int = 0x30D2;
const EGL_NONE: egl::Int = 0x3038;
const EGL_TRUE: egl::Int = 1;
const GL_TEXTURE_2D: u32 = 0x0DE1;

type RawImage = *const c_void;

type PfnCreateImageKhr = unsafe extern "system" fn(
    dpy: *const c_void,
    ctx: *const c_void,
    target: u32,
    buffer: *const c_void,
    attrib_list: *const egl::Int,
) -> RawImage;

type PfnDestroyImageKhr = unsafe extern "system" fn(dpy: *const c_void, image: RawImage) -> egl::Int;

type PfnImageTargetTexture2dOes = unsafe extern "system" fn(target: u32, image: RawImage);

/// `eglDisplay`/`eglContext` are thin newtypes over the platform's opaque pointer-sized handles;
/// this mirrors the `transmute_copy` idiom this crate already uses for `glow`'s GL object
/// newtypes to recover the raw pointer the KHR entry points expect.
fn raw_display(display: egl::Display) -> *const c_void {
    unsafe { std::mem::transmute_copy(&display) }
}

fn raw_context(context: egl::Context) -> *const c_void {
    unsafe { std::mem::transmute_copy(&context) }
}

/// The three `KHR_image_base`/`OES_EGL_image` entry points, resolved once per producer context.
/// Plain function pointers: valid process-wide once resolved, so both the producer (creation/
/// destruction) and the host (texture binding) can hold a copy.
#[derive(Clone, Copy)]
pub(crate) struct EglImageFns {
    create_image_khr: PfnCreateImageKhr,
    destroy_image_khr: PfnDestroyImageKhr,
    image_target_texture_2d_oes: PfnImageTargetTexture2dOes,
}

impl EglImageFns {
    /// Resolves all three entry points, or `None` if the driver lacks any of them. A missing
    /// set is a soft degrade, not a hard failure: callers fall back to sharing the slot's GL
    /// object name directly, which already works inside an EGL share group.
    pub(crate) fn load(instance: &egl::DynamicInstance<egl::EGL1_4>) -> Option<Self> {
        let create_image_khr = instance.get_proc_address("eglCreateImageKHR")?;
        let destroy_image_khr = instance.get_proc_address("eglDestroyImageKHR")?;
        let image_target_texture_2d_oes =
            instance.get_proc_address("glEGLImageTargetTexture2DOES")?;
        Some(Self {
            create_image_khr: unsafe { std::mem::transmute(create_image_khr) },
            destroy_image_khr: unsafe { std::mem::transmute(destroy_image_khr) },
            image_target_texture_2d_oes: unsafe {
                std::mem::transmute(image_target_texture_2d_oes)
            },
        })
    }

    /// Wraps `texture` (current in `context` on `display`) as a shareable image. Must be called
    /// with the producer context active. Returns `None` on driver failure.
    pub(crate) fn create_from_texture(
        &self,
        display: egl::Display,
        context: egl::Context,
        texture: glow::Texture,
    ) -> Option<EglImage> {
        let attribs = [EGL_IMAGE_PRESERVED_KHR, EGL_TRUE, EGL_NONE];
        let raw_texture: u32 = unsafe { std::mem::transmute_copy(&texture) };

        let image = unsafe {
            (self.create_image_khr)(
                raw_display(display),
                raw_context(context),
                EGL_GL_TEXTURE_2D_KHR,
                raw_texture as usize as *const c_void,
                attribs.as_ptr(),
            )
        };

        if image.is_null() {
            return None;
        }

        Some(EglImage {
            handle: EglImageHandle {
                raw: image,
                bind_fn: self.image_target_texture_2d_oes,
            },
            display: raw_display(display),
            destroy_fn: self.destroy_image_khr,
        })
    }
}

/// Copyable reference to a live image, used to bind it against whatever texture is currently
/// bound to `GL_TEXTURE_2D` in the calling context. The owning [`EglImage`] is responsible for
/// destruction; this handle never outlives a poll call.
#[derive(Clone, Copy)]
pub(crate) struct EglImageHandle {
    raw: RawImage,
    bind_fn: PfnImageTargetTexture2dOes,
}

// The raw image handle is an opaque id valid across any context in the same EGL share group;
// only binding it requires a particular context to be current, which every caller already
// arranges (the host context, for `bind_to_current_texture_2d`).
unsafe impl Send for EglImageHandle {}
unsafe impl Sync for EglImageHandle {}

impl EglImageHandle {
    /// Binds this image against the texture currently bound to `GL_TEXTURE_2D`. Must be called
    /// with that texture bound and the desired context (the host's) current.
    pub(crate) fn bind_to_current_texture_2d(&self) {
        unsafe { (self.bind_fn)(GL_TEXTURE_2D, self.raw) };
    }
}

/// Owns one slot's shareable image. Created and destroyed on the render thread under the
/// producer context; its [`EglImageHandle`] may be read and bound from the host thread.
pub(crate) struct EglImage {
    handle: EglImageHandle,
    display: *const c_void,
    destroy_fn: PfnDestroyImageKhr,
}

unsafe impl Send for EglImage {}

impl EglImage {
    pub(crate) fn handle(&self) -> EglImageHandle {
        self.handle
    }

    /// Destroys the image. Must be called on the render thread under the producer context,
    /// after any fence protecting the slot's last render has already been waited on.
    pub(crate) fn destroy(self) {
        unsafe { (self.destroy_fn)(self.display, self.handle.raw) };
    }
}
