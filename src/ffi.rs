//! C ABI surface for `mpv_flutter_gl_bridge`.
//!
//! All exported symbols are `extern "C"` functions; structs are `#[repr(C)]`. The decoder and
//! host compositor are both supplied as vtables of C function pointers plus an opaque
//! `userdata`, since `Decoder`/`TextureHost` are Rust-side traits with no direct C
//! representation.

use std::ffi::c_void;
use std::sync::{Arc, Mutex};

use khronos_egl as egl;

use crate::config::{BridgeConfig, SoftwareLimits};
use crate::decoder::{Decoder, RenderTarget, VideoOutParams};
use crate::error::DecoderError;
use crate::host::TextureHost;
use crate::video_output::VideoOutput;

/// Decoder collaborator, supplied by the embedder at creation time.
///
/// `render_fbo`/`render_software`/`video_out_params` return 0 on success, non-zero on failure.
/// `set_update_callback` must arrange for `callback(callback_userdata)` to be invoked (from any
/// decoder-owned thread) whenever a new frame becomes available, and must stop invoking the
/// previous callback once replaced.
#[repr(C)]
pub struct DecoderVtable {
    pub userdata: *mut c_void,
    pub render_fbo: extern "C" fn(*mut c_void, fbo: u32, width: u32, height: u32) -> i32,
    pub render_software:
        extern "C" fn(*mut c_void, pointer: *mut u8, stride: u32, width: u32, height: u32) -> i32,
    pub video_out_params:
        extern "C" fn(*mut c_void, out_dw: *mut u32, out_dh: *mut u32, out_rotate: *mut u32) -> i32,
    pub set_update_callback: extern "C" fn(
        *mut c_void,
        callback: Option<extern "C" fn(*mut c_void)>,
        callback_userdata: *mut c_void,
    ),
}

// The embedder guarantees `userdata` is safe to use from whichever thread invokes these
// function pointers; that contract is the only thing making `FfiDecoder: Send + Sync` sound.
unsafe impl Send for DecoderVtable {}
unsafe impl Sync for DecoderVtable {}

/// Host compositor collaborator (Flutter's texture registrar, in production).
#[repr(C)]
pub struct HostVtable {
    pub userdata: *mut c_void,
    pub notify_frame_available: extern "C" fn(*mut c_void),
    pub notify_dimensions: extern "C" fn(*mut c_void, width: u32, height: u32),
    pub schedule_idle:
        extern "C" fn(*mut c_void, callback: extern "C" fn(*mut c_void), callback_userdata: *mut c_void),
}

unsafe impl Send for HostVtable {}
unsafe impl Sync for HostVtable {}

type UpdateClosure = Box<dyn Fn() + Send + Sync>;

struct FfiDecoder {
    vtable: DecoderVtable,
    update_closure: Mutex<Option<Box<UpdateClosure>>>,
}

extern "C" fn update_trampoline(userdata: *mut c_void) {
    if userdata.is_null() {
        return;
    }
    let closure = unsafe { &*(userdata as *const UpdateClosure) };
    closure();
}

impl Decoder for FfiDecoder {
    fn render(&self, target: RenderTarget) -> Result<(), DecoderError> {
        let code = match target {
            RenderTarget::Fbo { fbo, width, height } => {
                let name = fbo_name(fbo);
                (self.vtable.render_fbo)(self.vtable.userdata, name, width, height)
            }
            RenderTarget::Software {
                width,
                height,
                stride,
                pointer,
            } => (self.vtable.render_software)(self.vtable.userdata, pointer, stride, width, height),
        };

        if code == 0 {
            Ok(())
        } else {
            Err(DecoderError::RenderFailed { code })
        }
    }

    fn video_out_params(&self) -> Result<VideoOutParams, DecoderError> {
        let (mut dw, mut dh, mut rotate) = (0u32, 0u32, 0u32);
        let code = (self.vtable.video_out_params)(self.vtable.userdata, &mut dw, &mut dh, &mut rotate);
        if code != 0 {
            return Err(DecoderError::MissingProperty("video-out-params"));
        }
        Ok(VideoOutParams { dw, dh, rotate })
    }

    fn set_update_callback(&self, callback: Option<Box<dyn Fn() + Send + Sync>>) {
        let mut guard = self.update_closure.lock().expect("lock poisoned");
        *guard = callback.map(Box::new);

        let userdata = guard
            .as_deref()
            .map_or(std::ptr::null_mut(), |b| b as *const UpdateClosure as *mut c_void);
        let trampoline = guard.is_some().then_some(update_trampoline as extern "C" fn(*mut c_void));

        (self.vtable.set_update_callback)(self.vtable.userdata, trampoline, userdata);
    }
}

/// `RenderTarget::Fbo`'s `fbo` is a `glow::Framebuffer`, a thin newtype over the driver's
/// `GLuint`; the C side only ever deals in that raw name.
fn fbo_name(fbo: glow::Framebuffer) -> u32 {
    unsafe { std::mem::transmute_copy(&fbo) }
}

struct FfiHost {
    vtable: HostVtable,
}

extern "C" fn idle_trampoline(userdata: *mut c_void) {
    if userdata.is_null() {
        return;
    }
    let boxed = unsafe { Box::from_raw(userdata as *mut Box<dyn FnOnce() + Send>) };
    boxed();
}

impl TextureHost for FfiHost {
    fn notify_frame_available(&self) {
        (self.vtable.notify_frame_available)(self.vtable.userdata);
    }

    fn notify_dimensions(&self, width: u32, height: u32) {
        (self.vtable.notify_dimensions)(self.vtable.userdata, width, height);
    }

    fn schedule_idle(&self, callback: Box<dyn FnOnce() + Send>) {
        let raw = Box::into_raw(Box::new(callback)) as *mut c_void;
        (self.vtable.schedule_idle)(self.vtable.userdata, idle_trampoline, raw);
    }
}

/// Opaque handle returned to the embedder.
pub struct BridgeHandle {
    output: Arc<VideoOutput>,
}

/// Creates a bridge, attempting the hardware path lazily. Must be called on the thread that
/// currently has the host's EGL context active.
///
/// Returns null if libEGL could not be loaded.
#[unsafe(no_mangle)]
pub extern "C" fn mpv_flutter_gl_bridge_create(
    decoder_vtable: DecoderVtable,
    host_vtable: HostVtable,
    width: u32,
    height: u32,
    enable_hardware_acceleration: u8,
    max_software_width: u32,
    max_software_height: u32,
) -> *mut BridgeHandle {
    let Ok(instance) = (unsafe { egl::DynamicInstance::<egl::EGL1_4>::load() }) else {
        return std::ptr::null_mut();
    };

    let decoder = Arc::new(FfiDecoder {
        vtable: decoder_vtable,
        update_closure: Mutex::new(None),
    });
    let host = Arc::new(FfiHost { vtable: host_vtable });

    let config = BridgeConfig {
        width,
        height,
        enable_hardware_acceleration: enable_hardware_acceleration != 0,
        software_limits: SoftwareLimits {
            max_width: max_software_width.max(1),
            max_height: max_software_height.max(1),
        },
    };

    let output = VideoOutput::new(Arc::new(instance), decoder, host, config);
    Box::into_raw(Box::new(BridgeHandle { output }))
}

/// Registers the host's own GL loader, used to poll fences under the host's own context.
/// `loader` is called with a NUL-terminated function name; must be called once, from the host
/// thread, with the host context current.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mpv_flutter_gl_bridge_bind_host_gl(
    handle: *mut BridgeHandle,
    loader: extern "C" fn(*const std::ffi::c_char) -> *const c_void,
) {
    if handle.is_null() {
        return;
    }
    let handle = unsafe { &*handle };
    handle.output.bind_host_gl(|name| {
        let Ok(cname) = std::ffi::CString::new(name) else {
            return std::ptr::null();
        };
        loader(cname.as_ptr())
    });
}

/// Updates the fixed output dimensions (0, 0 means "follow the decoder").
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mpv_flutter_gl_bridge_set_dimensions(
    handle: *mut BridgeHandle,
    width: u32,
    height: u32,
) {
    if handle.is_null() {
        return;
    }
    unsafe { &*handle }.output.set_dimensions(width, height);
}

/// Returns the opaque texture id the embedder should register with the compositor.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mpv_flutter_gl_bridge_texture_id(handle: *mut BridgeHandle) -> u64 {
    if handle.is_null() {
        return 0;
    }
    unsafe { &*handle }.output.texture_id()
}

/// Non-blocking poll for the texture the host should currently sample. Always returns `true`
/// with a valid texture name: a dummy 1x1 placeholder when no real frame is ready yet (cold
/// start, a resize in flight, or the hardware path unavailable).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mpv_flutter_gl_bridge_poll_texture(
    handle: *mut BridgeHandle,
    out_target: *mut u32,
    out_name: *mut u32,
    out_width: *mut u32,
    out_height: *mut u32,
) -> bool {
    if handle.is_null() {
        return false;
    }
    let texture = (unsafe { &*handle }).output.poll_texture();

    unsafe {
        *out_target = texture.target;
        *out_name = texture.name;
        *out_width = texture.width;
        *out_height = texture.height;
    }
    true
}

/// Destroys a bridge created by `mpv_flutter_gl_bridge_create`, tearing down the hardware path
/// on its render thread.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mpv_flutter_gl_bridge_destroy(handle: *mut BridgeHandle) {
    if handle.is_null() {
        return;
    }
    let handle = unsafe { Box::from_raw(handle) };
    handle.output.dispose();
}
