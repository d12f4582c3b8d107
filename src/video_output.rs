//! Orchestrator: owns the decoder render session, dispatches frame-ready callbacks onto the
//! render thread, routes dimension changes, and chooses the hardware vs. software path.

use std::cell::RefCell;
use std::ffi::c_void;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use khronos_egl as egl;
use log::{debug, error, warn};

use crate::buffer_pool::BufferPool;
use crate::config::BridgeConfig;
use crate::decoder::{Decoder, RenderTarget};
use crate::error::BridgeError;
use crate::frame::{DisplaySlot, FrameExchange, SLOT_COUNT};
use crate::gl::egl_context::{GlContext, HostEglState};
use crate::gl::egl_image::EglImageFns;
use crate::gl::{GlApi, GlowApi};
use crate::host::{PolledTexture, TextureHost};
use crate::render_thread::RenderThread;
use crate::software_fallback::SoftwareFallback;

/// Render-thread-confined hardware resources. Only ever touched from inside a closure the
/// render thread itself runs, via the `PRODUCER` thread-local below — mirroring how the
/// teacher keeps its shared GL context behind a per-thread `Cell` rather than sending it.
struct ProducerState {
    gl_context: GlContext,
    api: Rc<GlowApi>,
    image_fns: Option<EglImageFns>,
}

thread_local! {
    static PRODUCER: RefCell<Option<ProducerState>> = const { RefCell::new(None) };
    static HOST_GL: RefCell<Option<Rc<GlowApi>>> = const { RefCell::new(None) };
    static HOST_DUMMY_TEXTURE: RefCell<Option<glow::Texture>> = const { RefCell::new(None) };
    static HOST_IMAGE_CACHE: RefCell<(u64, [Option<glow::Texture>; SLOT_COUNT])> =
        RefCell::new((0, [None; SLOT_COUNT]));
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Created,
    HwReady,
    SwReady,
    Destroyed,
}

/// Orchestrator for one decoder/texture pairing. The crate's FFI layer hands out one `Arc` of
/// this per registered texture.
pub struct VideoOutput {
    state: Mutex<State>,
    config: BridgeConfig,
    host_egl: Option<HostEglState>,
    egl_instance: Arc<egl::DynamicInstance<egl::EGL1_4>>,
    render_thread: Arc<RenderThread>,
    frame_exchange: FrameExchange,
    buffer_pool: BufferPool,
    decoder: Arc<dyn Decoder>,
    host: Arc<dyn TextureHost>,
    software: SoftwareFallback,
    destroyed: Arc<AtomicBool>,
    dimensions: Mutex<(u32, u32)>,
}

impl VideoOutput {
    /// Creates a new orchestrator. Must be called on the thread that currently has the host's
    /// EGL context active — this is the only point at which the host's display/context/surface
    /// handles are captured for sharing.
    pub fn new(
        egl_instance: Arc<egl::DynamicInstance<egl::EGL1_4>>,
        decoder: Arc<dyn Decoder>,
        host: Arc<dyn TextureHost>,
        config: BridgeConfig,
    ) -> Arc<Self> {
        let config = config.normalized();
        let host_egl = capture_host_egl_state(&egl_instance);
        if host_egl.is_none() {
            warn!("no host EGL context current at construction; hardware path disabled");
        }

        let render_thread = RenderThread::spawn("mpv-flutter-gl-render");
        let software = SoftwareFallback::new(config.software_limits);

        let initial_dimensions = if config.auto_dimensions() {
            (1, 1)
        } else {
            (config.width, config.height)
        };

        let this = Arc::new(Self {
            state: Mutex::new(State::Created),
            config,
            host_egl,
            egl_instance,
            render_thread,
            frame_exchange: FrameExchange::new(),
            buffer_pool: BufferPool::new(),
            decoder: decoder.clone(),
            host: host.clone(),
            software,
            destroyed: Arc::new(AtomicBool::new(false)),
            dimensions: Mutex::new(initial_dimensions),
        });

        host.notify_dimensions(1, 1);

        let weak = Arc::downgrade(&this);
        decoder.set_update_callback(Some(Box::new(move || {
            if let Some(this) = weak.upgrade() {
                this.on_frame_available();
            }
        })));

        this
    }

    /// Registers the host's own GL loader so `poll_texture` can drive fence polls under the
    /// host's context. Call once, from the host thread, with the host context current.
    pub fn bind_host_gl(&self, loader: impl FnMut(&str) -> *const c_void) {
        let gl = unsafe { glow::Context::from_loader_function(loader) };
        HOST_GL.with(|cell| *cell.borrow_mut() = Some(Rc::new(GlowApi::new(Rc::new(gl)))));
    }

    /// Updates the fixed dimensions (0 means "follow the decoder"). Clamped in software mode.
    pub fn set_dimensions(self: &Arc<Self>, width: u32, height: u32) {
        *self.dimensions.lock().expect("lock poisoned") = (width, height);
    }

    fn on_frame_available(self: &Arc<Self>) {
        if self.destroyed.load(Ordering::Acquire) {
            return;
        }

        let (width, height) = self.resolve_dimensions();
        let this = self.clone();
        let _ = self.render_thread.post(move || this.render_one_frame(width, height));
    }

    /// Fixed-size mode reads back the same mutable `dimensions` state `set_dimensions` writes,
    /// so a runtime override actually takes effect instead of being shadowed by the frozen
    /// construction-time config.
    fn resolve_dimensions(&self) -> (u32, u32) {
        if !self.config.auto_dimensions() {
            return *self.dimensions.lock().expect("lock poisoned");
        }
        match self.decoder.video_out_params() {
            Ok(params) => {
                let (w, h) = params.display_size();
                *self.dimensions.lock().expect("lock poisoned") = (w, h);
                self.host.notify_dimensions(w, h);
                (w, h)
            }
            Err(err) => {
                warn!("failed to query decoder dimensions: {err}");
                *self.dimensions.lock().expect("lock poisoned")
            }
        }
    }

    /// Lazily creates the producer GL context on first use. Runs on the render thread
    /// (`post_and_wait` inlines if already there).
    fn ensure_hw_ready(self: &Arc<Self>) -> Result<(), BridgeError> {
        {
            let state = self.state.lock().expect("lock poisoned");
            match *state {
                State::HwReady => return Ok(()),
                State::SwReady | State::Destroyed => {
                    return Err(BridgeError::Hardware("hardware path already abandoned".into()));
                }
                State::Created => {}
            }
        }

        if !self.config.enable_hardware_acceleration {
            *self.state.lock().expect("lock poisoned") = State::SwReady;
            return Err(BridgeError::Hardware("hardware acceleration disabled by config".into()));
        }

        let Some(host_egl) = self.host_egl else {
            *self.state.lock().expect("lock poisoned") = State::SwReady;
            return Err(BridgeError::Hardware("no host EGL state captured".into()));
        };

        let instance = self.egl_instance.clone();
        let result = self
            .render_thread
            .post_and_wait(move || init_producer(instance, host_egl));

        let mut state = self.state.lock().expect("lock poisoned");
        match result {
            Ok(()) => {
                *state = State::HwReady;
                Ok(())
            }
            Err(err) => {
                *state = State::SwReady;
                Err(err.into())
            }
        }
    }

    fn render_one_frame(self: &Arc<Self>, width: u32, height: u32) {
        if self.destroyed.load(Ordering::Acquire) {
            return;
        }

        if let Err(err) = self.ensure_hw_ready() {
            warn!("hardware path unavailable, falling back to software: {err}");
            self.software
                .on_frame_available(&self.host, &self.decoder, width, height);
            return;
        }

        let outcome = PRODUCER.with(|cell| {
            let mut guard = cell.borrow_mut();
            let producer = guard.as_mut().expect("producer initialized by ensure_hw_ready");
            let gl = producer.api.clone();
            let image_fns = producer.image_fns;
            let display = producer.gl_context.host().display;
            let context = producer.gl_context.raw_context();

            producer.gl_context.with_active(|_ctx| {
                let image_ctx = image_fns.as_ref().map(|fns| (fns, display, context));
                self.buffer_pool.ensure(
                    &*gl,
                    width,
                    height,
                    |i| self.frame_exchange.take_pending_fence(i),
                    || self.frame_exchange.reset_epoch(),
                    image_ctx,
                )?;

                let index = self.frame_exchange.begin_write(&*gl);
                self.buffer_pool.bind_for_write(&*gl, index);
                let fbo = self.buffer_pool.fbo_for(index);

                Ok((gl, index, fbo))
            })
        });

        let (gl, index, fbo) = match outcome {
            Ok(tuple) => tuple,
            Err(err) => {
                error!("producer activation failed during render: {err}");
                return;
            }
        };

        let render_result = self.decoder.render(RenderTarget::Fbo { fbo, width, height });
        if let Err(err) = render_result {
            debug!("discarding frame: decoder render failed: {err}");
            return;
        }

        self.frame_exchange.publish(&*gl, index);
        self.host.notify_frame_available();
    }

    /// Returns an opaque identifier the host uses to refer to this output's texture.
    pub fn texture_id(self: &Arc<Self>) -> u64 {
        Arc::as_ptr(self) as u64
    }

    /// Consumer poll: always returns a valid texture to sample, falling back to a lazily
    /// created 1x1 placeholder when no real frame is ready yet (cold start, a resize in flight,
    /// or the hardware path unavailable). Never blocks. Must be called with `bind_host_gl`
    /// already having run on this thread.
    pub fn poll_texture(self: &Arc<Self>) -> PolledTexture {
        let (width, height) = *self.dimensions.lock().expect("lock poisoned");
        let target = glow::TEXTURE_2D;

        let Some(gl) = HOST_GL.with(|cell| cell.borrow().clone()) else {
            error!("poll_texture called before bind_host_gl; no host GL context available");
            return PolledTexture { target, name: 0, width, height };
        };

        let is_hw_ready = *self.state.lock().expect("lock poisoned") == State::HwReady;
        let slot = if is_hw_ready {
            self.frame_exchange.poll(&*gl, self.buffer_pool.is_resizing())
        } else {
            DisplaySlot::Placeholder
        };

        let name = match slot {
            DisplaySlot::Placeholder => texture_name(dummy_texture(&gl)),
            DisplaySlot::Slot { index, .. } => texture_name(self.bind_host_texture_for_slot(&gl, index)),
        };

        PolledTexture { target, name, width, height }
    }

    /// Binds slot `index`'s shareable image against a host-owned texture (creating and caching
    /// one on first use), or, if the driver lacks image support, returns the producer's texture
    /// name directly — still valid to sample since both contexts share one EGL share group.
    /// The cache is keyed by `BufferPool`'s generation counter, so a resize invalidates it.
    fn bind_host_texture_for_slot(&self, gl: &GlowApi, index: usize) -> glow::Texture {
        let Some(image) = self.buffer_pool.image_for(index) else {
            return self.buffer_pool.texture_for(index);
        };

        HOST_IMAGE_CACHE.with(|cell| {
            let mut cache = cell.borrow_mut();
            let generation = self.buffer_pool.generation();
            if cache.0 != generation {
                cache.1 = [None; SLOT_COUNT];
                cache.0 = generation;
            }

            if let Some(texture) = cache.1[index] {
                return texture;
            }

            let texture = gl.gen_texture();
            gl.bind_texture_2d(Some(texture));
            image.bind_to_current_texture_2d();
            gl.tex_parameters_linear_clamp();
            gl.bind_texture_2d(None);

            cache.1[index] = Some(texture);
            texture
        })
    }

    /// Marks this output destroyed, clears the decoder callback, tears down the hardware path
    /// on the render thread, and joins it.
    pub fn dispose(self: &Arc<Self>) {
        self.destroyed.store(true, Ordering::Release);
        self.decoder.set_update_callback(None);
        self.software.dispose();

        let was_hw_ready = {
            let mut state = self.state.lock().expect("lock poisoned");
            let was_ready = *state == State::HwReady;
            *state = State::Destroyed;
            was_ready
        };

        if was_hw_ready {
            let this = self.clone();
            self.render_thread.post_and_wait(move || {
                PRODUCER.with(|cell| {
                    if let Some(producer) = cell.borrow_mut().take() {
                        this.buffer_pool.destroy_all(&*producer.api);
                    }
                });
            });
        }

        self.render_thread.request_shutdown();
        debug!("video output disposed");
    }
}

fn init_producer(
    instance: Arc<egl::DynamicInstance<egl::EGL1_4>>,
    host_egl: HostEglState,
) -> Result<(), crate::error::GlContextError> {
    let gl_context = GlContext::new(instance.clone(), host_egl)?;

    let glow_ctx = unsafe {
        glow::Context::from_loader_function(|name| {
            instance
                .get_proc_address(name)
                .map(|f| f as *const c_void)
                .unwrap_or(std::ptr::null())
        })
    };
    let api = Rc::new(GlowApi::new(Rc::new(glow_ctx)));

    let image_fns = EglImageFns::load(&instance);
    if image_fns.is_none() {
        warn!("KHR_image_base/OES_EGL_image unavailable; sharing slot textures by name instead");
    }

    PRODUCER.with(|cell| {
        *cell.borrow_mut() = Some(ProducerState { gl_context, api, image_fns });
    });

    Ok(())
}

fn capture_host_egl_state(
    instance: &egl::DynamicInstance<egl::EGL1_4>,
) -> Option<HostEglState> {
    let display = instance.get_current_display()?;
    let context = instance.get_current_context()?;
    let draw_surface = instance.get_current_surface(egl::DRAW);
    let read_surface = instance.get_current_surface(egl::READ);
    Some(HostEglState {
        display,
        context,
        draw_surface,
        read_surface,
    })
}

/// Lazily creates (and caches, per host thread) a 1x1 placeholder texture for polls with
/// nothing real to show yet.
fn dummy_texture(gl: &GlowApi) -> glow::Texture {
    HOST_DUMMY_TEXTURE.with(|cell| {
        let mut cell = cell.borrow_mut();
        if let Some(texture) = *cell {
            return texture;
        }
        let texture = gl.gen_texture();
        gl.bind_texture_2d(Some(texture));
        gl.tex_image_2d_rgba8(1, 1);
        gl.tex_parameters_linear_clamp();
        gl.bind_texture_2d(None);
        *cell = Some(texture);
        texture
    })
}

/// `glow::Texture` is a thin newtype over the driver's `GLuint` name; this extracts it for the
/// host-facing polled-texture callback.
fn texture_name(texture: glow::Texture) -> u32 {
    unsafe { std::mem::transmute_copy(&texture) }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use super::*;
    use crate::decoder::fake::FakeDecoder;
    use crate::host::recording::RecordingHost;

    /// No EGL context is current in a test process, so `VideoOutput::new` always falls back to
    /// software. `egl::DynamicInstance::load()` itself can fail outright on a machine with no
    /// libEGL at all (no GPU, no software rasterizer) — skip rather than fail in that case,
    /// since it says nothing about the code under test.
    fn new_output(decoder: Arc<FakeDecoder>, host: Arc<RecordingHost>, config: BridgeConfig) -> Option<Arc<VideoOutput>> {
        let instance = egl::DynamicInstance::<egl::EGL1_4>::load().ok()?;
        Some(VideoOutput::new(Arc::new(instance), decoder, host, config))
    }

    fn wait_for<F: Fn() -> bool>(check: F) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !check() {
            if Instant::now() > deadline {
                panic!("condition never became true");
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    /// Drains `host`'s idle queue on a tight loop until `frame_available_count` moves, since the
    /// software path schedules its render asynchronously from the render thread.
    fn wait_for_software_frame(host: &RecordingHost) {
        wait_for(|| {
            host.drain_idle_callbacks();
            *host.frame_available_count.lock().unwrap() > 0
        });
    }

    #[test]
    fn construction_registers_a_one_by_one_placeholder_size() {
        let decoder = Arc::new(FakeDecoder::new(1920, 1080, 0));
        let host = Arc::new(RecordingHost::new());
        let Some(_output) = new_output(decoder, host.clone(), BridgeConfig::default()) else {
            return;
        };
        assert_eq!(*host.dimensions.lock().unwrap(), vec![(1, 1)]);
    }

    #[test]
    fn no_host_egl_current_falls_back_to_software_and_still_delivers_a_frame() {
        let decoder = Arc::new(FakeDecoder::new(640, 360, 0));
        let host = Arc::new(RecordingHost::new());
        let Some(output) = new_output(decoder.clone(), host.clone(), BridgeConfig::default()) else {
            return;
        };

        decoder.signal_frame_available();
        wait_for_software_frame(&host);

        // the hardware path never engaged: poll_texture falls back to the null placeholder
        // since bind_host_gl was never called on this thread.
        assert_eq!(output.poll_texture().name, 0);
    }

    #[test]
    fn rotated_dimensions_are_swapped_before_being_reported() {
        let decoder = Arc::new(FakeDecoder::new(1080, 1920, 90));
        let host = Arc::new(RecordingHost::new());
        let Some(output) = new_output(decoder, host.clone(), BridgeConfig::default()) else {
            return;
        };

        let (w, h) = output.resolve_dimensions();
        assert_eq!((w, h), (1920, 1080));
    }

    #[test]
    fn fixed_dimensions_ignore_the_decoders_reported_size() {
        let decoder = Arc::new(FakeDecoder::new(3840, 2160, 0));
        let host = Arc::new(RecordingHost::new());
        let config = BridgeConfig {
            width: 320,
            height: 240,
            ..BridgeConfig::default()
        };
        let Some(output) = new_output(decoder, host, config) else {
            return;
        };

        assert_eq!(output.resolve_dimensions(), (320, 240));
    }

    #[test]
    fn set_dimensions_overrides_the_fixed_size_at_runtime() {
        let decoder = Arc::new(FakeDecoder::new(3840, 2160, 0));
        let host = Arc::new(RecordingHost::new());
        let config = BridgeConfig {
            width: 320,
            height: 240,
            ..BridgeConfig::default()
        };
        let Some(output) = new_output(decoder, host, config) else {
            return;
        };

        output.set_dimensions(640, 480);
        assert_eq!(output.resolve_dimensions(), (640, 480));
    }

    #[test]
    fn dispose_stops_further_frame_delivery() {
        let decoder = Arc::new(FakeDecoder::new(640, 360, 0));
        let host = Arc::new(RecordingHost::new());
        let Some(output) = new_output(decoder.clone(), host.clone(), BridgeConfig::default()) else {
            return;
        };

        output.dispose();
        let before = *host.frame_available_count.lock().unwrap();
        decoder.signal_frame_available();
        std::thread::sleep(Duration::from_millis(50));
        host.drain_idle_callbacks();
        assert_eq!(*host.frame_available_count.lock().unwrap(), before);
    }

    #[test]
    fn software_path_delivers_a_frame_for_a_request_above_the_configured_limit() {
        let decoder = Arc::new(FakeDecoder::new(7680, 4320, 0));
        let host = Arc::new(RecordingHost::new());
        let config = BridgeConfig {
            software_limits: crate::config::SoftwareLimits {
                max_width: 1280,
                max_height: 720,
            },
            ..BridgeConfig::default()
        };
        let Some(_output) = new_output(decoder.clone(), host.clone(), config) else {
            return;
        };

        decoder.signal_frame_available();
        wait_for_software_frame(&host);
    }
}
