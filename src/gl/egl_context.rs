//! ### English
//! Producer EGL context: discovery, activation and host-state save/restore.
//!
//! ### 中文
//! 生产者 EGL 上下文：发现、激活以及宿主状态的保存/恢复。

use std::sync::Arc;

use khronos_egl as egl;
use log::warn;

use crate::error::GlContextError;

/// Host EGL state captured once at construction time, used to create a context that shares
/// objects with the host and, on every activation, to restore the host's own current state.
#[derive(Clone, Copy)]
pub struct HostEglState {
    pub display: egl::Display,
    pub context: egl::Context,
    pub draw_surface: Option<egl::Surface>,
    pub read_surface: Option<egl::Surface>,
}

// EGL handles are opaque ids valid process-wide; only *activation* (`make_current`) is
// thread-affine, which every caller already goes through `GlContext::with_active`.
unsafe impl Send for HostEglState {}
unsafe impl Sync for HostEglState {}

/// Snapshot of "what is current right now", captured before an activation and restored after.
struct CurrentState {
    context: Option<egl::Context>,
    draw: Option<egl::Surface>,
    read: Option<egl::Surface>,
}

enum Drawable {
    Pbuffer(egl::Surface),
    Surfaceless,
}

/// Owns the producer EGL context and (if created) its pbuffer drawable.
///
/// Does not own the host's `display`/`context`/surfaces — only the two resources this
/// component creates for itself.
pub struct GlContext {
    instance: Arc<egl::DynamicInstance<egl::EGL1_4>>,
    host: HostEglState,
    config: egl::Config,
    context: egl::Context,
    drawable: Drawable,
}

const ES3_WINDOW_PBUFFER: &[i32] = &[
    egl::SURFACE_TYPE as i32,
    (egl::WINDOW_BIT | egl::PBUFFER_BIT) as i32,
    egl::RENDERABLE_TYPE as i32,
    0x0040, // EGL_OPENGL_ES3_BIT
    egl::NONE as i32,
];

const ES2_WINDOW_PBUFFER: &[i32] = &[
    egl::SURFACE_TYPE as i32,
    (egl::WINDOW_BIT | egl::PBUFFER_BIT) as i32,
    egl::RENDERABLE_TYPE as i32,
    egl::OPENGL_ES2_BIT as i32,
    egl::NONE as i32,
];

const PBUFFER_ONLY: &[i32] = &[
    egl::SURFACE_TYPE as i32,
    egl::PBUFFER_BIT as i32,
    egl::RENDERABLE_TYPE as i32,
    egl::OPENGL_ES2_BIT as i32,
    egl::NONE as i32,
];

impl GlContext {
    /// Creates the producer context, sharing GL objects with `host`.
    ///
    /// Must be called from the render thread: it makes the new context current in order to
    /// probe it, then restores whatever was current before.
    pub fn new(
        instance: Arc<egl::DynamicInstance<egl::EGL1_4>>,
        host: HostEglState,
    ) -> Result<Self, GlContextError> {
        instance
            .bind_api(egl::OPENGL_ES_API)
            .map_err(|e| GlContextError::BindApi(e.to_string()))?;

        let host_config_id = instance
            .query_context(host.context, egl::CONFIG_ID)
            .ok();

        let config = Self::choose_config(&instance, host.display, host_config_id)?;
        let (drawable, drawable_kind) = Self::create_drawable(&instance, host.display, config)?;
        let context = Self::create_context(&instance, host.display, config, host.context)?;

        let mut this = Self {
            instance,
            host,
            config,
            context,
            drawable,
        };

        // Probe-activate once so a broken context/drawable fails fast at construction rather
        // than on the first real render task.
        this.with_active(|_| Ok::<(), GlContextError>(()))
            .map_err(|e| GlContextError::Activation(format!("{e} (drawable={drawable_kind})")))?;

        Ok(this)
    }

    fn choose_config(
        instance: &egl::DynamicInstance<egl::EGL1_4>,
        display: egl::Display,
        host_config_id: Option<i32>,
    ) -> Result<egl::Config, GlContextError> {
        let mut attempted = Vec::new();

        if let Some(id) = host_config_id {
            let attribs = [egl::CONFIG_ID as i32, id, egl::NONE as i32];
            if let Ok(Some(config)) = instance.choose_config(display, &attribs, 1) {
                return Ok(config);
            }
            attempted.push(format!("exact host config id {id}"));
        }

        for (label, attribs) in [
            ("ES3 window+pbuffer", ES3_WINDOW_PBUFFER),
            ("ES2 window+pbuffer", ES2_WINDOW_PBUFFER),
            ("pbuffer-only ES2", PBUFFER_ONLY),
        ] {
            match instance.choose_config(display, attribs, 1) {
                Ok(Some(config)) => return Ok(config),
                _ => attempted.push(label.to_string()),
            }
        }

        Err(GlContextError::ConfigSelection { attempted })
    }

    fn create_drawable(
        instance: &egl::DynamicInstance<egl::EGL1_4>,
        display: egl::Display,
        config: egl::Config,
    ) -> Result<(Drawable, &'static str), GlContextError> {
        let pbuffer_attribs = [
            egl::WIDTH as i32,
            1,
            egl::HEIGHT as i32,
            1,
            egl::NONE as i32,
        ];

        match instance.create_pbuffer_surface(display, config, &pbuffer_attribs) {
            Ok(surface) => Ok((Drawable::Pbuffer(surface), "pbuffer")),
            Err(err) => {
                warn!("pbuffer drawable creation failed, falling back to surfaceless: {err}");
                Ok((Drawable::Surfaceless, "surfaceless"))
            }
        }
    }

    fn create_context(
        instance: &egl::DynamicInstance<egl::EGL1_4>,
        display: egl::Display,
        config: egl::Config,
        share_with: egl::Context,
    ) -> Result<egl::Context, GlContextError> {
        let mut attempted_apis = Vec::new();

        let es2_attribs = [egl::CONTEXT_CLIENT_VERSION as i32, 2, egl::NONE as i32];
        match instance.create_context(display, config, Some(share_with), &es2_attribs) {
            Ok(ctx) => return Ok(ctx),
            Err(_) => attempted_apis.push("ES2"),
        }

        let es3_attribs = [egl::CONTEXT_CLIENT_VERSION as i32, 3, egl::NONE as i32];
        match instance.create_context(display, config, Some(share_with), &es3_attribs) {
            Ok(ctx) => Ok(ctx),
            Err(err) => {
                attempted_apis.push("ES3");
                Err(GlContextError::ContextCreation {
                    attempted_apis,
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Saves host state, activates this context, runs `f`, then restores host state.
    ///
    /// `make_current(NO_SURFACE)` is only valid for surfaceless drawables; the pbuffer path
    /// always passes the real surface.
    pub fn with_active<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, GlContextError>,
    ) -> Result<T, GlContextError> {
        let saved = self.snapshot_current();

        self.activate_self()
            .map_err(GlContextError::Activation)?;

        let result = f(self);

        self.restore(saved);
        result
    }

    fn snapshot_current(&self) -> CurrentState {
        CurrentState {
            context: self.instance.get_current_context(),
            draw: self.instance.get_current_surface(egl::DRAW),
            read: self.instance.get_current_surface(egl::READ),
        }
    }

    fn activate_self(&self) -> Result<(), String> {
        let (draw, read) = match self.drawable {
            Drawable::Pbuffer(surface) => (Some(surface), Some(surface)),
            Drawable::Surfaceless => (None, None),
        };
        self.instance
            .make_current(self.host.display, draw, read, Some(self.context))
            .map_err(|e| e.to_string())
    }

    fn restore(&self, saved: CurrentState) {
        if self
            .instance
            .make_current(self.host.display, saved.draw, saved.read, saved.context)
            .is_err()
        {
            warn!("failed to restore host EGL state after producer activation");
        }
    }

    pub fn config(&self) -> egl::Config {
        self.config
    }

    pub fn raw_context(&self) -> egl::Context {
        self.context
    }

    pub fn host(&self) -> &HostEglState {
        &self.host
    }
}

impl Drop for GlContext {
    fn drop(&mut self) {
        if let Drawable::Pbuffer(surface) = self.drawable {
            let _ = self.instance.destroy_surface(self.host.display, surface);
        }
        let _ = self.instance.destroy_context(self.host.display, self.context);
    }
}
