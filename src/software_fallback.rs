//! CPU pixel buffer used when the hardware path cannot be initialized.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, warn};

use crate::config::SoftwareLimits;
use crate::decoder::{Decoder, RenderTarget};
use crate::host::TextureHost;

struct PixelBuffer {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

/// Single CPU pixel buffer guarded by a mutex, driven entirely from host-thread idle callbacks.
pub(crate) struct SoftwareFallback {
    buffer: Arc<Mutex<PixelBuffer>>,
    limits: SoftwareLimits,
    destroyed: Arc<AtomicBool>,
}

impl SoftwareFallback {
    pub(crate) fn new(limits: SoftwareLimits) -> Self {
        let capacity = (limits.max_width * limits.max_height * 4) as usize;
        Self {
            buffer: Arc::new(Mutex::new(PixelBuffer {
                data: vec![0; capacity],
                width: 0,
                height: 0,
            })),
            limits,
            destroyed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Clamps `(w, h)` to the configured software maxima, preserving aspect ratio.
    fn clamp(&self, width: u32, height: u32) -> (u32, u32) {
        if width <= self.limits.max_width && height <= self.limits.max_height {
            return (width.max(1), height.max(1));
        }
        let scale = (self.limits.max_width as f64 / width.max(1) as f64)
            .min(self.limits.max_height as f64 / height.max(1) as f64);
        (
            ((width as f64 * scale) as u32).max(1),
            ((height as f64 * scale) as u32).max(1),
        )
    }

    /// Handles a decoder "frame available" notification: schedules an idle callback on the
    /// host's UI loop. Must never touch GL or call into the host registrar directly from the
    /// decoder's thread.
    pub(crate) fn on_frame_available(
        &self,
        host: &Arc<dyn TextureHost>,
        decoder: &Arc<dyn Decoder>,
        requested_width: u32,
        requested_height: u32,
    ) {
        let destroyed = self.destroyed.clone();
        let host = host.clone();
        let decoder = decoder.clone();
        let buffer = self.buffer.clone();
        let (width, height) = self.clamp(requested_width, requested_height);

        host.schedule_idle(Box::new(move || {
            if destroyed.load(Ordering::Acquire) {
                return;
            }

            let mut guard = buffer.lock().expect("lock poisoned");
            guard.width = width;
            guard.height = height;
            let stride = width * 4;

            let render_result = decoder.render(RenderTarget::Software {
                width,
                height,
                stride,
                pointer: guard.data.as_mut_ptr(),
            });

            if let Err(err) = render_result {
                warn!("software render failed, keeping previous frame: {err}");
                return;
            }

            debug!("software frame rendered at {width}x{height}");
            host.notify_frame_available();
        }));
    }

    pub(crate) fn dispose(&self) {
        self.destroyed.store(true, Ordering::Release);
    }
}
