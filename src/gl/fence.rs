//! GPU fence helpers shared by the producer (render-done fences) and `BufferPool` (resize
//! draining).

use log::warn;

use crate::gl::{FenceWaitResult, GlApi};

/// Non-blocking poll used on the consumer's hot path: `timeout = 0`. An unmet fence means "no
/// newer frame this poll", never an error.
pub fn poll_signaled(gl: &dyn GlApi, fence: glow::Fence) -> bool {
    matches!(
        gl.client_wait_sync_timeout(fence, 0),
        FenceWaitResult::AlreadySignaled | FenceWaitResult::ConditionSatisfied
    )
}

/// Blocking wait used only during `BufferPool::ensure`'s resize path: waits forever (subject to
/// the driver's own timeout semantics) so a slot can be safely destroyed.
pub fn wait_forever_then_delete(gl: &dyn GlApi, fence: glow::Fence) {
    gl.flush();
    match gl.client_wait_sync_timeout(fence, u64::MAX) {
        FenceWaitResult::WaitFailed => {
            warn!("fence wait failed during resize drain; destroying slot anyway")
        }
        _ => {}
    }
    gl.delete_sync(fence);
}
