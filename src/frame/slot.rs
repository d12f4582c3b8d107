use std::sync::atomic::{AtomicU64, Ordering};

use crate::cache::pad_after2;

const SEQ_FENCE_PAD_BYTES: usize = pad_after2::<AtomicU64, AtomicU64>();

/// One triple-buffer slot's cross-thread state.
///
/// `fence` stores the raw GL sync handle cast to `u64` (0 = none) rather than `Option<glow::Fence>`
/// directly, so it can live in an atomic alongside `seq` without a lock.
#[repr(C, align(64))]
pub(crate) struct SlotAtomics {
    pub(crate) seq: AtomicU64,
    pub(crate) fence: AtomicU64,
    _pad: [u8; SEQ_FENCE_PAD_BYTES],
}

impl SlotAtomics {
    pub(crate) fn new() -> Self {
        Self {
            seq: AtomicU64::new(0),
            fence: AtomicU64::new(0),
            _pad: [0; SEQ_FENCE_PAD_BYTES],
        }
    }

    /// Takes the current fence handle unconditionally, leaving the slot's fence cleared.
    pub(crate) fn take_fence(&self, order: Ordering) -> Option<glow::Fence> {
        let raw = self.fence.swap(0, order);
        raw_to_fence(raw)
    }

    /// Reads the current fence handle without clearing it.
    pub(crate) fn peek_fence(&self, order: Ordering) -> Option<glow::Fence> {
        raw_to_fence(self.fence.load(order))
    }

    /// Clears the fence iff it still equals `fence` (guards against a concurrent producer
    /// having already replaced it with a newer one).
    pub(crate) fn clear_fence_if(&self, fence: glow::Fence) -> bool {
        let raw = fence_to_raw(fence);
        self.fence
            .compare_exchange(raw, 0, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    pub(crate) fn store_fence(&self, fence: glow::Fence, order: Ordering) {
        self.fence.store(fence_to_raw(fence), order);
    }

    pub(crate) fn reset(&self) {
        self.seq.store(0, Ordering::Relaxed);
        self.fence.store(0, Ordering::Relaxed);
    }
}

/// Reinterprets a `glow::Fence` as the `u64` stored in the slot's atomic.
///
/// `glow::Fence` is a thin newtype over the platform's native sync handle; the cast mirrors how
/// a raw `GLsync` pointer would be packed into a 64-bit slot.
fn fence_to_raw(fence: glow::Fence) -> u64 {
    unsafe { std::mem::transmute_copy(&fence) }
}

fn raw_to_fence(raw: u64) -> Option<glow::Fence> {
    if raw == 0 {
        None
    } else {
        Some(unsafe { std::mem::transmute_copy(&raw) })
    }
}
