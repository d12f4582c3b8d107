//! The lock-free handoff itself: slot selection, sequence numbers, display protection.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::gl::GlApi;

use super::slot::SlotAtomics;
use super::{DisplaySlot, SLOT_COUNT};

/// Atomic state shared between the render thread (producer) and the host callback thread
/// (consumer). Per-slot `seq`/`fence` live in [`SlotAtomics`]; this struct holds the
/// cross-cutting sequence counters.
pub(crate) struct FrameExchange {
    slots: [SlotAtomics; SLOT_COUNT],
    producer_seq: AtomicU64,
    display_seq: AtomicU64,
    consumer_seq: AtomicU64,
}

impl FrameExchange {
    pub(crate) fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| SlotAtomics::new()),
            producer_seq: AtomicU64::new(1),
            display_seq: AtomicU64::new(0),
            consumer_seq: AtomicU64::new(0),
        }
    }

    /// Resets every sequence counter and slot to the cold-start epoch. Only valid to call while
    /// the pool is in its `resizing` window, with no concurrent producer/consumer access.
    pub(crate) fn reset_epoch(&self) {
        for slot in &self.slots {
            slot.reset();
        }
        self.producer_seq.store(1, Ordering::Relaxed);
        self.display_seq.store(0, Ordering::Relaxed);
        self.consumer_seq.store(0, Ordering::Relaxed);
    }

    /// Selects the producer's next write slot: any slot not currently displayed, preferring the
    /// one with the smallest `seq` (oldest frame). Destroys that slot's stale fence if present.
    ///
    /// Cold start (`display_seq == 0`, every slot's `seq == 0`) has nothing displayed yet, so
    /// every slot is a valid candidate — the producer may write any slot.
    ///
    /// Must be called from the render thread only.
    pub(crate) fn begin_write(&self, gl: &dyn GlApi) -> usize {
        let display_seq = self.display_seq.load(Ordering::Acquire);

        let index = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| display_seq == 0 || slot.seq.load(Ordering::Relaxed) != display_seq)
            .min_by_key(|(_, slot)| slot.seq.load(Ordering::Relaxed))
            .map(|(i, _)| i)
            .expect("N=3 slots always yield a non-displayed candidate");

        if let Some(stale) = self.slots[index].take_fence(Ordering::AcqRel) {
            gl.delete_sync(stale);
        }

        index
    }

    /// Publishes `index` as holding a freshly rendered frame: creates a render-done fence and
    /// assigns the next sequence number. Call only after the producer has flushed its render
    /// submission into the slot's FBO.
    ///
    /// Must be called from the render thread only.
    pub(crate) fn publish(&self, gl: &dyn GlApi, index: usize) -> u64 {
        gl.flush();

        if let Some(fence) = gl.fence_sync() {
            self.slots[index].store_fence(fence, Ordering::Relaxed);
        }

        let my_seq = self.producer_seq.fetch_add(1, Ordering::Relaxed);
        // Release: everything this thread wrote to the slot (including the fence store above)
        // becomes visible to a consumer that observes this seq with Acquire.
        self.slots[index].seq.store(my_seq, Ordering::Release);
        my_seq
    }

    /// Consumer poll: never blocks (fence waits use a zero timeout). Returns the slot the host
    /// should sample this poll, or a placeholder when nothing is ready yet.
    ///
    /// Must be called from the host callback thread only.
    pub(crate) fn poll(&self, gl: &dyn GlApi, resizing: bool) -> DisplaySlot {
        if resizing {
            return DisplaySlot::Placeholder;
        }

        let consumer_seq = self.consumer_seq.load(Ordering::Relaxed);
        let mut winner: Option<(usize, u64)> = None;

        for (i, slot) in self.slots.iter().enumerate() {
            let seq = slot.seq.load(Ordering::Acquire);
            if seq <= consumer_seq {
                continue;
            }
            let Some(fence) = slot.peek_fence(Ordering::Acquire) else {
                continue;
            };
            if !crate::gl::fence::poll_signaled(gl, fence) {
                continue;
            }
            if slot.clear_fence_if(fence) {
                gl.delete_sync(fence);
            }
            if winner.is_none_or(|(_, best_seq)| seq > best_seq) {
                winner = Some((i, seq));
            }
        }

        match winner {
            Some((index, seq)) => {
                self.consumer_seq.store(seq, Ordering::Relaxed);
                // Release: protects `index` from the producer before this call returns.
                self.display_seq.store(seq, Ordering::Release);
                DisplaySlot::Slot { index, seq }
            }
            None => self.current_display_slot(),
        }
    }

    /// Takes and clears slot `index`'s pending fence, if any. Used by `BufferPool::ensure` to
    /// wait out an in-flight render before destroying the slot it belongs to on resize.
    ///
    /// Must be called from the render thread only.
    pub(crate) fn take_pending_fence(&self, index: usize) -> Option<glow::Fence> {
        self.slots[index].take_fence(Ordering::AcqRel)
    }

    /// Cold-start / no-new-frame tie-break: the slot carrying the largest non-zero `seq`, if any.
    fn current_display_slot(&self) -> DisplaySlot {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.seq.load(Ordering::Relaxed) != 0)
            .max_by_key(|(_, slot)| slot.seq.load(Ordering::Relaxed))
            .map(|(index, slot)| DisplaySlot::Slot {
                index,
                seq: slot.seq.load(Ordering::Relaxed),
            })
            .unwrap_or(DisplaySlot::Placeholder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gl::test_support::FakeGl;

    #[test]
    fn cold_start_returns_placeholder() {
        let exchange = FrameExchange::new();
        let gl = FakeGl::new();
        assert_eq!(exchange.poll(&gl, false), DisplaySlot::Placeholder);
    }

    #[test]
    fn producer_never_overwrites_the_displayed_slot() {
        let exchange = FrameExchange::new();
        let gl = FakeGl::new();

        for _ in 0..5 {
            let index = exchange.begin_write(&gl);
            exchange.publish(&gl, index);
        }
        let shown = exchange.poll(&gl, false);
        let DisplaySlot::Slot { index: shown_index, seq: shown_seq } = shown else {
            panic!("expected a real slot after 5 publishes");
        };
        assert_eq!(shown_seq, 5);

        for _ in 0..20 {
            let index = exchange.begin_write(&gl);
            assert_ne!(
                index, shown_index,
                "producer selected the slot currently protected by display_seq"
            );
            exchange.publish(&gl, index);
        }
    }

    #[test]
    fn consumer_observes_monotonically_increasing_sequence() {
        let exchange = FrameExchange::new();
        let gl = FakeGl::new();

        let i1 = exchange.begin_write(&gl);
        exchange.publish(&gl, i1);
        let first = exchange.poll(&gl, false);
        let i2 = exchange.begin_write(&gl);
        exchange.publish(&gl, i2);
        let i3 = exchange.begin_write(&gl);
        exchange.publish(&gl, i3);
        let second = exchange.poll(&gl, false);

        let (DisplaySlot::Slot { seq: s1, .. }, DisplaySlot::Slot { seq: s2, .. }) =
            (first, second)
        else {
            panic!("expected real slots");
        };
        assert!(s2 > s1);
        assert_eq!(s2, 3);
    }

    #[test]
    fn resize_epoch_reset_restarts_sequence_at_one() {
        let exchange = FrameExchange::new();
        let gl = FakeGl::new();

        let i1 = exchange.begin_write(&gl);
        let seq1 = exchange.publish(&gl, i1);
        assert_eq!(seq1, 1);

        exchange.reset_epoch();
        assert_eq!(exchange.poll(&gl, false), DisplaySlot::Placeholder);

        let i2 = exchange.begin_write(&gl);
        let seq2 = exchange.publish(&gl, i2);
        assert_eq!(seq2, 1);
    }

    #[test]
    fn resizing_flag_yields_placeholder_even_with_frames_available() {
        let exchange = FrameExchange::new();
        let gl = FakeGl::new();
        let index = exchange.begin_write(&gl);
        exchange.publish(&gl, index);
        assert_eq!(exchange.poll(&gl, true), DisplaySlot::Placeholder);
    }
}
