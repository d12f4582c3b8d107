//! Lock-free producer/consumer frame handoff (§4.4 of the design).

mod exchange;
mod slot;

pub(crate) use exchange::FrameExchange;

/// Number of slots in the triple buffer.
pub(crate) const SLOT_COUNT: usize = 3;

/// What the consumer gets back from a poll: either a real slot to sample or the cold-start /
/// resizing placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DisplaySlot {
    Placeholder,
    Slot { index: usize, seq: u64 },
}
