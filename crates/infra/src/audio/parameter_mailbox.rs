//! Lock-free parameter handoff from the control thread to the audio thread
//!
//! Each parameter owns one atomic slot holding the bits of its latest raw
//! value, and a shared bit mask marks the slots written since the last drain.
//!
//! Performance characteristics:
//! - Wait-free for writers (one store, one `fetch_or`)
//! - Repeated writes to one parameter coalesce; the latest value wins
//! - The audio thread drains once per block and never takes a lock
//! - No allocations after construction

use crossbeam::utils::CachePadded;
use dcomp_core::ParamId;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{trace, warn};

/// Shared storage behind a [`ParameterSender`]/[`ParameterReceiver`] pair
pub struct ParameterMailbox {
    /// Raw values as `f32` bits, one per `ParamId`
    slots: [CachePadded<AtomicU32>; ParamId::COUNT],

    /// Bit `i` set when slot `i` holds a value not yet drained
    pending: CachePadded<AtomicU32>,
}

impl ParameterMailbox {
    fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| CachePadded::new(AtomicU32::new(0))),
            pending: CachePadded::new(AtomicU32::new(0)),
        }
    }

    /// Create a connected sender/receiver pair
    pub fn channel() -> (ParameterSender, ParameterReceiver) {
        let mailbox = Arc::new(Self::new());
        (
            ParameterSender {
                mailbox: Arc::clone(&mailbox),
            },
            ParameterReceiver { mailbox },
        )
    }

    #[inline]
    fn mask(id: ParamId) -> u32 {
        1 << id.index()
    }
}

/// Control-side endpoint; cheap to clone and share between threads
#[derive(Clone)]
pub struct ParameterSender {
    mailbox: Arc<ParameterMailbox>,
}

impl ParameterSender {
    /// Post a raw host value (display units) for the audio thread
    ///
    /// Non-finite values are rejected here so they never reach the audio
    /// thread. Returns whether the value was posted.
    pub fn on_parameter_changed(&self, id: ParamId, raw: f32) -> bool {
        if !raw.is_finite() {
            warn!(param = %id, raw, "Rejected non-finite parameter value");
            return false;
        }

        // Slot first, flag second: a drain that sees the flag sees the value
        self.mailbox.slots[id.index()].store(raw.to_bits(), Ordering::Release);
        self.mailbox
            .pending
            .fetch_or(ParameterMailbox::mask(id), Ordering::Release);
        trace!(param = %id, raw, "Parameter posted");
        true
    }

    /// Whether any posted value has not been drained yet
    pub fn has_pending(&self) -> bool {
        self.mailbox.pending.load(Ordering::Acquire) != 0
    }
}

/// Audio-side endpoint
pub struct ParameterReceiver {
    mailbox: Arc<ParameterMailbox>,
}

impl ParameterReceiver {
    /// Hand every pending value to `apply`, in `ParamId` order
    ///
    /// Returns the number of parameters delivered.
    #[inline]
    pub fn drain(&self, mut apply: impl FnMut(ParamId, f32)) -> usize {
        let mut pending = self.mailbox.pending.swap(0, Ordering::AcqRel);
        let mut delivered = 0;

        while pending != 0 {
            let index = pending.trailing_zeros() as usize;
            pending &= pending - 1;

            if let Some(id) = ParamId::from_index(index) {
                let bits = self.mailbox.slots[index].load(Ordering::Acquire);
                apply(id, f32::from_bits(bits));
                delivered += 1;
            }
        }

        delivered
    }

    pub fn has_pending(&self) -> bool {
        self.mailbox.pending.load(Ordering::Acquire) != 0
    }
}

/// Create a connected parameter sender/receiver pair
pub fn parameter_mailbox() -> (ParameterSender, ParameterReceiver) {
    ParameterMailbox::channel()
}
