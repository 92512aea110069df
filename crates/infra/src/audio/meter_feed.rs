//! Lossy meter feed from the audio thread to a visualization consumer
//!
//! Backed by a bounded crossbeam channel. The publishing side never blocks
//! or logs: when the consumer falls behind, frames are dropped and counted,
//! and the receiver reports the loss on its next drain.

use crossbeam::channel::{bounded, Receiver, Sender};
use crossbeam::utils::CachePadded;
use dcomp_core::{GainCurve, MeterFrame, MeterSink};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Message carried by the feed
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MeterEvent {
    Frame(MeterFrame),
    CurveChanged(GainCurve),
}

/// Create a connected publisher/receiver pair holding at most `capacity` events
pub fn meter_feed(capacity: usize) -> (MeterPublisher, MeterReceiver) {
    let (sender, receiver) = bounded(capacity.max(1));
    let dropped = Arc::new(CachePadded::new(AtomicU64::new(0)));
    debug!(capacity, "Meter feed created");
    (
        MeterPublisher {
            sender,
            dropped: Arc::clone(&dropped),
        },
        MeterReceiver {
            receiver,
            dropped,
            reported_dropped: 0,
            latest: None,
            curve: None,
        },
    )
}

/// Audio-side end of the feed, installed as the router's [`MeterSink`]
pub struct MeterPublisher {
    sender: Sender<MeterEvent>,
    dropped: Arc<CachePadded<AtomicU64>>,
}

impl MeterPublisher {
    fn publish(&mut self, event: MeterEvent) {
        if self.sender.try_send(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Frames lost so far
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl MeterSink for MeterPublisher {
    fn on_meter(&mut self, frame: MeterFrame) {
        self.publish(MeterEvent::Frame(frame));
    }

    fn on_curve_changed(&mut self, curve: GainCurve) {
        self.publish(MeterEvent::CurveChanged(curve));
    }
}

/// Consumer end of the feed
pub struct MeterReceiver {
    receiver: Receiver<MeterEvent>,
    dropped: Arc<CachePadded<AtomicU64>>,
    /// Drop count already logged
    reported_dropped: u64,
    latest: Option<MeterFrame>,
    curve: Option<GainCurve>,
}

impl MeterReceiver {
    /// Take every queued frame, oldest first
    ///
    /// Curve changes seen on the way are remembered in [`curve`](Self::curve).
    pub fn drain(&mut self) -> Vec<MeterFrame> {
        let mut frames = Vec::with_capacity(self.receiver.len());
        for event in self.receiver.try_iter() {
            match event {
                MeterEvent::Frame(frame) => frames.push(frame),
                MeterEvent::CurveChanged(curve) => self.curve = Some(curve),
            }
        }
        if let Some(frame) = frames.last() {
            self.latest = Some(*frame);
        }

        let dropped = self.dropped();
        if dropped > self.reported_dropped {
            warn!(
                lost = dropped - self.reported_dropped,
                total = dropped,
                "Meter feed overflowed, frames dropped"
            );
            self.reported_dropped = dropped;
        }
        frames
    }

    /// Newest frame, discarding older queued ones
    pub fn latest(&mut self) -> Option<MeterFrame> {
        self.drain();
        self.latest
    }

    /// Most recently announced transfer curve
    pub fn curve(&self) -> Option<GainCurve> {
        self.curve
    }

    /// Frames the publisher had to drop
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
