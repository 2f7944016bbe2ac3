//! Trigger delivery between trigger sources and the capture loop.
//!
//! Sources (stdin, signals, tests) hold a cloneable [`TriggerSender`]; the
//! capture loop owns the [`TriggerReceiver`] and polls it without blocking.
//! Dump requests and stop signals travel on separate channels so a dump
//! requested while another is in progress stays queued instead of being
//! mistaken for a stop.
//!
//! Each stop carries the number of dump requests sent before it. The
//! receiver numbers dumps in the order it dequeues them, so a stop only
//! applies to dump `k` when its stamp is at least `k`; a stop sent while
//! idle can never end a dump requested after it.

use std::cell::Cell;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use tracing::debug;

/// A request to save the buffered audio plus a live continuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DumpRequest {
    /// Post-trigger capture window. `None` or zero means "until stopped".
    pub duration: Option<Duration>,
}

impl DumpRequest {
    /// Capture `duration` of live audio after the trigger.
    pub fn timed(duration: Duration) -> Self {
        Self {
            duration: Some(duration),
        }
    }

    /// Capture live audio until a stop signal arrives.
    pub fn open_ended() -> Self {
        Self { duration: None }
    }

    pub fn stop_condition(&self) -> StopCondition {
        match self.duration {
            Some(d) if !d.is_zero() => StopCondition::Elapsed(d),
            _ => StopCondition::Signal,
        }
    }
}

/// When the live phase of a dump ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCondition {
    /// Wall-clock time since the dump started.
    Elapsed(Duration),
    /// An explicit stop signal.
    Signal,
}

/// Create a connected sender/receiver pair.
pub fn channel() -> (TriggerSender, TriggerReceiver) {
    let (dump_tx, dump_rx) = unbounded();
    let (stop_tx, stop_rx) = unbounded();
    (
        TriggerSender {
            dump_tx,
            stop_tx,
            dumps_sent: Arc::new(AtomicU64::new(0)),
        },
        TriggerReceiver {
            dumps: dump_rx,
            stops: stop_rx,
            dumps_taken: Cell::new(0),
            held_stop: Cell::new(None),
        },
    )
}

#[derive(Debug, Clone)]
pub struct TriggerSender {
    dump_tx: Sender<DumpRequest>,
    stop_tx: Sender<u64>,
    /// Dump requests delivered to the channel, shared by all clones.
    dumps_sent: Arc<AtomicU64>,
}

impl TriggerSender {
    /// Queue a dump. Returns `false` once the capture loop is gone.
    pub fn dump(&self, request: DumpRequest) -> bool {
        let delivered = self.dump_tx.send(request).is_ok();
        if delivered {
            self.dumps_sent.fetch_add(1, Ordering::SeqCst);
        }
        delivered
    }

    /// Signal the in-progress (or already queued) dump to finish. Returns
    /// `false` once the capture loop is gone.
    pub fn stop(&self) -> bool {
        let stamp = self.dumps_sent.load(Ordering::SeqCst);
        self.stop_tx.send(stamp).is_ok()
    }
}

/// Owned by the capture thread; `Send` but not `Sync`.
#[derive(Debug)]
pub struct TriggerReceiver {
    dumps: Receiver<DumpRequest>,
    stops: Receiver<u64>,
    /// Dump requests dequeued so far; the current dump is number `dumps_taken`.
    dumps_taken: Cell<u64>,
    /// A stop addressed to a dump that was still queued when stops were
    /// last drained.
    held_stop: Cell<Option<u64>>,
}

impl TriggerReceiver {
    /// Next pending dump request, if any. Never blocks.
    pub fn try_dump(&self) -> Option<DumpRequest> {
        match self.dumps.try_recv() {
            Ok(request) => {
                self.dumps_taken.set(self.dumps_taken.get() + 1);
                Some(request)
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Consume one stop signal addressed to the current dump. Stops sent
    /// before that dump was requested are dropped. Never blocks.
    pub fn take_stop(&self) -> bool {
        let current = self.dumps_taken.get();
        if let Some(stamp) = self.held_stop.take() {
            if stamp >= current {
                return true;
            }
        }
        while let Ok(stamp) = self.stops.try_recv() {
            if stamp >= current {
                return true;
            }
            debug!(stamp, current, "dropping stop sent before the current dump");
        }
        false
    }

    /// Drop stop signals that arrived with no dump in progress. A stop
    /// sent after a dump that is still queued is kept for that dump.
    /// Returns the number dropped.
    pub fn discard_stops(&self) -> usize {
        let taken = self.dumps_taken.get();
        let mut dropped = 0;
        for stamp in self.held_stop.take().into_iter().chain(self.stops.try_iter()) {
            if stamp > taken && self.held_stop.get().is_none() {
                self.held_stop.set(Some(stamp));
            } else {
                dropped += 1;
            }
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_duration_is_open_ended() {
        assert_eq!(
            DumpRequest::timed(Duration::ZERO).stop_condition(),
            StopCondition::Signal
        );
        assert_eq!(DumpRequest::open_ended().stop_condition(), StopCondition::Signal);
        assert_eq!(
            DumpRequest::timed(Duration::from_secs(2)).stop_condition(),
            StopCondition::Elapsed(Duration::from_secs(2))
        );
    }

    #[test]
    fn dumps_and_stops_are_independent() {
        let (tx, rx) = channel();
        assert!(tx.dump(DumpRequest::open_ended()));
        assert!(tx.stop());
        assert!(tx.stop());

        assert!(rx.take_stop());
        assert_eq!(rx.try_dump(), Some(DumpRequest::open_ended()));
        assert_eq!(rx.try_dump(), None);
        assert_eq!(rx.discard_stops(), 1);
        assert!(!rx.take_stop());
    }

    #[test]
    fn stop_sent_before_a_dump_does_not_end_it() {
        let (tx, rx) = channel();
        assert!(tx.stop());
        assert!(tx.dump(DumpRequest::open_ended()));

        assert!(rx.try_dump().is_some());
        assert!(!rx.take_stop());

        assert!(tx.stop());
        assert!(rx.take_stop());
    }

    #[test]
    fn stop_for_queued_dump_survives_idle_drain() {
        let (tx, rx) = channel();
        assert!(tx.stop());
        assert!(tx.dump(DumpRequest::open_ended()));
        assert!(tx.stop());

        // Idle: the first stop is stale, the second belongs to the queued dump.
        assert_eq!(rx.discard_stops(), 1);
        assert!(rx.try_dump().is_some());
        assert!(rx.take_stop());
        assert!(!rx.take_stop());
    }

    #[test]
    fn clones_share_the_dump_count() {
        let (tx, rx) = channel();
        let other = tx.clone();
        assert!(other.dump(DumpRequest::open_ended()));
        assert!(tx.stop());

        assert!(rx.try_dump().is_some());
        assert!(rx.take_stop());
    }

    #[test]
    fn sender_reports_disconnected_receiver() {
        let (tx, rx) = channel();
        drop(rx);
        assert!(!tx.dump(DumpRequest::default()));
        assert!(!tx.stop());
    }

    #[test]
    fn receiver_survives_dropped_senders() {
        let (tx, rx) = channel();
        drop(tx);
        assert_eq!(rx.try_dump(), None);
        assert!(!rx.take_stop());
    }
}
