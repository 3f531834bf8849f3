//! Training progress reporting.
//!
//! The trainer holds an `Arc<dyn ProgressReporter>` and calls
//! [`ProgressReporter::report`] once per completed epoch. Reporting never
//! blocks training: [`ChannelReporter`] hands events to an unbounded
//! channel and a single forwarder task drains it, in order, into a
//! [`ProgressSink`]. No event of a run is dropped or reordered on the way.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::RunId;

/// One epoch's progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub epoch: u32,
    /// Mean finite total loss across agents.
    pub loss: f64,
    /// Mean raw episode reward.
    pub reward: f64,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    /// Creates an event stamped with the current time.
    pub fn new(epoch: u32, loss: f64, reward: f64) -> Self {
        Self {
            epoch,
            loss,
            reward,
            timestamp: Utc::now(),
        }
    }
}

/// A progress event tagged with the run that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressMessage {
    pub run_id: RunId,
    pub event: ProgressEvent,
}

/// Receives per-epoch progress from a trainer.
pub trait ProgressReporter: Send + Sync {
    /// Must return promptly; delivery problems are the reporter's concern.
    fn report(&self, event: ProgressEvent);
}

/// Failure to deliver a progress message to viewers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReporterDeliveryFailure {
    #[error("no viewer is subscribed")]
    NoSubscribers,

    #[error("progress sink is closed")]
    Closed,
}

/// Destination of progress messages, shared by every run.
pub trait ProgressSink: Send + Sync {
    fn deliver(&self, message: ProgressMessage) -> Result<(), ReporterDeliveryFailure>;
}

impl<T: ProgressSink + ?Sized> ProgressSink for std::sync::Arc<T> {
    fn deliver(&self, message: ProgressMessage) -> Result<(), ReporterDeliveryFailure> {
        (**self).deliver(message)
    }
}

/// Fans messages out to any number of subscribed viewers.
///
/// Each message is delivered as a whole value, so events from concurrent
/// runs never interleave.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<ProgressMessage>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressMessage> {
        self.sender.subscribe()
    }
}

impl ProgressSink for BroadcastSink {
    fn deliver(&self, message: ProgressMessage) -> Result<(), ReporterDeliveryFailure> {
        self.sender
            .send(message)
            .map(|_| ())
            .map_err(|_| ReporterDeliveryFailure::NoSubscribers)
    }
}

/// Non-blocking reporter backed by an unbounded `mpsc` channel.
///
/// `report` only enqueues, so a slow sink delays delivery but never the
/// trainer, and every event reaches the sink in FIFO order.
#[derive(Debug)]
pub struct ChannelReporter {
    run_id: RunId,
    tx: mpsc::UnboundedSender<ProgressMessage>,
}

impl ChannelReporter {
    /// Creates the reporter and spawns its forwarder on `handle`.
    ///
    /// The forwarder ends once the reporter is dropped and the channel is
    /// drained.
    pub fn spawn<S>(run_id: RunId, sink: S, handle: &Handle) -> (Self, JoinHandle<()>)
    where
        S: ProgressSink + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<ProgressMessage>();
        let forwarder = handle.spawn(async move {
            while let Some(message) = rx.recv().await {
                let epoch = message.event.epoch;
                if let Err(e) = sink.deliver(message) {
                    debug!(%run_id, epoch, error = %e, "progress event not delivered");
                }
            }
        });
        (Self { run_id, tx }, forwarder)
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }
}

impl ProgressReporter for ChannelReporter {
    fn report(&self, event: ProgressEvent) {
        let epoch = event.epoch;
        let message = ProgressMessage {
            run_id: self.run_id,
            event,
        };
        if self.tx.send(message).is_err() {
            warn!(run_id = %self.run_id, epoch, "{}", ReporterDeliveryFailure::Closed);
        }
    }
}

/// Keeps every reported event in memory.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events reported so far.
    pub fn events(&self) -> Vec<ProgressEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ProgressReporter for RecordingReporter {
    fn report(&self, event: ProgressEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Default)]
    struct CollectingSink(Arc<Mutex<Vec<ProgressMessage>>>);

    impl ProgressSink for CollectingSink {
        fn deliver(&self, message: ProgressMessage) -> Result<(), ReporterDeliveryFailure> {
            self.0.lock().unwrap().push(message);
            Ok(())
        }
    }

    #[test]
    fn event_serializes_with_timestamp() {
        let event = ProgressEvent::new(3, 0.25, -12.0);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["epoch"], 3);
        assert_eq!(json["loss"], 0.25);
        assert_eq!(json["reward"], -12.0);
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn recording_reporter_keeps_order() {
        let reporter = RecordingReporter::new();
        for epoch in 0..3 {
            reporter.report(ProgressEvent::new(epoch, 0.0, 0.0));
        }
        let epochs: Vec<u32> = reporter.events().iter().map(|e| e.epoch).collect();
        assert_eq!(epochs, vec![0, 1, 2]);
    }

    #[test]
    fn broadcast_without_viewers_is_a_delivery_failure() {
        let sink = BroadcastSink::new(4);
        let message = ProgressMessage {
            run_id: crate::generate_run_id(),
            event: ProgressEvent::new(0, 0.0, 0.0),
        };
        assert_eq!(sink.deliver(message), Err(ReporterDeliveryFailure::NoSubscribers));
    }

    #[tokio::test]
    async fn channel_reporter_forwards_in_order() {
        let collected = Arc::new(Mutex::new(Vec::new()));
        let sink = CollectingSink(collected.clone());
        let run_id = crate::generate_run_id();
        let (reporter, forwarder) = ChannelReporter::spawn(run_id, sink, &Handle::current());
        for epoch in 0..5 {
            reporter.report(ProgressEvent::new(epoch, 0.0, -1.0));
        }
        drop(reporter);
        forwarder.await.unwrap();

        let messages = collected.lock().unwrap();
        assert_eq!(messages.len(), 5);
        assert!(messages.iter().all(|m| m.run_id == run_id));
        let epochs: Vec<u32> = messages.iter().map(|m| m.event.epoch).collect();
        assert_eq!(epochs, vec![0, 1, 2, 3, 4]);
    }

    /// Takes a fixed time per message, slower than the reporting side.
    struct SlowSink {
        delay: Duration,
        delivered: Arc<Mutex<Vec<u32>>>,
    }

    impl ProgressSink for SlowSink {
        fn deliver(&self, message: ProgressMessage) -> Result<(), ReporterDeliveryFailure> {
            std::thread::sleep(self.delay);
            self.delivered.lock().unwrap().push(message.event.epoch);
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn slow_sink_still_receives_every_event_in_order() {
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = SlowSink {
            delay: Duration::from_millis(2),
            delivered: delivered.clone(),
        };
        let (reporter, forwarder) =
            ChannelReporter::spawn(crate::generate_run_id(), sink, &Handle::current());
        for epoch in 0..200 {
            reporter.report(ProgressEvent::new(epoch, 0.0, 0.0));
        }
        drop(reporter);
        forwarder.await.unwrap();
        assert_eq!(*delivered.lock().unwrap(), (0..200).collect::<Vec<u32>>());
    }

    #[tokio::test]
    async fn reporting_after_the_forwarder_stopped_is_swallowed() {
        let collected = Arc::new(Mutex::new(Vec::new()));
        let (reporter, forwarder) = ChannelReporter::spawn(
            crate::generate_run_id(),
            CollectingSink(collected.clone()),
            &Handle::current(),
        );
        forwarder.abort();
        let _ = forwarder.await;
        reporter.report(ProgressEvent::new(0, 0.0, 0.0));
        assert!(collected.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn broadcast_sink_reaches_subscribers() {
        let sink = BroadcastSink::new(8);
        let mut viewer = sink.subscribe();
        let run_id = crate::generate_run_id();
        let (reporter, forwarder) = ChannelReporter::spawn(run_id, sink.clone(), &Handle::current());
        reporter.report(ProgressEvent::new(0, 1.5, -3.0));
        drop(reporter);
        forwarder.await.unwrap();
        let message = viewer.recv().await.unwrap();
        assert_eq!(message.run_id, run_id);
        assert_eq!(message.event.loss, 1.5);
    }
}
