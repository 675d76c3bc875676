use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use super::error::SessionError;
use super::state::SessionState;
use crate::classifier::Prediction;

/// Which loop a failed cycle belonged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    Recording,
    Predicting,
}

/// A single loop cycle that failed without ending the loop.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleFailure {
    pub kind: LoopKind,
    pub message: String,
    /// Failures in a row, including this one.
    pub consecutive: u32,
}

/// Receives everything a session reports. All methods default to no-ops.
pub trait SessionObserver: Send + Sync {
    fn state_changed(&self, _from: &SessionState, _to: &SessionState) {}

    fn example_added(&self, _label: &str, _count: usize) {}

    fn capacity_reached(&self, _label: &str, _cap: usize) {}

    fn prediction_ready(&self, _prediction: &Prediction) {}

    fn cycle_failed(&self, _failure: &CycleFailure) {}

    /// A failure that ended a loop or an operation the user should hear about.
    fn error(&self, _error: &Arc<SessionError>) {}
}

/// Default observer: writes every event to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl SessionObserver for LogObserver {
    fn state_changed(&self, from: &SessionState, to: &SessionState) {
        info!("Session state: {} -> {}", from, to);
    }

    fn example_added(&self, label: &str, count: usize) {
        debug!("Added training example for {}. Total: {}", label, count);
    }

    fn capacity_reached(&self, label: &str, cap: usize) {
        warn!("Maximum samples ({}) reached for {}", cap, label);
    }

    fn prediction_ready(&self, prediction: &Prediction) {
        debug!("Prediction: {} {:?}", prediction.label, prediction.ranked());
    }

    fn cycle_failed(&self, failure: &CycleFailure) {
        warn!(
            "{:?} cycle failed ({} in a row): {}",
            failure.kind, failure.consecutive, failure.message
        );
    }

    fn error(&self, error: &Arc<SessionError>) {
        error!("Session error: {}", error);
    }
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged { from: SessionState, to: SessionState },
    ExampleAdded { label: String, count: usize },
    CapacityReached { label: String, cap: usize },
    PredictionReady(Prediction),
    CycleFailed(CycleFailure),
    Error(Arc<SessionError>),
}

/// Observer that forwards every callback as a [`SessionEvent`] on a channel.
#[derive(Debug, Clone)]
pub struct EventChannel {
    sender: UnboundedSender<SessionEvent>,
}

impl EventChannel {
    pub fn new() -> (Self, UnboundedReceiver<SessionEvent>) {
        let (sender, receiver) = unbounded_channel();
        (Self { sender }, receiver)
    }

    fn send(&self, event: SessionEvent) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.sender.send(event);
    }
}

impl SessionObserver for EventChannel {
    fn state_changed(&self, from: &SessionState, to: &SessionState) {
        self.send(SessionEvent::StateChanged {
            from: from.clone(),
            to: to.clone(),
        });
    }

    fn example_added(&self, label: &str, count: usize) {
        self.send(SessionEvent::ExampleAdded {
            label: label.to_string(),
            count,
        });
    }

    fn capacity_reached(&self, label: &str, cap: usize) {
        self.send(SessionEvent::CapacityReached {
            label: label.to_string(),
            cap,
        });
    }

    fn prediction_ready(&self, prediction: &Prediction) {
        self.send(SessionEvent::PredictionReady(prediction.clone()));
    }

    fn cycle_failed(&self, failure: &CycleFailure) {
        self.send(SessionEvent::CycleFailed(failure.clone()));
    }

    fn error(&self, error: &Arc<SessionError>) {
        self.send(SessionEvent::Error(Arc::clone(error)));
    }
}

/// Fans events out to several observers.
pub(crate) struct Observers(Vec<Arc<dyn SessionObserver>>);

impl Observers {
    pub(crate) fn new(observers: Vec<Arc<dyn SessionObserver>>) -> Self {
        Self(observers)
    }

    pub(crate) fn state_changed(&self, from: &SessionState, to: &SessionState) {
        self.0.iter().for_each(|o| o.state_changed(from, to));
    }

    pub(crate) fn example_added(&self, label: &str, count: usize) {
        self.0.iter().for_each(|o| o.example_added(label, count));
    }

    pub(crate) fn capacity_reached(&self, label: &str, cap: usize) {
        self.0.iter().for_each(|o| o.capacity_reached(label, cap));
    }

    pub(crate) fn prediction_ready(&self, prediction: &Prediction) {
        self.0.iter().for_each(|o| o.prediction_ready(prediction));
    }

    pub(crate) fn cycle_failed(&self, failure: &CycleFailure) {
        self.0.iter().for_each(|o| o.cycle_failed(failure));
    }

    pub(crate) fn error(&self, error: SessionError) {
        let error = Arc::new(error);
        self.0.iter().for_each(|o| o.error(&error));
    }
}
