//! Bridges the operator's push-callback listener interface into an ordered,
//! pollable event stream with a synchronous progress side-channel. One
//! bridge serves exactly one upload stage: it is created right before the
//! stage's device call and torn down as soon as the stage resolves.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time;

use crate::operator::{
    ActionState, ActionUploadEvent, DeviceError, ListenerId, MissionOperator, MissionState,
    MissionUploadEvent,
};
use crate::uploader::{UPLOADING_STAGE_ACTIONS, UPLOADING_STAGE_WAYPOINTS};

/// Handler for the progress side-channel, invoked on the producer thread
/// with the normalized `[0,1]` fraction.
pub type StageProgressHandler = Box<dyn Fn(f64) + Send>;

/// Per-stage plumbing over the operator boundary: which listener registry
/// to use, how to snapshot the stage's protocol state, and how to read the
/// stage fields out of an event.
pub trait UploadStage: Sized + Send + 'static {
    type State: Copy + PartialEq + fmt::Debug + Send;

    /// Stage label carried by progress reports.
    const STAGE: &'static str;

    fn state(&self) -> Self::State;

    fn error(&self) -> Option<&DeviceError>;

    /// Normalized progress carried by this event, if the device reported
    /// counters with a non-zero total.
    fn fraction(&self) -> Option<f64>;

    fn current_state(operator: &dyn MissionOperator) -> Self::State;

    fn subscribe(
        operator: &dyn MissionOperator,
        listener: Arc<dyn Fn(Self) + Send + Sync>,
    ) -> ListenerId;

    fn unsubscribe(operator: &dyn MissionOperator, id: ListenerId);
}

impl UploadStage for MissionUploadEvent {
    type State = MissionState;

    const STAGE: &'static str = UPLOADING_STAGE_WAYPOINTS;

    fn state(&self) -> MissionState {
        self.current_state
    }

    fn error(&self) -> Option<&DeviceError> {
        self.error.as_ref()
    }

    fn fraction(&self) -> Option<f64> {
        self.progress.and_then(|progress| progress.fraction())
    }

    fn current_state(operator: &dyn MissionOperator) -> MissionState {
        operator.mission_state()
    }

    fn subscribe(
        operator: &dyn MissionOperator,
        listener: Arc<dyn Fn(Self) + Send + Sync>,
    ) -> ListenerId {
        operator.add_mission_listener(listener)
    }

    fn unsubscribe(operator: &dyn MissionOperator, id: ListenerId) {
        operator.remove_mission_listener(id)
    }
}

impl UploadStage for ActionUploadEvent {
    type State = ActionState;

    const STAGE: &'static str = UPLOADING_STAGE_ACTIONS;

    fn state(&self) -> ActionState {
        self.current_state
    }

    fn error(&self) -> Option<&DeviceError> {
        self.error.as_ref()
    }

    fn fraction(&self) -> Option<f64> {
        self.progress.and_then(|progress| progress.fraction())
    }

    fn current_state(operator: &dyn MissionOperator) -> ActionState {
        operator.action_state()
    }

    fn subscribe(
        operator: &dyn MissionOperator,
        listener: Arc<dyn Fn(Self) + Send + Sync>,
    ) -> ListenerId {
        operator.add_action_listener(listener)
    }

    fn unsubscribe(operator: &dyn MissionOperator, id: ListenerId) {
        operator.remove_action_listener(id)
    }
}

pub struct EventBridge<E: UploadStage> {
    operator: Arc<dyn MissionOperator>,
    events_tx: mpsc::UnboundedSender<E>,
    events_rx: mpsc::UnboundedReceiver<E>,
    progress: Arc<Mutex<Option<StageProgressHandler>>>,
    listener: Option<ListenerId>,
}

impl<E: UploadStage> EventBridge<E> {
    /// Creates a detached bridge. No listener is registered until
    /// [`subscribe`](EventBridge::subscribe) is called.
    pub fn new(operator: Arc<dyn MissionOperator>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            operator,
            events_tx,
            events_rx,
            progress: Arc::new(Mutex::new(None)),
            listener: None,
        }
    }

    pub fn operator(&self) -> &dyn MissionOperator {
        self.operator.as_ref()
    }

    /// Installs the progress side-channel handler. The handler runs on the
    /// producer thread, independently of [`next`](EventBridge::next), so
    /// high-frequency partial updates never have to be drained through the
    /// blocking consumer.
    pub fn on_progress(&mut self, handler: StageProgressHandler) {
        if let Ok(mut progress) = self.progress.lock() {
            *progress = Some(handler);
        }
    }

    /// Registers with the operator's listener registry. A no-op when the
    /// bridge is already subscribed.
    pub fn subscribe(&mut self) {
        if self.listener.is_some() {
            return;
        }
        let events_tx = self.events_tx.clone();
        let progress = Arc::clone(&self.progress);
        let listener: Arc<dyn Fn(E) + Send + Sync> = Arc::new(move |event: E| {
            let fraction = event.fraction();
            /* enqueue first; an unbounded send never blocks the producer */
            if events_tx.send(event).is_err() {
                log::debug!("upload event dropped after consumer exit");
            }
            if let Some(fraction) = fraction {
                if let Ok(progress) = progress.lock() {
                    if let Some(handler) = progress.as_ref() {
                        handler(fraction);
                    }
                }
            }
        });
        self.listener = Some(E::subscribe(self.operator.as_ref(), listener));
    }

    /// Deregisters from the operator. Idempotent, and safe when the bridge
    /// was never subscribed; once it returns, no further events are
    /// enqueued.
    pub fn unsubscribe(&mut self) {
        if let Some(id) = self.listener.take() {
            E::unsubscribe(self.operator.as_ref(), id);
        }
    }

    /// Waits for the next event, in arrival order, for at most `deadline`.
    /// Returns `None` when the deadline elapses first.
    pub async fn next(&mut self, deadline: Duration) -> Option<E> {
        match time::timeout(deadline, self.events_rx.recv()).await {
            Ok(Some(event)) => Some(event),
            /* the bridge keeps its own sender, so recv never observes a
               closed channel; only the deadline ends the wait */
            Ok(None) | Err(_) => None,
        }
    }
}

impl<E: UploadStage> Drop for EventBridge<E> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::{MissionUploadProgress, MissionState};
    use crate::uploader::testing::ScriptedOperator;

    fn mission_bridge(operator: &Arc<ScriptedOperator>) -> EventBridge<MissionUploadEvent> {
        EventBridge::new(Arc::clone(operator) as Arc<dyn MissionOperator>)
    }

    fn progress_event(last_uploaded: u32, total: u32) -> MissionUploadEvent {
        MissionUploadEvent {
            current_state: MissionState::Uploading,
            progress: Some(MissionUploadProgress {
                last_uploaded_waypoint_index: last_uploaded,
                total_waypoint_count: total,
            }),
            error: None,
        }
    }

    #[tokio::test]
    async fn events_are_delivered_in_arrival_order() {
        let operator = Arc::new(ScriptedOperator::new());
        let mut bridge = mission_bridge(&operator);
        bridge.subscribe();
        operator.emit_mission(MissionUploadEvent::state(MissionState::Uploading));
        operator.emit_mission(MissionUploadEvent::state(MissionState::ReadyToExecute));
        let first = bridge.next(Duration::from_millis(100)).await.unwrap();
        let second = bridge.next(Duration::from_millis(100)).await.unwrap();
        assert_eq!(first.current_state, MissionState::Uploading);
        assert_eq!(second.current_state, MissionState::ReadyToExecute);
    }

    #[tokio::test]
    async fn subscribing_twice_does_not_duplicate_events() {
        let operator = Arc::new(ScriptedOperator::new());
        let mut bridge = mission_bridge(&operator);
        bridge.subscribe();
        bridge.subscribe();
        assert_eq!(operator.mission_listener_count(), 1);
        operator.emit_mission(MissionUploadEvent::state(MissionState::Uploading));
        assert!(bridge.next(Duration::from_millis(100)).await.is_some());
        assert!(bridge.next(Duration::from_millis(50)).await.is_none());
    }

    #[tokio::test]
    async fn no_event_is_enqueued_after_unsubscribe() {
        let operator = Arc::new(ScriptedOperator::new());
        let mut bridge = mission_bridge(&operator);
        bridge.subscribe();
        bridge.unsubscribe();
        bridge.unsubscribe();
        assert_eq!(operator.mission_listener_count(), 0);
        operator.emit_mission(MissionUploadEvent::state(MissionState::ReadyToExecute));
        assert!(bridge.next(Duration::from_millis(50)).await.is_none());
    }

    #[tokio::test]
    async fn unsubscribing_a_never_subscribed_bridge_is_safe() {
        let operator = Arc::new(ScriptedOperator::new());
        let mut bridge = mission_bridge(&operator);
        bridge.unsubscribe();
        assert_eq!(operator.mission_listener_count(), 0);
    }

    #[tokio::test]
    async fn dropping_the_bridge_removes_the_listener() {
        let operator = Arc::new(ScriptedOperator::new());
        {
            let mut bridge = mission_bridge(&operator);
            bridge.subscribe();
            assert_eq!(operator.mission_listener_count(), 1);
        }
        assert_eq!(operator.mission_listener_count(), 0);
    }

    #[tokio::test]
    async fn the_progress_tap_fires_without_draining_the_stream() {
        let operator = Arc::new(ScriptedOperator::new());
        let mut bridge = mission_bridge(&operator);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bridge.on_progress(Box::new(move |fraction| {
            sink.lock().unwrap().push(fraction);
        }));
        bridge.subscribe();
        operator.emit_mission(progress_event(3, 10));
        /* a zero total carries no progress signal */
        operator.emit_mission(progress_event(0, 0));
        operator.emit_mission(MissionUploadEvent::state(MissionState::ReadyToExecute));
        assert_eq!(*seen.lock().unwrap(), vec![0.4]);
        /* all three events are still queued for the consumer */
        for _ in 0..3 {
            assert!(bridge.next(Duration::from_millis(100)).await.is_some());
        }
    }
}
