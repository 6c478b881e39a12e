//! The device-side mission operator boundary: protocol states, upload
//! events, and the capability trait the uploader drives. Concrete backends
//! (the simulated vehicle, a real transport) implement [`MissionOperator`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::mission::{Action, Mission};

/// Protocol states reported on the waypoint event stream.
///
/// Only `ReadyToUpload` and `ReadyToExecute` matter to the uploader as
/// precondition and target values; the remaining states are passed through
/// and ignored by the wait loops.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MissionState {
    Unknown,
    Disconnected,
    NotSupported,
    Recovering,
    ReadyToUpload,
    Uploading,
    ReadyToExecute,
    Executing,
    Interrupted,
}

/// Protocol states reported on the action event stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionState {
    Unknown,
    Disconnected,
    NotSupported,
    Recovering,
    ReadyToUpload,
    Uploading,
    ReadyToExecute,
    Executing,
    Interrupted,
}

/// A failure reported by the vehicle itself, either synchronously from a
/// device call, from an asynchronous completion, or on the event stream.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
#[error("device error {code}: {description}")]
pub struct DeviceError {
    pub code: i32,
    pub description: String,
}

impl DeviceError {
    pub fn new(code: i32, description: impl Into<String>) -> Self {
        Self { code, description: description.into() }
    }
}

/// Waypoint-stage progress counters as the device reports them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MissionUploadProgress {
    pub last_uploaded_waypoint_index: u32,
    pub total_waypoint_count: u32,
}

impl MissionUploadProgress {
    /// Normalized completion after the last uploaded waypoint, or `None`
    /// when the device has not reported a total yet.
    pub fn fraction(self) -> Option<f64> {
        fraction(self.last_uploaded_waypoint_index, self.total_waypoint_count)
    }
}

/// Action-stage progress counters as the device reports them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActionUploadProgress {
    pub last_uploaded_action_index: u32,
    pub total_action_count: u32,
}

impl ActionUploadProgress {
    pub fn fraction(self) -> Option<f64> {
        fraction(self.last_uploaded_action_index, self.total_action_count)
    }
}

/* a zero total means "no progress signal", never a division */
fn fraction(last_uploaded_index: u32, total_count: u32) -> Option<f64> {
    if total_count == 0 {
        return None;
    }
    Some(f64::from(last_uploaded_index + 1) / f64::from(total_count))
}

/// One push notification on the waypoint event stream.
#[derive(Clone, Debug, PartialEq)]
pub struct MissionUploadEvent {
    pub current_state: MissionState,
    pub progress: Option<MissionUploadProgress>,
    pub error: Option<DeviceError>,
}

impl MissionUploadEvent {
    pub fn state(state: MissionState) -> Self {
        Self { current_state: state, progress: None, error: None }
    }
}

/// One push notification on the action event stream.
#[derive(Clone, Debug, PartialEq)]
pub struct ActionUploadEvent {
    pub current_state: ActionState,
    pub progress: Option<ActionUploadProgress>,
    pub error: Option<DeviceError>,
}

impl ActionUploadEvent {
    pub fn state(state: ActionState) -> Self {
        Self { current_state: state, progress: None, error: None }
    }
}

pub type MissionEventListener = Arc<dyn Fn(MissionUploadEvent) + Send + Sync>;
pub type ActionEventListener = Arc<dyn Fn(ActionUploadEvent) + Send + Sync>;

/// Handle returned by the listener registry, used for deregistration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// The mission operator capability of a connected vehicle.
///
/// Listeners are invoked from the backend's own producer threads and may be
/// invoked while the registry is held; they must not block and must not call
/// back into the operator. `remove_*_listener` guarantees the listener is
/// not invoked after the call returns.
#[async_trait]
pub trait MissionOperator: Send + Sync {
    /// Snapshot of the waypoint-stream protocol state.
    fn mission_state(&self) -> MissionState;

    /// Snapshot of the action-stream protocol state.
    fn action_state(&self) -> ActionState;

    /// Hands the route over to the vehicle. Reports rejection synchronously.
    fn load_mission(&self, mission: &Mission) -> Result<(), DeviceError>;

    /// Starts transferring the loaded waypoints to the vehicle. Completion
    /// means the command was accepted; transfer progress arrives on the
    /// waypoint event stream.
    async fn upload_mission(&self) -> Result<(), DeviceError>;

    /// Starts transferring the action list. Completion semantics mirror
    /// [`upload_mission`](MissionOperator::upload_mission).
    async fn upload_actions(&self, actions: &[Action]) -> Result<(), DeviceError>;

    fn add_mission_listener(&self, listener: MissionEventListener) -> ListenerId;

    fn remove_mission_listener(&self, id: ListenerId);

    fn add_action_listener(&self, listener: ActionEventListener) -> ListenerId;

    fn remove_action_listener(&self, id: ListenerId);
}
