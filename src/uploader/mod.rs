//! Implements waypoint mission uploading against the operator capability of
//! a connected vehicle: load the route, transfer the waypoints, then
//! transfer the optional action list, driving the operator's event streams
//! through the ready states in between.

use std::sync::Arc;
use std::time::Duration;

use crate::mission::{Action, Mission};
use crate::operator::{ActionState, ActionUploadEvent, DeviceError, MissionState, MissionUploadEvent};
use crate::vehicle::Vehicle;

pub mod bridge;
pub mod waiter;

#[cfg(test)]
pub(crate) mod testing;

use bridge::{EventBridge, UploadStage};
use waiter::StateWaiter;

pub const UPLOADING_STAGE_WAYPOINTS: &str = "Uploading waypoints";
pub const UPLOADING_STAGE_ACTIONS: &str = "Uploading actions";

/// Maximum silence tolerated between two upload events before a wait is
/// abandoned.
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(30);

/// Fractional progress of one upload stage, delivered to the caller's
/// progress handler zero or more times per stage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OperationProgress {
    pub stage: &'static str,
    pub progress: f64,
}

/// Caller-supplied progress handler. It is invoked from the backend's
/// producer threads and must not block.
pub type ProgressHandler = Arc<dyn Fn(OperationProgress) + Send + Sync>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("no vehicle is connected, or the vehicle does not support waypoint missions")]
    DeviceUnavailable,
    #[error("a mission can be loaded only in ReadyToUpload or ReadyToExecute, current state is {0:?}")]
    InvalidState(MissionState),
    #[error("{stage}: {source}")]
    Device {
        stage: &'static str,
        #[source]
        source: DeviceError,
    },
    #[error("{stage}: no upload event within {} s", .timeout.as_secs_f64())]
    HeartbeatTimeout {
        stage: &'static str,
        timeout: Duration,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

fn at_stage(stage: &'static str) -> impl Fn(waiter::Error) -> Error {
    move |error| match error {
        waiter::Error::Device(source) => Error::Device { stage, source },
        waiter::Error::HeartbeatTimeout(timeout) => Error::HeartbeatTimeout { stage, timeout },
    }
}

fn wire_progress<E: UploadStage>(bridge: &mut EventBridge<E>, on_progress: Option<&ProgressHandler>) {
    if let Some(on_progress) = on_progress {
        let on_progress = Arc::clone(on_progress);
        bridge.on_progress(Box::new(move |fraction| {
            on_progress(OperationProgress { stage: E::STAGE, progress: fraction });
        }));
    }
}

/// Uploads a waypoint mission and its optional action list to the vehicle,
/// using [`DEFAULT_HEARTBEAT_TIMEOUT`] between upload events.
pub async fn upload(
    vehicle: &dyn Vehicle,
    mission: &Mission,
    actions: Option<&[Action]>,
    on_progress: Option<ProgressHandler>,
) -> Result<()> {
    upload_with_heartbeat(vehicle, mission, actions, on_progress, DEFAULT_HEARTBEAT_TIMEOUT).await
}

/// Uploads a waypoint mission and its optional action list to the vehicle.
///
/// The operator is driven through the fixed sequence load → wait
/// `ReadyToUpload` → upload → wait `ReadyToExecute`, followed by the action
/// stage when `actions` is non-empty. The first device-reported error or
/// missed heartbeat terminates the whole operation; each stage's listener
/// is removed on every exit path. Nothing is retried internally, and at
/// most one upload may be in flight per vehicle at a time.
pub async fn upload_with_heartbeat(
    vehicle: &dyn Vehicle,
    mission: &Mission,
    actions: Option<&[Action]>,
    on_progress: Option<ProgressHandler>,
    heartbeat_timeout: Duration,
) -> Result<()> {
    let operator = vehicle.mission_operator().ok_or(Error::DeviceUnavailable)?;

    /* the state is sampled before any listener exists; a transition between
       this read and the subscribe below can be missed (known limitation of
       the device API usage) */
    let state = operator.mission_state();
    if state != MissionState::ReadyToUpload && state != MissionState::ReadyToExecute {
        return Err(Error::InvalidState(state));
    }

    {
        let mut bridge = EventBridge::<MissionUploadEvent>::new(Arc::clone(&operator));
        wire_progress(&mut bridge, on_progress.as_ref());
        bridge.subscribe();

        operator
            .load_mission(mission)
            .map_err(|source| Error::Device { stage: UPLOADING_STAGE_WAYPOINTS, source })?;
        StateWaiter::new(&mut bridge)
            .wait_for(MissionState::ReadyToUpload, heartbeat_timeout)
            .await
            .map_err(at_stage(UPLOADING_STAGE_WAYPOINTS))?;

        operator
            .upload_mission()
            .await
            .map_err(|source| Error::Device { stage: UPLOADING_STAGE_WAYPOINTS, source })?;
        StateWaiter::new(&mut bridge)
            .wait_for(MissionState::ReadyToExecute, heartbeat_timeout)
            .await
            .map_err(at_stage(UPLOADING_STAGE_WAYPOINTS))?;

        /* the waypoint-stage listener is released here, before the action
           stage opens its own */
    }

    if let Some(actions) = actions.filter(|actions| !actions.is_empty()) {
        let mut bridge = EventBridge::<ActionUploadEvent>::new(Arc::clone(&operator));
        wire_progress(&mut bridge, on_progress.as_ref());
        bridge.subscribe();

        operator
            .upload_actions(actions)
            .await
            .map_err(|source| Error::Device { stage: UPLOADING_STAGE_ACTIONS, source })?;
        StateWaiter::new(&mut bridge)
            .wait_for(ActionState::ReadyToExecute, heartbeat_timeout)
            .await
            .map_err(at_stage(UPLOADING_STAGE_ACTIONS))?;
    }

    Ok(())
}
