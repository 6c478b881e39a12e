//! A simulated vehicle backend. It implements the mission operator against
//! scripted internal state, emitting upload events from a spawned transfer
//! task the way a vendor SDK emits them from its own threads. It stands in
//! for the real transport in the demo binary and in end-to-end tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time;
use uuid::Uuid;

use crate::mission::{Action, Mission};
use crate::operator::{
    ActionEventListener, ActionState, ActionUploadEvent, ActionUploadProgress, DeviceError,
    ListenerId, MissionEventListener, MissionOperator, MissionState, MissionUploadEvent,
    MissionUploadProgress,
};
use crate::vehicle::{Vehicle, VehicleModel};

/* numeric codes reported by the simulated autopilot */
const ERROR_NOT_READY: i32 = 16;
const ERROR_EMPTY_ROUTE: i32 = 17;
const ERROR_NO_MISSION: i32 = 18;
const ERROR_TRANSFER: i32 = 19;

#[derive(Clone, Copy, Debug)]
pub struct SimConfig {
    /// Delay between two transfer events, per waypoint or action.
    pub transfer_delay: Duration,
    /// Abort the waypoint transfer with a device error at this index.
    pub fail_waypoint_at: Option<u32>,
    /// Abort the action transfer with a device error at this index.
    pub fail_action_at: Option<u32>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            transfer_delay: Duration::from_millis(50),
            fail_waypoint_at: None,
            fail_action_at: None,
        }
    }
}

struct Inner {
    mission_state: MissionState,
    action_state: ActionState,
    loaded_waypoint_count: Option<u32>,
    next_listener: u64,
    mission_listeners: HashMap<u64, MissionEventListener>,
    action_listeners: HashMap<u64, ActionEventListener>,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

fn emit_mission(inner: &Inner, event: MissionUploadEvent) {
    for listener in inner.mission_listeners.values() {
        listener(event.clone());
    }
}

fn emit_action(inner: &Inner, event: ActionUploadEvent) {
    for listener in inner.action_listeners.values() {
        listener(event.clone());
    }
}

pub struct SimOperator {
    inner: Arc<Mutex<Inner>>,
    config: SimConfig,
}

impl SimOperator {
    fn new(config: SimConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                mission_state: MissionState::ReadyToUpload,
                action_state: ActionState::ReadyToUpload,
                loaded_waypoint_count: None,
                next_listener: 0,
                mission_listeners: HashMap::new(),
                action_listeners: HashMap::new(),
            })),
            config,
        }
    }
}

async fn drive_waypoint_transfer(
    inner: Arc<Mutex<Inner>>,
    total: u32,
    delay: Duration,
    fail_at: Option<u32>,
) {
    for index in 0..total {
        time::sleep(delay).await;
        if fail_at == Some(index) {
            let mut guard = lock(&inner);
            guard.mission_state = MissionState::ReadyToUpload;
            emit_mission(
                &guard,
                MissionUploadEvent {
                    current_state: MissionState::Uploading,
                    progress: None,
                    error: Some(DeviceError::new(
                        ERROR_TRANSFER,
                        format!("transfer aborted at waypoint {}", index),
                    )),
                },
            );
            return;
        }
        let guard = lock(&inner);
        emit_mission(
            &guard,
            MissionUploadEvent {
                current_state: MissionState::Uploading,
                progress: Some(MissionUploadProgress {
                    last_uploaded_waypoint_index: index,
                    total_waypoint_count: total,
                }),
                error: None,
            },
        );
    }
    let mut guard = lock(&inner);
    guard.mission_state = MissionState::ReadyToExecute;
    emit_mission(&guard, MissionUploadEvent::state(MissionState::ReadyToExecute));
}

async fn drive_action_transfer(
    inner: Arc<Mutex<Inner>>,
    total: u32,
    delay: Duration,
    fail_at: Option<u32>,
) {
    for index in 0..total {
        time::sleep(delay).await;
        if fail_at == Some(index) {
            let mut guard = lock(&inner);
            guard.action_state = ActionState::ReadyToUpload;
            emit_action(
                &guard,
                ActionUploadEvent {
                    current_state: ActionState::Uploading,
                    progress: None,
                    error: Some(DeviceError::new(
                        ERROR_TRANSFER,
                        format!("transfer aborted at action {}", index),
                    )),
                },
            );
            return;
        }
        let guard = lock(&inner);
        emit_action(
            &guard,
            ActionUploadEvent {
                current_state: ActionState::Uploading,
                progress: Some(ActionUploadProgress {
                    last_uploaded_action_index: index,
                    total_action_count: total,
                }),
                error: None,
            },
        );
    }
    let mut guard = lock(&inner);
    guard.action_state = ActionState::ReadyToExecute;
    emit_action(&guard, ActionUploadEvent::state(ActionState::ReadyToExecute));
}

#[async_trait]
impl MissionOperator for SimOperator {
    fn mission_state(&self) -> MissionState {
        lock(&self.inner).mission_state
    }

    fn action_state(&self) -> ActionState {
        lock(&self.inner).action_state
    }

    fn load_mission(&self, mission: &Mission) -> Result<(), DeviceError> {
        let mut inner = lock(&self.inner);
        match inner.mission_state {
            MissionState::ReadyToUpload | MissionState::ReadyToExecute => {}
            state => {
                return Err(DeviceError::new(
                    ERROR_NOT_READY,
                    format!("cannot load a mission in {:?}", state),
                ))
            }
        }
        if mission.waypoints.is_empty() {
            return Err(DeviceError::new(ERROR_EMPTY_ROUTE, "the route has no waypoints"));
        }
        inner.loaded_waypoint_count = Some(mission.waypoints.len() as u32);
        inner.mission_state = MissionState::ReadyToUpload;
        inner.action_state = ActionState::ReadyToUpload;
        emit_mission(&inner, MissionUploadEvent::state(MissionState::ReadyToUpload));
        log::debug!("sim: loaded a route of {} waypoints", mission.waypoints.len());
        Ok(())
    }

    async fn upload_mission(&self) -> Result<(), DeviceError> {
        let total = {
            let mut inner = lock(&self.inner);
            let total = match inner.loaded_waypoint_count {
                Some(total) => total,
                None => return Err(DeviceError::new(ERROR_NO_MISSION, "no mission is loaded")),
            };
            inner.mission_state = MissionState::Uploading;
            total
        };
        let inner = Arc::clone(&self.inner);
        let delay = self.config.transfer_delay;
        let fail_at = self.config.fail_waypoint_at;
        /* the transfer runs on the backend's own task, like a vendor SDK
           pushing updates from its own threads */
        tokio::spawn(drive_waypoint_transfer(inner, total, delay, fail_at));
        Ok(())
    }

    async fn upload_actions(&self, actions: &[Action]) -> Result<(), DeviceError> {
        let total = actions.len() as u32;
        {
            let mut inner = lock(&self.inner);
            if inner.loaded_waypoint_count.is_none() {
                return Err(DeviceError::new(ERROR_NO_MISSION, "no mission is loaded"));
            }
            inner.action_state = ActionState::Uploading;
        }
        let inner = Arc::clone(&self.inner);
        let delay = self.config.transfer_delay;
        let fail_at = self.config.fail_action_at;
        tokio::spawn(drive_action_transfer(inner, total, delay, fail_at));
        Ok(())
    }

    fn add_mission_listener(&self, listener: MissionEventListener) -> ListenerId {
        let mut inner = lock(&self.inner);
        inner.next_listener += 1;
        let id = inner.next_listener;
        inner.mission_listeners.insert(id, listener);
        ListenerId(id)
    }

    fn remove_mission_listener(&self, id: ListenerId) {
        lock(&self.inner).mission_listeners.remove(&id.0);
    }

    fn add_action_listener(&self, listener: ActionEventListener) -> ListenerId {
        let mut inner = lock(&self.inner);
        inner.next_listener += 1;
        let id = inner.next_listener;
        inner.action_listeners.insert(id, listener);
        ListenerId(id)
    }

    fn remove_action_listener(&self, id: ListenerId) {
        lock(&self.inner).action_listeners.remove(&id.0);
    }
}

pub struct SimVehicle {
    id: Uuid,
    model: VehicleModel,
    serial: String,
    operator: Arc<SimOperator>,
}

impl SimVehicle {
    pub fn new(model: VehicleModel) -> Self {
        Self::with_config(model, SimConfig::default())
    }

    pub fn with_config(model: VehicleModel, config: SimConfig) -> Self {
        let id = Uuid::new_v4();
        let serial = format!("SIM-{}", &id.to_simple().to_string()[..8]);
        Self { id, model, serial, operator: Arc::new(SimOperator::new(config)) }
    }
}

impl Vehicle for SimVehicle {
    fn id(&self) -> Uuid {
        self.id
    }

    fn model(&self) -> VehicleModel {
        self.model
    }

    fn serial(&self) -> &str {
        &self.serial
    }

    fn mission_operator(&self) -> Option<Arc<dyn MissionOperator>> {
        if self.model.supports_waypoint_missions() {
            Some(Arc::clone(&self.operator) as Arc<dyn MissionOperator>)
        } else {
            None
        }
    }
}
