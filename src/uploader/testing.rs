//! Scripted operator and vehicle doubles for driving the upload core
//! through exact event sequences.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use crate::mission::{Action, Mission};
use crate::operator::{
    ActionEventListener, ActionState, ActionUploadEvent, DeviceError, ListenerId,
    MissionEventListener, MissionOperator, MissionState, MissionUploadEvent,
};
use crate::vehicle::{Vehicle, VehicleModel};

#[derive(Default)]
struct Registry {
    next_id: u64,
    mission: HashMap<u64, MissionEventListener>,
    action: HashMap<u64, ActionEventListener>,
}

/// An operator whose device calls succeed or fail on demand and emit
/// pre-scripted event sequences, synchronously, so tests are deterministic.
pub(crate) struct ScriptedOperator {
    mission_state: Mutex<MissionState>,
    action_state: Mutex<ActionState>,
    registry: Mutex<Registry>,
    load_error: Mutex<Option<DeviceError>>,
    upload_error: Mutex<Option<DeviceError>>,
    actions_error: Mutex<Option<DeviceError>>,
    after_load: Mutex<Vec<MissionUploadEvent>>,
    after_upload: Mutex<Vec<MissionUploadEvent>>,
    after_actions: Mutex<Vec<ActionUploadEvent>>,
    calls: Mutex<Vec<&'static str>>,
    mission_subscribes: AtomicUsize,
    action_subscribes: AtomicUsize,
}

impl ScriptedOperator {
    pub fn new() -> Self {
        Self {
            mission_state: Mutex::new(MissionState::Unknown),
            action_state: Mutex::new(ActionState::Unknown),
            registry: Mutex::new(Registry::default()),
            load_error: Mutex::new(None),
            upload_error: Mutex::new(None),
            actions_error: Mutex::new(None),
            after_load: Mutex::new(Vec::new()),
            after_upload: Mutex::new(Vec::new()),
            after_actions: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            mission_subscribes: AtomicUsize::new(0),
            action_subscribes: AtomicUsize::new(0),
        }
    }

    pub fn set_mission_state(&self, state: MissionState) {
        *self.mission_state.lock().unwrap() = state;
    }

    pub fn set_action_state(&self, state: ActionState) {
        *self.action_state.lock().unwrap() = state;
    }

    pub fn fail_load(&self, error: DeviceError) {
        *self.load_error.lock().unwrap() = Some(error);
    }

    pub fn script_after_load(&self, events: Vec<MissionUploadEvent>) {
        *self.after_load.lock().unwrap() = events;
    }

    pub fn script_after_upload(&self, events: Vec<MissionUploadEvent>) {
        *self.after_upload.lock().unwrap() = events;
    }

    pub fn script_after_actions(&self, events: Vec<ActionUploadEvent>) {
        *self.after_actions.lock().unwrap() = events;
    }

    pub fn emit_mission(&self, event: MissionUploadEvent) {
        let registry = self.registry.lock().unwrap();
        for listener in registry.mission.values() {
            listener(event.clone());
        }
    }

    pub fn emit_action(&self, event: ActionUploadEvent) {
        let registry = self.registry.lock().unwrap();
        for listener in registry.action.values() {
            listener(event.clone());
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mission_listener_count(&self) -> usize {
        self.registry.lock().unwrap().mission.len()
    }

    pub fn action_listener_count(&self) -> usize {
        self.registry.lock().unwrap().action.len()
    }

    pub fn mission_subscribe_count(&self) -> usize {
        self.mission_subscribes.load(Ordering::SeqCst)
    }

    pub fn action_subscribe_count(&self) -> usize {
        self.action_subscribes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MissionOperator for ScriptedOperator {
    fn mission_state(&self) -> MissionState {
        *self.mission_state.lock().unwrap()
    }

    fn action_state(&self) -> ActionState {
        *self.action_state.lock().unwrap()
    }

    fn load_mission(&self, _mission: &Mission) -> Result<(), DeviceError> {
        self.calls.lock().unwrap().push("load_mission");
        if let Some(error) = self.load_error.lock().unwrap().take() {
            return Err(error);
        }
        let events = std::mem::take(&mut *self.after_load.lock().unwrap());
        for event in events {
            self.emit_mission(event);
        }
        Ok(())
    }

    async fn upload_mission(&self) -> Result<(), DeviceError> {
        self.calls.lock().unwrap().push("upload_mission");
        if let Some(error) = self.upload_error.lock().unwrap().take() {
            return Err(error);
        }
        let events = std::mem::take(&mut *self.after_upload.lock().unwrap());
        for event in events {
            self.emit_mission(event);
        }
        Ok(())
    }

    async fn upload_actions(&self, _actions: &[Action]) -> Result<(), DeviceError> {
        self.calls.lock().unwrap().push("upload_actions");
        if let Some(error) = self.actions_error.lock().unwrap().take() {
            return Err(error);
        }
        let events = std::mem::take(&mut *self.after_actions.lock().unwrap());
        for event in events {
            self.emit_action(event);
        }
        Ok(())
    }

    fn add_mission_listener(&self, listener: MissionEventListener) -> ListenerId {
        self.mission_subscribes.fetch_add(1, Ordering::SeqCst);
        let mut registry = self.registry.lock().unwrap();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.mission.insert(id, listener);
        ListenerId(id)
    }

    fn remove_mission_listener(&self, id: ListenerId) {
        self.registry.lock().unwrap().mission.remove(&id.0);
    }

    fn add_action_listener(&self, listener: ActionEventListener) -> ListenerId {
        self.action_subscribes.fetch_add(1, Ordering::SeqCst);
        let mut registry = self.registry.lock().unwrap();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.action.insert(id, listener);
        ListenerId(id)
    }

    fn remove_action_listener(&self, id: ListenerId) {
        self.registry.lock().unwrap().action.remove(&id.0);
    }
}

pub(crate) struct ScriptedVehicle {
    id: Uuid,
    operator: Option<Arc<ScriptedOperator>>,
}

impl ScriptedVehicle {
    pub fn new(operator: Arc<ScriptedOperator>) -> Self {
        Self { id: Uuid::new_v4(), operator: Some(operator) }
    }

    pub fn without_operator() -> Self {
        Self { id: Uuid::new_v4(), operator: None }
    }
}

impl Vehicle for ScriptedVehicle {
    fn id(&self) -> Uuid {
        self.id
    }

    fn model(&self) -> VehicleModel {
        VehicleModel::Matrice300Rtk
    }

    fn serial(&self) -> &str {
        "SCRIPTED-0001"
    }

    fn mission_operator(&self) -> Option<Arc<dyn MissionOperator>> {
        self.operator
            .as_ref()
            .map(|operator| Arc::clone(operator) as Arc<dyn MissionOperator>)
    }
}
