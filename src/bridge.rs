//! Connection lifecycle for the vehicle: tracks the currently attached
//! vehicle and publishes connection events to subscribers.

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use crate::vehicle::{Vehicle, VehicleModel};

#[derive(Clone, Debug)]
pub enum BridgeEvent {
    Connected { model: VehicleModel, serial: String },
    Disconnected,
    StateUpdate(String),
}

pub struct Bridge {
    vehicle: RwLock<Option<Arc<dyn Vehicle>>>,
    events_tx: mpsc::UnboundedSender<BridgeEvent>,
}

impl Bridge {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BridgeEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (Self { vehicle: RwLock::new(None), events_tx }, events_rx)
    }

    pub async fn attach(&self, vehicle: Arc<dyn Vehicle>) {
        log::info!(
            "vehicle connected: {:?} (serial {}, id {})",
            vehicle.model(),
            vehicle.serial(),
            vehicle.id()
        );
        let event = BridgeEvent::Connected {
            model: vehicle.model(),
            serial: vehicle.serial().to_owned(),
        };
        *self.vehicle.write().await = Some(vehicle);
        let _ = self.events_tx.send(event);
    }

    pub async fn detach(&self) {
        if self.vehicle.write().await.take().is_some() {
            log::info!("vehicle disconnected");
            let _ = self.events_tx.send(BridgeEvent::Disconnected);
        }
    }

    /// The currently attached vehicle, if any.
    pub async fn vehicle(&self) -> Option<Arc<dyn Vehicle>> {
        self.vehicle.read().await.clone()
    }

    /// Publishes a free-form status update to bridge subscribers.
    pub fn notify(&self, text: impl Into<String>) {
        let _ = self.events_tx.send(BridgeEvent::StateUpdate(text.into()));
    }
}
