//! Blocks the upload flow until the operator reaches a target protocol
//! state, bounded by a per-event heartbeat deadline.

use std::time::Duration;

use crate::operator::DeviceError;
use crate::uploader::bridge::{EventBridge, UploadStage};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("no upload event within {} s while waiting for the target state", .0.as_secs_f64())]
    HeartbeatTimeout(Duration),
}

pub type Result<T> = std::result::Result<T, Error>;

pub struct StateWaiter<'a, E: UploadStage> {
    bridge: &'a mut EventBridge<E>,
}

impl<'a, E: UploadStage> StateWaiter<'a, E> {
    pub fn new(bridge: &'a mut EventBridge<E>) -> Self {
        Self { bridge }
    }

    /// Waits until the operator reports `target` on this stage's stream.
    ///
    /// The timeout is a heartbeat, not an overall deadline: every received
    /// event re-arms the window, so the wait continues for as long as the
    /// device keeps reporting intermediate states. The first event carrying
    /// a device error fails the wait immediately.
    pub async fn wait_for(&mut self, target: E::State, heartbeat_timeout: Duration) -> Result<()> {
        /* the device may already be there; do not consume the stream */
        if E::current_state(self.bridge.operator()) == target {
            return Ok(());
        }
        loop {
            let event = match self.bridge.next(heartbeat_timeout).await {
                Some(event) => event,
                None => return Err(Error::HeartbeatTimeout(heartbeat_timeout)),
            };
            if let Some(error) = event.error() {
                return Err(Error::Device(error.clone()));
            }
            if event.state() == target {
                return Ok(());
            }
            /* intermediate state; keep waiting */
        }
    }
}
