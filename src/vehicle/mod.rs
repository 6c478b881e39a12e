//! The connected-vehicle boundary: model identification and access to the
//! mission operator capability, when the model carries one.

use std::sync::Arc;

use uuid::Uuid;

use crate::operator::MissionOperator;

pub mod sim;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VehicleModel {
    Matrice300Rtk,
    Phantom4Rtk,
    Unknown,
}

impl VehicleModel {
    /// Whether this model exposes the waypoint mission operator.
    pub fn supports_waypoint_missions(self) -> bool {
        matches!(self, VehicleModel::Matrice300Rtk)
    }
}

pub trait Vehicle: Send + Sync {
    fn id(&self) -> Uuid;

    fn model(&self) -> VehicleModel;

    fn serial(&self) -> &str;

    /// The mission operator capability, or `None` when the model does not
    /// support waypoint missions.
    fn mission_operator(&self) -> Option<Arc<dyn MissionOperator>>;
}
