//! Route model: the caller-owned waypoint mission and action list carried
//! by a route document. The uploader treats both as opaque payloads.

use serde::{Deserialize, Serialize};

pub mod container;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Waypoint {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mission {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mission_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_flight_speed: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_flight_speed: Option<f32>,
    pub waypoints: Vec<Waypoint>,
}

/// One device action attached to the route. Trigger and actuator payloads
/// are vendor-defined documents and pass through the uploader untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub action_id: i32,
    pub trigger: serde_json::Value,
    pub actuator: serde_json::Value,
}
