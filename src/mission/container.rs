//! Route document container. A route is a JSON object whose `actions` field
//! selects between two known schema generations: the legacy waypoint-only
//! document (no `actions`, or `actions: null`) and the waypoint-plus-actions
//! document. The dispatch is one structural probe performed here, before any
//! device traffic.

use std::time::Duration;

use serde::Deserialize;

use crate::mission::{Action, Mission};
use crate::uploader::{self, ProgressHandler};
use crate::vehicle::Vehicle;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("route document is not a JSON object")]
    NotAnObject,
    #[error("could not decode route document")]
    Json(#[from] serde_json::Error),
    #[error("uploading legacy waypoint routes is not implemented")]
    LegacyUnsupported,
    #[error(transparent)]
    Upload(#[from] uploader::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Legacy waypoint-only route. The mission payload keeps its original
/// schema; this generation can be inspected but not uploaded.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyRoute {
    #[serde(default)]
    pub autopilot_model: Option<String>,
    pub mission: serde_json::Value,
}

/// Waypoint-plus-actions route.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaypointActionsRoute {
    #[serde(default)]
    pub autopilot_model: Option<String>,
    pub mission: Mission,
    pub actions: Vec<Action>,
}

#[derive(Clone, Debug)]
pub enum RouteContainer {
    Legacy(LegacyRoute),
    WaypointActions(WaypointActionsRoute),
}

impl RouteContainer {
    /// Decodes a route document, probing the `actions` field once to select
    /// the schema generation and then validating against exactly that one.
    pub fn from_json(json: &str) -> Result<RouteContainer> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        if !value.is_object() {
            return Err(Error::NotAnObject);
        }
        let has_actions = match value.get("actions") {
            Some(actions) => !actions.is_null(),
            None => false,
        };
        if has_actions {
            Ok(RouteContainer::WaypointActions(serde_json::from_value(value)?))
        } else {
            Ok(RouteContainer::Legacy(serde_json::from_value(value)?))
        }
    }

    /// Uploads the contained route to the vehicle's mission operator.
    pub async fn upload_to_vehicle(
        &self,
        vehicle: &dyn Vehicle,
        on_progress: Option<ProgressHandler>,
        heartbeat_timeout: Duration,
    ) -> Result<()> {
        match self {
            RouteContainer::Legacy(_) => Err(Error::LegacyUnsupported),
            RouteContainer::WaypointActions(route) => {
                uploader::upload_with_heartbeat(
                    vehicle,
                    &route.mission,
                    Some(route.actions.as_slice()),
                    on_progress,
                    heartbeat_timeout,
                )
                .await?;
                Ok(())
            }
        }
    }
}
