use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use structopt::StructOpt;
use tokio_stream::{wrappers::UnboundedReceiverStream, StreamExt};

mod bridge;
mod mission;
mod operator;
mod uploader;
mod vehicle;

use bridge::{Bridge, BridgeEvent};
use mission::container::RouteContainer;
use uploader::{OperationProgress, ProgressHandler};
use vehicle::{sim::SimVehicle, VehicleModel};

#[derive(StructOpt, Debug)]
#[structopt(name = "waypoint-uploader", about = "Uploads waypoint routes to a connected vehicle")]
enum Options {
    /// Decode a route document and print a summary
    Inspect {
        /// Path to the route document
        #[structopt(parse(from_os_str))]
        route: PathBuf,
    },
    /// Upload a route document to the simulated vehicle
    Upload {
        /// Path to the route document
        #[structopt(parse(from_os_str))]
        route: PathBuf,
        /// Maximum silence between upload events, in seconds
        #[structopt(long, default_value = "30")]
        heartbeat_timeout: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    /* initialize the logger */
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("waypoint_uploader=info"),
    )
    .init();
    match Options::from_args() {
        Options::Inspect { route } => inspect(&route),
        Options::Upload { route, heartbeat_timeout } => {
            upload(&route, Duration::from_secs(heartbeat_timeout)).await
        }
    }
}

fn read_route(path: &Path) -> anyhow::Result<RouteContainer> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("could not read {}", path.display()))?;
    RouteContainer::from_json(&json).context("could not decode the route document")
}

fn inspect(path: &Path) -> anyhow::Result<()> {
    match read_route(path)? {
        RouteContainer::Legacy(route) => {
            println!(
                "legacy waypoint route (autopilot model: {})",
                route.autopilot_model.as_deref().unwrap_or("unknown")
            );
            println!("  actions:   none (not uploadable)");
        }
        RouteContainer::WaypointActions(route) => {
            println!(
                "waypoint route with actions (autopilot model: {})",
                route.autopilot_model.as_deref().unwrap_or("unknown")
            );
            println!("  waypoints: {}", route.mission.waypoints.len());
            println!("  actions:   {}", route.actions.len());
        }
    }
    Ok(())
}

async fn upload(path: &Path, heartbeat_timeout: Duration) -> anyhow::Result<()> {
    let container = read_route(path)?;

    /* create the connection bridge and a task that relays its events */
    let (bridge, events_rx) = Bridge::new();
    let events_task = tokio::spawn(async move {
        let mut events = UnboundedReceiverStream::new(events_rx);
        while let Some(event) = events.next().await {
            match event {
                BridgeEvent::Connected { model, serial } => {
                    log::info!("bridge: connected {:?} ({})", model, serial)
                }
                BridgeEvent::Disconnected => log::info!("bridge: disconnected"),
                BridgeEvent::StateUpdate(text) => log::info!("bridge: {}", text),
            }
        }
    });

    bridge.attach(Arc::new(SimVehicle::new(VehicleModel::Matrice300Rtk))).await;
    let vehicle = bridge.vehicle().await.context("no vehicle is connected")?;

    let on_progress: ProgressHandler = Arc::new(|progress: OperationProgress| {
        log::info!("{} = {:.3}", progress.stage, progress.progress);
    });
    let result = container
        .upload_to_vehicle(vehicle.as_ref(), Some(on_progress), heartbeat_timeout)
        .await;
    match &result {
        Ok(()) => bridge.notify("route upload complete"),
        Err(error) => bridge.notify(format!("route upload failed: {}", error)),
    }
    bridge.detach().await;

    /* dropping the bridge closes the event channel and ends the relay */
    drop(bridge);
    let _ = events_task.await;
    result.map_err(Into::into)
}
