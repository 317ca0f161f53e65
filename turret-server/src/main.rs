//! Deterrent turret server.
//!
//! Runs the control loop on its own thread and serves the live MJPEG feed,
//! a status endpoint, and exported fire-event clips over HTTP. Camera and
//! actuator backends are selected on the command line so the same binary
//! drives the bench simulation and the deployed rig.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use hardware::{ActuatorBackend, ScriptedProbe, SimActuator, TemperatureProbe, ThermalZoneProbe};
use scarecrow::{
    ActuationController, Camera, ControlPipeline, Detector, FrameStore, StatusSnapshot,
    ThermalGovernor, TurretConfig,
};

use crate::clip::AviClipSink;
use crate::mjpeg::MjpegBroadcaster;
use crate::routes::AppState;
use crate::sim::{SimCamera, SimDetector};

mod clip;
mod mjpeg;
mod routes;
mod sim;
#[cfg(all(target_os = "linux", feature = "v4l2-camera"))]
mod v4l2;

#[derive(Parser, Debug)]
#[command(author, version, about = "Autonomous deterrent turret server")]
struct Args {
    /// HTTP listen address.
    #[arg(long, default_value = "0.0.0.0:3000")]
    listen: SocketAddr,

    /// Turret configuration file (JSON); defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = CameraKind::Sim)]
    camera: CameraKind,

    #[arg(long, value_enum, default_value_t = BackendKind::Sim)]
    backend: BackendKind,

    /// Capture device path (v4l2 camera only).
    #[arg(long, default_value = "/dev/video0")]
    device: String,

    #[arg(long, default_value = "640")]
    capture_width: u32,

    #[arg(long, default_value = "480")]
    capture_height: u32,

    /// Override the clip export directory from the config file.
    #[arg(long)]
    clip_dir: Option<PathBuf>,

    /// JPEG quality for the live stream and exported clips (1-100).
    #[arg(long, default_value = "80")]
    jpeg_quality: u8,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CameraKind {
    /// Synthetic field with a gliding color-keyed target.
    Sim,
    /// V4L2 webcam (requires the v4l2-camera feature).
    V4l2,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum BackendKind {
    /// Journaled no-op actuator.
    Sim,
    /// Raspberry Pi servo/relay rig (requires the pi-turret feature).
    Pi,
}

fn build_camera(args: &Args) -> Result<Box<dyn Camera>> {
    match args.camera {
        CameraKind::Sim => Ok(Box::new(SimCamera::new(
            args.capture_width,
            args.capture_height,
            30,
        ))),
        #[cfg(all(target_os = "linux", feature = "v4l2-camera"))]
        CameraKind::V4l2 => Ok(Box::new(v4l2::V4l2Camera::open(
            &args.device,
            args.capture_width,
            args.capture_height,
        )?)),
        #[cfg(not(all(target_os = "linux", feature = "v4l2-camera")))]
        CameraKind::V4l2 => {
            anyhow::bail!("this build has no v4l2 support; rebuild with --features v4l2-camera")
        }
    }
}

fn build_backend(args: &Args) -> Result<Box<dyn ActuatorBackend>> {
    match args.backend {
        BackendKind::Sim => Ok(Box::new(SimActuator::new())),
        #[cfg(all(target_os = "linux", feature = "pi-turret"))]
        BackendKind::Pi => Ok(Box::new(hardware::PiTurret::new(
            hardware::pi_turret::PiTurretConfig::default(),
        ))),
        #[cfg(not(all(target_os = "linux", feature = "pi-turret")))]
        BackendKind::Pi => {
            anyhow::bail!("this build has no Pi rig support; rebuild with --features pi-turret")
        }
    }
}

fn build_probe(args: &Args) -> Box<dyn TemperatureProbe> {
    match args.backend {
        // The bench has no thermal zone worth watching.
        BackendKind::Sim => Box::new(ScriptedProbe::constant(45.0)),
        BackendKind::Pi => Box::new(ThermalZoneProbe::new()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let jpeg_quality = args.jpeg_quality.clamp(1, 100);

    let mut config = match &args.config {
        Some(path) => TurretConfig::load_from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => TurretConfig::default(),
    };
    if let Some(dir) = &args.clip_dir {
        config.store.clip_dir = dir.clone();
    }

    let camera = build_camera(&args)?;
    let detector: Box<dyn Detector> = Box::new(SimDetector);
    let backend = build_backend(&args)?;
    let probe = build_probe(&args);

    let controller = ActuationController::new(config.actuation.clone(), backend)
        .context("actuator init failed")?;
    let governor = ThermalGovernor::start(config.thermal.clone(), probe);
    let store = Arc::new(FrameStore::new(
        config.store.clone(),
        Box::new(AviClipSink::new(jpeg_quality)),
    ));
    let board = Arc::new(Mutex::new(StatusSnapshot::default()));
    let stop = Arc::new(AtomicBool::new(false));
    let clip_dir = store.clip_dir().clone();

    let pipeline = ControlPipeline::new(
        config,
        camera,
        detector,
        controller,
        governor,
        Arc::clone(&store),
        Arc::clone(&stop),
        Arc::clone(&board),
    );
    let control_thread = std::thread::Builder::new()
        .name("control-loop".to_string())
        .spawn(move || pipeline.run())
        .context("spawning control loop")?;

    let broadcaster = Arc::new(MjpegBroadcaster::default());
    let bridge_thread = {
        let store = Arc::clone(&store);
        let broadcaster = Arc::clone(&broadcaster);
        std::thread::Builder::new()
            .name("stream-bridge".to_string())
            .spawn(move || mjpeg::run_store_bridge(store, broadcaster, jpeg_quality))
            .context("spawning stream bridge")?
    };

    let state = Arc::new(AppState {
        broadcaster,
        status: board,
        clip_dir,
    });
    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("binding {}", args.listen))?;
    info!(listen = %args.listen, "turret server up");

    let shutdown = {
        let stop = Arc::clone(&stop);
        async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("interrupt received, stopping control loop");
            stop.store(true, Ordering::SeqCst);
        }
    };
    axum::serve(listener, routes::router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("http server failed")?;

    // The loop notices the stop flag, runs its shutdown sequence, and stops
    // the store, which in turn releases the bridge.
    stop.store(true, Ordering::SeqCst);
    match control_thread.join() {
        Ok(result) => result.context("control loop failed")?,
        Err(_) => error!("control loop panicked"),
    }
    if bridge_thread.join().is_err() {
        error!("stream bridge panicked");
    }
    info!("turret server down");
    Ok(())
}
