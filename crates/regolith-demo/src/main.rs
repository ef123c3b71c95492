//! Headless driver for the terrain coordinator.
//!
//! Flies a camera from orbit down to the surface and back, ticking the
//! coordinator once per simulated frame and logging wave activity.
//! Run with `cargo run -p regolith-demo -- --frames 300 --radius 2000`.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use glam::DVec3;
use regolith_config::{CliArgs, Config, default_config_dir};
use regolith_terrain::{
    BuildWorker, ColorRamp, NoiseHeightSource, NoiseParams, RampSurfaceSynthesizer,
    TerrainBuildCoordinator, TerrainError, ThreadedBuildWorker, UpdateOutcome,
};
use tracing::{error, info};

/// Ocean to snow, sampled by normalized elevation.
const RAMP_STOPS: &[(f32, [u8; 4])] = &[
    (0.0, [18, 42, 96, 255]),
    (0.35, [52, 112, 168, 255]),
    (0.45, [196, 184, 132, 255]),
    (0.6, [72, 124, 58, 255]),
    (0.85, [118, 104, 92, 255]),
    (1.0, [240, 240, 244, 255]),
];

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let config_dir = args.config.clone().unwrap_or_else(default_config_dir);
    let mut config = match Config::load_or_create(&config_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config, using defaults: {e}");
            Config::default()
        }
    };
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    regolith_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    match run(&config, args.frames) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("terrain demo failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &Config, frames: u32) -> Result<(), TerrainError> {
    let body = regolith_lod::Body::from_config(&config.body)?;
    let heights = Arc::new(NoiseHeightSource::new(NoiseParams::default()));
    let worker = ThreadedBuildWorker::from_config(&config.build, heights.clone())?;
    info!(workers = worker.worker_count(), "build workers started");

    let synthesizer = Box::new(RampSurfaceSynthesizer::for_body(&body));
    let mut terrain = TerrainBuildCoordinator::new(config, heights.as_ref(), worker, synthesizer)?;
    terrain.set_color_ramp(ColorRamp::from_gradient(RAMP_STOPS, 256)?);

    let started = Instant::now();
    let mut swaps = 0u32;
    for frame in 0..frames {
        let camera = camera_path(frame, frames, body.radius);
        terrain.set_camera_position(camera);

        if let UpdateOutcome::Swapped { shown, retired, .. } = terrain.update() {
            swaps += 1;
            info!(
                frame,
                shown,
                retired,
                active = terrain.active_count(),
                altitude = camera.length() - body.radius,
                "wave swapped"
            );
        }
        terrain.process_surface_synthesis_for_frame();
    }

    // Let the last wave land before reporting.
    let settle = Instant::now();
    while terrain.is_wave_pending() && settle.elapsed().as_secs() < 10 {
        terrain.update();
        terrain.process_surface_synthesis_for_frame();
        std::thread::yield_now();
    }

    let renderables = terrain.get_renderables();
    let triangles = renderables.len() * terrain.indices().len() / 3;
    let stats = terrain.stats();
    info!(
        frames,
        swaps,
        chunks = renderables.len(),
        triangles,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "simulation finished"
    );
    info!(
        constructed = stats.chunks_constructed,
        reused = stats.chunks_reused,
        disposed = stats.chunks_disposed,
        jobs = stats.jobs_submitted,
        retried = stats.jobs_retried,
        stale = stats.stale_results,
        failed = stats.failed_builds,
        in_flight = terrain.worker().in_flight_count(),
        peak = stats.peak_chunks,
        pooled = terrain.pool().len(),
        "chunk lifecycle"
    );
    Ok(())
}

/// Descend from four radii to just above the surface over the first half of
/// the run while circling the body, then climb back out.
fn camera_path(frame: u32, frames: u32, radius: f64) -> DVec3 {
    let t = if frames > 1 {
        frame as f64 / (frames - 1) as f64
    } else {
        0.0
    };
    let descent = 1.0 - (2.0 * t - 1.0).abs();
    let distance = radius * (4.0 - 2.98 * descent);
    let angle = t * std::f64::consts::TAU * 0.25;
    DVec3::new(angle.sin(), 0.3, angle.cos()).normalize() * distance
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_path_reaches_surface_and_returns() {
        let radius = 1000.0;
        let start = camera_path(0, 101, radius).length();
        let middle = camera_path(50, 101, radius).length();
        let end = camera_path(100, 101, radius).length();
        assert!((start - 4000.0).abs() < 1e-6);
        assert!(middle > radius && middle < radius * 1.05);
        assert!((end - 4000.0).abs() < 1e-6);
    }

    #[test]
    fn test_single_frame_path_is_finite() {
        assert!(camera_path(0, 1, 500.0).is_finite());
    }

    #[test]
    fn test_ramp_stops_are_valid() {
        assert_eq!(ColorRamp::from_gradient(RAMP_STOPS, 64).unwrap().len(), 64);
    }
}
