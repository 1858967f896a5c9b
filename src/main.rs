//! CLI entry point for seam-inspect.
//!
//! Provides a command-line interface for:
//! - Validating a configuration file
//! - Driving the dispatch core with a simulated sensor, useful for
//!   exercising the scheduling and overtriggering behavior without hardware
//!
//! # Usage
//!
//! Validate a config:
//! ```bash
//! seam-inspect --config inspect.toml check-config
//! ```
//!
//! Run a simulated seam:
//! ```bash
//! seam-inspect simulate --frames 200 --drop-rate 0.02
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use rand::Rng;
use seam_inspect::config::Settings;
use seam_inspect::dispatcher::{InspectManager, Proxies};
use seam_inspect::frame::Image;
use seam_inspect::graph::{MockGraph, SensorRequirements};
use seam_inspect::product::{Product, Seam, SeamSeries};
use seam_inspect::results::CollectingProxy;
use seam_inspect::trigger::TriggerContext;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const CAMERA_SENSOR: i32 = 1;

#[derive(Parser)]
#[command(name = "seam-inspect")]
#[command(about = "Frame dispatch core for laser-weld seam inspection", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate the configuration, then exit
    CheckConfig,

    /// Drive one inspection cycle with a simulated camera
    Simulate {
        /// Number of frames per seam
        #[arg(long, default_value = "100")]
        frames: u32,

        /// Probability that a trigger is lost before reaching the core
        #[arg(long, default_value = "0.0")]
        drop_rate: f64,

        /// Simulated graph processing time per frame
        #[arg(long, default_value = "2ms", value_parser = humantime::parse_duration)]
        graph_time: Duration,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.log_level.clone())),
        )
        .init();

    match cli.command {
        Commands::CheckConfig => {
            settings.validate()?;
            info!(workers = settings.worker_count, "configuration is valid");
            Ok(())
        }
        Commands::Simulate {
            frames,
            drop_rate,
            graph_time,
        } => simulate(settings, frames, drop_rate, graph_time),
    }
}

/// Runs one product cycle against a mock graph, losing a fraction of the
/// triggers on the way, and reports the dispatch counters at the end.
fn simulate(settings: Settings, frames: u32, drop_rate: f64, graph_time: Duration) -> Result<()> {
    let graph = Arc::new(
        MockGraph::new(SensorRequirements::image_only(CAMERA_SENSOR)).with_run_time(graph_time),
    );

    // 100 µm trigger spacing at 20 mm/s welding speed: 5 ms per trigger
    let seam = Seam::single_interval(0, 100, 20_000, 100 * i64::from(frames), graph.clone());
    let trigger_interval = seam.trigger_interval();
    let product = Product::new(
        "simulated",
        1,
        vec![SeamSeries {
            number: 0,
            seams: vec![seam],
        }],
    );

    let proxy = Arc::new(CollectingProxy::default());
    let proxies = Proxies {
        result_handler: proxy.clone(),
        result_proxy: proxy.clone(),
        recorder: proxy.clone(),
        system_status: proxy.clone(),
        video_recorder: proxy.clone(),
    };

    let manager = InspectManager::new(settings, proxies)?;
    manager.change_product(product);
    manager.activate_seam_series(0)?;
    manager.start_inspect(0, 0, "simulated-seam")?;

    info!(
        frames,
        drop_rate,
        trigger_interval_us = trigger_interval.as_micros() as u64,
        graph_time_us = graph_time.as_micros() as u64,
        "simulation started"
    );

    let mut rng = rand::thread_rng();
    let cycle = manager.current_cycle();
    let mut delivered = 0u32;
    for image_number in 0..frames as i32 {
        std::thread::sleep(trigger_interval);
        if rng.gen_bool(drop_rate.clamp(0.0, 1.0)) {
            continue;
        }
        let trigger = TriggerContext::new(image_number, 0, 0, cycle);
        let image = simulated_image(&mut rng);
        if manager.data_image(CAMERA_SENSOR, trigger, image) {
            delivered += 1;
        }
    }

    let counters = manager.counters();
    manager.stop_inspect();

    info!(
        delivered,
        signaled = counters.signaled,
        joined = counters.joined,
        skipped_from_sensor = counters.skipped_from_sensor,
        skipped_in_inspection = counters.skipped_in_inspection,
        graph_runs = graph.executed().len(),
        results = proxy.results().len(),
        recorded_frames = proxy.recorded_frames().len(),
        "simulation finished"
    );
    Ok(())
}

fn simulated_image(rng: &mut impl Rng) -> Image {
    const W: u32 = 64;
    const H: u32 = 64;
    let pixels = (0..(W * H)).map(|_| rng.gen::<u8>()).collect();
    // dimensions and buffer length always match here
    Image::from_pixels(W, H, pixels).unwrap_or_default()
}
