//! framechain - demo chain runner and sidecar worker entry point
//!
//! `framechain run` builds a camera-like chain: a synthetic source behind a
//! Buffer, a slow detector behind a second Buffer, picture-in-picture and
//! side-by-side compositing, a Trigger pacing the whole chain, and a Viewer
//! polled by this process. When launched as a sidecar worker the binary
//! serves a single stage over stdin/stdout instead.

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use framechain::{
    backend::{is_worker_process, serve_stdio, StageRegistry, StageSpec},
    config::{default_config_path, ChainConfig, IsolationMode},
    imaging,
    pipeline::stages::{Buffer, Fallback, FallbackEntry, Inlay, SideBySide, Trigger, Viewer},
    pipeline::{Graph, Pipeline},
    processors::SlowDetectorConfig,
    sources::TestPatternConfig,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(name = "framechain", version)]
#[command(about = "Rate-decoupled pull chains for live media processing")]
struct Cli {
    /// Config file (TOML, or JSON by extension).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the demo chain.
    Run(RunArgs),
    /// Serve one stage over stdin/stdout (used by process isolation).
    Worker,
    /// Print the effective configuration as TOML.
    DumpConfig,
}

#[derive(Parser, Debug, Default)]
struct RunArgs {
    /// Override the run time in seconds (0 runs until interrupted).
    #[arg(long)]
    seconds: Option<u64>,

    /// Run the detector in a sidecar process.
    #[arg(long, default_value_t = false)]
    isolated: bool,

    /// Write PNG snapshots of the viewer output into this directory.
    #[arg(long)]
    snapshots: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    if is_worker_process() {
        return run_worker();
    }

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.cmd {
        Some(Command::Worker) => run_worker(),
        Some(Command::DumpConfig) => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Some(Command::Run(args)) => run_demo(config, args),
        None => run_demo(config, RunArgs::default()),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ChainConfig> {
    if let Some(path) = path {
        return ChainConfig::load(path).with_context(|| format!("loading {}", path.display()));
    }
    match default_config_path() {
        Some(path) if path.exists() => Ok(ChainConfig::load_or_default(path)),
        _ => Ok(ChainConfig::default()),
    }
}

fn run_worker() -> anyhow::Result<()> {
    framechain::logging::init_worker();
    tracing::debug!("Sidecar worker starting (pid {})", std::process::id());
    serve_stdio(&StageRegistry::with_builtins()).context("sidecar worker failed")
}

fn run_demo(mut config: ChainConfig, args: RunArgs) -> anyhow::Result<()> {
    let _log_guard = framechain::logging::init(&config.logging);

    if let Some(seconds) = args.seconds {
        config.demo.run_secs = seconds;
    }
    if args.isolated {
        config.buffer.isolation = IsolationMode::Process;
    }
    if args.snapshots.is_some() {
        config.demo.snapshot_dir = args.snapshots;
    }
    let demo = &config.demo;

    tracing::info!(
        "Starting demo chain {}x{} at {} Hz ({:?} isolation)",
        demo.width,
        demo.height,
        config.trigger.rate_hz,
        config.buffer.isolation
    );

    let graph = Graph::new();
    let mut chain = Pipeline::with_name(&graph, "demo");

    let source = StageSpec::new(
        "test_pattern",
        TestPatternConfig {
            width: demo.width,
            height: demo.height,
            ..TestPatternConfig::default()
        },
    )?;
    chain.add(Buffer::deferred(source).named("Camera"));

    // Until the first detection lands, show the raw frame with a placeholder label.
    let detector = StageSpec::new(
        "slow_detector",
        SlowDetectorConfig {
            latency_ms: demo.detector_latency_ms,
            ..SlowDetectorConfig::default()
        },
    )?;
    chain.add(
        Buffer::deferred(detector)
            .with_isolation(config.buffer.isolation())
            .with_fallback(Fallback::entries([
                FallbackEntry::Copy(-1),
                FallbackEntry::Text("detecting...".to_string()),
            ])),
    );

    // [frame, annotated, label] -> inlay the annotated image over the frame
    chain.add(Inlay::new(-3, -2, demo.inlay_factor));
    // [frame, annotated, label, inlay] -> raw frame beside the inlay
    chain.add(SideBySide::new(-4, -1).with_factor(demo.sbs_factor));
    chain.add(Trigger::from_settings(&config.trigger));

    let viewer = Arc::new(Viewer::new(-1));
    chain.add_arc(viewer.clone());

    chain.start(false).context("starting demo chain")?;

    let view_period = (demo.view_fps > 0.0)
        .then(|| Duration::try_from_secs_f64(1.0 / demo.view_fps).ok())
        .flatten()
        .unwrap_or(Duration::from_millis(100));
    let run_for = (demo.run_secs > 0).then(|| Duration::from_secs(demo.run_secs));
    let snapshot_every = Duration::from_secs(demo.snapshot_interval_secs.max(1));
    if let Some(dir) = &demo.snapshot_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating snapshot directory {}", dir.display()))?;
    }

    let started = Instant::now();
    let mut last_snapshot = Instant::now();
    while run_for.map_or(true, |limit| started.elapsed() < limit) {
        chain.pull();

        if let Some(dir) = &demo.snapshot_dir {
            if last_snapshot.elapsed() >= snapshot_every {
                last_snapshot = Instant::now();
                if let Err(e) = write_snapshot(&viewer, dir) {
                    tracing::warn!("Snapshot failed: {:#}", e);
                }
            }
        }
        std::thread::sleep(view_period);
    }

    tracing::info!(
        "Shutting down after {:.1}s, {} viewer updates",
        started.elapsed().as_secs_f64(),
        viewer.updates()
    );
    chain.stop();
    if !chain.wait(Some(Duration::from_secs(5))) {
        tracing::warn!("Chain did not stop within 5s");
    }
    Ok(())
}

fn write_snapshot(viewer: &Viewer, dir: &Path) -> anyhow::Result<()> {
    let Some(frame) = viewer.latest_image() else {
        return Ok(());
    };
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S%.3f");
    let path = dir.join(format!("frame-{}.png", stamp));
    let bytes = imaging::encode_png(&frame)?;
    std::fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))?;
    tracing::debug!("Wrote snapshot {}", path.display());
    Ok(())
}
