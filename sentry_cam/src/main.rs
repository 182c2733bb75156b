mod capture;
mod convert;
mod display;
mod mail;
mod notify;
mod recorder;

use anyhow::{Context, Result};
use capture::CameraSource;
use clap::Parser;
use display::Preview;
use mail::SmtpNotifier;
use notify::{BackgroundNotifier, BoxedNotifier};
use recorder::AviRecorder;
use sentry_vision::core_modules::region::RegionOfInterest;
use sentry_vision::{
    CommandNotifier, EventDispatcher, MotionPipeline, SnapshotNotifier, StreamRunner, WatchConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "sentry_cam")]
#[command(about = "Records motion incidents from a camera or video file")]
struct Cli {
    /// Path to the JSON or TOML configuration file.
    #[arg(short, long)]
    conf: PathBuf,
    /// Show the region of interest instead of the feed (needs `show_video`).
    #[arg(long)]
    aim: bool,
    /// Camera index to capture from.
    #[arg(long, default_value_t = 0, conflicts_with = "input")]
    device: i32,
    /// Read frames from a video file instead of a camera.
    #[arg(long)]
    input: Option<String>,
}

fn main() -> Result<()> {
    // --- 1. Argument Parsing & Setup ---
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let config = WatchConfig::load_from_file(&cli.conf)
        .with_context(|| format!("loading {}", cli.conf.display()))?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || shutdown.store(true, Ordering::SeqCst))
            .context("installing the Ctrl-C handler")?;
    }

    // --- 2. Video I/O Initialization ---
    let source = match &cli.input {
        Some(path) => CameraSource::open_file(path, config.resolution, config.fps)?,
        None => {
            let source = CameraSource::open_device(cli.device, config.resolution, config.fps)?;
            log::info!("warming up for {:.1}s", config.camera_warmup_time);
            std::thread::sleep(Duration::from_secs_f64(config.camera_warmup_time));
            source
        }
    };
    let recorder = AviRecorder::new(
        config.output_dir.clone(),
        &config.fourcc,
        config.fps,
        config.resolution,
    )?;

    // --- 3. Notification Delivery ---
    let runtime = tokio::runtime::Runtime::new().context("starting the notification runtime")?;
    let inner: BoxedNotifier = match (&config.notify_command, config.email_settings()?) {
        (Some(command), _) => Box::new(CommandNotifier::new(&config.snapshot_dir, command)?),
        (None, Some(smtp)) => Box::new(SmtpNotifier::new(&smtp).context("setting up e-mail")?),
        (None, None) => Box::new(SnapshotNotifier::new(&config.snapshot_dir)),
    };
    let (notifier, worker) = BackgroundNotifier::spawn(runtime.handle(), inner);

    // --- 4. Vision Pipeline Initialization ---
    let pipeline = MotionPipeline::new(&config)?;
    let preview = match (config.show_video, cli.aim) {
        (false, _) => None,
        (true, false) => Some(Preview::Feed),
        (true, true) => Some(Preview::Aim(RegionOfInterest::new(config.crop_rect()?, 0.0))),
    };

    // --- 5. Main Processing Loop ---
    let mut runner = StreamRunner::new(
        source,
        pipeline,
        EventDispatcher::new(recorder, notifier),
        &shutdown,
    );
    let outcome = runner.run(|report| {
        if let Some(preview) = &preview {
            if let Err(e) = preview.show(report) {
                log::warn!("preview failed: {e}");
            }
        }
    });
    drop(runner);
    if preview.is_some() {
        Preview::close();
    }

    // --- 6. Drain Pending Notifications ---
    match runtime.block_on(worker) {
        Ok(delivered) => log::info!("{delivered} notification(s) delivered"),
        Err(e) => log::error!("notification worker failed: {e}"),
    }

    let summary = outcome?;
    log::info!(
        "stopped ({:?}): {} frames, {} incidents, {} sink failures",
        summary.stop_reason,
        summary.frames_processed,
        summary.dispatch.incidents_ended,
        summary.dispatch.sink_failures,
    );
    Ok(())
}
