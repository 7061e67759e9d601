// stillcam demo
// Runs the capture service against the scripted camera until Ctrl-C (or
// --duration-s) and prints a JSON summary.

use anyhow::Context;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use stillcam::config::StillCamConfig;
use stillcam::testing::{MockCameraManager, MockDeviceSpec, MockPreviewSurface, MockStats};
use stillcam::{CaptureController, ImageWriter, Size};

struct Args {
    config: Option<PathBuf>,
    period_ms: Option<u64>,
    duration: Option<Duration>,
}

fn parse_args() -> anyhow::Result<Args> {
    let args: Vec<String> = env::args().collect();
    let mut parsed = Args {
        config: None,
        period_ms: None,
        duration: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                let path = args.get(i).context("--config needs a path")?;
                parsed.config = Some(PathBuf::from(path));
            }
            "--period-ms" => {
                i += 1;
                let value = args.get(i).context("--period-ms needs a value")?;
                parsed.period_ms = Some(value.parse().context("invalid --period-ms")?);
            }
            "--duration-s" => {
                i += 1;
                let value = args.get(i).context("--duration-s needs a value")?;
                let secs: u64 = value.parse().context("invalid --duration-s")?;
                parsed.duration = Some(Duration::from_secs(secs));
            }
            other => anyhow::bail!(
                "unknown argument {}\nusage: stillcam-demo [--config <file>] [--period-ms <n>] [--duration-s <n>]",
                other
            ),
        }
        i += 1;
    }
    Ok(parsed)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stillcam::init_logging();
    let args = parse_args()?;

    let mut config = match &args.config {
        Some(path) => StillCamConfig::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => StillCamConfig::load_or_default(),
    };
    if let Some(period_ms) = args.period_ms {
        config.capture.period_ms = period_ms;
    }

    let manager = Arc::new(MockCameraManager::new(vec![
        MockDeviceSpec::back("0"),
        MockDeviceSpec::front("1"),
    ]));
    let surface = Arc::new(MockPreviewSurface::portrait());

    let mut controller = CaptureController::new(config, manager.clone(), surface)
        .context("invalid configuration")?
        .with_sink(Arc::new(ImageWriter::new()));

    let (stop_tx, mut stop_rx) = tokio::sync::mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .context("installing Ctrl-C handler")?;

    controller.start();
    controller.surface_available(Size::new(1080, 1920))?;

    match args.duration {
        Some(duration) => {
            tokio::select! {
                _ = tokio::time::sleep(duration) => {}
                _ = stop_rx.recv() => {}
            }
        }
        None => {
            stop_rx.recv().await;
        }
    }

    controller.stop().await;

    let stats = manager.stats();
    let summary = serde_json::json!({
        "name": stillcam::NAME,
        "version": stillcam::VERSION,
        "output_directory": controller.config().storage.output_dir(),
        "status": controller.status(),
        "camera": {
            "devices_opened": MockStats::get(&stats.devices_opened),
            "devices_closed": MockStats::get(&stats.devices_closed),
            "still_captures": MockStats::get(&stats.still_captures),
            "precapture_triggers": MockStats::get(&stats.precapture_triggers),
            "last_orientation": stats.last_orientation(),
        },
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
