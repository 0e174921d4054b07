/// Example: Run a scanner session against a synthetic camera
///
/// Uses a scripted classifier so no model is needed. If the configured
/// `model_path` points at a classifier script it is replayed, otherwise
/// labels are picked at random.
///
/// Usage:
///   cargo run --example scan_demo [config.json] [seconds]
use rand::seq::SliceRandom;
use rand::Rng;
use std::env;
use std::path::Path;
use std::time::{Duration, Instant};
use trash_scanner::classifier_stub::{ClassifierScript, ScriptStep};
use trash_scanner::frame_source::SyntheticFrameSource;
use trash_scanner::{
    Classification, Classifier, ScanEvent, ScannerConfig, ScannerSession, ScriptedClassifier,
};

const LABELS: &[&str] = &[
    "background",
    "background",
    "plastic bottle",
    "cardboard box",
    "glass jar",
    "aluminum can",
    "banana peel",
    "newspaper",
    "battery",
];

fn random_script(steps: usize) -> ClassifierScript {
    let mut rng = rand::thread_rng();
    let steps = (0..steps)
        .map(|_| {
            if rng.gen_bool(0.05) {
                return ScriptStep::Fail("simulated inference failure".to_string());
            }
            let label = LABELS.choose(&mut rng).copied().unwrap_or("background");
            ScriptStep::Results(vec![
                Classification::new(label, rng.gen_range(0.4..0.99)),
                Classification::new("background", rng.gen_range(0.0..0.3)),
            ])
        })
        .collect();

    ClassifierScript {
        steps,
        fallback: vec![Classification::new("background", 0.9)],
        latency_ms: 40,
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    trash_scanner::init()?;

    let args: Vec<String> = env::args().collect();
    let config = match args.get(1) {
        Some(path) => ScannerConfig::from_file(path)?,
        None => ScannerConfig {
            scan_interval_secs: 1.0,
            popup_duration_secs: 3,
            ..Default::default()
        },
    };
    let run_for = Duration::from_secs(args.get(2).and_then(|s| s.parse().ok()).unwrap_or(20));

    println!("♻️  Trash Scanner Demo (v{})", trash_scanner::version());
    println!("═══════════════════════════════════\n");

    let classifier: trash_scanner::Result<Box<dyn Classifier>> =
        if Path::new(&config.model_path).exists() {
            ScriptedClassifier::load(&config.model_path)
                .map(|c| Box::new(c) as Box<dyn Classifier>)
        } else {
            println!("📦 No script at {}, using random labels\n", config.model_path);
            Ok(Box::new(ScriptedClassifier::new(random_script(64))))
        };

    let mut session = ScannerSession::new(config, classifier)?;
    let events = session.events();
    let handle = session.handle();

    session.start(Box::new(SyntheticFrameSource::new(1280, 720, 30)))?;

    let started = Instant::now();
    let mut popups = 0;
    while started.elapsed() < run_for {
        session.pump(Duration::from_millis(50));

        for event in events.try_iter() {
            match event {
                ScanEvent::PopupShown(item) => {
                    popups += 1;
                    println!("🔍 {} ({:.0}%)", item.headline(), item.confidence * 100.0);
                    // Every third popup gets closed by "the user"
                    if popups % 3 == 0 {
                        handle.dismiss();
                    }
                }
                ScanEvent::CountdownChanged { remaining, total } => {
                    println!("   ⏳ {}/{}s", remaining, total);
                }
                ScanEvent::PopupHidden { reason } => println!("   ✓ hidden ({:?})\n", reason),
                ScanEvent::Error(message) => println!("❌ {}", message),
                ScanEvent::SessionStarted => println!("▶️  Session started\n"),
                ScanEvent::SessionStopped => println!("⏹️  Session stopped"),
            }
        }
    }

    session.stop();
    for event in events.try_iter() {
        if let ScanEvent::PopupHidden { reason } = event {
            println!("   ✓ hidden ({:?})", reason);
        }
    }

    let stats = session.stats();
    println!(
        "\n📊 {} frames, {} scanned, {} rejected, {} popups",
        stats.frames_received, stats.frames_scanned, stats.frames_rejected, popups
    );
    Ok(())
}
