use anyhow::Result;
use log::info;
use std::sync::Arc;
use std::time::{Duration, Instant};

use body_measure::config::Config;
use body_measure::geometry::{MeasurementKind, Measurements};
use body_measure::init_logging;
use body_measure::pipeline::{Driver, MeasurementSink};
use body_measure::pose::{Detector, Keypoint, Landmark};
use body_measure::source::synthetic::{HardwareLedger, SyntheticCamera, SyntheticSession};
use body_measure::source::{Frame, FrameSourceManager, SourceOutcome};

const CONFIG_PATH: &str = "config.toml";
const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;
/// 各フェーズの長さ（秒）
const PHASE_SECS: f64 = 2.0;

/// 呼吸のように肩幅がゆっくり揺れる人物を返す検出器
struct ScriptedPose;

impl Detector for ScriptedPose {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Keypoint>> {
        let t = frame.sequence as f32 * 0.1;
        let half = 50.0 + 3.0 * t.sin();
        let cx = frame.width() as f32 / 2.0;
        Ok(vec![
            Keypoint::new(Landmark::Nose, cx, 60.0, 0.9),
            Keypoint::new(Landmark::LeftShoulder, cx + half, 120.0, 0.9),
            Keypoint::new(Landmark::RightShoulder, cx - half, 120.0, 0.9),
            Keypoint::new(Landmark::LeftHip, cx + half * 0.8, 270.0, 0.8),
            Keypoint::new(Landmark::RightHip, cx - half * 0.8, 270.0, 0.8),
            Keypoint::new(Landmark::LeftAnkle, cx + 30.0, 460.0, 0.7),
            Keypoint::new(Landmark::RightAnkle, cx - 30.0, 460.0, 0.7),
        ])
    }
}

/// 一定間隔でログに出す
struct LogSink {
    last: Option<Measurements>,
    log_timer: Instant,
}

impl MeasurementSink for LogSink {
    fn on_measurements(&mut self, measurements: &Measurements) {
        self.last = Some(*measurements);
        if self.log_timer.elapsed() >= Duration::from_secs(1) {
            for kind in MeasurementKind::ALL {
                if let Some(t) = measurements.get(kind) {
                    info!("{:>8}: {}", kind, t);
                }
            }
            self.log_timer = Instant::now();
        }
    }

    fn on_source_event(&mut self, outcome: &SourceOutcome) {
        info!("source: {:?}", outcome);
    }
}

fn main() -> Result<()> {
    let config = Config::load_or_default(CONFIG_PATH);
    init_logging(config.app.log_filter());

    println!("Pipeline Demo {}", env!("GIT_VERSION"));
    println!("Target FPS: {}", config.app.target_fps);
    println!("FOV: {}°  fallback distance: {} cm", config.measure.fov_deg, config.measure.assumed_distance_cm);
    println!("Camera facing: {:?}", config.camera.facing);
    println!();

    let ledger = HardwareLedger::new();
    let camera = Arc::new(SyntheticCamera::new(WIDTH, HEIGHT, ledger.clone()));
    let session = Arc::new(SyntheticSession::new(WIDTH, HEIGHT, ledger.clone()));
    let sources = FrameSourceManager::from_config(&config, camera, session);
    let sink = LogSink { last: None, log_timer: Instant::now() };
    let mut driver = Driver::from_config(&config, sources, ScriptedPose, sink);

    let frame_duration = Duration::from_secs_f64(1.0 / config.app.target_fps as f64);
    let phase = Duration::from_secs_f64(PHASE_SECS);

    // カメラ → 深度セッション → 終了（設定によってはカメラへ復帰）
    driver.sources_mut().start_camera();
    let mut phase_start = Instant::now();
    let mut step = 0u32;

    loop {
        let loop_start = Instant::now();
        driver.tick();

        if phase_start.elapsed() >= phase {
            phase_start = Instant::now();
            step += 1;
            match step {
                1 => {
                    info!("switching to depth session");
                    driver.sources_mut().start_session();
                }
                2 => {
                    info!("ending depth session");
                    driver.sources_mut().end_session();
                }
                _ => break,
            }
        }

        let elapsed = loop_start.elapsed();
        if elapsed < frame_duration {
            std::thread::sleep(frame_duration - elapsed);
        }
    }

    driver.sources_mut().stop();
    let stats = driver.stats();
    println!();
    println!(
        "ticks={} processed={} emitted={} skipped={} detector_errors={}",
        stats.ticks, stats.processed, stats.emitted, stats.skipped, stats.detector_errors
    );
    println!(
        "camera acquire/release={}/{}  session acquire/release={}/{}  overlaps={}",
        ledger.camera_acquires(),
        ledger.camera_releases(),
        ledger.session_acquires(),
        ledger.session_releases(),
        ledger.overlaps()
    );
    if let Some(last) = driver.sink().last {
        if let Some(shoulder) = last.shoulder {
            println!("last shoulder: {}", shoulder);
        }
    }
    Ok(())
}
