use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;

use body_measure::config::Config;
use body_measure::geometry::MeasurementKind;
use body_measure::init_logging;
use body_measure::pipeline::Estimator;
use body_measure::pose::{Extractor, Keypoint};

const CONFIG_PATH: &str = "config.toml";

/// 検出結果ファイル
///
/// ```json
/// { "width": 640, "height": 480,
///   "keypoints": [{ "name": "nose", "x": 320, "y": 60, "score": 0.9 }, ...] }
/// ```
#[derive(Debug, Deserialize)]
struct Detection {
    width: u32,
    height: u32,
    keypoints: Vec<Keypoint>,
}

fn main() -> Result<()> {
    let config = Config::load_or_default(CONFIG_PATH);
    init_logging(config.app.log_filter());

    let args: Vec<String> = std::env::args().collect();
    let Some(path) = args.get(1) else {
        bail!("usage: measure_keypoints <keypoints.json> [distance_cm]");
    };

    let mut measure = config.measure.clone();
    if let Some(distance) = args.get(2) {
        measure.assumed_distance_cm = distance
            .parse()
            .with_context(|| format!("invalid distance: {}", distance))?;
    }

    let content = fs::read_to_string(path).with_context(|| format!("failed to read {}", path))?;
    let detection: Detection =
        serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path))?;
    if detection.width == 0 || detection.height == 0 {
        bail!("frame size must be non-zero, got {}x{}", detection.width, detection.height);
    }

    println!("body-measure {}", env!("GIT_VERSION"));
    println!("Frame: {}x{}", detection.width, detection.height);
    println!("FOV: {}°  distance: {} cm", measure.fov_deg, measure.assumed_distance_cm);
    println!("Keypoints: {}", detection.keypoints.len());
    println!();

    let extractor = Extractor::new(measure.confidence_threshold)
        .with_references(measure.torso_reference, measure.height_reference);
    let estimator = Estimator::from_config(&measure);

    let spans = extractor.extract(&detection.keypoints);
    let measurements = estimator.measure(&spans, detection.width, detection.height, None);

    for kind in MeasurementKind::ALL {
        match measurements.get(kind) {
            Some(t) => println!("{:>8}: {}", kind, t),
            None => println!("{:>8}: --", kind),
        }
    }
    Ok(())
}
