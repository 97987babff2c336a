use anyhow::{bail, Result};
use log::{warn, LevelFilter};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::geometry::DepthSampling;
use crate::pose::{HeightReference, TorsoReference};
use crate::source::{Facing, SessionCapabilities};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub measure: MeasureConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub app: AppConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MeasureConfig {
    /// 水平画角（度）
    #[serde(default = "default_fov_deg")]
    pub fov_deg: f64,
    /// 単眼モードで仮定する被写体までの距離（cm）
    #[serde(default = "default_assumed_distance_cm")]
    pub assumed_distance_cm: f64,
    /// キーポイント信頼度閾値（この値を超えたものだけ採用）
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default)]
    pub torso_reference: TorsoReference,
    #[serde(default)]
    pub height_reference: HeightReference,
    #[serde(default)]
    pub depth_sampling: DepthSampling,
    /// 深度マップがある間、画面中央の深度を単眼モードの距離として使う
    #[serde(default)]
    pub center_depth_as_distance: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CameraConfig {
    #[serde(default = "default_facing")]
    pub facing: Facing,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    /// DOM overlay（任意機能）を要求するか
    #[serde(default = "default_dom_overlay")]
    pub dom_overlay: bool,
    /// セッション終了後にカメラへ自動復帰する
    #[serde(default)]
    pub resume_camera_on_end: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_target_fps")]
    pub target_fps: u32,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_fov_deg() -> f64 { 60.0 }
fn default_assumed_distance_cm() -> f64 { 65.0 }
fn default_confidence_threshold() -> f32 { 0.3 }
fn default_facing() -> Facing { Facing::Back }
fn default_dom_overlay() -> bool { true }
fn default_target_fps() -> u32 { 30 }
fn default_log_level() -> String { "info".to_string() }

impl Default for MeasureConfig {
    fn default() -> Self {
        Self {
            fov_deg: default_fov_deg(),
            assumed_distance_cm: default_assumed_distance_cm(),
            confidence_threshold: default_confidence_threshold(),
            torso_reference: TorsoReference::default(),
            height_reference: HeightReference::default(),
            depth_sampling: DepthSampling::default(),
            center_depth_as_distance: false,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self { facing: default_facing() }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dom_overlay: default_dom_overlay(),
            resume_camera_on_end: false,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            target_fps: default_target_fps(),
            log_level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// `log_level` を解釈する。不正な値は info 扱い
    pub fn log_filter(&self) -> LevelFilter {
        self.log_level.parse().unwrap_or(LevelFilter::Info)
    }
}

impl SessionConfig {
    pub fn capabilities(&self) -> SessionCapabilities {
        SessionCapabilities {
            depth: true,
            dom_overlay: self.dom_overlay,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// 読み込みに失敗したらデフォルト設定を返す
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("config {} not loaded ({}), using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let m = &self.measure;
        if !(m.fov_deg > 0.0 && m.fov_deg < 180.0) {
            bail!("measure.fov_deg must be in (0, 180), got {}", m.fov_deg);
        }
        if !(m.assumed_distance_cm > 0.0) || !m.assumed_distance_cm.is_finite() {
            bail!(
                "measure.assumed_distance_cm must be positive, got {}",
                m.assumed_distance_cm
            );
        }
        if !(0.0..1.0).contains(&m.confidence_threshold) {
            bail!(
                "measure.confidence_threshold must be in [0, 1), got {}",
                m.confidence_threshold
            );
        }
        if self.app.target_fps == 0 {
            bail!("app.target_fps must be non-zero");
        }
        Ok(())
    }
}
