use nalgebra::{center, distance, Point2};
use serde::Deserialize;

use super::keypoint::{confident, Keypoint, Landmark};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.3;

/// 胴の長さの上端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TorsoReference {
    /// 左肩 → 左腰
    #[default]
    LeftSide,
    /// 両肩の中点 → 左腰
    ShoulderMidpoint,
}

/// 身長の下端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeightReference {
    /// 信頼できる足首の平均（片方だけならその足首）
    #[default]
    AveragedAnkles,
    /// 左足首のみ
    LeftAnkle,
}

/// 2 点間の区間（ピクセル座標）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Span {
    pub from: Point2<f64>,
    pub to: Point2<f64>,
}

impl Span {
    pub fn new(from: Point2<f64>, to: Point2<f64>) -> Self {
        Self { from, to }
    }

    pub fn pixels(&self) -> f64 {
        distance(&self.from, &self.to)
    }
}

/// 計測 3 種の区間。検出できなかったものは None
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BodySpans {
    pub shoulder: Option<Span>,
    pub torso: Option<Span>,
    pub height: Option<Span>,
}

/// ピクセル距離のみ
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PixelDistances {
    pub shoulder_px: Option<f64>,
    pub torso_px: Option<f64>,
    pub height_px: Option<f64>,
}

impl BodySpans {
    pub fn is_empty(&self) -> bool {
        self.shoulder.is_none() && self.torso.is_none() && self.height.is_none()
    }

    pub fn pixel_distances(&self) -> PixelDistances {
        PixelDistances {
            shoulder_px: self.shoulder.map(|s| s.pixels()),
            torso_px: self.torso.map(|s| s.pixels()),
            height_px: self.height.map(|s| s.pixels()),
        }
    }
}

/// キーポイント列から肩幅・胴・身長の区間を取り出す
#[derive(Debug, Clone)]
pub struct Extractor {
    threshold: f32,
    torso: TorsoReference,
    height: HeightReference,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIDENCE_THRESHOLD)
    }
}

impl Extractor {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            torso: TorsoReference::default(),
            height: HeightReference::default(),
        }
    }

    pub fn with_references(mut self, torso: TorsoReference, height: HeightReference) -> Self {
        self.torso = torso;
        self.height = height;
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn extract(&self, keypoints: &[Keypoint]) -> BodySpans {
        BodySpans {
            shoulder: self.shoulder(keypoints),
            torso: self.torso(keypoints),
            height: self.height(keypoints),
        }
    }

    fn point(&self, keypoints: &[Keypoint], name: Landmark) -> Option<Point2<f64>> {
        confident(keypoints, name, self.threshold)
    }

    fn shoulder(&self, keypoints: &[Keypoint]) -> Option<Span> {
        let left = self.point(keypoints, Landmark::LeftShoulder)?;
        let right = self.point(keypoints, Landmark::RightShoulder)?;
        Some(Span::new(left, right))
    }

    fn torso(&self, keypoints: &[Keypoint]) -> Option<Span> {
        let left_shoulder = self.point(keypoints, Landmark::LeftShoulder)?;
        let hip = self.point(keypoints, Landmark::LeftHip)?;
        let top = match self.torso {
            TorsoReference::LeftSide => left_shoulder,
            TorsoReference::ShoulderMidpoint => {
                let right_shoulder = self.point(keypoints, Landmark::RightShoulder)?;
                center(&left_shoulder, &right_shoulder)
            }
        };
        Some(Span::new(top, hip))
    }

    fn height(&self, keypoints: &[Keypoint]) -> Option<Span> {
        let nose = self.point(keypoints, Landmark::Nose)?;
        let left = self.point(keypoints, Landmark::LeftAnkle);
        let bottom = match self.height {
            HeightReference::LeftAnkle => left?,
            HeightReference::AveragedAnkles => {
                match (left, self.point(keypoints, Landmark::RightAnkle)) {
                    (Some(l), Some(r)) => center(&l, &r),
                    (Some(a), None) | (None, Some(a)) => a,
                    (None, None) => return None,
                }
            }
        };
        Some(Span::new(nose, bottom))
    }
}

/// デフォルト設定でピクセル距離を取り出す
pub fn extract(keypoints: &[Keypoint], threshold: f32) -> PixelDistances {
    Extractor::new(threshold).extract(keypoints).pixel_distances()
}
