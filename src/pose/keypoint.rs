use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// MoveNet の 17 ランドマーク
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(usize)]
pub enum Landmark {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
}

impl Landmark {
    pub const COUNT: usize = 17;

    pub const ALL: [Landmark; Self::COUNT] = [
        Self::Nose,
        Self::LeftEye,
        Self::RightEye,
        Self::LeftEar,
        Self::RightEar,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftElbow,
        Self::RightElbow,
        Self::LeftWrist,
        Self::RightWrist,
        Self::LeftHip,
        Self::RightHip,
        Self::LeftKnee,
        Self::RightKnee,
        Self::LeftAnkle,
        Self::RightAnkle,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// 検出器が出力する名前（`left_shoulder` など）
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nose => "nose",
            Self::LeftEye => "left_eye",
            Self::RightEye => "right_eye",
            Self::LeftEar => "left_ear",
            Self::RightEar => "right_ear",
            Self::LeftShoulder => "left_shoulder",
            Self::RightShoulder => "right_shoulder",
            Self::LeftElbow => "left_elbow",
            Self::RightElbow => "right_elbow",
            Self::LeftWrist => "left_wrist",
            Self::RightWrist => "right_wrist",
            Self::LeftHip => "left_hip",
            Self::RightHip => "right_hip",
            Self::LeftKnee => "left_knee",
            Self::RightKnee => "right_knee",
            Self::LeftAnkle => "left_ankle",
            Self::RightAnkle => "right_ankle",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|l| l.as_str() == name)
    }
}

/// 単一キーポイント
///
/// 座標は検出器に渡したフレームのピクセル座標。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub name: Landmark,
    pub x: f32,
    pub y: f32,
    /// 信頼度スコア (0.0〜1.0)
    #[serde(alias = "score")]
    pub confidence: f32,
}

impl Keypoint {
    pub fn new(name: Landmark, x: f32, y: f32, confidence: f32) -> Self {
        Self { name, x, y, confidence }
    }

    /// 信頼度が閾値を超えているか（閾値ちょうどは不採用）
    pub fn is_valid(&self, threshold: f32) -> bool {
        self.confidence > threshold && self.x.is_finite() && self.y.is_finite()
    }

    pub fn position(&self) -> Point2<f64> {
        Point2::new(self.x as f64, self.y as f64)
    }
}

/// 名前でキーポイントを探す（重複時は先頭）
pub fn find(keypoints: &[Keypoint], name: Landmark) -> Option<&Keypoint> {
    keypoints.iter().find(|kp| kp.name == name)
}

/// 閾値を超えたキーポイントの位置
pub fn confident(keypoints: &[Keypoint], name: Landmark, threshold: f32) -> Option<Point2<f64>> {
    find(keypoints, name)
        .filter(|kp| kp.is_valid(threshold))
        .map(Keypoint::position)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_landmark_count() {
        assert_eq!(Landmark::COUNT, 17);
        assert_eq!(Landmark::ALL.len(), Landmark::COUNT);
    }

    #[test]
    fn test_landmark_from_index() {
        assert_eq!(Landmark::from_index(0), Some(Landmark::Nose));
        assert_eq!(Landmark::from_index(16), Some(Landmark::RightAnkle));
        assert_eq!(Landmark::from_index(17), None);
        for (i, l) in Landmark::ALL.iter().enumerate() {
            assert_eq!(*l as usize, i);
        }
    }

    #[test]
    fn test_landmark_names() {
        assert_eq!(Landmark::from_name("left_shoulder"), Some(Landmark::LeftShoulder));
        assert_eq!(Landmark::from_name("tail"), None);
        assert_eq!(Landmark::RightAnkle.as_str(), "right_ankle");
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let kp = Keypoint::new(Landmark::Nose, 10.0, 10.0, 0.3);
        assert!(!kp.is_valid(0.3));
        let kp = Keypoint::new(Landmark::Nose, 10.0, 10.0, 0.31);
        assert!(kp.is_valid(0.3));
    }

    #[test]
    fn test_non_finite_position_is_invalid() {
        let kp = Keypoint::new(Landmark::Nose, f32::NAN, 10.0, 0.9);
        assert!(!kp.is_valid(0.3));
    }

    #[test]
    fn test_deserialize_detector_output() {
        let kp: Keypoint =
            serde_json::from_str(r#"{"name":"left_hip","x":12.5,"y":40.0,"score":0.8}"#).unwrap();
        assert_eq!(kp.name, Landmark::LeftHip);
        assert_eq!(kp.confidence, 0.8);
    }

    #[test]
    fn test_confident_lookup() {
        let kps = [
            Keypoint::new(Landmark::Nose, 1.0, 2.0, 0.9),
            Keypoint::new(Landmark::LeftHip, 3.0, 4.0, 0.1),
        ];
        assert_eq!(confident(&kps, Landmark::Nose, 0.3), Some(Point2::new(1.0, 2.0)));
        assert_eq!(confident(&kps, Landmark::LeftHip, 0.3), None);
        assert_eq!(confident(&kps, Landmark::RightHip, 0.3), None);
    }
}
