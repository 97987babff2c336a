use nalgebra::{distance, Point2, Point3};

use super::depth::{sample_with, DepthMap, DepthSampling};

pub const DEFAULT_FOV_DEG: f64 = 60.0;
pub const DEFAULT_SUBJECT_DISTANCE_CM: f64 = 65.0;

/// 推定に使うカメラ条件
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryContext {
    /// 水平画角（度）
    pub fov_deg: f64,
    /// 検出器に渡したフレームの解像度
    pub frame_width: u32,
    pub frame_height: u32,
    pub sampling: DepthSampling,
}

impl GeometryContext {
    pub fn new(fov_deg: f64, frame_width: u32, frame_height: u32) -> Self {
        Self {
            fov_deg,
            frame_width,
            frame_height,
            sampling: DepthSampling::Nearest,
        }
    }

    pub fn with_sampling(mut self, sampling: DepthSampling) -> Self {
        self.sampling = sampling;
        self
    }

    fn is_valid(&self) -> bool {
        self.fov_deg > 0.0 && self.fov_deg < 180.0 && self.frame_width > 0 && self.frame_height > 0
    }
}

/// 推定モード。呼び出しごとに選ぶ
#[derive(Debug, Clone, Copy)]
pub enum EstimationMode<'a> {
    /// 画角と仮定距離による一次近似
    MonocularFov { subject_distance_cm: f64 },
    /// 深度を使ったピンホール逆投影
    DepthBackProjection { depth: &'a DepthMap },
}

/// 2 点間の実距離（cm）
///
/// 深度モードでどちらかの深度が無効なら None。呼び出し側は単眼モードに切り替えること。
pub fn estimate_distance(
    p1: &Point2<f64>,
    p2: &Point2<f64>,
    mode: &EstimationMode<'_>,
    ctx: &GeometryContext,
) -> Option<f64> {
    if !ctx.is_valid() {
        return None;
    }
    match *mode {
        EstimationMode::MonocularFov { subject_distance_cm } => {
            let cm_per_px = cm_per_pixel(ctx.fov_deg, ctx.frame_width, subject_distance_cm)?;
            Some(distance(p1, p2) * cm_per_px)
        }
        EstimationMode::DepthBackProjection { depth } => {
            let a = back_project_sampled(p1, depth, ctx)?;
            let b = back_project_sampled(p2, depth, ctx)?;
            Some(distance(&a, &b) * 100.0)
        }
    }
}

/// 距離 d (cm) における視野幅 `2·d·tan(θ/2)`
pub fn view_width_cm(fov_deg: f64, subject_distance_cm: f64) -> f64 {
    2.0 * subject_distance_cm * (fov_deg.to_radians() / 2.0).tan()
}

/// 1 ピクセルあたりの cm。条件が不正なら None
pub fn cm_per_pixel(fov_deg: f64, frame_width: u32, subject_distance_cm: f64) -> Option<f64> {
    if !(subject_distance_cm > 0.0 && subject_distance_cm.is_finite()) || frame_width == 0 {
        return None;
    }
    if !(fov_deg > 0.0 && fov_deg < 180.0) {
        return None;
    }
    Some(view_width_cm(fov_deg, subject_distance_cm) / frame_width as f64)
}

/// ピクセル位置と深度 z（メートル）からカメラ座標系の 3D 点（メートル）
///
/// 水平半画角 h = θ/2、垂直半画角はアスペクト比から v = atan(tan(h)·H/W)。
/// 正規化座標は画像中央が 0、上向きを +Y とする。
pub fn back_project(p: &Point2<f64>, z: f64, ctx: &GeometryContext) -> Point3<f64> {
    let w = ctx.frame_width as f64;
    let h = ctx.frame_height as f64;

    let half_h = ctx.fov_deg.to_radians() / 2.0;
    let half_v = (half_h.tan() * h / w).atan();

    let u_n = 2.0 * p.x / w - 1.0;
    let v_n = 1.0 - 2.0 * p.y / h;

    Point3::new(half_h.tan() * z * u_n, half_v.tan() * z * v_n, z)
}

fn back_project_sampled(
    p: &Point2<f64>,
    depth: &DepthMap,
    ctx: &GeometryContext,
) -> Option<Point3<f64>> {
    let z = sample_with(ctx.sampling, p.x, p.y, ctx.frame_width, ctx.frame_height, depth)?;
    Some(back_project(p, z as f64, ctx))
}
