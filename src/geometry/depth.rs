//! 深度マップと深度サンプラー
//!
//! 深度バッファの生フォーマット（8bit / 16bit / float）はここでメートルに正規化する。
//! スケールは `raw_to_meters` で明示し、バッファ型からは推測しない。

use serde::Deserialize;

use crate::error::DepthMapError;

/// 生の深度サンプル（行優先, `width * height` 要素）
#[derive(Debug, Clone, PartialEq)]
pub enum DepthSamples {
    U8(Vec<u8>),
    U16(Vec<u16>),
    F32(Vec<f32>),
}

impl DepthSamples {
    pub fn len(&self) -> usize {
        match self {
            Self::U8(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn raw(&self, index: usize) -> Option<f32> {
        match self {
            Self::U8(v) => v.get(index).map(|&r| r as f32),
            Self::U16(v) => v.get(index).map(|&r| r as f32),
            Self::F32(v) => v.get(index).copied(),
        }
    }
}

/// 1 フレーム分の深度マップ
///
/// 生成したフレームソースが所有し、利用側は参照のみ。次のフレームまで保持したい場合は clone する。
#[derive(Debug, Clone, PartialEq)]
pub struct DepthMap {
    width: u32,
    height: u32,
    samples: DepthSamples,
    raw_to_meters: f32,
}

impl DepthMap {
    pub fn new(
        width: u32,
        height: u32,
        samples: DepthSamples,
        raw_to_meters: f32,
    ) -> Result<Self, DepthMapError> {
        let expected = width as usize * height as usize;
        if samples.len() != expected {
            return Err(DepthMapError::BufferSizeMismatch {
                expected,
                actual: samples.len(),
            });
        }
        if !(raw_to_meters.is_finite() && raw_to_meters > 0.0) {
            return Err(DepthMapError::InvalidScale(raw_to_meters));
        }
        Ok(Self { width, height, samples, raw_to_meters })
    }

    /// メートル単位の float バッファから作成
    pub fn from_meters(width: u32, height: u32, meters: Vec<f32>) -> Result<Self, DepthMapError> {
        Self::new(width, height, DepthSamples::F32(meters), 1.0)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn raw_to_meters(&self) -> f32 {
        self.raw_to_meters
    }

    pub fn samples(&self) -> &DepthSamples {
        &self.samples
    }

    /// セル (x, y) の深度（メートル）
    ///
    /// 範囲外・非有限・0 以下は None。
    pub fn meters_at(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let index = y as usize * self.width as usize + x as usize;
        let meters = self.samples.raw(index)? * self.raw_to_meters;
        (meters.is_finite() && meters > 0.0).then_some(meters)
    }
}

/// 深度サンプリング方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthSampling {
    /// 最近傍セル（切り捨て）。補間しない近似
    #[default]
    Nearest,
    /// 周囲 4 セルの双線形補間。どれかが無効なら最近傍に戻る
    Bilinear,
}

/// カラーフレーム座標を深度マップ座標 (0.0〜1.0 正規化) に変換
fn normalize(px: f64, py: f64, color_w: u32, color_h: u32) -> Option<(f64, f64)> {
    if color_w == 0 || color_h == 0 || !px.is_finite() || !py.is_finite() {
        return None;
    }
    let u = px / color_w as f64;
    let v = py / color_h as f64;
    ((0.0..1.0).contains(&u) && (0.0..1.0).contains(&v)).then_some((u, v))
}

/// カラーフレームのピクセル位置の深度（メートル, 最近傍）
pub fn sample(px: f64, py: f64, color_w: u32, color_h: u32, depth: &DepthMap) -> Option<f32> {
    let (u, v) = normalize(px, py, color_w, color_h)?;
    let dx = (u * depth.width as f64).floor() as u32;
    let dy = (v * depth.height as f64).floor() as u32;
    depth.meters_at(dx, dy)
}

/// 双線形補間版。セル中心を格子点とみなす
pub fn sample_bilinear(
    px: f64,
    py: f64,
    color_w: u32,
    color_h: u32,
    depth: &DepthMap,
) -> Option<f32> {
    let (u, v) = normalize(px, py, color_w, color_h)?;
    if depth.width == 0 || depth.height == 0 {
        return None;
    }
    let max_x = (depth.width - 1) as f64;
    let max_y = (depth.height - 1) as f64;
    let fx = (u * depth.width as f64 - 0.5).clamp(0.0, max_x);
    let fy = (v * depth.height as f64 - 0.5).clamp(0.0, max_y);

    let x0 = fx.floor() as u32;
    let y0 = fy.floor() as u32;
    let x1 = (x0 + 1).min(depth.width - 1);
    let y1 = (y0 + 1).min(depth.height - 1);
    let tx = (fx - x0 as f64) as f32;
    let ty = (fy - y0 as f64) as f32;

    let corners = (
        depth.meters_at(x0, y0),
        depth.meters_at(x1, y0),
        depth.meters_at(x0, y1),
        depth.meters_at(x1, y1),
    );
    match corners {
        (Some(a), Some(b), Some(c), Some(d)) => {
            let top = a + (b - a) * tx;
            let bottom = c + (d - c) * tx;
            Some(top + (bottom - top) * ty)
        }
        _ => sample(px, py, color_w, color_h, depth),
    }
}

/// 方式を選んでサンプリング
pub fn sample_with(
    sampling: DepthSampling,
    px: f64,
    py: f64,
    color_w: u32,
    color_h: u32,
    depth: &DepthMap,
) -> Option<f32> {
    match sampling {
        DepthSampling::Nearest => sample(px, py, color_w, color_h, depth),
        DepthSampling::Bilinear => sample_bilinear(px, py, color_w, color_h, depth),
    }
}

/// 画面中央の深度（メートル）
pub fn center_depth(depth: &DepthMap) -> Option<f32> {
    depth.meters_at(depth.width / 2, depth.height / 2)
}
