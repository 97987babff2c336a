use image::RgbImage;

use crate::geometry::DepthMap;

/// カラーフレーム
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    /// ソース内の通し番号
    pub sequence: u64,
}

impl Frame {
    pub fn new(image: RgbImage, sequence: u64) -> Self {
        Self { image, sequence }
    }

    /// 黒画像（テスト・デモ用）
    pub fn blank(width: u32, height: u32, sequence: u64) -> Self {
        Self::new(RgbImage::new(width, height), sequence)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// アクティブなソースから借りる 1 フレーム分のデータ
///
/// 借用なので次のフレームまで持ち越せない。保持したい場合は clone する。
#[derive(Debug, Clone, Copy)]
pub struct SourceFrame<'a> {
    pub frame: &'a Frame,
    pub depth: Option<&'a DepthMap>,
}

impl<'a> SourceFrame<'a> {
    pub fn color(frame: &'a Frame) -> Self {
        Self { frame, depth: None }
    }

    pub fn with_depth(frame: &'a Frame, depth: Option<&'a DepthMap>) -> Self {
        Self { frame, depth }
    }
}
