use anyhow::Result;

use super::keypoint::Keypoint;
use crate::source::Frame;

/// 姿勢検出器
///
/// 学習済みモデルの中身は扱わない。フレームを受け取り、名前付きキーポイントを返すだけ。
/// 人物が映っていなければ空リストを返してよい。
pub trait Detector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Keypoint>>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Keypoint>> {
        (**self).detect(frame)
    }
}
