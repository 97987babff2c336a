use std::sync::mpsc::Sender;

use crate::geometry::Measurements;
use crate::source::SourceOutcome;

/// 計測結果の受け取り側（UI 層）
pub trait MeasurementSink {
    /// 処理したフレームごとに高々 1 回。空の結果では呼ばれない
    fn on_measurements(&mut self, measurements: &Measurements);

    /// ソースの開始・失敗・停止
    fn on_source_event(&mut self, _outcome: &SourceOutcome) {}
}

/// チャネル経由で別スレッドへ渡すときのメッセージ
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Measurements(Measurements),
    Source(SourceOutcome),
}

impl MeasurementSink for Sender<PipelineEvent> {
    fn on_measurements(&mut self, measurements: &Measurements) {
        let _ = self.send(PipelineEvent::Measurements(*measurements));
    }

    fn on_source_event(&mut self, outcome: &SourceOutcome) {
        let _ = self.send(PipelineEvent::Source(outcome.clone()));
    }
}

impl<S: MeasurementSink + ?Sized> MeasurementSink for &mut S {
    fn on_measurements(&mut self, measurements: &Measurements) {
        (**self).on_measurements(measurements)
    }

    fn on_source_event(&mut self, outcome: &SourceOutcome) {
        (**self).on_source_event(outcome)
    }
}
