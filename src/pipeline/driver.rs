use log::warn;

use super::estimate::Estimator;
use super::sink::MeasurementSink;
use crate::config::Config;
use crate::geometry::Measurements;
use crate::pose::{Detector, Extractor};
use crate::source::FrameSourceManager;

/// 1 tick の結果
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// アクティブなソースが無い（開始待ち・停止中を含む）
    Inactive,
    /// フレーム未到着
    NoFrame,
    DetectorFailed,
    /// 計測値が 1 つも無い（通知しない）
    Empty,
    Emitted(Measurements),
}

/// tick 回数の内訳
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub ticks: u64,
    pub skipped: u64,
    pub processed: u64,
    pub emitted: u64,
    pub detector_errors: u64,
}

/// 画面更新ごとに呼ばれる計測ループ
///
/// `tick` は `&mut self` を取り、検出器も同じ所有者の下で同期的に呼ぶので、
/// 検出が同時に 2 つ走ることはない。
pub struct Driver<D, S> {
    sources: FrameSourceManager,
    detector: D,
    sink: S,
    extractor: Extractor,
    estimator: Estimator,
    stats: TickStats,
}

impl<D: Detector, S: MeasurementSink> Driver<D, S> {
    pub fn new(sources: FrameSourceManager, detector: D, sink: S) -> Self {
        Self {
            sources,
            detector,
            sink,
            extractor: Extractor::default(),
            estimator: Estimator::default(),
            stats: TickStats::default(),
        }
    }

    /// 設定から作成
    pub fn from_config(config: &Config, sources: FrameSourceManager, detector: D, sink: S) -> Self {
        let m = &config.measure;
        Self::new(sources, detector, sink)
            .with_extractor(
                Extractor::new(m.confidence_threshold)
                    .with_references(m.torso_reference, m.height_reference),
            )
            .with_estimator(Estimator::from_config(m))
    }

    pub fn with_extractor(mut self, extractor: Extractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_estimator(mut self, estimator: Estimator) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn sources(&self) -> &FrameSourceManager {
        &self.sources
    }

    pub fn sources_mut(&mut self) -> &mut FrameSourceManager {
        &mut self.sources
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn stats(&self) -> TickStats {
        self.stats
    }

    /// 1 回分の処理
    ///
    /// 受信箱の遷移を反映 → フレーム取得 → 検出 → 区間抽出 → 計測 → 通知。
    pub fn tick(&mut self) -> TickOutcome {
        self.stats.ticks += 1;
        self.forward_source_events();

        if !self.sources.state().is_active() {
            self.stats.skipped += 1;
            return TickOutcome::Inactive;
        }

        let Some(source) = self.sources.next_frame() else {
            self.stats.skipped += 1;
            // 読み取り中の障害で止まった場合はここで通知する
            self.forward_source_events();
            return TickOutcome::NoFrame;
        };

        let (width, height) = (source.frame.width(), source.frame.height());
        let keypoints = match self.detector.detect(source.frame) {
            Ok(keypoints) => keypoints,
            Err(e) => {
                warn!("detection failed on frame {}: {:#}", source.frame.sequence, e);
                self.stats.detector_errors += 1;
                return TickOutcome::DetectorFailed;
            }
        };

        let spans = self.extractor.extract(&keypoints);
        let measurements = self.estimator.measure(&spans, width, height, source.depth);
        self.stats.processed += 1;

        if measurements.is_empty() {
            return TickOutcome::Empty;
        }
        self.sink.on_measurements(&measurements);
        self.stats.emitted += 1;
        TickOutcome::Emitted(measurements)
    }

    fn forward_source_events(&mut self) {
        for outcome in self.sources.pump() {
            self.sink.on_source_event(&outcome);
        }
    }
}
