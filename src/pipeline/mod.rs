//! フレームソース → 検出器 → 計測 → UI の 1 本のループ

pub mod driver;
pub mod estimate;
pub mod sink;

pub use driver::{Driver, TickOutcome, TickStats};
pub use estimate::Estimator;
pub use sink::{MeasurementSink, PipelineEvent};
