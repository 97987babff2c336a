//! ピクセル距離 → 実距離の変換
//!
//! 状態も I/O も持たない純粋関数のみ。

pub mod depth;
pub mod kernel;
pub mod measurement;

pub use depth::{center_depth, sample, sample_bilinear, DepthMap, DepthSamples, DepthSampling};
pub use kernel::{
    back_project, cm_per_pixel, estimate_distance, view_width_cm, EstimationMode,
    GeometryContext, DEFAULT_FOV_DEG, DEFAULT_SUBJECT_DISTANCE_CM,
};
pub use measurement::{
    cm_to_inch, MeasurementKind, MeasurementTriple, Measurements, Method, CM_PER_INCH,
};
