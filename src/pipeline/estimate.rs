use log::debug;

use crate::config::MeasureConfig;
use crate::geometry::{
    center_depth, estimate_distance, DepthMap, DepthSampling, EstimationMode, GeometryContext,
    MeasurementKind, MeasurementTriple, Measurements, Method, DEFAULT_FOV_DEG,
    DEFAULT_SUBJECT_DISTANCE_CM,
};
use crate::pose::{BodySpans, Span};

/// 区間 → 計測値。深度優先、だめなら画角による近似
#[derive(Debug, Clone)]
pub struct Estimator {
    fov_deg: f64,
    assumed_distance_cm: f64,
    sampling: DepthSampling,
    center_depth_as_distance: bool,
}

impl Default for Estimator {
    fn default() -> Self {
        Self {
            fov_deg: DEFAULT_FOV_DEG,
            assumed_distance_cm: DEFAULT_SUBJECT_DISTANCE_CM,
            sampling: DepthSampling::Nearest,
            center_depth_as_distance: false,
        }
    }
}

impl Estimator {
    pub fn from_config(config: &MeasureConfig) -> Self {
        Self {
            fov_deg: config.fov_deg,
            assumed_distance_cm: config.assumed_distance_cm,
            sampling: config.depth_sampling,
            center_depth_as_distance: config.center_depth_as_distance,
        }
    }

    pub fn with_center_depth_as_distance(mut self, enabled: bool) -> Self {
        self.center_depth_as_distance = enabled;
        self
    }

    /// 1 フレーム分の計測
    ///
    /// 深度の有無は計測の種類ごとに判定する（同じフレームでも肩は深度、身長は画角ということがある）。
    pub fn measure(
        &self,
        spans: &BodySpans,
        frame_width: u32,
        frame_height: u32,
        depth: Option<&DepthMap>,
    ) -> Measurements {
        let ctx = GeometryContext::new(self.fov_deg, frame_width, frame_height)
            .with_sampling(self.sampling);
        let fallback_cm = self.fallback_distance_cm(depth);

        let mut measurements = Measurements::default();
        for kind in MeasurementKind::ALL {
            let span = match kind {
                MeasurementKind::Shoulder => spans.shoulder,
                MeasurementKind::Torso => spans.torso,
                MeasurementKind::Height => spans.height,
            };
            let value = span.and_then(|s| self.measure_span(kind, &s, &ctx, depth, fallback_cm));
            measurements.set(kind, value);
        }
        measurements
    }

    fn measure_span(
        &self,
        kind: MeasurementKind,
        span: &Span,
        ctx: &GeometryContext,
        depth: Option<&DepthMap>,
        fallback_cm: f64,
    ) -> Option<MeasurementTriple> {
        let pixels = span.pixels();
        if let Some(depth) = depth {
            let mode = EstimationMode::DepthBackProjection { depth };
            match estimate_distance(&span.from, &span.to, &mode, ctx) {
                Some(cm) => return Some(MeasurementTriple::new(pixels, cm, Method::Depth)),
                None => debug!("{}: depth unavailable, using FOV", kind),
            }
        }
        let mode = EstimationMode::MonocularFov { subject_distance_cm: fallback_cm };
        let cm = estimate_distance(&span.from, &span.to, &mode, ctx)?;
        Some(MeasurementTriple::new(pixels, cm, Method::Fov))
    }

    fn fallback_distance_cm(&self, depth: Option<&DepthMap>) -> f64 {
        if !self.center_depth_as_distance {
            return self.assumed_distance_cm;
        }
        depth
            .and_then(center_depth)
            .map(|m| m as f64 * 100.0)
            .unwrap_or(self.assumed_distance_cm)
    }
}
