pub mod detector;
pub mod extract;
pub mod keypoint;

pub use detector::Detector;
pub use extract::{
    extract, BodySpans, Extractor, HeightReference, PixelDistances, Span, TorsoReference,
    DEFAULT_CONFIDENCE_THRESHOLD,
};
pub use keypoint::{Keypoint, Landmark};
