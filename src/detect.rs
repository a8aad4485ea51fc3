//! Face detection and face-box selection.

use image::GrayImage;
use rustface::{Detector, ImageData};

use crate::config::DetectorConfig;
use crate::error::{Error, Result};
use crate::types::{BoundingBox, Landmark};

/// Anything that finds face boxes in a grayscale image.
pub trait FaceDetector {
    fn detect(&mut self, image: &GrayImage) -> Vec<BoundingBox>;
}

/// SeetaFace frontal detector via `rustface`.
pub struct SeetaFaceDetector {
    inner: Box<dyn Detector>,
}

impl SeetaFaceDetector {
    pub fn new(config: &DetectorConfig) -> Result<Self> {
        let path = config
            .model_path
            .to_str()
            .ok_or_else(|| Error::Detector(format!("invalid model path {:?}", config.model_path)))?;
        let mut inner = rustface::create_detector(path)
            .map_err(|e| Error::Detector(format!("failed to load {path}: {e}")))?;
        inner.set_min_face_size(config.min_face_size);
        inner.set_score_thresh(config.score_thresh);
        inner.set_pyramid_scale_factor(config.pyramid_scale_factor);
        inner.set_slide_window_step(config.slide_window_step.0, config.slide_window_step.1);

        tracing::info!(path, min_face_size = config.min_face_size, "loaded face detector");
        Ok(Self { inner })
    }
}

impl FaceDetector for SeetaFaceDetector {
    fn detect(&mut self, image: &GrayImage) -> Vec<BoundingBox> {
        let (width, height) = image.dimensions();
        let data = ImageData::new(image.as_raw(), width, height);
        self.inner
            .detect(&data)
            .iter()
            .map(|face| {
                let bbox = face.bbox();
                BoundingBox::new(
                    bbox.x() as f32,
                    bbox.y() as f32,
                    bbox.width() as f32,
                    bbox.height() as f32,
                )
            })
            .collect()
    }
}

/// Pick the detected face that belongs to an annotation.
///
/// A box qualifies when it contains every landmark named in `key_names`
/// (names the annotation lacks are not checked). Returns the box only when
/// exactly one qualifies.
pub fn select_valid_face(
    detected: &[BoundingBox],
    landmarks: &[Landmark],
    key_names: &[String],
) -> Option<BoundingBox> {
    if detected.is_empty() {
        return None;
    }

    let key: Vec<_> = landmarks
        .iter()
        .filter(|l| key_names.iter().any(|k| *k == l.name))
        .collect();

    let mut valid = detected
        .iter()
        .filter(|b| key.iter().all(|l| b.contains(l.point)));

    match (valid.next(), valid.next()) {
        (Some(face), None) => Some(*face),
        _ => None,
    }
}
