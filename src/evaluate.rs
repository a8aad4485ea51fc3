//! Measure a trained model against an annotated dataset.

use std::path::PathBuf;

use serde::Serialize;

use crate::dataset::LandmarkDataset;
use crate::detect::{select_valid_face, FaceDetector};
use crate::error::{Error, Result};
use crate::metrics::{elementwise_norm, inter_eye_distance, mean};
use crate::model::SdmModel;
use crate::types::Shape;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageEvaluation {
    pub image: PathBuf,
    /// Mean landmark error in units of the predicted inter-eye distance.
    pub normalised_error: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub total_images: usize,
    /// Images without exactly one valid face.
    pub skipped: usize,
    pub mean_normalised_error: f32,
    pub images: Vec<ImageEvaluation>,
}

pub fn evaluate<D, F>(
    model: &SdmModel,
    dataset: &D,
    detector: &mut F,
    key_landmarks: &[String],
) -> Result<EvaluationReport>
where
    D: LandmarkDataset + ?Sized,
    F: FaceDetector + ?Sized,
{
    let mut images = Vec::new();
    let mut skipped = 0;

    for (i, landmarks) in dataset.landmarks().iter().enumerate() {
        if landmarks.len() != model.num_landmarks() {
            return Err(Error::DimensionMismatch {
                expected: model.num_landmarks(),
                actual: landmarks.len(),
            });
        }

        let path = dataset.filename(i)?;
        let image = dataset.load_image(i)?;
        let detected = detector.detect(&image);
        let Some(face) = select_valid_face(&detected, landmarks, key_landmarks) else {
            skipped += 1;
            continue;
        };

        let prediction = model.predict(&image, &face)?;
        let groundtruth = Shape::from_landmarks(landmarks);
        let ied = inter_eye_distance(&prediction, model.eyes())?;
        let error = mean(&elementwise_norm(&prediction, &groundtruth)?) / ied;

        tracing::debug!(image = %path.display(), error, "evaluated");
        images.push(ImageEvaluation {
            image: path.to_path_buf(),
            normalised_error: error,
        });
    }

    let errors: Vec<f32> = images.iter().map(|e| e.normalised_error).collect();
    let report = EvaluationReport {
        total_images: dataset.len(),
        skipped,
        mean_normalised_error: mean(&errors),
        images,
    };
    tracing::info!(
        evaluated = report.images.len(),
        skipped = report.skipped,
        mean_normalised_error = report.mean_normalised_error,
        "evaluation finished"
    );
    Ok(report)
}
