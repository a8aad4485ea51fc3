//! The training routine: dataset in, learned [`SdmModel`] out.
//!
//! 1. Detect faces and keep images with exactly one valid face box
//! 2. Normalise the annotations to their face boxes and average them
//! 3. Place the mean shape in the face box (and in perturbed copies of it)
//!    to get initial estimates
//! 4. Train the regressor cascade on HOG descriptors, reporting the residual
//!    after every stage

use image::GrayImage;
use serde::Serialize;

use crate::alignment::{align_mean, mean_shape, normalise_landmarks};
use crate::config::TrainingConfig;
use crate::dataset::LandmarkDataset;
use crate::descent::{InterEyeDistanceNormalisation, SupervisedDescentOptimiser};
use crate::detect::{select_valid_face, FaceDetector};
use crate::error::{Error, Result};
use crate::hog::{HogExtractor, HogProjection};
use crate::matrix::shapes_to_matrix;
use crate::metrics::{mean, normalised_landmark_errors, normalised_least_squares_residual, EyeLandmarks};
use crate::model::SdmModel;
use crate::perturb::PerturbationSampler;
use crate::regressor::LinearRegressor;
use crate::types::{BoundingBox, Landmark, Point, Shape};

/// Convergence figures after one learned regressor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StageReport {
    pub stage: usize,
    /// `||X - G|| / ||G||` over all training samples.
    pub nlsr: f32,
    /// Mean landmark error in units of inter-eye distance.
    pub normalised_error: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingReport {
    pub total_images: usize,
    pub kept_images: usize,
    /// Kept images times (perturbations + 1).
    pub samples: usize,
    pub initial_nlsr: f32,
    pub stages: Vec<StageReport>,
}

pub struct TrainingOutcome {
    pub model: SdmModel,
    pub report: TrainingReport,
}

/// A kept image with its selected face box.
struct TrainingFace {
    image: GrayImage,
    face: BoundingBox,
    groundtruth: Vec<Point>,
}

pub fn train<D, F>(dataset: &D, detector: &mut F, config: &TrainingConfig) -> Result<TrainingOutcome>
where
    D: LandmarkDataset + ?Sized,
    F: FaceDetector + ?Sized,
{
    config.validate()?;

    let landmark_names = model_landmark_names(dataset.landmarks())?;
    let eyes = EyeLandmarks::from_names(
        &landmark_names,
        &config.landmarks.right_eye,
        &config.landmarks.left_eye,
    )?;

    let faces = collect_faces(dataset, detector, &config.landmarks.key_landmarks)?;
    if faces.is_empty() {
        return Err(Error::NoTrainingSamples {
            total: dataset.len(),
        });
    }

    let normalised: Vec<Shape> = faces
        .iter()
        .map(|f| normalise_landmarks(&f.groundtruth, &f.face))
        .collect();
    let mean_normalised = mean_shape(&normalised)?;

    let mut sampler = PerturbationSampler::new(&config.perturbation)?;
    let copies = config.perturbation.num_perturbations as usize + 1;
    let mut x0 = Vec::with_capacity(faces.len() * copies);
    let mut x_gt = Vec::with_capacity(faces.len() * copies);
    let mut sample_images = Vec::with_capacity(faces.len() * copies);

    for (i, (face, shape)) in faces.iter().zip(&normalised).enumerate() {
        let groundtruth = align_mean(shape, &face.face);

        x0.push(align_mean(&mean_normalised, &face.face));
        x_gt.push(groundtruth.clone());
        sample_images.push(i);

        for _ in 0..config.perturbation.num_perturbations {
            let perturbed = sampler.sample(&face.face);
            x0.push(align_mean(&mean_normalised, &perturbed));
            x_gt.push(groundtruth.clone());
            sample_images.push(i);
        }
    }

    tracing::info!(
        kept = faces.len(),
        total = dataset.len(),
        samples = x0.len(),
        "kept {} images out of {}",
        faces.len(),
        dataset.len()
    );

    let x0 = shapes_to_matrix(&x0);
    let x_gt = shapes_to_matrix(&x_gt);
    let initial_nlsr = normalised_least_squares_residual(&x0, &x_gt)?;

    let regressors = config
        .regularisers()
        .into_iter()
        .map(LinearRegressor::new)
        .collect();
    let mut optimiser =
        SupervisedDescentOptimiser::new(regressors, InterEyeDistanceNormalisation::new(eyes.clone()));
    let hog = HogExtractor::new(config.hog_params(), eyes.clone());
    let images: Vec<GrayImage> = faces.into_iter().map(|f| f.image).collect();
    let projection = HogProjection::new(&hog, &images, &sample_images);

    tracing::info!(
        stages = optimiser.num_stages(),
        initial_nlsr,
        "training the model, reporting the residual after each learned regressor"
    );

    let mut stages = Vec::with_capacity(optimiser.num_stages());
    optimiser.train(&x_gt, &x0, &projection, |stage, current| {
        let nlsr = normalised_least_squares_residual(current, &x_gt)?;
        let errors = normalised_landmark_errors(current, &x_gt, &eyes)?;
        let normalised_error = mean(&errors.concat());
        tracing::info!(stage, nlsr, normalised_error, "learned regressor");
        stages.push(StageReport {
            stage,
            nlsr,
            normalised_error,
        });
        Ok(())
    })?;

    let report = TrainingReport {
        total_images: dataset.len(),
        kept_images: images.len(),
        samples: sample_images.len(),
        initial_nlsr,
        stages,
    };
    let model = SdmModel::new(mean_normalised, landmark_names, optimiser, hog)?;

    tracing::info!("training finished");
    Ok(TrainingOutcome { model, report })
}

/// Landmark names of the dataset; every annotation must have the same count.
fn model_landmark_names(annotations: &[Vec<Landmark>]) -> Result<Vec<String>> {
    let first = annotations
        .first()
        .ok_or(Error::NoTrainingSamples { total: 0 })?;
    for lmk in annotations {
        if lmk.len() != first.len() {
            return Err(Error::DimensionMismatch {
                expected: first.len(),
                actual: lmk.len(),
            });
        }
    }
    Ok(first.iter().map(|l| l.name.clone()).collect())
}

fn collect_faces<D, F>(dataset: &D, detector: &mut F, key_names: &[String]) -> Result<Vec<TrainingFace>>
where
    D: LandmarkDataset + ?Sized,
    F: FaceDetector + ?Sized,
{
    let mut faces = Vec::new();
    for (i, landmarks) in dataset.landmarks().iter().enumerate() {
        let path = dataset.filename(i)?;
        let image = dataset.load_image(i)?;
        let detected = detector.detect(&image);
        let Some(face) = select_valid_face(&detected, landmarks, key_names) else {
            tracing::debug!(
                image = %path.display(),
                detected = detected.len(),
                "no valid face, skipping"
            );
            continue;
        };
        faces.push(TrainingFace {
            image,
            face,
            groundtruth: landmarks.iter().map(|l| l.point).collect(),
        });
    }
    Ok(faces)
}
