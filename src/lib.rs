//! # sdm-face
//!
//! Training pipeline for Supervised Descent Method (SDM) facial landmark
//! alignment.
//!
//! This crate provides:
//! - **Dataset loading**: Helen-style images with 194-point annotations
//! - **Face-box selection**: detection via SeetaFace (`rustface`) and
//!   validation against the annotation
//! - **Augmentation**: randomised translation/scale perturbation of face boxes
//! - **Cascade training**: HOG descriptors and regularised linear regressors
//!   refining a mean-shape estimate toward ground truth
//!
//! Implements the training side of "Supervised Descent Method and its
//! Applications to Face Alignment" (Xiong & De la Torre, 2013).
//!
//! ## Algorithm Overview
//!
//! 1. Normalise every annotation relative to its detected face box
//! 2. Average the normalised shapes into a mean shape
//! 3. Place the mean shape into each face box (and perturbed copies of it)
//!    as the initial estimate
//! 4. For each cascade stage:
//!    - Extract HOG descriptors around the current estimate
//!    - Regress the IED-normalised offset to ground truth
//!    - Apply the learned update
//! 5. Serialise the mean shape and the learned cascade
//!
//! ## Quick Start
//!
//! ```no_run
//! use sdm_face::{train, HelenDataset, SeetaFaceDetector, TrainingConfig};
//!
//! # fn main() -> sdm_face::Result<()> {
//! let config = TrainingConfig::load("sdm.toml")?;
//! let dataset = HelenDataset::open(&config.image_dir, &config.annotation_dir)?;
//! let mut detector = SeetaFaceDetector::new(&config.detector)?;
//!
//! let outcome = train(&dataset, &mut detector, &config)?;
//! for stage in &outcome.report.stages {
//!     println!("stage {}: NLSR {:.4}", stage.stage, stage.nlsr);
//! }
//! outcome.model.save(&config.output)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom Face Detectors
//!
//! Implement the [`FaceDetector`] trait to plug in another detector:
//!
//! ```rust
//! use sdm_face::{BoundingBox, FaceDetector};
//!
//! struct WholeImage;
//!
//! impl FaceDetector for WholeImage {
//!     fn detect(&mut self, image: &image::GrayImage) -> Vec<BoundingBox> {
//!         let (w, h) = image.dimensions();
//!         vec![BoundingBox::new(0.0, 0.0, w as f32, h as f32)]
//!     }
//! }
//! ```

pub mod alignment;
pub mod config;
pub mod dataset;
pub mod descent;
pub mod detect;
mod error;
pub mod evaluate;
pub mod hog;
mod matrix;
pub mod metrics;
mod model;
pub mod perturb;
pub mod regressor;
pub mod training;
mod types;

pub use config::TrainingConfig;
pub use dataset::{read_helen_landmarks, HelenDataset, LandmarkDataset};
pub use detect::{select_valid_face, FaceDetector, SeetaFaceDetector};
pub use error::{Error, Result};
pub use evaluate::{evaluate, EvaluationReport};
pub use hog::{HogExtractor, HogParam, ImageAccess};
pub use matrix::{row_to_shape, shapes_to_matrix};
pub use metrics::EyeLandmarks;
pub use model::SdmModel;
pub use perturb::{perturb, PerturbationSampler};
pub use training::{train, TrainingOutcome, TrainingReport};
pub use types::{BoundingBox, Landmark, Point, Shape};
