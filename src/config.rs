//! Training configuration.
//!
//! Loaded from a TOML file. Every field has a default, so an empty file (or
//! no file at all) yields the stock Helen 194-point setup.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hog::HogParam;
use crate::regressor::Regulariser;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Directory holding the `.jpg` images.
    pub image_dir: PathBuf,
    /// Directory holding the `.txt` annotations.
    pub annotation_dir: PathBuf,
    /// Where the learned model is written.
    pub output: PathBuf,
    pub detector: DetectorConfig,
    pub landmarks: LandmarkConfig,
    pub perturbation: PerturbationConfig,
    /// One entry per cascade stage.
    pub cascade: Vec<StageConfig>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            image_dir: PathBuf::from("helen/images"),
            annotation_dir: PathBuf::from("helen/annotation"),
            output: PathBuf::from("helen_sdm_model.bin"),
            detector: DetectorConfig::default(),
            landmarks: LandmarkConfig::default(),
            perturbation: PerturbationConfig::default(),
            cascade: default_cascade(),
        }
    }
}

impl TrainingConfig {
    /// Read and validate a config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cascade.is_empty() {
            return Err(Error::InvalidConfig(
                "cascade must have at least one stage".into(),
            ));
        }
        for (i, stage) in self.cascade.iter().enumerate() {
            stage
                .hog
                .validate()
                .map_err(|e| Error::InvalidConfig(format!("cascade[{i}]: {e}")))?;
            if !(stage.regulariser.param.is_finite() && stage.regulariser.param >= 0.0) {
                return Err(Error::InvalidConfig(format!(
                    "cascade[{i}]: regulariser param must be a non-negative number"
                )));
            }
        }
        self.perturbation.validate()?;
        if self.landmarks.right_eye.is_empty() || self.landmarks.left_eye.is_empty() {
            return Err(Error::InvalidConfig(
                "eye landmark lists must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn hog_params(&self) -> Vec<HogParam> {
        self.cascade.iter().map(|s| s.hog).collect()
    }

    pub fn regularisers(&self) -> Vec<Regulariser> {
        self.cascade.iter().map(|s| s.regulariser).collect()
    }
}

/// SeetaFace detector settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub model_path: PathBuf,
    pub min_face_size: u32,
    pub score_thresh: f64,
    pub pyramid_scale_factor: f32,
    pub slide_window_step: (u32, u32),
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("seeta_fd_frontal_v1.0.bin"),
            min_face_size: 50,
            score_thresh: 2.0,
            pyramid_scale_factor: 0.8,
            slide_window_step: (4, 4),
        }
    }
}

/// Landmark names used for face validation and IED.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LandmarkConfig {
    /// Landmarks that must all fall inside the selected face box.
    pub key_landmarks: Vec<String>,
    /// Corners of the right eye (inner, outer).
    pub right_eye: Vec<String>,
    /// Corners of the left eye (inner, outer).
    pub left_eye: Vec<String>,
}

impl Default for LandmarkConfig {
    fn default() -> Self {
        Self {
            key_landmarks: vec!["144".into(), "124".into(), "95".into()],
            right_eye: vec!["125".into(), "115".into()],
            left_eye: vec!["135".into(), "145".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerturbationConfig {
    /// Extra perturbed samples per kept image.
    pub num_perturbations: u16,
    pub translation_mu: f32,
    pub translation_sigma: f32,
    pub scale_mu: f32,
    pub scale_sigma: f32,
    /// Fixed RNG seed; entropy-seeded when absent.
    pub seed: Option<u64>,
}

impl Default for PerturbationConfig {
    fn default() -> Self {
        Self {
            num_perturbations: 10,
            translation_mu: 0.0,
            translation_sigma: 0.04,
            scale_mu: 1.0,
            scale_sigma: 0.04,
            seed: None,
        }
    }
}

impl PerturbationConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, sigma) in [
            ("translation_sigma", self.translation_sigma),
            ("scale_sigma", self.scale_sigma),
        ] {
            if !(sigma.is_finite() && sigma >= 0.0) {
                return Err(Error::InvalidConfig(format!(
                    "{name} must be a non-negative number, got {sigma}"
                )));
            }
        }
        if !(self.translation_mu.is_finite() && self.scale_mu.is_finite()) {
            return Err(Error::InvalidConfig(
                "perturbation means must be finite".into(),
            ));
        }
        if self.scale_mu <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "scale_mu must be positive, got {}",
                self.scale_mu
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StageConfig {
    pub hog: HogParam,
    #[serde(default)]
    pub regulariser: Regulariser,
}

fn default_cascade() -> Vec<StageConfig> {
    [(11, 1.0), (10, 0.7), (8, 0.4), (6, 0.25)]
        .into_iter()
        .map(|(cell_size, relative_patch_size)| StageConfig {
            hog: HogParam {
                num_cells: 5,
                cell_size,
                num_bins: 4,
                relative_patch_size,
            },
            regulariser: Regulariser::default(),
        })
        .collect()
}
