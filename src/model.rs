use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::alignment::align_mean;
use crate::descent::{InterEyeDistanceNormalisation, SupervisedDescentOptimiser};
use crate::error::{Error, Result};
use crate::hog::{HogExtractor, HogParam, HogProjection, ImageAccess};
use crate::matrix::{row_to_shape, shapes_to_matrix};
use crate::metrics::EyeLandmarks;
use crate::types::{BoundingBox, Shape};

/// A learned SDM landmark detector.
///
/// The model consists of:
/// - A mean face shape, normalised to a face box (see [`crate::alignment`])
/// - A cascade of linear regressors over per-stage HOG descriptors
///
/// # Usage
///
/// ```ignore
/// let model = SdmModel::load("helen_sdm_model.bin")?;
/// let face_rect = BoundingBox::new(100.0, 100.0, 200.0, 200.0);
/// let landmarks = model.predict(&image, &face_rect)?;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SdmModel {
    /// Mean normalised shape, the initial estimate before refinement.
    mean: Shape,

    /// Landmark names, index-aligned with the shape points.
    landmark_names: Vec<String>,

    optimiser: SupervisedDescentOptimiser<InterEyeDistanceNormalisation>,

    hog: HogExtractor,
}

impl SdmModel {
    pub fn new(
        mean: Shape,
        landmark_names: Vec<String>,
        optimiser: SupervisedDescentOptimiser<InterEyeDistanceNormalisation>,
        hog: HogExtractor,
    ) -> Result<Self> {
        let model = Self {
            mean,
            landmark_names,
            optimiser,
            hog,
        };
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<()> {
        if self.landmark_names.len() != self.mean.num_landmarks() {
            return Err(Error::InvalidModel(format!(
                "{} landmark names for a {}-point mean shape",
                self.landmark_names.len(),
                self.mean.num_landmarks()
            )));
        }
        if self.optimiser.num_stages() != self.hog.num_stages() {
            return Err(Error::InvalidModel(format!(
                "{} regressors but {} HOG stages",
                self.optimiser.num_stages(),
                self.hog.num_stages()
            )));
        }
        if self.optimiser.regressors().iter().any(|r| !r.is_trained()) {
            return Err(Error::InvalidModel("untrained regressor in cascade".into()));
        }
        Ok(())
    }

    /// Load a model from a binary file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        let model: Self = bincode::deserialize(&bytes)?;
        model.validate()?;
        Ok(model)
    }

    /// Save the model to a binary file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        let bytes = bincode::serialize(self)?;
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(())
    }

    pub fn num_landmarks(&self) -> usize {
        self.mean.num_landmarks()
    }

    pub fn num_cascade_stages(&self) -> usize {
        self.optimiser.num_stages()
    }

    pub fn mean_shape(&self) -> &Shape {
        &self.mean
    }

    pub fn landmark_names(&self) -> &[String] {
        &self.landmark_names
    }

    pub fn eyes(&self) -> &EyeLandmarks {
        self.optimiser.normalisation().eyes()
    }

    pub fn hog_params(&self) -> &[HogParam] {
        self.hog.params()
    }

    /// Initial estimate for a face box: the mean shape placed in the box.
    pub fn initial_shape(&self, face_rect: &BoundingBox) -> Shape {
        align_mean(&self.mean, face_rect)
    }

    /// Predict landmarks, in image coordinates, for the face in `face_rect`.
    pub fn predict<I: ImageAccess>(&self, image: &I, face_rect: &BoundingBox) -> Result<Shape> {
        let x0 = shapes_to_matrix(&[self.initial_shape(face_rect)]);
        let projection = HogProjection::new(&self.hog, std::slice::from_ref(image), &[0]);
        let x = self.optimiser.predict(&x0, &projection)?;
        Ok(row_to_shape(&x, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regressor::{LinearRegressor, RegularisationKind, Regulariser};
    use crate::types::Point;
    use image::{GrayImage, Luma};
    use nalgebra::DMatrix;

    fn eyes() -> EyeLandmarks {
        EyeLandmarks {
            right: vec![0],
            left: vec![1],
        }
    }

    fn hog_param() -> HogParam {
        HogParam {
            num_cells: 2,
            cell_size: 4,
            num_bins: 4,
            relative_patch_size: 0.3,
        }
    }

    /// A one-stage model whose regressor always predicts a zero update.
    fn zero_update_model() -> SdmModel {
        let mean = Shape::new(vec![
            Point::new(-0.2, -0.1),
            Point::new(0.2, -0.1),
            Point::new(0.0, 0.2),
        ]);
        let features = 2 * 2 * 4 * 3;
        let mut regressor = LinearRegressor::new(Regulariser {
            kind: RegularisationKind::Manual,
            param: 1.0,
            regularise_last_row: true,
        });
        regressor
            .learn(&DMatrix::zeros(2, features), &DMatrix::zeros(2, 6), 0)
            .unwrap();

        SdmModel::new(
            mean,
            vec!["1".into(), "2".into(), "3".into()],
            SupervisedDescentOptimiser::new(
                vec![regressor],
                InterEyeDistanceNormalisation::new(eyes()),
            ),
            HogExtractor::new(vec![hog_param()], eyes()),
        )
        .unwrap()
    }

    #[test]
    fn model_initialization() {
        let model = zero_update_model();
        assert_eq!(model.num_landmarks(), 3);
        assert_eq!(model.num_cascade_stages(), 1);
    }

    #[test]
    fn zero_update_returns_aligned_mean() {
        let model = zero_update_model();
        let image = GrayImage::from_fn(100, 100, |x, y| Luma([((x + y) % 256) as u8]));
        let face_rect = BoundingBox::new(20.0, 20.0, 60.0, 60.0);

        let landmarks = model.predict(&image, &face_rect).unwrap();
        let expected = model.initial_shape(&face_rect);

        assert_eq!(landmarks.num_landmarks(), 3);
        for (p, e) in landmarks.points.iter().zip(&expected.points) {
            assert!(p.distance(e) < 1e-4);
        }
        // (-0.2 * 60 + 50, -0.1 * 60 + 50)
        assert!((expected[0].x - 38.0).abs() < 1e-4);
        assert!((expected[0].y - 44.0).abs() < 1e-4);
    }

    #[test]
    fn stage_count_mismatch_rejected() {
        let model = zero_update_model();
        let result = SdmModel::new(
            model.mean.clone(),
            model.landmark_names.clone(),
            model.optimiser.clone(),
            HogExtractor::new(vec![hog_param(), hog_param()], eyes()),
        );
        assert!(matches!(result, Err(Error::InvalidModel(_))));
    }

    #[test]
    fn untrained_regressor_rejected() {
        let result = SdmModel::new(
            Shape::zeros(2),
            vec!["1".into(), "2".into()],
            SupervisedDescentOptimiser::new(
                vec![LinearRegressor::new(Regulariser::default())],
                InterEyeDistanceNormalisation::new(eyes()),
            ),
            HogExtractor::new(vec![hog_param()], eyes()),
        );
        assert!(matches!(result, Err(Error::InvalidModel(_))));
    }

    #[test]
    fn save_and_load_model() {
        let model = zero_update_model();

        let temp_path = std::env::temp_dir().join(format!("sdm_test_model_{}.bin", std::process::id()));
        model.save(&temp_path).unwrap();

        let loaded = SdmModel::load(&temp_path).unwrap();
        assert_eq!(loaded.num_landmarks(), model.num_landmarks());
        assert_eq!(loaded.num_cascade_stages(), model.num_cascade_stages());
        assert_eq!(loaded.mean_shape(), model.mean_shape());
        assert_eq!(loaded.hog_params(), model.hog_params());
        assert_eq!(loaded.eyes(), model.eyes());

        std::fs::remove_file(temp_path).ok();
    }

    #[test]
    fn load_rejects_garbage() {
        let temp_path = std::env::temp_dir().join(format!("sdm_garbage_{}.bin", std::process::id()));
        std::fs::write(&temp_path, b"not a model").unwrap();
        assert!(SdmModel::load(&temp_path).is_err());
        std::fs::remove_file(temp_path).ok();
    }
}
