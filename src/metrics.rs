//! Landmark error measures used to monitor training.
//!
//! Errors are reported either as a normalised least-squares residual over the
//! whole estimate matrix, or per landmark as a Euclidean distance divided by
//! the inter-eye distance (IED) of the estimate.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::matrix::row_to_shape;
use crate::types::{Point, Shape};

/// Indices of the landmarks that locate each eye.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EyeLandmarks {
    pub right: Vec<usize>,
    pub left: Vec<usize>,
}

impl EyeLandmarks {
    /// Resolve eye landmark names against the model's landmark names.
    pub fn from_names(model_landmarks: &[String], right: &[String], left: &[String]) -> Result<Self> {
        let resolve = |names: &[String]| -> Result<Vec<usize>> {
            names
                .iter()
                .map(|name| {
                    model_landmarks
                        .iter()
                        .position(|m| m == name)
                        .ok_or_else(|| {
                            Error::InvalidConfig(format!("eye landmark {name:?} is not a model landmark"))
                        })
                })
                .collect()
        };
        Ok(Self {
            right: resolve(right)?,
            left: resolve(left)?,
        })
    }
}

pub fn landmark_norm(prediction: &Point, groundtruth: &Point) -> f32 {
    prediction.distance(groundtruth)
}

/// Per-landmark Euclidean distances.
pub fn elementwise_norm(prediction: &Shape, groundtruth: &Shape) -> Result<Vec<f32>> {
    if prediction.num_landmarks() != groundtruth.num_landmarks() {
        return Err(Error::DimensionMismatch {
            expected: groundtruth.num_landmarks(),
            actual: prediction.num_landmarks(),
        });
    }
    Ok(prediction
        .points
        .iter()
        .zip(&groundtruth.points)
        .map(|(p, g)| landmark_norm(p, g))
        .collect())
}

/// Distance between the centroids of the right-eye and left-eye landmarks.
pub fn inter_eye_distance(shape: &Shape, eyes: &EyeLandmarks) -> Result<f32> {
    let right = centroid(shape, &eyes.right)?;
    let left = centroid(shape, &eyes.left)?;
    let ied = right.distance(&left);
    if !(ied.is_finite() && ied > 0.0) {
        return Err(Error::DegenerateShape(format!(
            "inter-eye distance is {ied}"
        )));
    }
    Ok(ied)
}

fn centroid(shape: &Shape, indices: &[usize]) -> Result<Point> {
    if indices.is_empty() {
        return Err(Error::DegenerateShape("empty eye landmark list".into()));
    }
    let mut sum = Point::zero();
    for &i in indices {
        let p = shape.points.get(i).ok_or(Error::DimensionMismatch {
            expected: i + 1,
            actual: shape.num_landmarks(),
        })?;
        sum += *p;
    }
    Ok(sum * (1.0 / indices.len() as f32))
}

/// Per-landmark errors for every row, normalised by the IED of the
/// prediction row. One output row per input row.
pub fn normalised_landmark_errors(
    predictions: &DMatrix<f32>,
    groundtruth: &DMatrix<f32>,
    eyes: &EyeLandmarks,
) -> Result<Vec<Vec<f32>>> {
    check_same_shape(predictions, groundtruth)?;

    let mut errors = Vec::with_capacity(predictions.nrows());
    for r in 0..predictions.nrows() {
        let pred = row_to_shape(predictions, r);
        let gt = row_to_shape(groundtruth, r);
        let ied = inter_eye_distance(&pred, eyes)?;
        let norms = elementwise_norm(&pred, &gt)?;
        errors.push(norms.into_iter().map(|n| n / ied).collect());
    }
    Ok(errors)
}

/// `||P - G|| / ||G||` over all entries.
pub fn normalised_least_squares_residual(
    predictions: &DMatrix<f32>,
    groundtruth: &DMatrix<f32>,
) -> Result<f32> {
    check_same_shape(predictions, groundtruth)?;
    let denom = groundtruth.norm();
    if denom == 0.0 {
        return Err(Error::DegenerateShape("ground truth is all zeros".into()));
    }
    Ok((predictions - groundtruth).norm() / denom)
}

pub fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}

fn check_same_shape(a: &DMatrix<f32>, b: &DMatrix<f32>) -> Result<()> {
    if a.shape() != b.shape() {
        return Err(Error::DimensionMismatch {
            expected: b.len(),
            actual: a.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::shapes_to_matrix;

    fn eyes() -> EyeLandmarks {
        EyeLandmarks {
            right: vec![0, 1],
            left: vec![2, 3],
        }
    }

    fn face(offset: f32) -> Shape {
        Shape::new(vec![
            Point::new(10.0 + offset, 10.0),
            Point::new(20.0 + offset, 10.0),
            Point::new(40.0 + offset, 10.0),
            Point::new(50.0 + offset, 10.0),
        ])
    }

    #[test]
    fn ied_between_eye_centroids() {
        // centroids at x=15 and x=45
        assert!((inter_eye_distance(&face(0.0), &eyes()).unwrap() - 30.0).abs() < 1e-5);
    }

    #[test]
    fn ied_rejects_collapsed_eyes() {
        let shape = Shape::new(vec![Point::new(1.0, 1.0); 4]);
        assert!(matches!(
            inter_eye_distance(&shape, &eyes()),
            Err(Error::DegenerateShape(_))
        ));
    }

    #[test]
    fn ied_rejects_out_of_range_index() {
        let eyes = EyeLandmarks {
            right: vec![0],
            left: vec![9],
        };
        assert!(inter_eye_distance(&face(0.0), &eyes).is_err());
    }

    #[test]
    fn eye_names_resolve_to_indices() {
        let names: Vec<String> = (1..=4).map(|i| i.to_string()).collect();
        let eyes = EyeLandmarks::from_names(&names, &["2".into(), "1".into()], &["3".into()]).unwrap();
        assert_eq!(eyes.right, vec![1, 0]);
        assert_eq!(eyes.left, vec![2]);

        assert!(EyeLandmarks::from_names(&names, &["7".into()], &["3".into()]).is_err());
    }

    #[test]
    fn errors_normalised_by_prediction_ied() {
        let pred = shapes_to_matrix(&[face(3.0)]);
        let gt = shapes_to_matrix(&[face(0.0)]);

        let errors = normalised_landmark_errors(&pred, &gt, &eyes()).unwrap();
        assert_eq!(errors.len(), 1);
        for e in &errors[0] {
            assert!((e - 0.1).abs() < 1e-5);
        }
        assert!((mean(&errors[0]) - 0.1).abs() < 1e-5);
    }

    #[test]
    fn residual_zero_at_ground_truth() {
        let gt = shapes_to_matrix(&[face(0.0), face(1.0)]);
        assert_eq!(normalised_least_squares_residual(&gt, &gt).unwrap(), 0.0);

        let doubled = &gt * 2.0;
        assert!((normalised_least_squares_residual(&doubled, &gt).unwrap() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn mismatched_matrices_rejected() {
        let a = shapes_to_matrix(&[face(0.0)]);
        let b = shapes_to_matrix(&[face(0.0), face(0.0)]);
        assert!(normalised_least_squares_residual(&a, &b).is_err());
    }

    #[test]
    fn elementwise_norm_lengths_must_match() {
        assert!(elementwise_norm(&Shape::zeros(2), &Shape::zeros(3)).is_err());
    }
}
