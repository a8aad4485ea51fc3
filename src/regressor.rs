//! Regularised linear regression, solved with nalgebra's partial-pivot LU.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegularisationKind {
    /// `lambda = param * ||AᵀA|| / rows(A)`
    MatrixNorm,
    /// `lambda = param`
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Regulariser {
    pub kind: RegularisationKind,
    pub param: f32,
    /// Whether the bias term is regularised too.
    #[serde(default)]
    pub regularise_last_row: bool,
}

impl Default for Regulariser {
    fn default() -> Self {
        Self {
            kind: RegularisationKind::MatrixNorm,
            param: 1.5,
            regularise_last_row: false,
        }
    }
}

impl Regulariser {
    /// Diagonal matrix added to `AᵀA`.
    fn matrix(&self, ata: &DMatrix<f32>, num_rows: usize) -> DMatrix<f32> {
        let lambda = match self.kind {
            RegularisationKind::MatrixNorm => self.param * ata.norm() / num_rows as f32,
            RegularisationKind::Manual => self.param,
        };
        let n = ata.nrows();
        let mut reg = DMatrix::from_diagonal_element(n, n, lambda);
        if !self.regularise_last_row && n > 0 {
            reg[(n - 1, n - 1)] = 0.0;
        }
        reg
    }
}

/// Maps a descriptor row to a parameter update row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegressor {
    regulariser: Regulariser,
    /// `(features + 1) x outputs`, last row is the bias.
    weights: Option<DMatrix<f32>>,
}

impl LinearRegressor {
    pub fn new(regulariser: Regulariser) -> Self {
        Self {
            regulariser,
            weights: None,
        }
    }

    pub fn is_trained(&self) -> bool {
        self.weights.is_some()
    }

    pub fn regulariser(&self) -> &Regulariser {
        &self.regulariser
    }

    /// Fit `labels ≈ [data, 1] X`. `stage` only labels errors.
    pub fn learn(&mut self, data: &DMatrix<f32>, labels: &DMatrix<f32>, stage: usize) -> Result<()> {
        if data.nrows() != labels.nrows() {
            return Err(Error::DimensionMismatch {
                expected: data.nrows(),
                actual: labels.nrows(),
            });
        }
        if data.nrows() == 0 {
            return Err(Error::DegenerateShape("no rows to learn from".into()));
        }

        let a = with_bias(data);
        let at = a.transpose();
        let ata = &at * &a;
        let system = &ata + self.regulariser.matrix(&ata, a.nrows());
        let rhs = &at * labels;

        tracing::debug!(
            stage,
            rows = a.nrows(),
            unknowns = system.nrows(),
            outputs = labels.ncols(),
            "solving regression"
        );

        let weights = system
            .lu()
            .solve(&rhs)
            .ok_or(Error::SingularSystem { stage })?;
        self.weights = Some(weights);
        Ok(())
    }

    /// One output row per input row.
    pub fn predict(&self, data: &DMatrix<f32>) -> Result<DMatrix<f32>> {
        let weights = self
            .weights
            .as_ref()
            .ok_or_else(|| Error::InvalidModel("regressor has not been trained".into()))?;
        if data.ncols() + 1 != weights.nrows() {
            return Err(Error::DimensionMismatch {
                expected: weights.nrows() - 1,
                actual: data.ncols(),
            });
        }
        Ok(with_bias(data) * weights)
    }

    /// Input feature count the regressor was fitted on.
    pub fn num_features(&self) -> Option<usize> {
        self.weights.as_ref().map(|w| w.nrows() - 1)
    }
}

fn with_bias(data: &DMatrix<f32>) -> DMatrix<f32> {
    let cols = data.ncols();
    data.clone().insert_column(cols, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual(param: f32) -> Regulariser {
        Regulariser {
            kind: RegularisationKind::Manual,
            param,
            regularise_last_row: false,
        }
    }

    #[test]
    fn recovers_exact_linear_map() {
        // y0 = 2a - b + 3, y1 = a + 0.5
        let data = DMatrix::from_row_slice(4, 2, &[0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 2.0, 3.0]);
        let labels = DMatrix::from_fn(4, 2, |r, c| {
            let (a, b) = (data[(r, 0)], data[(r, 1)]);
            if c == 0 {
                2.0 * a - b + 3.0
            } else {
                a + 0.5
            }
        });

        let mut reg = LinearRegressor::new(manual(0.0));
        reg.learn(&data, &labels, 0).unwrap();
        let pred = reg.predict(&data).unwrap();

        assert!((pred - labels).abs().max() < 1e-3);
        assert_eq!(reg.num_features(), Some(2));
    }

    #[test]
    fn regularisation_shrinks_weights_but_not_bias() {
        let data = DMatrix::from_row_slice(3, 1, &[-1.0, 0.0, 1.0]);
        let labels = DMatrix::from_row_slice(3, 1, &[3.0, 5.0, 7.0]);

        let mut reg = LinearRegressor::new(manual(100.0));
        reg.learn(&data, &labels, 0).unwrap();
        let pred = reg.predict(&DMatrix::from_row_slice(1, 1, &[0.0])).unwrap();
        let slope = reg.predict(&DMatrix::from_row_slice(1, 1, &[1.0])).unwrap()[(0, 0)] - pred[(0, 0)];

        // Bias is unregularised and the data is centred, so the intercept is exact.
        assert!((pred[(0, 0)] - 5.0).abs() < 1e-4);
        assert!(slope > 0.0 && slope < 0.1);
    }

    #[test]
    fn matrix_norm_lambda_scales_with_data() {
        let ata = DMatrix::from_row_slice(2, 2, &[3.0, 0.0, 0.0, 4.0]);
        let reg = Regulariser {
            param: 2.0,
            ..Regulariser::default()
        };
        let m = reg.matrix(&ata, 10);
        // 2 * 5 / 10
        assert!((m[(0, 0)] - 1.0).abs() < 1e-6);
        assert_eq!(m[(1, 1)], 0.0);
    }

    #[test]
    fn singular_system_reported() {
        // A constant-zero feature with no regularisation
        let data = DMatrix::zeros(3, 1);
        let labels = DMatrix::from_row_slice(3, 1, &[1.0, 2.0, 3.0]);

        let mut reg = LinearRegressor::new(manual(0.0));
        let err = reg.learn(&data, &labels, 2).unwrap_err();
        assert!(matches!(err, Error::SingularSystem { stage: 2 }));
    }

    #[test]
    fn predict_requires_training_and_matching_width() {
        let reg = LinearRegressor::new(Regulariser::default());
        assert!(reg.predict(&DMatrix::zeros(1, 2)).is_err());

        let mut reg = LinearRegressor::new(manual(0.1));
        reg.learn(&DMatrix::identity(3, 3), &DMatrix::identity(3, 3), 0).unwrap();
        assert!(reg.predict(&DMatrix::zeros(1, 2)).is_err());
    }
}
