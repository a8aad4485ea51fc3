//! Supervised descent: a cascade of linear regressors, each mapping the
//! descriptor of the current estimate to a correction of that estimate.
//!
//! Estimates travel as matrices with one row per sample in the
//! [`Shape::to_row`](crate::Shape::to_row) layout.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::matrix::row_to_shape;
use crate::metrics::{inter_eye_distance, EyeLandmarks};
use crate::regressor::LinearRegressor;
use crate::types::Shape;

/// Computes the descriptor matrix of a set of estimates at a cascade stage.
pub trait Projection {
    fn project(&self, x: &DMatrix<f32>, stage: usize) -> Result<DMatrix<f32>>;
}

/// Scales regression targets per sample so that they are comparable across
/// face sizes. Updates are divided by the same factor.
pub trait Normalisation {
    fn factor(&self, estimate: &Shape) -> Result<f32>;
}

/// Normalises by `1 / IED` of the current estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterEyeDistanceNormalisation {
    eyes: EyeLandmarks,
}

impl InterEyeDistanceNormalisation {
    pub fn new(eyes: EyeLandmarks) -> Self {
        Self { eyes }
    }

    pub fn eyes(&self) -> &EyeLandmarks {
        &self.eyes
    }
}

impl Normalisation for InterEyeDistanceNormalisation {
    fn factor(&self, estimate: &Shape) -> Result<f32> {
        Ok(1.0 / inter_eye_distance(estimate, &self.eyes)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisedDescentOptimiser<N> {
    regressors: Vec<LinearRegressor>,
    normalisation: N,
}

impl<N: Normalisation> SupervisedDescentOptimiser<N> {
    pub fn new(regressors: Vec<LinearRegressor>, normalisation: N) -> Self {
        Self {
            regressors,
            normalisation,
        }
    }

    pub fn regressors(&self) -> &[LinearRegressor] {
        &self.regressors
    }

    pub fn normalisation(&self) -> &N {
        &self.normalisation
    }

    pub fn num_stages(&self) -> usize {
        self.regressors.len()
    }

    /// Learn every regressor in turn, starting from `x0` and regressing
    /// toward `x_gt`. `on_stage` sees the stage index and the estimates
    /// after that stage's update. Returns the final estimates.
    pub fn train<P, F>(
        &mut self,
        x_gt: &DMatrix<f32>,
        x0: &DMatrix<f32>,
        projection: &P,
        mut on_stage: F,
    ) -> Result<DMatrix<f32>>
    where
        P: Projection,
        F: FnMut(usize, &DMatrix<f32>) -> Result<()>,
    {
        if x_gt.shape() != x0.shape() {
            return Err(Error::DimensionMismatch {
                expected: x_gt.len(),
                actual: x0.len(),
            });
        }

        let mut current = x0.clone();
        for stage in 0..self.regressors.len() {
            let features = projection.project(&current, stage)?;
            let factors = self.factors(&current)?;

            let mut targets = &current - x_gt;
            for (r, factor) in factors.iter().enumerate() {
                targets.row_mut(r).scale_mut(*factor);
            }

            self.regressors[stage].learn(&features, &targets, stage)?;
            current = self.step(stage, &current, &features, &factors)?;
            on_stage(stage, &current)?;
        }
        Ok(current)
    }

    /// Run the learned cascade from `x0`.
    pub fn predict<P: Projection>(&self, x0: &DMatrix<f32>, projection: &P) -> Result<DMatrix<f32>> {
        let mut current = x0.clone();
        for stage in 0..self.regressors.len() {
            let features = projection.project(&current, stage)?;
            let factors = self.factors(&current)?;
            current = self.step(stage, &current, &features, &factors)?;
        }
        Ok(current)
    }

    fn factors(&self, x: &DMatrix<f32>) -> Result<Vec<f32>> {
        (0..x.nrows())
            .map(|r| self.normalisation.factor(&row_to_shape(x, r)))
            .collect()
    }

    fn step(
        &self,
        stage: usize,
        current: &DMatrix<f32>,
        features: &DMatrix<f32>,
        factors: &[f32],
    ) -> Result<DMatrix<f32>> {
        let mut update = self.regressors[stage].predict(features)?;
        for (r, factor) in factors.iter().enumerate() {
            update.row_mut(r).scale_mut(1.0 / factor);
        }
        Ok(current - update)
    }
}
