//! Face-box perturbation for training-set augmentation.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Normal;

use crate::config::PerturbationConfig;
use crate::error::{Error, Result};
use crate::types::BoundingBox;

/// Rescale `bbox` about its centre by `scale`, then shift it by
/// `tx_ratio * width` and `ty_ratio * height` pixels.
pub fn perturb(bbox: &BoundingBox, tx_ratio: f32, ty_ratio: f32, scale: f32) -> BoundingBox {
    let tx = tx_ratio * bbox.width;
    let ty = ty_ratio * bbox.height;

    let width = bbox.width * scale;
    let height = bbox.height * scale;

    BoundingBox::new(
        bbox.x + (bbox.width - width) / 2.0 + tx,
        bbox.y + (bbox.height - height) / 2.0 + ty,
        width,
        height,
    )
}

/// Draws random translation/scale perturbations.
pub struct PerturbationSampler {
    translation: Normal<f32>,
    scale: Normal<f32>,
    rng: StdRng,
}

impl PerturbationSampler {
    pub fn new(config: &PerturbationConfig) -> Result<Self> {
        let translation = Normal::new(config.translation_mu, config.translation_sigma)
            .map_err(|e| Error::InvalidConfig(format!("translation distribution: {e}")))?;
        let scale = Normal::new(config.scale_mu, config.scale_sigma)
            .map_err(|e| Error::InvalidConfig(format!("scale distribution: {e}")))?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            translation,
            scale,
            rng,
        })
    }

    /// A randomly perturbed copy of `bbox`.
    pub fn sample(&mut self, bbox: &BoundingBox) -> BoundingBox {
        let tx = self.rng.sample(self.translation);
        let ty = self.rng.sample(self.translation);
        let s = self.rng.sample(self.scale);
        perturb(bbox, tx, ty, s)
    }
}
