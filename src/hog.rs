//! HOG descriptors sampled around landmark estimates.
//!
//! Each landmark contributes one square patch, resampled to a fixed size and
//! handed to `imageproc`'s HOG implementation. The patch size follows the
//! face scale through the inter-eye distance of the current estimate.

use image::{GrayImage, Luma};
use imageproc::hog::{hog, HogOptions};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::descent::Projection;
use crate::error::{Error, Result};
use crate::matrix::row_to_shape;
use crate::metrics::{inter_eye_distance, EyeLandmarks};
use crate::types::Shape;

/// Trait for accessing pixel intensities from an image.
pub trait ImageAccess {
    /// Grayscale intensity at (x, y). Returns 0 for out-of-bounds pixels.
    fn get_pixel(&self, x: i32, y: i32) -> u8;

    fn width(&self) -> u32;
    fn height(&self) -> u32;
}

impl ImageAccess for GrayImage {
    fn get_pixel(&self, x: i32, y: i32) -> u8 {
        if x < 0 || y < 0 || x >= self.width() as i32 || y >= self.height() as i32 {
            return 0;
        }
        image::GenericImageView::get_pixel(self, x as u32, y as u32)[0]
    }

    fn width(&self) -> u32 {
        self.dimensions().0
    }

    fn height(&self) -> u32 {
        self.dimensions().1
    }
}

/// Descriptor settings for one cascade stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HogParam {
    /// Cells per patch side.
    pub num_cells: usize,
    /// Pixels per cell side after resampling.
    pub cell_size: usize,
    /// Orientation bins.
    pub num_bins: usize,
    /// Patch half-width as a fraction of the inter-eye distance.
    pub relative_patch_size: f32,
}

impl HogParam {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.num_cells == 0 || self.cell_size == 0 || self.num_bins == 0 {
            return Err("num_cells, cell_size and num_bins must be positive".into());
        }
        if !(self.relative_patch_size.is_finite() && self.relative_patch_size > 0.0) {
            return Err(format!(
                "relative_patch_size must be positive, got {}",
                self.relative_patch_size
            ));
        }
        Ok(())
    }

    /// Side of the resampled patch in pixels.
    pub fn patch_side(&self) -> usize {
        self.num_cells * self.cell_size
    }

    /// Descriptor length for a single landmark.
    pub fn descriptor_len(&self) -> usize {
        self.num_cells * self.num_cells * self.num_bins
    }

    fn options(&self) -> HogOptions {
        HogOptions::new(self.num_bins, false, self.cell_size, 1, 1)
    }
}

/// Computes per-stage shape descriptors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HogExtractor {
    params: Vec<HogParam>,
    eyes: EyeLandmarks,
}

impl HogExtractor {
    pub fn new(params: Vec<HogParam>, eyes: EyeLandmarks) -> Self {
        Self { params, eyes }
    }

    pub fn params(&self) -> &[HogParam] {
        &self.params
    }

    pub fn num_stages(&self) -> usize {
        self.params.len()
    }

    /// Length of the descriptor [`HogExtractor::describe`] returns at `stage`.
    pub fn descriptor_len(&self, stage: usize, num_landmarks: usize) -> usize {
        self.params[stage].descriptor_len() * num_landmarks
    }

    /// Concatenated HOG descriptors of every landmark in `shape`.
    pub fn describe<I: ImageAccess>(&self, image: &I, shape: &Shape, stage: usize) -> Result<Vec<f32>> {
        let param = self.params.get(stage).ok_or(Error::DimensionMismatch {
            expected: self.params.len(),
            actual: stage + 1,
        })?;
        let ied = inter_eye_distance(shape, &self.eyes)?;
        let half = (param.relative_patch_size * ied).round().max(1.0);

        let mut descriptor = Vec::with_capacity(param.descriptor_len() * shape.num_landmarks());
        for p in &shape.points {
            let patch = extract_patch(image, p.x, p.y, half, param.patch_side());
            let cell = hog(&patch, param.options()).map_err(Error::Hog)?;
            descriptor.extend(cell.into_iter().map(|v| if v.is_finite() { v } else { 0.0 }));
        }
        Ok(descriptor)
    }
}

/// Descriptors for estimates tied to source images.
///
/// Row `r` of an estimate matrix is described on `images[sample_images[r]]`,
/// so perturbed copies of one face share a single decoded image.
pub struct HogProjection<'a, I> {
    extractor: &'a HogExtractor,
    images: &'a [I],
    sample_images: &'a [usize],
}

impl<'a, I: ImageAccess> HogProjection<'a, I> {
    pub fn new(extractor: &'a HogExtractor, images: &'a [I], sample_images: &'a [usize]) -> Self {
        Self {
            extractor,
            images,
            sample_images,
        }
    }
}

impl<I: ImageAccess> Projection for HogProjection<'_, I> {
    fn project(&self, x: &DMatrix<f32>, stage: usize) -> Result<DMatrix<f32>> {
        if x.nrows() != self.sample_images.len() {
            return Err(Error::DimensionMismatch {
                expected: self.sample_images.len(),
                actual: x.nrows(),
            });
        }
        let cols = self.extractor.descriptor_len(stage, x.ncols() / 2);
        let mut features = DMatrix::zeros(x.nrows(), cols);
        for (r, &image) in self.sample_images.iter().enumerate() {
            let d = self
                .extractor
                .describe(&self.images[image], &row_to_shape(x, r), stage)?;
            for (c, v) in d.into_iter().enumerate() {
                features[(r, c)] = v;
            }
        }
        Ok(features)
    }
}

/// Resample the square `[cx - half, cx + half]` window to `side` x `side`.
fn extract_patch<I: ImageAccess>(image: &I, cx: f32, cy: f32, half: f32, side: usize) -> GrayImage {
    let step = 2.0 * half / side as f32;
    let x0 = cx - half;
    let y0 = cy - half;
    GrayImage::from_fn(side as u32, side as u32, |u, v| {
        let x = x0 + (u as f32 + 0.5) * step - 0.5;
        let y = y0 + (v as f32 + 0.5) * step - 0.5;
        Luma([sample_bilinear(image, x, y).round().clamp(0.0, 255.0) as u8])
    })
}

/// Sample a pixel with bilinear interpolation for sub-pixel accuracy.
#[inline]
fn sample_bilinear<I: ImageAccess>(image: &I, x: f32, y: f32) -> f32 {
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let x1 = x0 + 1;
    let y1 = y0 + 1;

    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = image.get_pixel(x0, y0) as f32;
    let p10 = image.get_pixel(x1, y0) as f32;
    let p01 = image.get_pixel(x0, y1) as f32;
    let p11 = image.get_pixel(x1, y1) as f32;

    let top = p00 * (1.0 - fx) + p10 * fx;
    let bottom = p01 * (1.0 - fx) + p11 * fx;
    top * (1.0 - fy) + bottom * fy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Point;

    fn param() -> HogParam {
        HogParam {
            num_cells: 2,
            cell_size: 4,
            num_bins: 4,
            relative_patch_size: 0.5,
        }
    }

    fn eyes() -> EyeLandmarks {
        EyeLandmarks {
            right: vec![0],
            left: vec![1],
        }
    }

    #[test]
    fn bilinear_interpolation() {
        let img = GrayImage::from_raw(2, 2, vec![0, 100, 200, 50]).unwrap();

        assert!((sample_bilinear(&img, 0.0, 0.0) - 0.0).abs() < 0.01);
        assert!((sample_bilinear(&img, 1.0, 0.0) - 100.0).abs() < 0.01);
        assert!((sample_bilinear(&img, 0.0, 1.0) - 200.0).abs() < 0.01);
        assert!((sample_bilinear(&img, 1.0, 1.0) - 50.0).abs() < 0.01);

        // (0 + 100 + 200 + 50) / 4
        assert!((sample_bilinear(&img, 0.5, 0.5) - 87.5).abs() < 0.01);
        assert!((sample_bilinear(&img, 0.5, 0.0) - 50.0).abs() < 0.01);
    }

    #[test]
    fn out_of_bounds_reads_zero() {
        let img = GrayImage::from_pixel(3, 3, Luma([255]));
        assert_eq!(ImageAccess::get_pixel(&img, -1, 0), 0);
        assert_eq!(ImageAccess::get_pixel(&img, 3, 0), 0);
        assert_eq!(ImageAccess::get_pixel(&img, 1, 1), 255);
    }

    #[test]
    fn patch_at_identity_scale_copies_pixels() {
        let img = GrayImage::from_fn(16, 16, |x, y| Luma([(x * 10 + y) as u8]));
        // half = 2 with side 4 is a one-to-one copy of pixels 6..10
        let patch = extract_patch(&img, 8.0, 8.0, 2.0, 4);
        assert_eq!(patch.dimensions(), (4, 4));
        assert_eq!(patch.get_pixel(0, 0)[0], (6 * 10 + 6) as u8);
        assert_eq!(patch.get_pixel(3, 1)[0], (9 * 10 + 7) as u8);
    }

    #[test]
    fn descriptor_length_matches_layout() {
        let img = GrayImage::from_fn(64, 64, |x, y| Luma([((x * 7 + y * 13) % 256) as u8]));
        let shape = Shape::new(vec![
            Point::new(20.0, 30.0),
            Point::new(44.0, 30.0),
            Point::new(32.0, 45.0),
        ]);
        let extractor = HogExtractor::new(vec![param()], eyes());

        let d = extractor.describe(&img, &shape, 0).unwrap();
        assert_eq!(d.len(), extractor.descriptor_len(0, 3));
        assert_eq!(d.len(), 2 * 2 * 4 * 3);
        assert!(d.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn gradient_direction_changes_descriptor() {
        let horizontal = GrayImage::from_fn(64, 64, |x, _| Luma([(x * 4) as u8]));
        let vertical = GrayImage::from_fn(64, 64, |_, y| Luma([(y * 4) as u8]));
        let shape = Shape::new(vec![Point::new(24.0, 32.0), Point::new(40.0, 32.0)]);
        let extractor = HogExtractor::new(vec![param()], eyes());

        let a = extractor.describe(&horizontal, &shape, 0).unwrap();
        let b = extractor.describe(&vertical, &shape, 0).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn unknown_stage_rejected() {
        let img = GrayImage::new(32, 32);
        let shape = Shape::new(vec![Point::new(10.0, 10.0), Point::new(20.0, 10.0)]);
        let extractor = HogExtractor::new(vec![param()], eyes());
        assert!(extractor.describe(&img, &shape, 1).is_err());
    }

    #[test]
    fn projection_describes_each_row_on_its_image() {
        let flat = GrayImage::from_pixel(64, 64, Luma([90]));
        let textured = GrayImage::from_fn(64, 64, |x, y| Luma([((x * 31 + y * 17) % 256) as u8]));
        let images = vec![flat, textured];
        let shape = Shape::new(vec![Point::new(24.0, 32.0), Point::new(40.0, 32.0)]);
        let x = crate::matrix::shapes_to_matrix(&[shape.clone(), shape.clone(), shape]);
        let extractor = HogExtractor::new(vec![param()], eyes());

        let features = HogProjection::new(&extractor, &images, &[1, 0, 1])
            .project(&x, 0)
            .unwrap();

        assert_eq!(features.shape(), (3, extractor.descriptor_len(0, 2)));
        assert_eq!(features.row(0), features.row(2));
        assert_ne!(features.row(0), features.row(1));

        assert!(HogProjection::new(&extractor, &images, &[0])
            .project(&x, 0)
            .is_err());
    }

    #[test]
    fn param_validation() {
        assert!(param().validate().is_ok());
        assert!(HogParam { num_bins: 0, ..param() }.validate().is_err());
        assert!(HogParam { relative_patch_size: -1.0, ..param() }.validate().is_err());
    }
}
