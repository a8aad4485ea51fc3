//! Landmark normalisation relative to a face box.
//!
//! Normalised coordinates are offsets from the box centre in units of box
//! width (x) and height (y).

use crate::error::{Error, Result};
use crate::types::{BoundingBox, Point, Shape};

pub fn normalise_landmarks(points: &[Point], face_box: &BoundingBox) -> Shape {
    let center = face_box.center();
    Shape::new(
        points
            .iter()
            .map(|p| {
                Point::new(
                    (p.x - center.x) / face_box.width,
                    (p.y - center.y) / face_box.height,
                )
            })
            .collect(),
    )
}

/// Place a normalised shape into a face box (inverse of
/// [`normalise_landmarks`]).
pub fn align_mean(mean: &Shape, face_box: &BoundingBox) -> Shape {
    let center = face_box.center();
    Shape::new(
        mean.points
            .iter()
            .map(|p| {
                Point::new(
                    p.x * face_box.width + center.x,
                    p.y * face_box.height + center.y,
                )
            })
            .collect(),
    )
}

/// Element-wise mean of a set of shapes.
pub fn mean_shape(shapes: &[Shape]) -> Result<Shape> {
    let first = shapes
        .first()
        .ok_or_else(|| Error::DegenerateShape("mean of an empty shape set".into()))?;
    let n = first.num_landmarks();

    let mut sum = Shape::zeros(n);
    for shape in shapes {
        if shape.num_landmarks() != n {
            return Err(Error::DimensionMismatch {
                expected: n,
                actual: shape.num_landmarks(),
            });
        }
        for (acc, p) in sum.points.iter_mut().zip(&shape.points) {
            *acc += *p;
        }
    }

    let scale = 1.0 / shapes.len() as f32;
    for p in &mut sum.points {
        *p = *p * scale;
    }
    Ok(sum)
}
