//! Conversions between shapes and the row matrices the regressors consume.

use nalgebra::DMatrix;

use crate::types::Shape;

/// Stack shapes as rows (see [`Shape::to_row`] for the layout).
///
/// All shapes must have the same landmark count.
pub fn shapes_to_matrix(shapes: &[Shape]) -> DMatrix<f32> {
    let cols = shapes.first().map_or(0, |s| s.num_landmarks() * 2);
    let mut m = DMatrix::zeros(shapes.len(), cols);
    for (r, shape) in shapes.iter().enumerate() {
        debug_assert_eq!(shape.num_landmarks() * 2, cols);
        for (c, v) in shape.to_row().into_iter().enumerate() {
            m[(r, c)] = v;
        }
    }
    m
}

pub fn row_to_shape(m: &DMatrix<f32>, row: usize) -> Shape {
    let v: Vec<f32> = m.row(row).iter().copied().collect();
    Shape::from_row(&v)
}
