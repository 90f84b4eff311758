use ndarray::*;
use num::Zero;

/// Border added around every input image, so a 28x28 digit becomes a 32x32 grid.
pub const INPUT_PADDING: usize = 2;

/// Surrounds a 2d grid with `padding` rows and columns of zeros on every side.
/// The original values end up at offset (padding, padding).
pub fn pad<'a, T, V>(data: V, padding: usize) -> Array2<T>
where
    T: Clone + Zero + 'a,
    V: AsArray<'a, T, Ix2>,
{
    let data_arr: ArrayView2<T> = data.into();
    let (rows, cols) = data_arr.dim();

    let mut padded = Array::zeros((rows + 2 * padding, cols + 2 * padding));
    padded
        .slice_mut(s![padding..padding + rows, padding..padding + cols])
        .assign(&data_arr);
    padded
}
