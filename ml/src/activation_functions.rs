//! The network uses tanh after every convolution and dense layer.
//!
//! All activation functions are exposed as free functions working on arbitrary array
//! dimensions. The derivative is expressed in terms of the already computed activation,
//! so the backward pass never needs the pre-activation sums.
use ndarray::*;

use crate::Precision;

/// Tanh implementation
pub fn tanh<D: Dimension>(data: &Array<Precision, D>) -> Array<Precision, D> {
    data.mapv(Precision::tanh)
}

/// Derivative of tanh, given y = tanh(x) instead of x: 1 - y².
pub fn tanh_derivative(y: Precision) -> Precision {
    1.0 - y * y
}

/// Elementwise tanh derivative of a whole activation array.
pub fn tanh_derivative_array<D: Dimension>(
    activations: &Array<Precision, D>,
) -> Array<Precision, D> {
    activations.mapv(tanh_derivative)
}
