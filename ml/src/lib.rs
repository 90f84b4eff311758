//! A LeNet-5 variant for classifying 28x28 grayscale digits, written without any
//! numerical or autodiff library. Every layer implements its own forward pass and
//! its own hand-derived gradient step.
//!
//! `ndarray` is only used as a shape-checked container.

pub mod activation_functions;
pub mod connectivity;
pub mod convolutions;
pub mod dataset;
pub mod fully_connected;
pub mod initialization;
pub mod models;
pub mod padding;
pub mod pooling;
pub mod training;

/// Precision of weights, biases and activations.
pub type Precision = f64;
/// Raw pixel intensity, 0 (background) to 255.
pub type Pixel = u8;

/// Side length of the images the network accepts.
pub const IMAGE_SIZE: usize = 28;
/// Number of digit classes.
pub const NUM_CLASSES: usize = 10;
