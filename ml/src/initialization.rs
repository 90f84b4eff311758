use crate::Precision;
use ndarray::{Array, Dimension, ShapeBuilder};
use ndarray_rand::rand_distr::{StandardNormal, Uniform};
use ndarray_rand::RandomExt;
use rand::Rng;

/// Half-width of the uniform range used for every bias and for all weights except C1.
pub const UNIFORM_LIMIT: Precision = 0.05;

/// How a freshly allocated parameter tensor is filled.
/// The random source is always passed in by the caller, so a seeded generator
/// reproduces the same network.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Initializer {
    /// Zero-mean gaussian with standard deviation sqrt(2 / fan_in).
    ScaledGaussian { fan_in: usize },
    /// Uniform on [-limit, limit].
    Uniform { limit: Precision },
}

impl Initializer {
    /// The default uniform initializer, U[-0.05, 0.05].
    pub fn small_uniform() -> Self {
        Initializer::Uniform {
            limit: UNIFORM_LIMIT,
        }
    }

    pub fn sample<Sh, D, R>(&self, shape: Sh, rng: &mut R) -> Array<Precision, D>
    where
        Sh: ShapeBuilder<Dim = D>,
        D: Dimension,
        R: Rng + ?Sized,
    {
        match *self {
            Initializer::ScaledGaussian { fan_in } => {
                assert!(fan_in > 0, "Fan-in of 0 passed");
                let std = (2.0 / fan_in as Precision).sqrt();
                Array::random_using(shape, StandardNormal, rng) * std
            }
            Initializer::Uniform { limit } => {
                Array::random_using(shape, Uniform::new_inclusive(-limit, limit), rng)
            }
        }
    }
}
