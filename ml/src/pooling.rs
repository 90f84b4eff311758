use crate::Precision;
use ndarray::*;

/// Non-overlapping average pooling (S2 and S4). The stride equals the window size,
/// there is no activation and nothing to learn.
///
/// Feature maps are expected in (channels, height, width) layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AveragePoolLayer {
    window: usize,
}

impl AveragePoolLayer {
    pub fn new(window: usize) -> AveragePoolLayer {
        assert!(window > 0, "Pooling window of 0 passed");
        AveragePoolLayer { window }
    }

    /// Share of an output gradient each input cell of the window receives.
    pub fn gradient_scale(&self) -> Precision {
        1.0 / (self.window * self.window) as Precision
    }

    /// Averages every window of every feature map.
    pub fn forward(&self, input: &Array3<Precision>) -> Array3<Precision> {
        let (channels, height, width) = input.dim();
        assert!(
            height % self.window == 0 && width % self.window == 0,
            "Feature map of size {}x{} cannot be pooled with window {}",
            height,
            width,
            self.window
        );

        let scale = self.gradient_scale();
        let mut output: Array3<Precision> =
            Array::zeros((channels, height / self.window, width / self.window));
        for ((c, i, j), out) in output.indexed_iter_mut() {
            let (row, col) = (i * self.window, j * self.window);
            let window = input.slice(s![c, row..row + self.window, col..col + self.window]);
            *out = window.sum() * scale;
        }
        output
    }

    /// Spreads the gradient of every pooled cell evenly over the cells of its window.
    /// The source cell of input coordinate (i, j) is (i / window, j / window).
    pub fn backward(&self, grad_output: &Array3<Precision>) -> Array3<Precision> {
        let (channels, height, width) = grad_output.dim();
        let scale = self.gradient_scale();

        Array::from_shape_fn(
            (channels, height * self.window, width * self.window),
            |(c, i, j)| grad_output[[c, i / self.window, j / self.window]] * scale,
        )
    }
}
