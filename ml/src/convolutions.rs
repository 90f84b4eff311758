use crate::{
    activation_functions::{tanh, tanh_derivative_array},
    initialization::Initializer,
    Precision,
};
use ndarray::*;
use rand::Rng;

/// Rust implementation of a valid (unpadded, stride 1) convolutional layer followed by tanh.
///
/// Every output feature map `f` reads the input maps listed in `connections[f]`, in that order.
/// Its kernel has shape (connections[f].len() x kernel size x kernel size), so C1 and C5 are the
/// special case where every map reads every input, and C3 can use the sparse LeNet table.
///
/// Feature maps are expected in (channels, height, width) layout.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvolutionLayer {
    kernels: Vec<Array3<Precision>>,
    biases: Array1<Precision>,
    connections: Vec<Vec<usize>>,
    kernel_size: usize,
    num_input_channels: usize,
}

/// Gradients of the loss with respect to a convolution layer's parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvolutionGradients {
    pub kernels: Vec<Array3<Precision>>,
    pub biases: Array1<Precision>,
}

impl ConvolutionLayer {
    pub fn new(
        kernels: Vec<Array3<Precision>>,
        biases: Array1<Precision>,
        connections: Vec<Vec<usize>>,
        num_input_channels: usize,
    ) -> ConvolutionLayer {
        assert!(!kernels.is_empty(), "Convolution without output maps passed");
        assert_eq!(kernels.len(), biases.len(), "Need one bias per output map");
        assert_eq!(
            kernels.len(),
            connections.len(),
            "Need one connection list per output map"
        );

        let kernel_size = kernels[0].len_of(Axis(1));
        for (kernel, maps) in kernels.iter().zip(&connections) {
            assert_eq!(
                kernel.dim(),
                (maps.len(), kernel_size, kernel_size),
                "Kernel shape does not match its connections"
            );
            assert!(
                maps.iter().all(|&m| m < num_input_channels),
                "Connection to a nonexistent input map"
            );
        }

        ConvolutionLayer {
            kernels,
            biases,
            connections,
            kernel_size,
            num_input_channels,
        }
    }

    /// Draws a new layer: kernels from `weight_init`, biases from U[-0.05, 0.05].
    pub fn random<R: Rng + ?Sized>(
        connections: Vec<Vec<usize>>,
        num_input_channels: usize,
        kernel_size: usize,
        weight_init: Initializer,
        rng: &mut R,
    ) -> ConvolutionLayer {
        let kernels = connections
            .iter()
            .map(|maps| weight_init.sample((maps.len(), kernel_size, kernel_size), rng))
            .collect();
        let biases = Initializer::small_uniform().sample(connections.len(), rng);
        ConvolutionLayer::new(kernels, biases, connections, num_input_channels)
    }

    pub fn kernels(&self) -> &[Array3<Precision>] {
        &self.kernels
    }

    pub fn biases(&self) -> &Array1<Precision> {
        &self.biases
    }

    pub fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    pub fn num_input_channels(&self) -> usize {
        self.num_input_channels
    }

    pub fn num_output_channels(&self) -> usize {
        self.kernels.len()
    }

    /// Mutable access to a single kernel weight (output map, connection slot, row, col).
    pub fn kernel_weight_mut(
        &mut self,
        map: usize,
        slot: usize,
        row: usize,
        col: usize,
    ) -> &mut Precision {
        &mut self.kernels[map][[slot, row, col]]
    }

    /// Output side length for an input of side length `input_size`: n - k + 1.
    pub fn output_size(&self, input_size: usize) -> usize {
        assert!(
            input_size >= self.kernel_size,
            "Input of size {} is smaller than the kernel",
            input_size
        );
        input_size - self.kernel_size + 1
    }

    /// Cross-correlates the input with every kernel, adds the bias and applies tanh.
    pub fn forward(&self, input: &Array3<Precision>) -> Array3<Precision> {
        let (channels, height, width) = input.dim();
        assert_eq!(
            channels, self.num_input_channels,
            "Wrong number of input channels"
        );
        let k = self.kernel_size;
        let (out_height, out_width) = (self.output_size(height), self.output_size(width));

        let mut sums: Array3<Precision> =
            Array::zeros((self.num_output_channels(), out_height, out_width));
        for (f, (kernel, maps)) in self.kernels.iter().zip(&self.connections).enumerate() {
            for i in 0..out_height {
                for j in 0..out_width {
                    let mut sum = self.biases[f];
                    for (slot, &m) in maps.iter().enumerate() {
                        let window = input.slice(s![m, i..i + k, j..j + k]);
                        sum += window_product(window, kernel.slice(s![slot, .., ..]));
                    }
                    sums[[f, i, j]] = sum;
                }
            }
        }
        tanh(&sums)
    }

    /// Gradient with respect to the pre-activation sums, given the gradient with respect to
    /// the layer output.
    pub fn deltas(
        &self,
        output: &Array3<Precision>,
        grad_output: &Array3<Precision>,
    ) -> Array3<Precision> {
        assert_eq!(output.dim(), grad_output.dim());
        grad_output * &tanh_derivative_array(output)
    }

    /// Scatters every delta back over the input window it was computed from, weighted by
    /// the kernel. An input cell accumulates contributions from every output map reading it.
    pub fn input_gradient(
        &self,
        deltas: &Array3<Precision>,
        input_dim: (usize, usize, usize),
    ) -> Array3<Precision> {
        let k = self.kernel_size;
        let mut grad_input: Array3<Precision> = Array::zeros(input_dim);
        for ((f, i, j), &d) in deltas.indexed_iter() {
            for (slot, &m) in self.connections[f].iter().enumerate() {
                grad_input
                    .slice_mut(s![m, i..i + k, j..j + k])
                    .scaled_add(d, &self.kernels[f].slice(s![slot, .., ..]));
            }
        }
        grad_input
    }

    /// Kernel and bias gradients, summed over every output position.
    pub fn gradients(
        &self,
        input: &Array3<Precision>,
        deltas: &Array3<Precision>,
    ) -> ConvolutionGradients {
        let k = self.kernel_size;
        let mut kernels: Vec<Array3<Precision>> = self
            .kernels
            .iter()
            .map(|kernel| Array::zeros(kernel.raw_dim()))
            .collect();
        let mut biases: Array1<Precision> = Array::zeros(self.biases.raw_dim());

        for ((f, i, j), &d) in deltas.indexed_iter() {
            for (slot, &m) in self.connections[f].iter().enumerate() {
                kernels[f]
                    .slice_mut(s![slot, .., ..])
                    .scaled_add(d, &input.slice(s![m, i..i + k, j..j + k]));
            }
            biases[f] += d;
        }
        ConvolutionGradients { kernels, biases }
    }

    /// Plain gradient descent step.
    pub fn apply_gradients(&mut self, gradients: &ConvolutionGradients, learning_rate: Precision) {
        for (kernel, grad) in self.kernels.iter_mut().zip(&gradients.kernels) {
            kernel.scaled_add(-learning_rate, grad);
        }
        self.biases.scaled_add(-learning_rate, &gradients.biases);
    }

    /// Backpropagates through the layer and updates its parameters.
    /// The returned input gradient is computed from the weights before the update.
    pub fn backward(
        &mut self,
        input: &Array3<Precision>,
        output: &Array3<Precision>,
        grad_output: &Array3<Precision>,
        learning_rate: Precision,
    ) -> Array3<Precision> {
        let deltas = self.deltas(output, grad_output);
        let grad_input = self.input_gradient(&deltas, input.dim());
        let gradients = self.gradients(input, &deltas);
        self.apply_gradients(&gradients, learning_rate);
        grad_input
    }

    /// Like `backward`, for a layer whose input is not learned (C1 reads the image),
    /// so no gradient needs to flow any further.
    pub fn backward_without_propagation(
        &mut self,
        input: &Array3<Precision>,
        output: &Array3<Precision>,
        grad_output: &Array3<Precision>,
        learning_rate: Precision,
    ) {
        let deltas = self.deltas(output, grad_output);
        let gradients = self.gradients(input, &deltas);
        self.apply_gradients(&gradients, learning_rate);
    }
}

/// Sum of the elementwise product of an input window and a kernel slice.
fn window_product(window: ArrayView2<Precision>, kernel: ArrayView2<Precision>) -> Precision {
    window.iter().zip(kernel.iter()).map(|(x, w)| x * w).sum()
}
