use crate::{
    activation_functions::{tanh, tanh_derivative_array},
    initialization::Initializer,
    Precision,
};
use ndarray::*;
use rand::Rng;

/// Rust implementation of a fully connected layer followed by tanh.
/// The weight matrix shall have dimension (in that order) output units x input units.
/// The bias is optional; the output layer of LeNet-5 has none.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedforwardLayer {
    weights: Array2<Precision>,
    biases: Option<Array1<Precision>>,
}

/// Gradients of the loss with respect to a fully connected layer's parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedforwardGradients {
    pub weights: Array2<Precision>,
    pub biases: Option<Array1<Precision>>,
}

impl FeedforwardLayer {
    pub fn new(weights: Array2<Precision>, biases: Option<Array1<Precision>>) -> FeedforwardLayer {
        if let Some(b) = &biases {
            assert_eq!(b.len(), weights.nrows(), "Need one bias per output unit");
        }
        FeedforwardLayer { weights, biases }
    }

    /// Draws a new layer with all weights (and biases, if any) from U[-0.05, 0.05].
    pub fn random<R: Rng + ?Sized>(
        input_dimension: usize,
        output_dimension: usize,
        with_bias: bool,
        rng: &mut R,
    ) -> FeedforwardLayer {
        let init = Initializer::small_uniform();
        let weights = init.sample((output_dimension, input_dimension), rng);
        let biases = if with_bias {
            Some(init.sample(output_dimension, rng))
        } else {
            None
        };
        FeedforwardLayer::new(weights, biases)
    }

    pub fn weights(&self) -> &Array2<Precision> {
        &self.weights
    }

    pub fn weights_mut(&mut self) -> &mut Array2<Precision> {
        &mut self.weights
    }

    pub fn biases(&self) -> Option<&Array1<Precision>> {
        self.biases.as_ref()
    }

    pub fn input_dimension(&self) -> usize {
        self.weights.ncols()
    }

    pub fn output_dimension(&self) -> usize {
        self.weights.nrows()
    }

    /// tanh(W x + b)
    pub fn forward<'a, V>(&self, data: V) -> Array1<Precision>
    where
        V: AsArray<'a, Precision, Ix1>,
    {
        let data_arr: ArrayView1<Precision> = data.into();
        assert_eq!(
            data_arr.len(),
            self.input_dimension(),
            "Wrong input dimension"
        );

        let sums: Array1<Precision> = self
            .weights
            .outer_iter()
            .enumerate()
            .map(|(i, row)| {
                let bias = self.biases.as_ref().map_or(0.0, |b| b[i]);
                let sum: Precision = row.iter().zip(data_arr.iter()).map(|(w, x)| w * x).sum();
                sum + bias
            })
            .collect();
        tanh(&sums)
    }

    /// Gradient with respect to the pre-activation sums, given the gradient with respect to
    /// the layer output.
    pub fn deltas(
        &self,
        output: &Array1<Precision>,
        grad_output: &Array1<Precision>,
    ) -> Array1<Precision> {
        assert_eq!(output.len(), grad_output.len());
        grad_output * &tanh_derivative_array(output)
    }

    /// Transposed weights applied to the deltas.
    pub fn input_gradient(&self, deltas: &Array1<Precision>) -> Array1<Precision> {
        let mut grad_input: Array1<Precision> = Array1::zeros(self.input_dimension());
        for (row, &d) in self.weights.outer_iter().zip(deltas.iter()) {
            grad_input.scaled_add(d, &row);
        }
        grad_input
    }

    /// Outer product of deltas and input for the weights, the deltas themselves for the bias.
    pub fn gradients(
        &self,
        input: &Array1<Precision>,
        deltas: &Array1<Precision>,
    ) -> FeedforwardGradients {
        let weights = Array::from_shape_fn(self.weights.raw_dim(), |(i, j)| deltas[i] * input[j]);
        let biases = self.biases.as_ref().map(|_| deltas.clone());
        FeedforwardGradients { weights, biases }
    }

    /// Plain gradient descent step. A layer without bias only updates its weights.
    pub fn apply_gradients(&mut self, gradients: &FeedforwardGradients, learning_rate: Precision) {
        self.weights.scaled_add(-learning_rate, &gradients.weights);
        if let (Some(biases), Some(grad)) = (self.biases.as_mut(), gradients.biases.as_ref()) {
            biases.scaled_add(-learning_rate, grad);
        }
    }

    /// Backpropagates through the layer and updates its parameters.
    /// The returned input gradient is computed from the weights before the update.
    pub fn backward(
        &mut self,
        input: &Array1<Precision>,
        output: &Array1<Precision>,
        grad_output: &Array1<Precision>,
        learning_rate: Precision,
    ) -> Array1<Precision> {
        let deltas = self.deltas(output, grad_output);
        let grad_input = self.input_gradient(&deltas);
        let gradients = self.gradients(input, &deltas);
        self.apply_gradients(&gradients, learning_rate);
        grad_input
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation_functions::tanh_derivative;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_forward() {
        let layer = FeedforwardLayer::new(
            array![[1., 0., -1.], [0.5, 0.5, 0.5]],
            Some(array![0., -1.]),
        );
        let out = layer.forward(&array![1., 2., 3.]);
        assert_eq!(out, array![(-2.0 as Precision).tanh(), (2.0 as Precision).tanh()]);
    }

    #[test]
    fn test_forward_without_bias() {
        let layer = FeedforwardLayer::new(array![[0.25, 0.25]], None);
        assert_eq!(layer.forward(&array![2., 2.]), array![(1.0 as Precision).tanh()]);
    }

    #[test]
    fn test_random_shapes() {
        let mut rng = StdRng::seed_from_u64(2);
        let f6 = FeedforwardLayer::random(120, 84, true, &mut rng);
        assert_eq!(f6.weights().dim(), (84, 120));
        assert_eq!(f6.biases().map(|b| b.len()), Some(84));

        let output = FeedforwardLayer::random(84, 10, false, &mut rng);
        assert_eq!(output.weights().dim(), (10, 84));
        assert!(output.biases().is_none());
    }

    #[test]
    fn test_input_gradient_is_transposed_product() {
        let layer = FeedforwardLayer::new(array![[1., 2.], [3., 4.], [5., 6.]], None);
        let grad = layer.input_gradient(&array![1., 0., -1.]);
        assert_eq!(grad, array![-4., -4.]);
    }

    #[test]
    fn test_gradients_match_finite_differences() {
        let mut rng = StdRng::seed_from_u64(4);
        let layer = FeedforwardLayer::random(4, 3, true, &mut rng);
        let input = array![0.3, -0.7, 1.1, 0.05];
        let target = array![1., -1., -1.];
        let loss = |l: &FeedforwardLayer| (l.forward(&input) - &target).mapv(|e| e * e).sum();

        let output = layer.forward(&input);
        let grad_output = (&output - &target) * 2.0;
        let deltas = layer.deltas(&output, &grad_output);
        let gradients = layer.gradients(&input, &deltas);

        let eps = 1e-6;
        for i in 0..3 {
            for j in 0..4 {
                let mut plus = layer.clone();
                plus.weights_mut()[[i, j]] += eps;
                let mut minus = layer.clone();
                minus.weights_mut()[[i, j]] -= eps;
                let numeric = (loss(&plus) - loss(&minus)) / (2.0 * eps);
                assert!((numeric - gradients.weights[[i, j]]).abs() < 1e-7);
            }
        }
        assert_eq!(gradients.biases, Some(deltas));
    }

    #[test]
    fn test_backward_without_bias_keeps_no_bias() {
        let mut layer = FeedforwardLayer::new(array![[0.1, -0.2]], None);
        let input = array![1., 1.];
        let output = layer.forward(&input);
        let grad_input = layer.backward(&input, &output, &array![1.], 0.1);

        let d = tanh_derivative(output[0]);
        assert!((grad_input[0] - 0.1 * d).abs() < 1e-12);
        assert!((grad_input[1] + 0.2 * d).abs() < 1e-12);
        assert!(layer.biases().is_none());
        assert!((layer.weights()[[0, 0]] - (0.1 - 0.1 * d)).abs() < 1e-12);
    }
}
