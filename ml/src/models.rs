use crate::{
    connectivity::{c3_connectivity, full_connectivity, C3_INPUT_MAPS, C3_OUTPUT_MAPS},
    convolutions::ConvolutionLayer,
    fully_connected::FeedforwardLayer,
    initialization::Initializer,
    padding::{pad, INPUT_PADDING},
    pooling::AveragePoolLayer,
    Pixel, Precision, IMAGE_SIZE, NUM_CLASSES,
};
use log::{debug, trace};
use ndarray::*;
use rand::Rng;

pub const KERNEL_SIZE: usize = 5;
pub const POOL_WINDOW: usize = 2;
pub const C1_MAPS: usize = C3_INPUT_MAPS;
pub const C3_MAPS: usize = C3_OUTPUT_MAPS;
pub const C5_MAPS: usize = 120;
pub const F6_UNITS: usize = 84;

pub const DEFAULT_LEARNING_RATE: Precision = 0.01;

/// Anything that turns an image into one score per class.
pub trait Classifier {
    fn classify(&self, image: ArrayView2<Pixel>) -> Array1<Precision>;
}

/// Every intermediate result of one forward pass, kept for the backward pass of the
/// same sample. Produced by `LeNet5::forward_with_context`, consumed by `LeNet5::backward`.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardContext {
    /// Padded image as a single channel, 1x32x32
    padded: Array3<Precision>,
    /// 6x28x28
    c1: Array3<Precision>,
    /// 6x14x14
    s2: Array3<Precision>,
    /// 16x10x10
    c3: Array3<Precision>,
    /// 16x5x5
    s4: Array3<Precision>,
    c5: Array1<Precision>,
    f6: Array1<Precision>,
    output: Array1<Precision>,
}

impl ForwardContext {
    /// The score vector, one tanh activation per class.
    pub fn output(&self) -> &Array1<Precision> {
        &self.output
    }

    pub fn into_output(self) -> Array1<Precision> {
        self.output
    }

    /// The first channel of every stage, named after the stage. Vector stages
    /// are returned as a single row.
    pub fn first_feature_maps(&self) -> Vec<(&'static str, Array2<Precision>)> {
        let first = |maps: &Array3<Precision>| maps.index_axis(Axis(0), 0).to_owned();
        let row = |v: &Array1<Precision>| v.clone().insert_axis(Axis(0));
        vec![
            ("input", first(&self.padded)),
            ("c1", first(&self.c1)),
            ("s2", first(&self.s2)),
            ("c3", first(&self.c3)),
            ("s4", first(&self.s4)),
            ("c5", row(&self.c5)),
            ("f6", row(&self.f6)),
            ("output", row(&self.output)),
        ]
    }
}

/// LeNet-5: pad, C1, S2, C3 (sparse), S4, C5, F6 and a bias-free output layer,
/// every learned stage followed by tanh.
///
/// The network owns all parameters. Training is plain per-sample gradient descent
/// on the squared error against a bipolar (+1 / -1) target.
#[derive(Debug, Clone, PartialEq)]
pub struct LeNet5 {
    c1: ConvolutionLayer,
    s2: AveragePoolLayer,
    c3: ConvolutionLayer,
    s4: AveragePoolLayer,
    c5: ConvolutionLayer,
    f6: FeedforwardLayer,
    output: FeedforwardLayer,
    learning_rate: Precision,
}

impl LeNet5 {
    /// Randomly initialized network. C1 kernels are drawn from N(0, 2/25), everything else
    /// from U[-0.05, 0.05].
    pub fn new<R: Rng + ?Sized>(rng: &mut R, learning_rate: Precision) -> LeNet5 {
        let c1 = ConvolutionLayer::random(
            full_connectivity(1, C1_MAPS),
            1,
            KERNEL_SIZE,
            Initializer::ScaledGaussian {
                fan_in: KERNEL_SIZE * KERNEL_SIZE,
            },
            rng,
        );
        let c3 = ConvolutionLayer::random(
            c3_connectivity(),
            C1_MAPS,
            KERNEL_SIZE,
            Initializer::small_uniform(),
            rng,
        );
        let c5 = ConvolutionLayer::random(
            full_connectivity(C3_MAPS, C5_MAPS),
            C3_MAPS,
            KERNEL_SIZE,
            Initializer::small_uniform(),
            rng,
        );
        let f6 = FeedforwardLayer::random(C5_MAPS, F6_UNITS, true, rng);
        let output = FeedforwardLayer::random(F6_UNITS, NUM_CLASSES, false, rng);

        debug!("Initialized LeNet-5 with learning rate {}", learning_rate);
        LeNet5::from_layers(c1, c3, c5, f6, output, learning_rate)
    }

    /// Assembles a network from given parameters. Panics if any layer has the wrong geometry.
    pub fn from_layers(
        c1: ConvolutionLayer,
        c3: ConvolutionLayer,
        c5: ConvolutionLayer,
        f6: FeedforwardLayer,
        output: FeedforwardLayer,
        learning_rate: Precision,
    ) -> LeNet5 {
        for (name, layer, inputs, outputs) in &[
            ("C1", &c1, 1, C1_MAPS),
            ("C3", &c3, C1_MAPS, C3_MAPS),
            ("C5", &c5, C3_MAPS, C5_MAPS),
        ] {
            assert_eq!(layer.kernel_size(), KERNEL_SIZE, "{} kernel size", name);
            assert_eq!(layer.num_input_channels(), *inputs, "{} inputs", name);
            assert_eq!(layer.num_output_channels(), *outputs, "{} outputs", name);
        }
        assert_eq!(f6.weights().dim(), (F6_UNITS, C5_MAPS), "F6 shape");
        assert!(f6.biases().is_some(), "F6 needs a bias");
        assert_eq!(output.weights().dim(), (NUM_CLASSES, F6_UNITS), "Output shape");
        assert!(output.biases().is_none(), "Output layer has no bias");

        LeNet5 {
            c1,
            s2: AveragePoolLayer::new(POOL_WINDOW),
            c3,
            s4: AveragePoolLayer::new(POOL_WINDOW),
            c5,
            f6,
            output,
            learning_rate,
        }
    }

    pub fn learning_rate(&self) -> Precision {
        self.learning_rate
    }

    pub fn c1(&self) -> &ConvolutionLayer {
        &self.c1
    }

    pub fn c3(&self) -> &ConvolutionLayer {
        &self.c3
    }

    pub fn c5(&self) -> &ConvolutionLayer {
        &self.c5
    }

    pub fn f6(&self) -> &FeedforwardLayer {
        &self.f6
    }

    pub fn output_layer(&self) -> &FeedforwardLayer {
        &self.output
    }

    /// Runs the whole pipeline and keeps every intermediate activation.
    /// Panics unless the image is 28x28.
    pub fn forward_with_context<'a, V>(&self, image: V) -> ForwardContext
    where
        V: AsArray<'a, Pixel, Ix2>,
    {
        let image: ArrayView2<Pixel> = image.into();
        assert_eq!(
            image.dim(),
            (IMAGE_SIZE, IMAGE_SIZE),
            "Only {}x{} images are supported",
            IMAGE_SIZE,
            IMAGE_SIZE
        );

        let padded = pad(image, INPUT_PADDING)
            .mapv(Precision::from)
            .insert_axis(Axis(0));
        let c1 = self.c1.forward(&padded);
        let s2 = self.s2.forward(&c1);
        let c3 = self.c3.forward(&s2);
        let s4 = self.s4.forward(&c3);
        // the C5 kernels cover all of S4, leaving one value per map
        let c5: Array1<Precision> = self.c5.forward(&s4).iter().copied().collect();
        let f6 = self.f6.forward(&c5);
        let output = self.output.forward(&f6);

        ForwardContext {
            padded,
            c1,
            s2,
            c3,
            s4,
            c5,
            f6,
            output,
        }
    }

    /// Score vector for an image, one value in (-1, 1) per class.
    pub fn forward<'a, V>(&self, image: V) -> Array1<Precision>
    where
        V: AsArray<'a, Pixel, Ix2>,
    {
        self.forward_with_context(image).into_output()
    }

    /// Squared error of the network output against the bipolar target of `label`.
    pub fn loss<'a, V>(&self, image: V, label: usize) -> Precision
    where
        V: AsArray<'a, Pixel, Ix2>,
    {
        squared_error(self.forward(image).view(), label)
    }

    /// Backpropagates the error of a forward pass and updates every layer, from the output
    /// layer down to C1. Each layer hands on the gradient for the layer below computed with
    /// its weights from before the update, then updates itself.
    pub fn backward(&mut self, context: &ForwardContext, label: usize) {
        let lr = self.learning_rate;
        let target = bipolar_target(label);
        let grad_output = (&context.output - &target) * 2.0;

        let grad_f6 = self
            .output
            .backward(&context.f6, &context.output, &grad_output, lr);
        let grad_c5 = self.f6.backward(&context.c5, &context.f6, &grad_f6, lr);
        let grad_s4 = self.c5.backward(
            &context.s4,
            &as_feature_maps(&context.c5),
            &as_feature_maps(&grad_c5),
            lr,
        );
        let grad_c3 = self.s4.backward(&grad_s4);
        let grad_s2 = self.c3.backward(&context.s2, &context.c3, &grad_c3, lr);
        let grad_c1 = self.s2.backward(&grad_s2);
        self.c1
            .backward_without_propagation(&context.padded, &context.c1, &grad_c1, lr);
    }

    /// One step of stochastic gradient descent on a single sample.
    pub fn train_step<'a, V>(&mut self, image: V, label: usize)
    where
        V: AsArray<'a, Pixel, Ix2>,
    {
        let context = self.forward_with_context(image);
        trace!(
            "Training on label {}, loss before step {}",
            label,
            squared_error(context.output().view(), label)
        );
        self.backward(&context, label);
    }
}

impl Classifier for LeNet5 {
    fn classify(&self, image: ArrayView2<Pixel>) -> Array1<Precision> {
        self.forward(image)
    }
}

/// A vector as (length x 1 x 1) feature maps, the shape C5 produces and consumes.
fn as_feature_maps(v: &Array1<Precision>) -> Array3<Precision> {
    Array::from_shape_fn((v.len(), 1, 1), |(f, _, _)| v[f])
}

/// +1 at the position of the label, -1 everywhere else.
pub fn bipolar_target(label: usize) -> Array1<Precision> {
    assert!(label < NUM_CLASSES, "Label {} is not a digit", label);
    Array::from_shape_fn(NUM_CLASSES, |i| if i == label { 1.0 } else { -1.0 })
}

/// Sum of squared differences between the scores and the bipolar target of `label`.
pub fn squared_error(scores: ArrayView1<Precision>, label: usize) -> Precision {
    let target = bipolar_target(label);
    scores
        .iter()
        .zip(target.iter())
        .map(|(y, t)| (y - t).powi(2))
        .sum()
}

/// Index of the largest score. Ties go to the lowest index.
pub fn argmax<'a, V>(scores: V) -> usize
where
    V: AsArray<'a, Precision, Ix1>,
{
    let scores: ArrayView1<Precision> = scores.into();
    let mut best = 0;
    let mut max = Precision::NEG_INFINITY;
    for (i, &s) in scores.iter().enumerate() {
        if s > max {
            max = s;
            best = i;
        }
    }
    best
}

/// Fraction of images whose highest score is at their label. An empty set has accuracy 0.
pub fn evaluate<C: Classifier + ?Sized>(
    model: &C,
    images: &[Array2<Pixel>],
    labels: &[usize],
) -> Precision {
    assert_eq!(
        images.len(),
        labels.len(),
        "Need exactly one label per image"
    );
    if images.is_empty() {
        return 0.0;
    }

    let correct = images
        .iter()
        .zip(labels)
        .filter(|(image, label)| argmax(&model.classify(image.view())) == **label)
        .count();
    correct as Precision / images.len() as Precision
}
