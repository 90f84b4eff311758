//! Epoch loops around `LeNet5::train_step`, with progress reported through `log`.
use crate::{
    dataset::Dataset,
    models::{evaluate, LeNet5},
    Precision,
};
use log::{debug, info};

/// Accuracies measured after one training epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochReport {
    /// Counted from 1
    pub epoch: usize,
    pub train_accuracy: Precision,
    pub test_accuracy: Precision,
}

/// Trains on every sample of the dataset, in order, once per epoch.
pub fn train(network: &mut LeNet5, dataset: &Dataset, epochs: usize) {
    info!("Training started");
    for epoch in 1..=epochs {
        run_epoch(network, dataset);
        info!("Epoch {}/{}", epoch, epochs);
    }
    info!("Training complete");
}

/// Like `train`, but measures train and test accuracy after every epoch.
pub fn train_with_validation(
    network: &mut LeNet5,
    train_set: &Dataset,
    test_set: &Dataset,
    epochs: usize,
) -> Vec<EpochReport> {
    info!("Training with validation started");
    let mut reports = Vec::with_capacity(epochs);
    for epoch in 1..=epochs {
        run_epoch(network, train_set);

        let report = EpochReport {
            epoch,
            train_accuracy: evaluate(&*network, &train_set.images, &train_set.labels),
            test_accuracy: evaluate(&*network, &test_set.images, &test_set.labels),
        };
        info!(
            "Epoch {}/{}: training accuracy {:.2}%, test accuracy {:.2}%",
            epoch,
            epochs,
            report.train_accuracy * 100.0,
            report.test_accuracy * 100.0
        );
        reports.push(report);
    }
    info!("Training complete");
    reports
}

fn run_epoch(network: &mut LeNet5, dataset: &Dataset) {
    for (i, (image, &label)) in dataset.images.iter().zip(&dataset.labels).enumerate() {
        network.train_step(image, label);
        if (i + 1) % 1000 == 0 {
            debug!("{} of {} samples", i + 1, dataset.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{argmax, DEFAULT_LEARNING_RATE};
    use crate::{Pixel, IMAGE_SIZE};
    use ndarray::{Array, Array2};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// A vertical bar for label 1, a horizontal bar for label 7.
    fn bars() -> Dataset {
        let vertical: Array2<Pixel> =
            Array::from_shape_fn((IMAGE_SIZE, IMAGE_SIZE), |(i, j)| {
                if (12..16).contains(&j) && (4..24).contains(&i) {
                    255
                } else {
                    0
                }
            });
        let horizontal = vertical.t().to_owned();
        Dataset::new(vec![vertical, horizontal], vec![1, 7]).unwrap()
    }

    #[test]
    fn test_train_learns_two_images() {
        let mut network = LeNet5::new(&mut StdRng::seed_from_u64(10), DEFAULT_LEARNING_RATE);
        let dataset = bars();
        train(&mut network, &dataset, 40);

        for (image, &label) in dataset.images.iter().zip(&dataset.labels) {
            assert_eq!(argmax(&network.forward(image)), label);
        }
    }

    #[test]
    fn test_train_with_validation_reports_every_epoch() {
        let mut network = LeNet5::new(&mut StdRng::seed_from_u64(11), DEFAULT_LEARNING_RATE);
        let dataset = bars();
        let reports = train_with_validation(&mut network, &dataset, &dataset, 3);

        assert_eq!(reports.len(), 3);
        for (i, report) in reports.iter().enumerate() {
            assert_eq!(report.epoch, i + 1);
            assert!((0.0..=1.0).contains(&report.train_accuracy));
            // same set on both sides
            assert_eq!(report.train_accuracy, report.test_accuracy);
        }
    }

    #[test]
    fn test_zero_epochs_changes_nothing() {
        let mut network = LeNet5::new(&mut StdRng::seed_from_u64(12), DEFAULT_LEARNING_RATE);
        let before = network.clone();
        train(&mut network, &bars(), 0);
        assert_eq!(network, before);
    }
}
