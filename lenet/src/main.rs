//! This crate drives the LeNet-5 classifier from the command line: it reads MNIST IDX files,
//! trains a freshly initialized network epoch by epoch and can dump the feature maps of a
//! single forward pass as images.

use env_logger::Builder;
use lenet::{enlarge, feature_map_to_image, inspected_network};
use log::info;
use ml::{
    dataset::{read_images, Dataset},
    models::{evaluate, LeNet5, DEFAULT_LEARNING_RATE},
    training::{train, train_with_validation},
    Precision,
};
use quicli::prelude::*;
use rand::{rngs::StdRng, SeedableRng};
use std::{
    fs::{self, File},
    io::{self, BufReader},
    path::PathBuf,
};
use structopt::StructOpt;

/// Trains the network on an MNIST training set
#[derive(Debug, StructOpt)]
struct TrainOpts {
    /// Path to the IDX image file (e.g. train-images-idx3-ubyte)
    #[structopt(parse(from_os_str))]
    images: PathBuf,
    /// Path to the IDX label file (e.g. train-labels-idx1-ubyte)
    #[structopt(parse(from_os_str))]
    labels: PathBuf,
    /// IDX image file of a test set, evaluated after every epoch
    #[structopt(long = "test-images", parse(from_os_str))]
    test_images: Option<PathBuf>,
    /// IDX label file of the test set
    #[structopt(long = "test-labels", parse(from_os_str))]
    test_labels: Option<PathBuf>,
    /// Number of passes over the training set
    #[structopt(short = "e", long = "epochs", default_value = "1")]
    epochs: usize,
    /// Gradient descent step size
    #[structopt(short = "l", long = "learning-rate")]
    learning_rate: Option<Precision>,
    /// Seed for the weight initialization, random if not given
    #[structopt(short = "s", long = "seed")]
    seed: Option<u64>,
    /// Only use the first N samples of every file
    #[structopt(short = "n", long = "limit")]
    limit: Option<usize>,
    #[structopt(flatten)]
    verbosity: Verbosity,
}

/// Writes the first feature map of every stage of one forward pass as PNG files
#[derive(Debug, StructOpt)]
struct InspectOpts {
    /// Path to the IDX image file
    #[structopt(parse(from_os_str))]
    images: PathBuf,
    /// Index of the image inside the file
    #[structopt(short = "i", long = "index", default_value = "0")]
    index: usize,
    /// IDX label file matching the images, needed to train before inspecting
    #[structopt(short = "l", long = "labels", parse(from_os_str))]
    labels: Option<PathBuf>,
    /// Passes over the image file before inspecting, 0 keeps the initial weights
    #[structopt(short = "e", long = "epochs", default_value = "0")]
    epochs: usize,
    /// Only train on the first N samples
    #[structopt(short = "n", long = "limit")]
    limit: Option<usize>,
    /// Directory the images are written to, one file per stage
    #[structopt(short = "o", long = "output", parse(from_os_str), default_value = ".")]
    output: PathBuf,
    /// Size of one activation in pixels
    #[structopt(long = "scale", default_value = "8")]
    scale: u32,
    /// Seed for the weight initialization, random if not given
    #[structopt(short = "s", long = "seed")]
    seed: Option<u64>,
    #[structopt(flatten)]
    verbosity: Verbosity,
}

/// Train and inspect a LeNet-5 digit classifier.
#[derive(Debug, StructOpt)]
#[structopt(name = "LeNet")]
enum Lenet {
    #[structopt(name = "train", about = "Trains a new network on MNIST IDX files.")]
    Train(TrainOpts),
    #[structopt(
        name = "inspect",
        about = "Runs one image through a network and saves the feature maps of every stage. \
                 The weights are untrained unless --epochs and --labels are given."
    )]
    Inspect(InspectOpts),
}

/// Trait for the subcommands that lenet uses
trait LenetOpts {
    /// Performs the subcommand
    fn run(&self) -> CliResult;
    /// Returns the verbosity command
    fn get_verbosity(&self) -> &Verbosity;
    /// Sets up logging
    fn setup_env_logger(&self) -> CliResult {
        let mut builder = Builder::from_default_env();

        builder
            .filter(None, self.get_verbosity().log_level().to_level_filter())
            .init();

        Ok(())
    }
}

/// Seeded generator if a seed was given, else one seeded from the OS.
fn rng_from(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

impl LenetOpts for TrainOpts {
    // Performs training
    fn run(&self) -> CliResult {
        let train_set = Dataset::from_paths(&self.images, &self.labels, self.limit)?;
        info!("Loaded {} training samples", train_set.len());

        let learning_rate = self.learning_rate.unwrap_or(DEFAULT_LEARNING_RATE);
        let mut network = LeNet5::new(&mut rng_from(self.seed), learning_rate);

        match (&self.test_images, &self.test_labels) {
            (Some(images), Some(labels)) => {
                let test_set = Dataset::from_paths(images, labels, self.limit)?;
                info!("Loaded {} test samples", test_set.len());
                let reports =
                    train_with_validation(&mut network, &train_set, &test_set, self.epochs);
                if let Some(last) = reports.last() {
                    println!(
                        "Training accuracy: {:.2}%\nTest accuracy: {:.2}%",
                        last.train_accuracy * 100.0,
                        last.test_accuracy * 100.0
                    );
                }
            }
            (None, None) => {
                train(&mut network, &train_set, self.epochs);
                let accuracy = evaluate(&network, &train_set.images, &train_set.labels);
                println!("Training accuracy: {:.2}%", accuracy * 100.0);
            }
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "--test-images and --test-labels must be given together",
                )
                .into());
            }
        }
        Ok(())
    }

    fn get_verbosity(&self) -> &Verbosity {
        &self.verbosity
    }
}

impl LenetOpts for InspectOpts {
    // Writes the feature maps
    fn run(&self) -> CliResult {
        let images = read_images(BufReader::new(File::open(&self.images)?), Some(self.index + 1))?;
        let image = images.get(self.index).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("File only holds {} images", images.len()),
            )
        })?;

        let train_set = if self.epochs > 0 {
            let labels = self.labels.as_ref().ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "--labels is needed to train before inspecting",
                )
            })?;
            Some(Dataset::from_paths(&self.images, labels, self.limit)?)
        } else {
            None
        };
        let network = inspected_network(
            &mut rng_from(self.seed),
            train_set.as_ref(),
            self.epochs,
        );
        let context = network.forward_with_context(image);

        fs::create_dir_all(&self.output)?;
        for (stage, map) in context.first_feature_maps() {
            let picture = enlarge(&feature_map_to_image(&map, stage == "input"), self.scale);
            let path = self.output.join(format!("{}.png", stage));
            picture.save(&path)?;
            info!("Wrote {}", path.display());
        }
        println!("Scores: {}", context.output());
        Ok(())
    }

    fn get_verbosity(&self) -> &Verbosity {
        &self.verbosity
    }
}

impl LenetOpts for Lenet {
    fn run(&self) -> CliResult {
        match self {
            Lenet::Train(c) => c.run(),
            Lenet::Inspect(c) => c.run(),
        }
    }

    fn get_verbosity(&self) -> &Verbosity {
        match self {
            Lenet::Train(c) => c.get_verbosity(),
            Lenet::Inspect(c) => c.get_verbosity(),
        }
    }
}

fn main() -> CliResult {
    let args = Lenet::from_args();
    args.setup_env_logger()?;
    args.run()
}
