use image::{GrayImage, Luma};
use log::info;
use ml::{
    dataset::Dataset,
    models::{LeNet5, DEFAULT_LEARNING_RATE},
    training::train,
    Precision,
};
use ndarray::Array2;
use rand::Rng;

/// Network whose feature maps get inspected: freshly initialized, then trained for
/// `epochs` passes if a training set is given.
pub fn inspected_network<R: Rng + ?Sized>(
    rng: &mut R,
    train_set: Option<&Dataset>,
    epochs: usize,
) -> LeNet5 {
    let mut network = LeNet5::new(rng, DEFAULT_LEARNING_RATE);
    if let Some(train_set) = train_set {
        info!("Training on {} samples before inspecting", train_set.len());
        train(&mut network, train_set, epochs);
    }
    network
}

/// Turns a feature map into a grayscale image, one pixel per activation.
/// Raw maps (the padded input) already hold intensities in 0..=255, every other stage
/// holds tanh activations in [-1, 1].
pub fn feature_map_to_image(map: &Array2<Precision>, raw: bool) -> GrayImage {
    let (height, width) = map.dim();
    GrayImage::from_fn(width as u32, height as u32, |x, y| {
        Luma([to_pixel(map[[y as usize, x as usize]], raw)])
    })
}

/// Scales an image up by an integer factor without smoothing.
pub fn enlarge(image: &GrayImage, factor: u32) -> GrayImage {
    let factor = factor.max(1);
    GrayImage::from_fn(image.width() * factor, image.height() * factor, |x, y| {
        *image.get_pixel(x / factor, y / factor)
    })
}

/// Turns a network activation into a pixel value
pub fn to_pixel(x: Precision, raw: bool) -> u8 {
    if raw {
        x.round().clamp(0.0, 255.0) as u8
    } else {
        ((x.clamp(-1.0, 1.0) + 1.0) * 127.5).round() as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn digit_set() -> Dataset {
        let image = Array2::from_shape_fn((28, 28), |(i, j)| {
            if (6..22).contains(&i) && (10..14).contains(&j) {
                255
            } else {
                0
            }
        });
        Dataset::new(vec![image], vec![1]).unwrap()
    }

    #[test]
    fn test_inspected_network_untrained() {
        let network = inspected_network(&mut StdRng::seed_from_u64(3), None, 5);
        assert_eq!(network, LeNet5::new(&mut StdRng::seed_from_u64(3), DEFAULT_LEARNING_RATE));
    }

    #[test]
    fn test_inspected_network_trained() {
        let dataset = digit_set();
        let fresh = LeNet5::new(&mut StdRng::seed_from_u64(3), DEFAULT_LEARNING_RATE);
        let trained = inspected_network(&mut StdRng::seed_from_u64(3), Some(&dataset), 10);
        assert_ne!(trained, fresh);
        assert!(trained.loss(&dataset.images[0], 1) < fresh.loss(&dataset.images[0], 1));
    }

    #[test]
    fn test_to_pixel() {
        assert_eq!(to_pixel(-1.0, false), 0);
        assert_eq!(to_pixel(0.0, false), 128);
        assert_eq!(to_pixel(1.0, false), 255);
        assert_eq!(to_pixel(3.0, false), 255);
        assert_eq!(to_pixel(254.6, true), 255);
        assert_eq!(to_pixel(-4.0, true), 0);
    }

    #[test]
    fn test_feature_map_to_image() {
        let map = array![[-1.0, 0.0, 1.0]];
        let image = feature_map_to_image(&map, false);
        assert_eq!(image.dimensions(), (3, 1));
        assert_eq!(image.get_pixel(0, 0).0, [0]);
        assert_eq!(image.get_pixel(2, 0).0, [255]);
    }

    #[test]
    fn test_enlarge() {
        let map = array![[0.0, 255.0], [255.0, 0.0]];
        let image = enlarge(&feature_map_to_image(&map, true), 4);
        assert_eq!(image.dimensions(), (8, 8));
        assert_eq!(image.get_pixel(3, 3).0, [0]);
        assert_eq!(image.get_pixel(4, 3).0, [255]);
    }
}
