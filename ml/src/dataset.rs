//! Reader for the IDX files the MNIST digits are distributed in.
//!
//! Image files start with the big-endian u32 header (magic 2051, count, rows, cols) followed by
//! one unsigned byte per pixel, row by row. Label files start with (magic 2049, count) followed
//! by one byte per label.
use crate::{Pixel, IMAGE_SIZE, NUM_CLASSES};
use log::debug;
use ndarray::Array2;
use std::io::{self, BufReader, Read};
use std::{fs::File, path::Path};
use thiserror::Error;

pub const IMAGE_MAGIC: u32 = 2051;
pub const LABEL_MAGIC: u32 = 2049;

type DatasetResult<T> = Result<T, DatasetError>;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("Dataset file could not be read. Filesystem reported error\n {0}.")]
    Io(#[from] std::io::Error),
    #[error("Wrong magic number {found} (expected {expected})")]
    MagicNumber { expected: u32, found: u32 },
    #[error("Images have size {rows}x{cols}, only {}x{} is supported", IMAGE_SIZE, IMAGE_SIZE)]
    ImageSize { rows: usize, cols: usize },
    #[error("Label {0} is not a digit")]
    Label(u8),
    #[error("Got {images} images but {labels} labels")]
    CountMismatch { images: usize, labels: usize },
}

/// Images with their labels, index by index.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    pub images: Vec<Array2<Pixel>>,
    pub labels: Vec<usize>,
}

impl Dataset {
    pub fn new(images: Vec<Array2<Pixel>>, labels: Vec<usize>) -> DatasetResult<Dataset> {
        if images.len() != labels.len() {
            return Err(DatasetError::CountMismatch {
                images: images.len(),
                labels: labels.len(),
            });
        }
        Ok(Dataset { images, labels })
    }

    /// Loads an image file and a label file. With a limit, only the first `limit` items
    /// of each file are read.
    pub fn from_paths<P: AsRef<Path>, Q: AsRef<Path>>(
        images: P,
        labels: Q,
        limit: Option<usize>,
    ) -> DatasetResult<Dataset> {
        debug!("Reading images from {}", images.as_ref().display());
        let images = read_images(BufReader::new(File::open(images)?), limit)?;
        debug!("Reading labels from {}", labels.as_ref().display());
        let labels = read_labels(BufReader::new(File::open(labels)?), limit)?;
        Dataset::new(images, labels)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

fn read_u32<R: Read>(reader: &mut R) -> DatasetResult<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

fn check_magic<R: Read>(reader: &mut R, expected: u32) -> DatasetResult<()> {
    let found = read_u32(reader)?;
    if found != expected {
        return Err(DatasetError::MagicNumber { expected, found });
    }
    Ok(())
}

/// Reads up to `limit` images (all of them without a limit) from an IDX image file.
pub fn read_images<R: Read>(
    mut reader: R,
    limit: Option<usize>,
) -> DatasetResult<Vec<Array2<Pixel>>> {
    check_magic(&mut reader, IMAGE_MAGIC)?;
    let count = read_u32(&mut reader)? as usize;
    let rows = read_u32(&mut reader)? as usize;
    let cols = read_u32(&mut reader)? as usize;
    if rows != IMAGE_SIZE || cols != IMAGE_SIZE {
        return Err(DatasetError::ImageSize { rows, cols });
    }

    let count = limit.map_or(count, |l| l.min(count));
    debug!("Header: {} images of {}x{}", count, rows, cols);

    // the header count is not trusted for allocation, a short file fails in read_exact
    let mut images = Vec::new();
    let mut pixels = vec![0u8; rows * cols];
    for _ in 0..count {
        reader.read_exact(&mut pixels)?;
        images.push(Array2::from_shape_fn((rows, cols), |(i, j)| pixels[i * cols + j]));
    }
    Ok(images)
}

/// Reads up to `limit` labels (all of them without a limit) from an IDX label file.
pub fn read_labels<R: Read>(mut reader: R, limit: Option<usize>) -> DatasetResult<Vec<usize>> {
    check_magic(&mut reader, LABEL_MAGIC)?;
    let count = read_u32(&mut reader)? as usize;
    let count = limit.map_or(count, |l| l.min(count));

    let mut raw = Vec::new();
    reader.take(count as u64).read_to_end(&mut raw)?;
    if raw.len() < count {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("Label file ends after {} of {} labels", raw.len(), count),
        )
        .into());
    }
    raw.into_iter()
        .map(|l| {
            if (l as usize) < NUM_CLASSES {
                Ok(l as usize)
            } else {
                Err(DatasetError::Label(l))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::{Cursor, Write};

    use super::*;
    use tempfile::tempdir;

    fn image_file(count: u32, rows: u32, cols: u32, pixels: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for v in &[IMAGE_MAGIC, count, rows, cols] {
            bytes.extend_from_slice(&v.to_be_bytes());
        }
        bytes.extend_from_slice(pixels);
        bytes
    }

    fn label_file(labels: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&LABEL_MAGIC.to_be_bytes());
        bytes.extend_from_slice(&(labels.len() as u32).to_be_bytes());
        bytes.extend_from_slice(labels);
        bytes
    }

    fn pixels(count: usize) -> Vec<u8> {
        (0..count * IMAGE_SIZE * IMAGE_SIZE)
            .map(|i| (i % 256) as u8)
            .collect()
    }

    #[test]
    fn test_read_images() {
        let bytes = image_file(2, 28, 28, &pixels(2));
        let images = read_images(Cursor::new(bytes), None).unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].dim(), (28, 28));
        assert_eq!(images[0][[0, 5]], 5);
        assert_eq!(images[0][[1, 0]], 28);
        // second image starts at byte 784 = 3 * 256 + 16
        assert_eq!(images[1][[0, 0]], 16);
    }

    #[test]
    fn test_read_images_with_limit() {
        let bytes = image_file(3, 28, 28, &pixels(3));
        let images = read_images(Cursor::new(bytes), Some(1)).unwrap();
        assert_eq!(images.len(), 1);

        let bytes = image_file(1, 28, 28, &pixels(1));
        let images = read_images(Cursor::new(bytes), Some(10)).unwrap();
        assert_eq!(images.len(), 1);
    }

    #[test]
    fn test_wrong_magic() {
        let bytes = label_file(&[1, 2]);
        match read_images(Cursor::new(bytes), None) {
            Err(DatasetError::MagicNumber { expected, found }) => {
                assert_eq!(expected, IMAGE_MAGIC);
                assert_eq!(found, LABEL_MAGIC);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_wrong_image_size() {
        let bytes = image_file(1, 32, 32, &[0; 32 * 32]);
        assert!(matches!(
            read_images(Cursor::new(bytes), None),
            Err(DatasetError::ImageSize { rows: 32, cols: 32 })
        ));
    }

    #[test]
    fn test_truncated_file() {
        let bytes = image_file(2, 28, 28, &pixels(1));
        assert!(matches!(
            read_images(Cursor::new(bytes), None),
            Err(DatasetError::Io(_))
        ));
    }

    #[test]
    fn test_huge_header_count_is_an_error() {
        let bytes = image_file(u32::MAX, 28, 28, &pixels(1));
        assert!(matches!(
            read_images(Cursor::new(bytes), None),
            Err(DatasetError::Io(_))
        ));

        let mut bytes = label_file(&[1, 2, 3]);
        bytes[4..8].copy_from_slice(&u32::MAX.to_be_bytes());
        assert!(matches!(
            read_labels(Cursor::new(bytes), None),
            Err(DatasetError::Io(_))
        ));
    }

    #[test]
    fn test_read_labels() {
        let labels = read_labels(Cursor::new(label_file(&[7, 2, 1, 0])), None).unwrap();
        assert_eq!(labels, vec![7, 2, 1, 0]);
        let labels = read_labels(Cursor::new(label_file(&[7, 2, 1, 0])), Some(2)).unwrap();
        assert_eq!(labels, vec![7, 2]);
        assert!(matches!(
            read_labels(Cursor::new(label_file(&[3, 10])), None),
            Err(DatasetError::Label(10))
        ));
    }

    #[test]
    fn test_dataset_from_paths() {
        let dir = tempdir().unwrap();
        let image_path = dir.path().join("images-idx3-ubyte");
        let label_path = dir.path().join("labels-idx1-ubyte");
        File::create(&image_path)
            .unwrap()
            .write_all(&image_file(3, 28, 28, &pixels(3)))
            .unwrap();
        File::create(&label_path)
            .unwrap()
            .write_all(&label_file(&[5, 0, 4]))
            .unwrap();

        let dataset = Dataset::from_paths(&image_path, &label_path, None).unwrap();
        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.labels, vec![5, 0, 4]);

        let limited = Dataset::from_paths(&image_path, &label_path, Some(2)).unwrap();
        assert_eq!(limited.len(), 2);

        dir.close().unwrap();
    }

    #[test]
    fn test_dataset_count_mismatch() {
        let dir = tempdir().unwrap();
        let image_path = dir.path().join("images");
        let label_path = dir.path().join("labels");
        File::create(&image_path)
            .unwrap()
            .write_all(&image_file(2, 28, 28, &pixels(2)))
            .unwrap();
        File::create(&label_path)
            .unwrap()
            .write_all(&label_file(&[5]))
            .unwrap();

        assert!(matches!(
            Dataset::from_paths(&image_path, &label_path, None),
            Err(DatasetError::CountMismatch {
                images: 2,
                labels: 1
            })
        ));

        dir.close().unwrap();
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let result = Dataset::from_paths(dir.path().join("nope"), dir.path().join("nope"), None);
        assert!(matches!(result, Err(DatasetError::Io(_))));
    }
}
