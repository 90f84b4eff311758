//! Which S2 feature maps each C3 feature map reads from.
//!
//! The coverage is deliberately asymmetric: six maps see three neighbouring S2 maps,
//! six see four neighbouring maps, three see two non-neighbouring pairs and the last one
//! sees all six.

/// Number of feature maps produced by S2 and consumed by C3.
pub const C3_INPUT_MAPS: usize = 6;
/// Number of feature maps produced by C3.
pub const C3_OUTPUT_MAPS: usize = 16;

/// Input map indices for each C3 output map, in the order they are read.
pub const C3_CONNECTIVITY: [&[usize]; C3_OUTPUT_MAPS] = [
    &[0, 1, 2],
    &[1, 2, 3],
    &[2, 3, 4],
    &[3, 4, 5],
    &[4, 5, 0],
    &[5, 0, 1],
    &[0, 1, 2, 3],
    &[1, 2, 3, 4],
    &[2, 3, 4, 5],
    &[3, 4, 5, 0],
    &[4, 5, 0, 1],
    &[5, 0, 1, 2],
    &[0, 1, 3, 4],
    &[1, 2, 4, 5],
    &[2, 3, 5, 0],
    &[0, 1, 2, 3, 4, 5],
];

/// Connection table of a layer where every output map reads every input map.
pub fn full_connectivity(input_maps: usize, output_maps: usize) -> Vec<Vec<usize>> {
    (0..output_maps).map(|_| (0..input_maps).collect()).collect()
}

/// The C3 table as owned rows, the form `ConvolutionLayer` stores.
pub fn c3_connectivity() -> Vec<Vec<usize>> {
    C3_CONNECTIVITY.iter().map(|maps| maps.to_vec()).collect()
}
