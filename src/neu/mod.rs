//! Self-organizing-map color quantization.
//!
//! A 256-neuron Kohonen network is trained over the image and its neurons
//! become the palette. Palettes are capped at 256 entries regardless of the
//! requested size.

mod index;
mod network;

pub(crate) use network::{SomNetwork, NETSIZE};

use crate::{pixel::Transparency, Error, Indices, QuantizeOutput};
use palette::Srgba;

/// Options for the self-organizing-map engine.
#[derive(Debug, Clone, Default)]
pub struct NeuOptions {
    /// Explicit sampling fraction; `None` derives it from the dither flag
    /// (every pixel normally, one in five when dithering).
    pub(crate) sample_frac: Option<u32>,
}

impl NeuOptions {
    /// Creates options with the reference defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Trains on one pixel out of `sample_frac` instead of the default.
    #[must_use]
    pub fn sample_frac(mut self, sample_frac: u32) -> Self {
        self.sample_frac = Some(sample_frac.max(1));
        self
    }

    pub(crate) fn effective_sample_frac(&self, dither: bool) -> u32 {
        self.sample_frac.unwrap_or(if dither { 5 } else { 1 })
    }
}

/// Trains the map and returns the palette of at most `min(k, 256)` colors.
///
/// # Errors
/// Returns [`Error::InvalidArgument`] for empty input or `k == 0`.
pub fn palette(
    pixels: &[Srgba<u8>],
    k: u32,
    sample_frac: u32,
    seed: u64,
    transparency: &Transparency,
) -> Result<Vec<Srgba<u8>>, Error> {
    let (net, max_colors) = train(pixels, k, sample_frac, seed, transparency)?;
    Ok(net.palette(max_colors))
}

/// Trains the map and remaps the image onto the resulting palette.
///
/// # Errors
/// Returns [`Error::InvalidArgument`] for empty input or `k == 0`.
pub fn indexed_palette(
    pixels: &[Srgba<u8>],
    k: u32,
    sample_frac: u32,
    seed: u64,
    transparency: &Transparency,
) -> Result<QuantizeOutput, Error> {
    let (mut net, max_colors) = train(pixels, k, sample_frac, seed, transparency)?;
    let palette = net.palette(max_colors);

    #[allow(clippy::cast_possible_truncation)]
    let indices = pixels
        .iter()
        .map(|&c| net.search(c, max_colors) as u8)
        .collect();

    Ok(QuantizeOutput { palette, indices: Indices::Narrow(indices) })
}

pub(crate) fn train(
    pixels: &[Srgba<u8>],
    k: u32,
    sample_frac: u32,
    seed: u64,
    transparency: &Transparency,
) -> Result<(SomNetwork, usize), Error> {
    if pixels.is_empty() {
        return Err(Error::InvalidArgument("no pixels to quantize"));
    }
    if k == 0 {
        return Err(Error::InvalidArgument("palette size must be positive"));
    }
    let max_colors = (k as usize).min(NETSIZE);

    let mut net = SomNetwork::new(seed, *transparency);
    net.learn(pixels, sample_frac.max(1));
    net.build_index();
    Ok((net, max_colors))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn identical_runs_are_byte_identical() {
        let pixels: Vec<Srgba<u8>> = (0u32..4096)
            .map(|i| Srgba::new((i * 3 % 256) as u8, (i % 256) as u8, (i * 29 % 256) as u8, 255))
            .collect();
        let transparency = Transparency::scan(&pixels);

        let a = indexed_palette(&pixels, 64, 1, 0, &transparency).unwrap();
        let b = indexed_palette(&pixels, 64, 1, 0, &transparency).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn palette_is_capped_at_the_network_size() {
        let pixels: Vec<Srgba<u8>> = (0u32..1024)
            .map(|i| Srgba::new((i % 256) as u8, (i / 4) as u8, 7, 255))
            .collect();
        let transparency = Transparency::scan(&pixels);

        let colors = palette(&pixels, 4096, 1, 0, &transparency).unwrap();
        assert_eq!(colors.len(), NETSIZE);
    }

    #[test]
    fn indices_stay_within_the_palette() {
        let pixels: Vec<Srgba<u8>> = (0u32..2048)
            .map(|i| Srgba::new((i * 5 % 256) as u8, (i * 3 % 256) as u8, (i % 256) as u8, 255))
            .collect();
        let transparency = Transparency::scan(&pixels);

        let output = indexed_palette(&pixels, 32, 1, 0, &transparency).unwrap();
        assert_eq!(output.palette.len(), 32);
        for i in 0..output.indices.len() {
            assert!((output.indices.get(i) as usize) < output.palette.len());
        }
    }

    #[test]
    fn empty_input_is_rejected() {
        let transparency = Transparency::scan(&[]);
        let result = indexed_palette(&[], 16, 1, 0, &transparency);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }
}
