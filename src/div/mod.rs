//! Divisive variance-split color quantization.
//!
//! The engine deduplicates the input into a weighted unique-color stream
//! (unless told the pixels are already unique), recursively splits the
//! heaviest cluster until the requested palette size is reached, and remaps
//! pixels through a sum-sorted nearest-color search.

mod cluster;
mod mps;

use cluster::cluster_colors;
pub(crate) use mps::SumSortedPalette;

use crate::{
    color_table::{color_table, cut_bits},
    pixel::{argb_index, Transparency},
    Error, Indices, QuantizeOutput,
};
use palette::Srgba;

/// Options for the divisive engine.
///
/// The defaults match the reference pipeline: full 8-bit precision, no
/// subsampling, ten local k-means refinement passes per split.
#[derive(Debug, Clone)]
pub struct DivOptions {
    /// Bits of precision kept per channel before clustering, in `[1, 8]`.
    /// Lower values coarsen the input which shrinks the unique-color stream.
    pub(crate) num_bits: u8,
    /// Row/column stride for subsampling during deduplication.
    pub(crate) dec_factor: u32,
    /// Local k-means iterations per split; zero disables refinement.
    pub(crate) max_iters: u32,
    /// Skip deduplication entirely and weigh every pixel uniformly.
    ///
    /// Only worthwhile when the caller knows the pixels are already unique;
    /// takes effect at full precision without subsampling.
    pub(crate) assume_unique: bool,
}

impl DivOptions {
    /// Creates options with the reference defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            num_bits: 8,
            dec_factor: 1,
            max_iters: 10,
            assume_unique: false,
        }
    }

    /// Sets the per-channel precision in bits.
    #[must_use]
    pub fn num_bits(mut self, num_bits: u8) -> Self {
        self.num_bits = num_bits;
        self
    }

    /// Sets the deduplication subsampling stride.
    #[must_use]
    pub fn dec_factor(mut self, dec_factor: u32) -> Self {
        self.dec_factor = dec_factor;
        self
    }

    /// Sets the number of local k-means refinement passes per split.
    #[must_use]
    pub fn max_iters(mut self, max_iters: u32) -> Self {
        self.max_iters = max_iters;
        self
    }

    /// Declares the input free of duplicate pixels.
    #[must_use]
    pub fn assume_unique(mut self, assume_unique: bool) -> Self {
        self.assume_unique = assume_unique;
        self
    }
}

impl Default for DivOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Computes a palette of at most `k` colors for `pixels`.
///
/// # Errors
/// Returns [`Error::InvalidArgument`] for empty or oversized input,
/// `k == 0`, a zero `dec_factor`, or a `num_bits` outside `[1, 8]`, and
/// [`Error::InternalError`] if the clusterer loses track of a cluster.
pub fn palette(
    pixels: &[Srgba<u8>],
    k: u32,
    options: &DivOptions,
    transparency: &Transparency,
) -> Result<Vec<Srgba<u8>>, Error> {
    if pixels.is_empty() {
        return Err(Error::InvalidArgument("no pixels to quantize"));
    }
    if k == 0 {
        return Err(Error::InvalidArgument("palette size must be positive"));
    }

    // The dedup table addresses pixels with 32-bit positions.
    let num_cols = u32::try_from(pixels.len())
        .map_err(|_| Error::InvalidArgument("image has more pixels than supported"))?;
    let uniform_weight = 1.0 / f64::from(num_cols);

    let cluster = |data: &[Srgba<u8>], weights: Option<&[f64]>, data_weight: f64| {
        if k <= 256 {
            cluster_colors::<u8>(data, weights, data_weight, options.num_bits, options.max_iters, k)
        } else {
            cluster_colors::<u32>(data, weights, data_weight, options.num_bits, options.max_iters, k)
        }
    };

    if options.assume_unique && options.num_bits == 8 && options.dec_factor == 1 {
        // No duplicate pixels and no decimation or bit cutting.
        cluster(pixels, None, uniform_weight)
    } else if options.num_bits == 8 {
        // Full precision, but duplicates expected: deduplicate now.
        let table = color_table(pixels, 1, num_cols, options.dec_factor, transparency)?;
        cluster(&table.colors, Some(&table.weights), 0.0)
    } else {
        // Cut precision first so deduplication collapses far more pixels.
        let mut cut = pixels.to_vec();
        cut_bits(&mut cut, options.num_bits, options.num_bits, options.num_bits, options.num_bits);
        let table = color_table(&cut, 1, num_cols, options.dec_factor, transparency)?;
        cluster(&table.colors, Some(&table.weights), 0.0)
    }
}

/// Remaps every pixel to its nearest palette entry.
///
/// Palettes of up to 256 entries yield byte indices into the palette;
/// larger palettes yield 16-bit reduced-precision color codes (with the
/// semi-transparency fold disabled, as wide output formats carry at most
/// one alpha bit).
pub(crate) fn map_pixels(
    pixels: &[Srgba<u8>],
    palette: &[Srgba<u8>],
    transparency: &Transparency,
) -> Indices {
    let search = SumSortedPalette::new(palette);

    if palette.len() > 256 {
        let has_transparency = transparency.transparent_index.is_some();
        Indices::Wide(
            pixels
                .iter()
                .map(|&c| {
                    let entry = palette[search.nearest(c) as usize];
                    #[allow(clippy::cast_possible_truncation)]
                    {
                        argb_index(entry, false, has_transparency) as u16
                    }
                })
                .collect(),
        )
    } else {
        #[allow(clippy::cast_possible_truncation)]
        Indices::Narrow(pixels.iter().map(|&c| search.nearest(c) as u8).collect())
    }
}

/// Computes a palette and remaps the image onto it in one call.
///
/// # Errors
/// See [`palette`].
pub fn indexed_palette(
    pixels: &[Srgba<u8>],
    k: u32,
    options: &DivOptions,
    transparency: &Transparency,
) -> Result<QuantizeOutput, Error> {
    let palette = palette(pixels, k, options, transparency)?;
    let indices = map_pixels(pixels, &palette, transparency);
    Ok(QuantizeOutput { palette, indices })
}
