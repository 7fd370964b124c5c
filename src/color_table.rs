//! Deduplication of source pixels into a unique-color table with frequency
//! weights, plus the bit-precision cutter used to coarsen colors first.

use crate::{
    pixel::{self, Transparency},
    Error,
};
use palette::Srgba;

/// Number of bucket chains in the deduplication hash table.
pub(crate) const COLOR_HASH_SIZE: u32 = 20023;

/// A chain entry. Chains are stored in an arena and linked by index,
/// so no entry outlives the table build.
struct Bucket {
    color: Srgba<u8>,
    count: u32,
    next: Option<u32>,
}

/// Unique colors of an image alongside their sampling weights.
///
/// Weights sum to 1 over the sampled pixel population.
#[derive(Debug, Clone)]
pub struct ColorTable {
    /// The unique colors, each appearing exactly once.
    pub colors: Vec<Srgba<u8>>,
    /// Frequency of each color divided by the number of sampled pixels.
    pub weights: Vec<f64>,
}

impl ColorTable {
    /// The number of unique colors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}

/// Deduplicates `pixels`, optionally subsampling rows and columns on a
/// `dec_factor` stride.
///
/// `pixels` is addressed as a `num_rows` by `num_cols` row-major grid.
/// Colors are keyed by their reduced-precision fold (which keeps alpha bits
/// exactly when `transparency` says the image carries them) and compared
/// byte-exact within a chain. The output order is the hash-bucket order of
/// the table, with each chain yielding its most recently inserted color
/// first; no further ordering is guaranteed.
///
/// # Errors
/// Returns [`Error::InvalidArgument`] when `dec_factor` is zero.
pub fn color_table(
    pixels: &[Srgba<u8>],
    num_rows: u32,
    num_cols: u32,
    dec_factor: u32,
    transparency: &Transparency,
) -> Result<ColorTable, Error> {
    if dec_factor < 1 {
        return Err(Error::InvalidArgument("decimation factor must be positive"));
    }

    let mut heads: Vec<Option<u32>> = vec![None; COLOR_HASH_SIZE as usize];
    let mut arena: Vec<Bucket> = Vec::new();

    for ir in (0..num_rows).step_by(dec_factor as usize) {
        for ic in (0..num_cols).step_by(dec_factor as usize) {
            let c = pixels[(ic + ir * num_cols) as usize];
            let hash = (transparency.key(c) % COLOR_HASH_SIZE) as usize;

            let mut found = None;
            let mut link = heads[hash];
            while let Some(at) = link {
                let bucket = &arena[at as usize];
                if bucket.color == c {
                    found = Some(at);
                    break;
                }
                link = bucket.next;
            }

            match found {
                Some(at) => arena[at as usize].count += 1,
                None => {
                    #[allow(clippy::cast_possible_truncation)]
                    let at = arena.len() as u32;
                    arena.push(Bucket { color: c, count: 1, next: heads[hash] });
                    heads[hash] = Some(at);
                }
            }
        }
    }

    // Normalization factor to turn color frequencies into color probabilities.
    let norm_factor = 1.0
        / (f64::from(num_rows.div_ceil(dec_factor)) * f64::from(num_cols.div_ceil(dec_factor)));

    let mut colors = Vec::with_capacity(arena.len());
    let mut weights = Vec::with_capacity(arena.len());
    for head in &heads {
        let mut link = *head;
        while let Some(at) = link {
            let bucket = &arena[at as usize];
            colors.push(bucket.color);
            weights.push(norm_factor * f64::from(bucket.count));
            link = bucket.next;
        }
    }

    Ok(ColorTable { colors, weights })
}

/// Reduces the precision of each channel by right-shifting away its low
/// bits, keeping `num_bits_*` significant bits per channel.
///
/// Each bit count must lie in `[1, 8]`; otherwise the call leaves the
/// pixels untouched. Operates in place.
pub fn cut_bits(
    pixels: &mut [Srgba<u8>],
    num_bits_alpha: u8,
    num_bits_red: u8,
    num_bits_green: u8,
    num_bits_blue: u8,
) {
    let valid = |bits: u8| (1..=8).contains(&bits);
    if !valid(num_bits_alpha) || !valid(num_bits_red) || !valid(num_bits_green) || !valid(num_bits_blue)
    {
        return;
    }

    let shift_alpha = 8 - num_bits_alpha;
    let shift_red = 8 - num_bits_red;
    let shift_green = 8 - num_bits_green;
    let shift_blue = 8 - num_bits_blue;

    for c in pixels {
        c.alpha >>= shift_alpha;
        c.red >>= shift_red;
        c.green >>= shift_green;
        c.blue >>= shift_blue;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn opaque(r: u8, g: u8, b: u8) -> Srgba<u8> {
        Srgba::new(r, g, b, 255)
    }

    fn no_transparency() -> Transparency {
        Transparency::scan(&[opaque(0, 0, 0)])
    }

    #[test]
    fn rejects_zero_decimation() {
        let pixels = [opaque(1, 2, 3)];
        let result = color_table(&pixels, 1, 1, 0, &no_transparency());
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn weights_sum_to_one_and_colors_are_unique() {
        let pixels = [
            opaque(10, 20, 30),
            opaque(10, 20, 30),
            opaque(40, 50, 60),
            opaque(10, 20, 30),
            opaque(40, 50, 60),
            opaque(70, 80, 90),
        ];
        let table = color_table(&pixels, 1, 6, 1, &no_transparency()).unwrap();

        assert_eq!(table.len(), 3);
        let total: f64 = table.weights.iter().sum();
        assert!((total - 1.0).abs() < 1e-12);

        let mut seen = table.colors.clone();
        seen.sort_by_key(|&c| pixel::pack(c));
        seen.dedup();
        assert_eq!(seen.len(), 3);

        for (c, w) in table.colors.iter().zip(&table.weights) {
            let count = pixels.iter().filter(|&&p| p == *c).count();
            assert!((w - count as f64 / 6.0).abs() < 1e-12);
        }
    }

    #[test]
    fn decimation_samples_on_the_stride() {
        // 2 x 4 grid sampled with stride 2 visits rows {0} and columns {0, 2}.
        let pixels = [
            opaque(1, 0, 0),
            opaque(2, 0, 0),
            opaque(3, 0, 0),
            opaque(4, 0, 0),
            opaque(5, 0, 0),
            opaque(6, 0, 0),
            opaque(7, 0, 0),
            opaque(8, 0, 0),
        ];
        let table = color_table(&pixels, 2, 4, 2, &no_transparency()).unwrap();

        let mut sampled: Vec<u8> = table.colors.iter().map(|c| c.red).collect();
        sampled.sort_unstable();
        assert_eq!(sampled, vec![1, 3]);
        assert!(table.weights.iter().all(|&w| (w - 0.5).abs() < 1e-12));
    }

    #[test]
    fn cut_bits_full_precision_is_identity() {
        let mut pixels = [Srgba::new(0xAB, 0xCD, 0xEF, 0x12)];
        let expected = pixels;
        cut_bits(&mut pixels, 8, 8, 8, 8);
        assert_eq!(pixels, expected);
    }

    #[test]
    fn cut_bits_shifts_each_channel() {
        let mut pixels = [Srgba::new(0xAB, 0xCD, 0xEF, 0xFF)];
        cut_bits(&mut pixels, 5, 5, 5, 5);
        assert_eq!(pixels, [Srgba::new(0xAB >> 3, 0xCD >> 3, 0xEF >> 3, 0xFF >> 3)]);
    }

    #[test]
    fn cut_bits_out_of_range_is_a_no_op() {
        let mut pixels = [Srgba::new(0xAB, 0xCD, 0xEF, 0xFF)];
        let expected = pixels;
        cut_bits(&mut pixels, 0, 5, 5, 5);
        assert_eq!(pixels, expected);
        cut_bits(&mut pixels, 5, 9, 5, 5);
        assert_eq!(pixels, expected);
    }
}
