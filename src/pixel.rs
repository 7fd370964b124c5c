//! Pixel-level helpers shared by both quantization engines.

use palette::Srgba;

/// Packs a color into a 32-bit ARGB value with alpha in the high byte.
///
/// Packed values are used as hash and memoization keys; equality of packed
/// values is equivalent to byte-exact color equality.
#[inline]
pub(crate) fn pack(c: Srgba<u8>) -> u32 {
    u32::from(c.alpha) << 24 | u32::from(c.red) << 16 | u32::from(c.green) << 8 | u32::from(c.blue)
}

/// Reduced-precision key for a color, used to bucket colors in the
/// deduplication table and to emit wide pixel codes.
///
/// The fold keeps alpha bits only when the image actually carries them:
/// ARGB4444 when semi-transparency is present, ARGB1555 when only a fully
/// transparent pixel exists, RGB565 otherwise.
#[inline]
pub(crate) fn argb_index(c: Srgba<u8>, has_semi_transparency: bool, has_transparency: bool) -> u32 {
    let (a, r, g, b) = (
        u32::from(c.alpha),
        u32::from(c.red),
        u32::from(c.green),
        u32::from(c.blue),
    );
    if has_semi_transparency {
        (a & 0xF0) << 8 | (r & 0xF0) << 4 | (g & 0xF0) | (b >> 4)
    } else if has_transparency {
        (a & 0x80) << 8 | (r & 0xF8) << 7 | (g & 0xF8) << 2 | (b >> 3)
    } else {
        (r & 0xF8) << 8 | (g & 0xFC) << 3 | (b >> 3)
    }
}

/// Sum of absolute component differences, alpha included.
#[inline]
pub(crate) fn l1_distance(x: Srgba<u8>, y: Srgba<u8>) -> u32 {
    u32::from(x.alpha.abs_diff(y.alpha))
        + u32::from(x.red.abs_diff(y.red))
        + u32::from(x.green.abs_diff(y.green))
        + u32::from(x.blue.abs_diff(y.blue))
}

/// Color components as reals in axis order alpha, red, green, blue.
///
/// The divisive clusterer relies on this order when breaking ties between
/// equal-variance cutting axes.
#[inline]
pub(crate) fn components(c: Srgba<u8>) -> [f64; 4] {
    [
        f64::from(c.alpha),
        f64::from(c.red),
        f64::from(c.green),
        f64::from(c.blue),
    ]
}

/// Transparency facts gathered from the source pixels.
///
/// One value is built per quantization call and threaded through the engine,
/// so repeated calls never observe each other's state.
#[derive(Debug, Clone, Copy)]
pub struct Transparency {
    /// Whether any pixel has an alpha below 255.
    pub has_semi_transparency: bool,
    /// Position of the first fully transparent pixel, if any.
    pub transparent_index: Option<u32>,
    /// The color of that pixel.
    pub transparent_color: Srgba<u8>,
}

impl Transparency {
    /// Scans the pixels once, recording semi-transparency and the first
    /// fully transparent pixel.
    #[must_use]
    pub fn scan(pixels: &[Srgba<u8>]) -> Self {
        let mut state = Self {
            has_semi_transparency: false,
            transparent_index: None,
            transparent_color: Srgba::new(0, 0, 0, 0),
        };

        #[allow(clippy::cast_possible_truncation)]
        for (i, &c) in pixels.iter().enumerate() {
            if c.alpha < u8::MAX {
                state.has_semi_transparency = true;
                if c.alpha == 0 && state.transparent_index.is_none() {
                    state.transparent_index = Some(i as u32);
                    state.transparent_color = c;
                }
            }
        }

        state
    }

    /// Key for `c` under the alpha fold implied by this state.
    #[inline]
    pub(crate) fn key(&self, c: Srgba<u8>) -> u32 {
        argb_index(c, self.has_semi_transparency, self.transparent_index.is_some())
    }
}
