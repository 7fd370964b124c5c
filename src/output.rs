//! Quantization results: the palette and the per-pixel index buffer.

use palette::Srgba;

/// The per-pixel index buffer produced by quantization.
///
/// Palettes of at most 256 entries index with bytes; larger palettes use
/// 16-bit values holding reduced-precision color codes instead of palette
/// positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Indices {
    /// One byte per pixel, indexing into the palette.
    Narrow(Vec<u8>),
    /// Two bytes per pixel, holding reduced-precision color codes.
    Wide(Vec<u16>),
}

impl Indices {
    /// The number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Indices::Narrow(v) => v.len(),
            Indices::Wide(v) => v.len(),
        }
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The entry at `i` widened to `u32`.
    #[must_use]
    pub fn get(&self, i: usize) -> u32 {
        match self {
            Indices::Narrow(v) => u32::from(v[i]),
            Indices::Wide(v) => u32::from(v[i]),
        }
    }
}

/// What a quantization run produces: the palette and the remapped image.
///
/// The palette holds at most the requested number of colors and shrinks
/// when the input has less diversity than requested. When the input
/// contained a fully transparent pixel, entry 0 holds its color.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantizeOutput {
    /// Colors chosen to represent the image, at most the requested count.
    pub palette: Vec<Srgba<u8>>,
    /// One palette assignment per source pixel, in row-major order.
    pub indices: Indices,
}
