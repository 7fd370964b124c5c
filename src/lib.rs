#![deny(unsafe_code)]
#![warn(missing_docs, clippy::pedantic, clippy::unwrap_used, clippy::expect_used)]
#![allow(clippy::many_single_char_names, clippy::module_name_repetitions)]

//! Color quantization with two engines: a divisive variance-split
//! clusterer ([`div`]) and a Kohonen self-organizing map ([`neu`]), both
//! operating directly on 8-bit ARGB pixels.
//!
//! Images are handled as plain `&[Srgba<u8>]` buffers in row-major order.
//! Pixel positions are tracked as `u32`, so buffers beyond `u32::MAX`
//! pixels are rejected up front rather than silently misaddressed.

mod color_table;
mod error;
mod output;
mod pipeline;
mod pixel;

pub mod div;
pub mod neu;

pub use color_table::{color_table, cut_bits, ColorTable};
pub use error::Error;
pub use output::{Indices, QuantizeOutput};
pub use pipeline::*;
pub use pixel::Transparency;

/// Largest palette a quantization call will produce.
///
/// Palettes above 256 colors are only reachable through the divisive
/// engine; their pixel output holds reduced-precision color codes rather
/// than palette positions.
pub const MAX_COLORS: u32 = 1 << 16;

#[cfg(test)]
pub(crate) mod tests {
    use palette::Srgba;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoroshiro128PlusPlus;

    /// 1024 seeded random opaque colors.
    pub fn random_opaque_pixels() -> Vec<Srgba<u8>> {
        let mut rng = Xoroshiro128PlusPlus::seed_from_u64(0);
        (0..1024)
            .map(|_| Srgba::new(rng.gen::<u8>(), rng.gen::<u8>(), rng.gen::<u8>(), 255))
            .collect()
    }
}
