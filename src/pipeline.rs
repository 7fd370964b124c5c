//! Contains the [`ImagePipeline`] builder struct for the high level API.

use crate::{
    div::{self, DivOptions, SumSortedPalette},
    neu::{self, NeuOptions},
    pixel::Transparency,
    Error, Indices, QuantizeOutput, MAX_COLORS,
};
use palette::Srgba;

/// The color quantization method (engine) to use.
#[derive(Debug, Clone)]
pub enum QuantizeMethod {
    /// Divisive variance-split clustering.
    Div(DivOptions),
    /// Kohonen self-organizing map.
    Neu(NeuOptions),
}

impl QuantizeMethod {
    /// The divisive engine with its default options.
    #[must_use]
    pub fn div() -> Self {
        Self::Div(DivOptions::new())
    }

    /// The self-organizing-map engine with its default options.
    #[must_use]
    pub fn neu() -> Self {
        Self::Neu(NeuOptions::new())
    }
}

/// A caller-supplied dithering routine.
///
/// The pipeline hands over the source pixels, the palette, and a
/// nearest-color function; the routine returns one entry per pixel in the
/// same width the plain mapping would use (palette positions, or
/// reduced-precision codes for palettes above 256 entries).
pub trait Ditherer {
    /// Produces the dithered index buffer.
    fn dither(
        &self,
        pixels: &[Srgba<u8>],
        width: u32,
        height: u32,
        palette: &[Srgba<u8>],
        nearest: &mut dyn FnMut(Srgba<u8>) -> u16,
    ) -> Vec<u16>;
}

/// A builder struct to quantize an image down to a limited palette.
///
/// # Examples
/// ```
/// # use palettize::{ImagePipeline, QuantizeMethod};
/// # fn main() -> Result<(), palettize::Error> {
/// let argb = vec![palette::Srgba::new(0u8, 0, 0, 255); 12];
/// let output = ImagePipeline::new(&argb, 4, 3)?
///     .palette_size(16)
///     .quantize_method(QuantizeMethod::neu())
///     .quantized()?;
/// # Ok(())
/// # }
/// ```
#[must_use]
#[derive(Clone)]
pub struct ImagePipeline<'a> {
    /// The input image as a row-major pixel buffer.
    pixels: &'a [Srgba<u8>],
    /// The image width.
    width: u32,
    /// The image height.
    height: u32,
    /// The (maximum) number of colors to put in the palette.
    k: u32,
    /// The color quantization method to use.
    method: QuantizeMethod,
    /// Whether to delegate remapping to the ditherer.
    dither: bool,
    /// The caller-supplied dither routine, if any.
    ditherer: Option<&'a dyn Ditherer>,
    /// Seed for the engine PRNG.
    seed: u64,
}

impl<'a> ImagePipeline<'a> {
    /// Creates a new [`ImagePipeline`] with default options.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] when `width * height` does not
    /// match the pixel count, or when the buffer has more than `u32::MAX`
    /// pixels (positions are tracked as `u32`).
    pub fn new(pixels: &'a [Srgba<u8>], width: u32, height: u32) -> Result<Self, Error> {
        let num_pixels = u32::try_from(pixels.len())
            .map_err(|_| Error::InvalidArgument("image has more pixels than supported"))?;
        if u64::from(num_pixels) != u64::from(width) * u64::from(height) {
            return Err(Error::InvalidArgument("pixel count does not match dimensions"));
        }
        Ok(Self {
            pixels,
            width,
            height,
            k: 256,
            method: QuantizeMethod::div(),
            dither: false,
            ditherer: None,
            seed: 0,
        })
    }

    /// Sets the (maximum) number of colors to have in the palette, clamped
    /// to [`MAX_COLORS`].
    ///
    /// The default palette size is 256.
    pub fn palette_size(&mut self, k: u32) -> &mut Self {
        self.k = k.min(MAX_COLORS);
        self
    }

    /// Selects the quantization engine; the divisive engine is the
    /// default.
    pub fn quantize_method(&mut self, method: QuantizeMethod) -> &mut Self {
        self.method = method;
        self
    }

    /// Delegates remapping to `ditherer`.
    ///
    /// The self-organizing-map engine also lowers its sampling rate, as the
    /// dithering hides the coarser palette.
    pub fn ditherer(&mut self, ditherer: &'a dyn Ditherer) -> &mut Self {
        self.dither = true;
        self.ditherer = Some(ditherer);
        self
    }

    /// Sets the seed used by the engine PRNG.
    ///
    /// Identical inputs, options, and seeds produce identical outputs.
    pub fn seed(&mut self, seed: u64) -> &mut Self {
        self.seed = seed;
        self
    }

    /// Runs the pipeline, producing the palette and index buffer.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] for empty input or a zero palette
    /// size, and [`Error::InternalError`] when the divisive clusterer loses
    /// track of a cluster.
    pub fn quantized(&self) -> Result<QuantizeOutput, Error> {
        if self.pixels.is_empty() {
            return Err(Error::InvalidArgument("no pixels to quantize"));
        }
        if self.k == 0 {
            return Err(Error::InvalidArgument("palette size must be positive"));
        }

        let transparency = Transparency::scan(self.pixels);
        match &self.method {
            QuantizeMethod::Div(options) => self.quantize_div(options, &transparency),
            QuantizeMethod::Neu(options) => self.quantize_neu(options, &transparency),
        }
    }

    fn quantize_div(
        &self,
        options: &DivOptions,
        transparency: &Transparency,
    ) -> Result<QuantizeOutput, Error> {
        let pixels = self.pixels;

        if self.k > 2 {
            let palette = div::palette(pixels, self.k, options, transparency)?;

            if palette.len() > 256 {
                // Wide output carries reduced-precision codes instead of
                // palette positions; the semi-transparency fold is turned
                // off as the codes keep at most one alpha bit.
                let wide = Transparency { has_semi_transparency: false, ..*transparency };
                let indices = match self.ditherer {
                    Some(ditherer) if self.dither => {
                        let search = SumSortedPalette::new(&palette);
                        let mut nearest = |c: Srgba<u8>| {
                            let entry = palette[search.nearest(c) as usize];
                            #[allow(clippy::cast_possible_truncation)]
                            {
                                wide.key(entry) as u16
                            }
                        };
                        Indices::Wide(ditherer.dither(
                            pixels,
                            self.width,
                            self.height,
                            &palette,
                            &mut nearest,
                        ))
                    }
                    _ => div::map_pixels(pixels, &palette, &wide),
                };
                return Ok(QuantizeOutput { palette, indices });
            }

            let indices = self.narrow_indices(&palette);
            Ok(finish_narrow(palette, indices, transparency))
        } else {
            // Tiny palettes are synthesized directly.
            let palette = if transparency.transparent_index.is_some() {
                vec![transparency.transparent_color, Srgba::new(0, 0, 0, 255)]
            } else {
                vec![Srgba::new(0, 0, 0, 255), Srgba::new(255, 255, 255, 255)]
            };

            let indices = self.narrow_indices(&palette);
            Ok(finish_narrow(palette, indices, transparency))
        }
    }

    fn quantize_neu(
        &self,
        options: &NeuOptions,
        transparency: &Transparency,
    ) -> Result<QuantizeOutput, Error> {
        let pixels = self.pixels;
        let sample_frac = options.effective_sample_frac(self.dither);

        let (mut net, max_colors) =
            neu::train(pixels, self.k, sample_frac, self.seed, transparency)?;
        let palette = net.palette(max_colors);

        let indices: Vec<u16> = match self.ditherer {
            Some(ditherer) if self.dither => {
                let mut nearest = |c: Srgba<u8>| net.search(c, max_colors);
                ditherer.dither(pixels, self.width, self.height, &palette, &mut nearest)
            }
            _ => pixels.iter().map(|&c| net.search(c, max_colors)).collect(),
        };

        Ok(finish_narrow(palette, indices, transparency))
    }

    /// Maps every pixel to a palette position, through the ditherer when
    /// one is installed.
    fn narrow_indices(&self, palette: &[Srgba<u8>]) -> Vec<u16> {
        let pixels = self.pixels;
        let search = SumSortedPalette::new(palette);

        #[allow(clippy::cast_possible_truncation)]
        let mut nearest = |c: Srgba<u8>| search.nearest(c) as u16;
        match self.ditherer {
            Some(ditherer) if self.dither => {
                ditherer.dither(pixels, self.width, self.height, palette, &mut nearest)
            }
            _ => pixels.iter().map(|&c| nearest(c)).collect(),
        }
    }
}

/// Applies the transparent-slot rules and narrows the indices to bytes.
///
/// For palettes above two entries the slot the transparent pixel landed in
/// receives the exact transparent color and is then swapped into position
/// zero. Two-entry palettes already start with the transparent color and
/// only need their entries swapped back if the mapping crossed them.
fn finish_narrow(
    mut palette: Vec<Srgba<u8>>,
    mut indices: Vec<u16>,
    transparency: &Transparency,
) -> QuantizeOutput {
    if let Some(transparent_index) = transparency.transparent_index {
        let slot = indices[transparent_index as usize];
        if palette.len() > 2 {
            palette[usize::from(slot)] = transparency.transparent_color;
            if slot != 0 {
                palette.swap(0, usize::from(slot));
                for i in &mut indices {
                    if *i == slot {
                        *i = 0;
                    } else if *i == 0 {
                        *i = slot;
                    }
                }
            }
        } else if palette[usize::from(slot)] != transparency.transparent_color {
            palette.swap(0, 1);
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    let indices = indices.into_iter().map(|i| i as u8).collect();
    QuantizeOutput { palette, indices: Indices::Narrow(indices) }
}

/// Decodes an image file into the RGBA pixel buffer the pipeline consumes.
///
/// # Errors
/// Returns [`Error::UnsupportedFormat`] when the file cannot be decoded.
#[cfg(feature = "image")]
pub fn load_image(path: &std::path::Path) -> Result<image::RgbaImage, Error> {
    image::open(path)
        .map(image::DynamicImage::into_rgba8)
        .map_err(|_| Error::UnsupportedFormat)
}

#[cfg(feature = "image")]
impl<'a> TryFrom<&'a image::RgbaImage> for ImagePipeline<'a> {
    type Error = Error;

    fn try_from(image: &'a image::RgbaImage) -> Result<Self, Self::Error> {
        use palette::cast::ComponentsAs;

        // The backing container may be longer than the raster it holds.
        let len = (image.width() as usize) * (image.height() as usize) * 4;
        let pixels: &[Srgba<u8>] = image.as_raw()[..len].components_as();
        Self::new(pixels, image.width(), image.height())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn opaque(r: u8, g: u8, b: u8) -> Srgba<u8> {
        Srgba::new(r, g, b, 255)
    }

    fn run(pixels: &[Srgba<u8>], width: u32, height: u32, k: u32, method: QuantizeMethod) -> QuantizeOutput {
        ImagePipeline::new(pixels, width, height)
            .unwrap()
            .palette_size(k)
            .quantize_method(method)
            .quantized()
            .unwrap()
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let pixels = [opaque(0, 0, 0); 5];
        assert!(matches!(
            ImagePipeline::new(&pixels, 2, 2),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn zero_palette_size_is_rejected() {
        let pixels = [opaque(0, 0, 0); 4];
        let result = ImagePipeline::new(&pixels, 2, 2)
            .unwrap()
            .palette_size(0)
            .quantized();
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn two_color_palette_without_transparency_is_black_and_white() {
        let pixels = [
            opaque(0, 0, 0),
            opaque(255, 255, 255),
            opaque(255, 255, 255),
            opaque(0, 0, 0),
        ];
        let output = run(&pixels, 2, 2, 2, QuantizeMethod::div());
        assert_eq!(
            output.palette,
            vec![opaque(0, 0, 0), opaque(255, 255, 255)]
        );
        assert_eq!(output.indices, Indices::Narrow(vec![0, 1, 1, 0]));
    }

    #[test]
    fn two_color_palette_with_transparency_keeps_the_transparent_color_first() {
        let mut pixels = vec![opaque(40, 40, 40); 4];
        pixels[2] = Srgba::new(0, 0, 0, 0);
        let output = run(&pixels, 2, 2, 2, QuantizeMethod::div());
        assert_eq!(output.palette[0], Srgba::new(0, 0, 0, 0));
        assert_eq!(output.palette[1], opaque(0, 0, 0));
        assert_eq!(output.indices.get(2), 0);
    }

    #[test]
    fn transparent_pixel_owns_palette_slot_zero() {
        for method in [QuantizeMethod::div(), QuantizeMethod::neu()] {
            let mut pixels = Vec::new();
            pixels.push(Srgba::new(0, 0, 0, 0));
            pixels.extend([
                opaque(250, 10, 10),
                opaque(10, 250, 10),
                opaque(10, 10, 250),
            ]);
            let output = run(&pixels, 4, 1, 4, method);

            assert_eq!(output.palette[0], Srgba::new(0, 0, 0, 0));
            assert_eq!(output.indices.get(0), 0);
        }
    }

    #[test]
    fn both_engines_handle_an_opaque_image() {
        let pixels: Vec<Srgba<u8>> = (0u32..64)
            .map(|i| opaque((i * 4) as u8, (i * 2) as u8, (255 - i) as u8))
            .collect();
        for method in [QuantizeMethod::div(), QuantizeMethod::neu()] {
            let output = run(&pixels, 8, 8, 16, method);
            assert!(output.palette.len() <= 16);
            assert_eq!(output.indices.len(), 64);
            for i in 0..output.indices.len() {
                assert!((output.indices.get(i) as usize) < output.palette.len().max(1));
            }
        }
    }

    #[test]
    fn ditherer_receives_control_when_installed() {
        struct PassthroughDitherer;
        impl Ditherer for PassthroughDitherer {
            fn dither(
                &self,
                pixels: &[Srgba<u8>],
                _width: u32,
                _height: u32,
                _palette: &[Srgba<u8>],
                nearest: &mut dyn FnMut(Srgba<u8>) -> u16,
            ) -> Vec<u16> {
                pixels.iter().map(|&c| nearest(c)).collect()
            }
        }

        let pixels: Vec<Srgba<u8>> = (0u32..16).map(|i| opaque((i * 16) as u8, 0, 0)).collect();
        let ditherer = PassthroughDitherer;
        let output = ImagePipeline::new(&pixels, 4, 4)
            .unwrap()
            .palette_size(4)
            .ditherer(&ditherer)
            .quantized()
            .unwrap();
        assert_eq!(output.indices.len(), 16);
    }
}
