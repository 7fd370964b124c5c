use palette::Srgba;
use palettize::{cut_bits, Error, ImagePipeline, Indices, QuantizeMethod, QuantizeOutput};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoroshiro128PlusPlus;

fn opaque(r: u8, g: u8, b: u8) -> Srgba<u8> {
    Srgba::new(r, g, b, 255)
}

fn l1(x: Srgba<u8>, y: Srgba<u8>) -> u32 {
    u32::from(x.alpha.abs_diff(y.alpha))
        + u32::from(x.red.abs_diff(y.red))
        + u32::from(x.green.abs_diff(y.green))
        + u32::from(x.blue.abs_diff(y.blue))
}

fn quantize(
    pixels: &[Srgba<u8>],
    width: u32,
    height: u32,
    k: u32,
    method: QuantizeMethod,
) -> QuantizeOutput {
    ImagePipeline::new(pixels, width, height)
        .unwrap()
        .palette_size(k)
        .quantize_method(method)
        .seed(0)
        .quantized()
        .unwrap()
}

#[test]
fn solid_color_image_collapses_to_one_entry() {
    let pixels = vec![Srgba::new(0x80, 0x80, 0x80, 0xFF); 16];
    let output = quantize(&pixels, 4, 4, 8, QuantizeMethod::div());

    assert_eq!(output.palette, vec![Srgba::new(0x80, 0x80, 0x80, 0xFF)]);
    assert_eq!(output.indices, Indices::Narrow(vec![0; 16]));
}

#[test]
fn two_color_checker_splits_cleanly() {
    let black = opaque(0, 0, 0);
    let white = opaque(255, 255, 255);
    let pixels = [black, white, white, black];
    let output = quantize(&pixels, 2, 2, 2, QuantizeMethod::div());

    assert_eq!(output.palette.len(), 2);
    assert!(output.palette.contains(&black));
    assert!(output.palette.contains(&white));

    // Pixels of the same color share an index; different colors differ.
    assert_eq!(output.indices.get(0), output.indices.get(3));
    assert_eq!(output.indices.get(1), output.indices.get(2));
    assert_ne!(output.indices.get(0), output.indices.get(1));
}

#[test]
fn transparency_is_preserved_in_slot_zero() {
    for method in [QuantizeMethod::div(), QuantizeMethod::neu()] {
        let pixels = [
            Srgba::new(0, 0, 0, 0),
            opaque(200, 30, 30),
            opaque(30, 200, 30),
            opaque(30, 30, 200),
        ];
        let output = quantize(&pixels, 2, 2, 4, method);

        assert_eq!(output.palette[0], Srgba::new(0, 0, 0, 0));
        assert_eq!(output.indices.get(0), 0);
    }
}

#[test]
fn mapped_pixels_are_brute_force_nearest() {
    let mut rng = Xoroshiro128PlusPlus::seed_from_u64(0);
    let pixels: Vec<Srgba<u8>> = (0..1024)
        .map(|_| opaque(rng.gen::<u8>(), rng.gen::<u8>(), rng.gen::<u8>()))
        .collect();
    let output = quantize(&pixels, 32, 32, 16, QuantizeMethod::div());

    for (i, &c) in pixels.iter().enumerate() {
        let chosen = output.palette[output.indices.get(i) as usize];
        let best = output.palette.iter().map(|&p| l1(c, p)).min().unwrap();
        assert_eq!(
            l1(c, chosen),
            best,
            "pixel {i} was not mapped to its nearest palette entry"
        );
    }
}

#[test]
fn som_runs_are_reproducible() {
    let mut rng = Xoroshiro128PlusPlus::seed_from_u64(0);
    let pixels: Vec<Srgba<u8>> = (0..4096)
        .map(|_| opaque(rng.gen::<u8>(), rng.gen::<u8>(), rng.gen::<u8>()))
        .collect();

    let a = quantize(&pixels, 64, 64, 64, QuantizeMethod::neu());
    let b = quantize(&pixels, 64, 64, 64, QuantizeMethod::neu());
    assert_eq!(a.palette, b.palette);
    assert_eq!(a.indices, b.indices);
}

#[test]
fn bit_precision_cut_keeps_shifted_channels() {
    let mut pixels = [Srgba::new(0xAB, 0xCD, 0xEF, 0xFF)];
    cut_bits(&mut pixels, 8, 5, 5, 5);
    assert_eq!(pixels[0], Srgba::new(0xAB >> 3, 0xCD >> 3, 0xEF >> 3, 0xFF));

    // Quantizing at 5 bits of precision snaps every channel onto the
    // (c >> 3) << 3 grid.
    let pixels = vec![Srgba::new(0xAB, 0xCD, 0xEF, 0xFF); 16];
    let output = ImagePipeline::new(&pixels, 4, 4)
        .unwrap()
        .palette_size(8)
        .quantize_method(QuantizeMethod::Div(
            palettize::div::DivOptions::new().num_bits(5),
        ))
        .quantized()
        .unwrap();
    assert_eq!(
        output.palette,
        vec![Srgba::new(
            (0xAB >> 3) << 3,
            (0xCD >> 3) << 3,
            (0xEF >> 3) << 3,
            (0xFF >> 3) << 3,
        )]
    );
}

#[test]
fn empty_input_is_an_invalid_argument() {
    let pixels: [Srgba<u8>; 0] = [];
    let result = ImagePipeline::new(&pixels, 0, 0).unwrap().quantized();
    assert!(matches!(result, Err(Error::InvalidArgument(_))));
}

#[test]
fn oversized_palettes_switch_to_wide_output() {
    let mut rng = Xoroshiro128PlusPlus::seed_from_u64(0);
    let pixels: Vec<Srgba<u8>> = (0..4096)
        .map(|_| opaque(rng.gen::<u8>(), rng.gen::<u8>(), rng.gen::<u8>()))
        .collect();

    let narrow = quantize(&pixels, 64, 64, 256, QuantizeMethod::div());
    assert!(matches!(narrow.indices, Indices::Narrow(_)));

    let wide = quantize(&pixels, 64, 64, 512, QuantizeMethod::div());
    assert!(matches!(wide.indices, Indices::Wide(_)));

    // The SOM engine clamps instead.
    let clamped = quantize(&pixels, 64, 64, 512, QuantizeMethod::neu());
    assert!(clamped.palette.len() <= 256);
    assert!(matches!(clamped.indices, Indices::Narrow(_)));
}

#[test]
fn palette_never_exceeds_requested_size() {
    let mut rng = Xoroshiro128PlusPlus::seed_from_u64(0);
    let pixels: Vec<Srgba<u8>> = (0..256)
        .map(|_| opaque(rng.gen::<u8>(), rng.gen::<u8>(), rng.gen::<u8>()))
        .collect();

    for k in [3u32, 5, 17, 100, 256] {
        for method in [QuantizeMethod::div(), QuantizeMethod::neu()] {
            let output = quantize(&pixels, 16, 16, k, method);
            assert!(output.palette.len() <= k as usize);
            for i in 0..output.indices.len() {
                assert!((output.indices.get(i) as usize) < output.palette.len());
            }
        }
    }
}
