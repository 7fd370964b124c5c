#![deny(unsafe_code)]
#![warn(clippy::use_debug, clippy::dbg_macro, clippy::todo, clippy::unimplemented)]

use std::{path::PathBuf, process::ExitCode, time::Instant};

use clap::Parser;
use image::RgbaImage;
use log::info;
use palettize::{ImagePipeline, Indices, QuantizeMethod, QuantizeOutput};

#[derive(Parser)]
#[command(version, about = "Reduce an image to a limited color palette")]
struct Options {
    /// Input image path.
    input: PathBuf,

    /// Maximum number of colors for the output format to support.
    #[arg(short = 'm', long = "max-colors", default_value_t = 256)]
    max_colors: u32,

    /// Output image file dir. The default is the source image directory.
    #[arg(short = 'o', long = "out-dir")]
    out_dir: Option<PathBuf>,

    /// Seed for engine randomness.
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn main() -> ExitCode {
    env_logger::init();

    let options = match Options::try_parse() {
        Ok(options) => options,
        Err(err) => {
            // Usage problems print help and exit cleanly.
            let _ = err.print();
            return ExitCode::SUCCESS;
        }
    };

    let k = options.max_colors.clamp(2, 65_536);

    let image = match palettize::load_image(&options.input) {
        Ok(image) => image,
        Err(err) => {
            eprintln!("failed to read image {}: {err}", options.input.display());
            return ExitCode::FAILURE;
        }
    };

    let out_dir = options.out_dir.clone().unwrap_or_else(|| {
        options
            .input
            .parent()
            .map_or_else(|| PathBuf::from("."), PathBuf::from)
    });
    let stem = options
        .input
        .file_stem()
        .map_or_else(|| "image".into(), |s| s.to_string_lossy().into_owned());

    for (name, method) in [
        ("DIV", QuantizeMethod::div()),
        ("NEU", QuantizeMethod::neu()),
    ] {
        let mut pipeline = match ImagePipeline::try_from(&image) {
            Ok(pipeline) => pipeline,
            Err(err) => {
                eprintln!("image too large: {err}");
                return ExitCode::FAILURE;
            }
        };
        pipeline.palette_size(k).quantize_method(method).seed(options.seed);

        let start = Instant::now();
        let output = match pipeline.quantized() {
            Ok(output) => output,
            Err(err) => {
                eprintln!("{name} quantization failed: {err}");
                return ExitCode::FAILURE;
            }
        };
        info!(
            "{name} quantized to {} colors in {}ms",
            output.palette.len(),
            start.elapsed().as_millis()
        );

        let target = out_dir.join(format!("{stem}-{name}quant{k}.png"));
        let has_transparency = image.pixels().any(|p| p.0[3] == 0);
        let rendered = render(&output, image.width(), image.height(), has_transparency);
        match rendered.save(&target) {
            Ok(()) => println!("Converted image: {}", target.display()),
            Err(err) => {
                eprintln!("failed to save image in '{}': {err}", target.display());
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}

/// Expands the palette-indexed output back into an RGBA raster.
fn render(output: &QuantizeOutput, width: u32, height: u32, has_transparency: bool) -> RgbaImage {
    let mut buf = Vec::with_capacity((width as usize) * (height as usize) * 4);
    match &output.indices {
        Indices::Narrow(indices) => {
            for &i in indices {
                let c = output.palette[usize::from(i)];
                buf.extend([c.red, c.green, c.blue, c.alpha]);
            }
        }
        Indices::Wide(indices) => {
            // Wide output stores 16-bit color codes; expand the code, not a
            // palette position.
            for &code in indices {
                buf.extend(code_to_rgba(code, has_transparency));
            }
        }
    }

    #[allow(clippy::unwrap_used)]
    // One entry is pushed per pixel, so the buffer length always matches.
    RgbaImage::from_vec(width, height, buf).unwrap()
}

/// Expands an ARGB1555 (with transparency) or RGB565 code to 8-bit RGBA.
fn code_to_rgba(code: u16, has_transparency: bool) -> [u8; 4] {
    #[allow(clippy::cast_possible_truncation)]
    if has_transparency {
        let a = if code & 0x8000 == 0 { 0 } else { u8::MAX };
        let r = (((code >> 10) & 0x1F) << 3) as u8;
        let g = (((code >> 5) & 0x1F) << 3) as u8;
        let b = ((code & 0x1F) << 3) as u8;
        [r, g, b, a]
    } else {
        let r = (((code >> 11) & 0x1F) << 3) as u8;
        let g = (((code >> 5) & 0x3F) << 2) as u8;
        let b = ((code & 0x1F) << 3) as u8;
        [r, g, b, u8::MAX]
    }
}
