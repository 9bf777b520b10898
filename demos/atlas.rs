//! Render the printable ASCII range into a grayscale PNG atlas.
//!
//! Usage: atlas <font.ttf> [out.png] [ppem]

use std::env;
use std::process::exit;

use glyph_raster_rs::{Bitmap, Font, Glyph, Instance};

const IMAGE_W: u32 = 256;
const IMAGE_H: u32 = 256;

fn main() {
    let mut args = env::args().skip(1);
    let Some(font_path) = args.next() else {
        eprintln!("usage: atlas <font.ttf> [out.png] [ppem]");
        exit(2);
    };
    let out_path = args.next().unwrap_or_else(|| "atlas.png".to_string());
    let ppem: u32 = args
        .next()
        .map(|v| v.parse().expect("ppem must be an integer"))
        .unwrap_or(18);

    if let Err(err) = run(&font_path, &out_path, ppem) {
        eprintln!("atlas: {err}");
        exit(1);
    }
}

fn run(font_path: &str, out_path: &str, ppem: u32) -> Result<(), Box<dyn std::error::Error>> {
    let font = Font::from_file(font_path)?;
    let mut instance = Instance::new(&font, ppem)?;
    let mut atlas = Bitmap::new(IMAGE_W, IMAGE_H)?;

    let row_height = font.line_height(&instance).max(1) as u32;
    let mut x = 0u32;
    let mut y = 0u32;

    for ch in ' '..='~' {
        let mut glyph = Glyph::new(font.glyph_index(ch as u32));

        // Measure before drawing so rows wrap cleanly. Hinting can move
        // the rendered box by a pixel, hence the slack.
        let metrics = font.glyph_metrics(&instance, glyph.idx)?;
        let slot = metrics.width.max(metrics.advance) as u32 + 2;
        if x + slot >= IMAGE_W {
            x = 0;
            y += row_height;
        }
        if y + row_height > IMAGE_H {
            eprintln!("atlas full at {:?}", ch);
            break;
        }

        font.render_glyph_into(&mut instance, &mut glyph, &mut atlas, x, y)?;
        x += glyph.advance.max(1) as u32;
    }

    image::GrayImage::from_raw(atlas.width, atlas.height, atlas.pixels)
        .ok_or("atlas buffer size mismatch")?
        .save(out_path)?;
    println!("wrote {out_path}");
    Ok(())
}
