//! End-to-end tests over synthetic in-memory fonts.
//!
//! The builder at the bottom assembles a minimal but valid sfnt blob:
//! a 64-upem font whose outline glyphs are axis-aligned squares, which
//! makes exact coverage predictions possible.

use glyph_raster_rs::{Bitmap, Font, Glyph, Instance, RasterError};

const PPEM: u32 = 16; // 64 upem at ppem 16 -> 0.25 px per FUnit

const GLYPH_A: u16 = 1;
const GLYPH_SPACE: u16 = 2;
const GLYPH_B: u16 = 3;

#[test]
fn cmap_maps_known_and_unknown_code_points() {
    let font = Font::from_bytes(test_font(None)).unwrap();
    assert_eq!(font.glyph_index('A' as u32), GLYPH_A);
    assert_eq!(font.glyph_index(' ' as u32), GLYPH_SPACE);
    assert_eq!(font.glyph_index('B' as u32), GLYPH_B);
    assert_eq!(font.glyph_index(0xE000), 0);
    assert_eq!(font.glyph_index(0x1F600), 0);
    assert_eq!(font.num_glyphs(), 4);
}

#[test]
fn empty_glyph_renders_nothing_but_advances() {
    let font = Font::from_bytes(test_font(None)).unwrap();
    let mut instance = Instance::new(&font, PPEM).unwrap();

    let mut image = Bitmap::new(64, 64).unwrap();
    image.pixels.iter_mut().for_each(|p| *p = 9);

    let mut glyph = Glyph::new(font.glyph_index(' ' as u32));
    font.render_glyph_into(&mut instance, &mut glyph, &mut image, 5, 5).unwrap();

    assert_eq!((glyph.size.x, glyph.size.y), (0, 0));
    assert_eq!(glyph.advance, 5); // 20 FUnits at 0.25 px/unit
    assert!(image.pixels.iter().all(|&p| p == 9), "image must be untouched");
}

#[test]
fn box_glyph_fills_its_bounding_box() {
    let font = Font::from_bytes(test_font(None)).unwrap();
    let mut instance = Instance::unhinted(&font, PPEM).unwrap();

    let mut glyph = Glyph::new(GLYPH_A);
    let bitmap = font.render_glyph(&mut instance, &mut glyph).unwrap();

    assert_eq!((glyph.size.x, glyph.size.y), (8, 8));
    assert_eq!((bitmap.width, bitmap.height), (8, 8));
    assert_eq!(glyph.advance, 10);
    assert_eq!((glyph.offset.x, glyph.offset.y), (0, 8));
    assert!(bitmap.pixels.iter().all(|&p| p == 255), "square must be fully opaque");
}

#[test]
fn bbox_grows_with_ppem() {
    let font = Font::from_bytes(test_font(None)).unwrap();
    let mut previous = 0;
    for ppem in [8, 16, 32] {
        let mut instance = Instance::unhinted(&font, ppem).unwrap();
        let mut glyph = Glyph::new(GLYPH_A);
        font.render_glyph(&mut instance, &mut glyph).unwrap();
        assert!(glyph.size.x >= previous, "bbox shrank at ppem {ppem}");
        assert_eq!(glyph.size.x, glyph.size.y);
        previous = glyph.size.x;
    }
}

#[test]
fn atlas_render_matches_golden_coverage_sum() {
    let font = Font::from_bytes(test_font(None)).unwrap();
    let mut instance = Instance::unhinted(&font, PPEM).unwrap();
    let mut atlas = Bitmap::new(64, 16).unwrap();

    let mut x = 0u32;
    for cp in ['A', 'B', ' '] {
        let mut glyph = Glyph::new(font.glyph_index(cp as u32));
        font.render_glyph_into(&mut instance, &mut glyph, &mut atlas, x, 0).unwrap();
        x += glyph.advance as u32;
    }

    let nonzero = atlas.pixels.iter().filter(|&&p| p != 0).count();
    let sum: u64 = atlas.pixels.iter().map(|&p| p as u64).sum();
    assert_eq!(nonzero, 2 * 8 * 8);
    assert_eq!(sum, 2 * 8 * 8 * 255);
}

#[test]
fn glyph_metrics_without_rendering() {
    let font = Font::from_bytes(test_font(None)).unwrap();
    let instance = Instance::unhinted(&font, PPEM).unwrap();

    let metrics = font.glyph_metrics(&instance, GLYPH_A).unwrap();
    assert_eq!(metrics.advance, 10);
    assert_eq!(metrics.left_side_bearing, 0);
    assert_eq!((metrics.width, metrics.height), (8, 8));

    let metrics = font.glyph_metrics(&instance, GLYPH_B).unwrap();
    assert_eq!(metrics.left_side_bearing, 1); // 4 FUnits

    let metrics = font.glyph_metrics(&instance, GLYPH_SPACE).unwrap();
    assert_eq!((metrics.width, metrics.height), (0, 0));
    assert_eq!(metrics.advance, 5);
}

#[test]
fn line_metrics_scale_with_the_instance() {
    let font = Font::from_bytes(test_font(None)).unwrap();
    let instance = Instance::unhinted(&font, PPEM).unwrap();
    assert_eq!(font.ascender(&instance), 12); // 48 FUnits
    assert_eq!(font.descender(&instance), -4); // -16 FUnits
    assert_eq!(font.line_gap(&instance), 0);
    assert_eq!(font.line_height(&instance), 16);
}

#[test]
fn hinted_and_unhinted_agree_for_a_program_free_glyph() {
    let font = Font::from_bytes(test_font(Some(benign_hinting()))).unwrap();
    assert!(font.has_hinting());

    let mut hinted = Instance::new(&font, PPEM).unwrap();
    assert!(hinted.is_hinted());
    let mut unhinted = Instance::unhinted(&font, PPEM).unwrap();

    let mut glyph_h = Glyph::new(GLYPH_A);
    let mut glyph_u = Glyph::new(GLYPH_A);
    let bitmap_h = font.render_glyph(&mut hinted, &mut glyph_h).unwrap();
    let bitmap_u = font.render_glyph(&mut unhinted, &mut glyph_u).unwrap();

    assert_eq!(glyph_h.size.x, glyph_u.size.x);
    assert_eq!(bitmap_h.pixels, bitmap_u.pixels);
}

#[test]
fn glyph_program_moves_points() {
    // Glyph B carries a SHPIX that shifts its first point one pixel
    // along the freedom vector.
    let font = Font::from_bytes(test_font(Some(benign_hinting()))).unwrap();

    let mut hinted = Instance::new(&font, PPEM).unwrap();
    let mut unhinted = Instance::unhinted(&font, PPEM).unwrap();

    let mut glyph_h = Glyph::new(GLYPH_B);
    let mut glyph_u = Glyph::new(GLYPH_B);
    let bitmap_h = font.render_glyph(&mut hinted, &mut glyph_h).unwrap();
    let bitmap_u = font.render_glyph(&mut unhinted, &mut glyph_u).unwrap();

    assert_eq!(glyph_h.advance, glyph_u.advance);
    assert_ne!(bitmap_h.pixels, bitmap_u.pixels, "hinting must have an effect");
    assert!(bitmap_h.pixels.iter().all(|&p| p <= 255));
}

#[test]
fn rendering_twice_is_deterministic() {
    let bytes = test_font(Some(benign_hinting()));
    let font_a = Font::from_bytes(bytes.clone()).unwrap();
    let font_b = Font::from_bytes(bytes).unwrap();

    let mut inst_a = Instance::new(&font_a, PPEM).unwrap();
    let mut inst_b = Instance::new(&font_b, PPEM).unwrap();

    let mut glyph_a = Glyph::new(GLYPH_B);
    let mut glyph_b = Glyph::new(GLYPH_B);
    let bitmap_a = font_a.render_glyph(&mut inst_a, &mut glyph_a).unwrap();
    let bitmap_b = font_b.render_glyph(&mut inst_b, &mut glyph_b).unwrap();

    assert_eq!(bitmap_a.pixels, bitmap_b.pixels);
    assert_eq!(glyph_a.advance, glyph_b.advance);
}

#[test]
fn divide_by_zero_in_font_program_fails_loading() {
    let hinting = Hinting {
        cvt: vec![50, 100],
        fpgm: vec![0xB1, 0, 0, 0x62], // PUSHB[1] 0 0; DIV
        prep: Vec::new(),
    };
    assert!(matches!(
        Font::from_bytes(test_font(Some(hinting))),
        Err(RasterError::DivideByZero)
    ));
}

#[test]
fn stack_underflow_in_cv_program_fails_instance_creation() {
    let hinting = Hinting {
        cvt: vec![50, 100],
        fpgm: Vec::new(),
        prep: vec![0x21], // POP with nothing on the stack
    };
    let font = Font::from_bytes(test_font(Some(hinting))).unwrap();
    assert!(matches!(
        Instance::new(&font, PPEM),
        Err(RasterError::HintingAborted(_))
    ));
}

#[test]
fn truncated_blob_is_malformed() {
    let mut bytes = test_font(None);
    bytes.truncate(bytes.len() / 2);
    assert!(Font::from_bytes(bytes).is_err());
}

// ---------------------------------------------------------------- //
// Synthetic font assembly                                          //
// ---------------------------------------------------------------- //

struct Hinting {
    cvt: Vec<i16>,
    fpgm: Vec<u8>,
    prep: Vec<u8>,
}

/// A font program defining an empty function 0, a CV program calling it
/// and writing one CVT entry.
fn benign_hinting() -> Hinting {
    Hinting {
        cvt: vec![50, 100],
        fpgm: vec![0xB0, 0, 0x2C, 0x2D], // PUSHB[0] 0; FDEF; ENDF
        prep: vec![
            0xB0, 0, 0x2B, // PUSHB[0] 0; CALL
            0xB1, 0, 0x40, 0x44, // PUSHB[1] 0 64; WCVTP
        ],
    }
}

fn push_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn push_i16(out: &mut Vec<u8>, v: i16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn push_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

/// One closed square contour with long (i16) coordinate deltas.
fn square_glyph(x_min: i16, y_min: i16, x_max: i16, y_max: i16, instructions: &[u8]) -> Vec<u8> {
    let mut block = Vec::new();
    push_i16(&mut block, 1); // numberOfContours
    push_i16(&mut block, x_min);
    push_i16(&mut block, y_min);
    push_i16(&mut block, x_max);
    push_i16(&mut block, y_max);
    push_u16(&mut block, 3); // endPtsOfContours
    push_u16(&mut block, instructions.len() as u16);
    block.extend_from_slice(instructions);
    block.extend_from_slice(&[0x01; 4]); // four on-curve, long-delta flags
    for dx in [x_min, x_max - x_min, 0, x_min - x_max] {
        push_i16(&mut block, dx);
    }
    for dy in [y_min, 0, y_max - y_min, 0] {
        push_i16(&mut block, dy);
    }
    block
}

fn cmap_table(segments: &[(u16, u16, i16)]) -> Vec<u8> {
    let seg_count = segments.len() as u16 + 1; // plus terminator
    let mut sub = Vec::new();
    push_u16(&mut sub, 4); // format
    push_u16(&mut sub, 16 + 8 * seg_count); // length
    push_u16(&mut sub, 0); // language
    push_u16(&mut sub, seg_count * 2);
    push_u16(&mut sub, 0); // searchRange
    push_u16(&mut sub, 0); // entrySelector
    push_u16(&mut sub, 0); // rangeShift
    for (_, end, _) in segments {
        push_u16(&mut sub, *end);
    }
    push_u16(&mut sub, 0xFFFF);
    push_u16(&mut sub, 0); // reservedPad
    for (start, _, _) in segments {
        push_u16(&mut sub, *start);
    }
    push_u16(&mut sub, 0xFFFF);
    for (_, _, delta) in segments {
        push_i16(&mut sub, *delta);
    }
    push_i16(&mut sub, 1);
    for _ in 0..seg_count {
        push_u16(&mut sub, 0); // idRangeOffset
    }

    let mut cmap = Vec::new();
    push_u16(&mut cmap, 0); // version
    push_u16(&mut cmap, 1); // numTables
    push_u16(&mut cmap, 0); // platform: Unicode
    push_u16(&mut cmap, 3); // encoding: BMP
    push_u32(&mut cmap, 12); // subtable offset
    cmap.extend_from_slice(&sub);
    cmap
}

/// Assemble the whole sfnt blob. Glyphs: 0 = notdef (empty), 1 = 'A'
/// box, 2 = space (empty), 3 = 'B' box with a SHPIX program.
fn test_font(hinting: Option<Hinting>) -> Vec<u8> {
    let upem: u16 = 64;

    // PUSHB[0] 0; PUSHW[0] 64; SHPIX: shift point 0 by one pixel.
    let shpix = [0xB0, 0x00, 0xB8, 0x00, 0x40, 0x38];

    let glyphs: [Option<Vec<u8>>; 4] = [
        None,
        Some(square_glyph(0, 0, 32, 32, &[])),
        None,
        Some(square_glyph(0, 0, 32, 32, &shpix)),
    ];

    let mut glyf = Vec::new();
    let mut loca_halves = vec![0u16];
    for glyph in &glyphs {
        if let Some(block) = glyph {
            glyf.extend_from_slice(block);
            if glyf.len() % 2 != 0 {
                glyf.push(0); // loca format 0 stores half-offsets
            }
        }
        loca_halves.push((glyf.len() / 2) as u16);
    }

    let mut loca = Vec::new();
    for half in &loca_halves {
        push_u16(&mut loca, *half);
    }

    let mut head = vec![0u8; 54];
    head[18..20].copy_from_slice(&upem.to_be_bytes());
    // indexToLocFormat at offset 50 stays 0 (short)

    let mut maxp = vec![0u8; 32];
    maxp[4..6].copy_from_slice(&(glyphs.len() as u16).to_be_bytes());
    maxp[16..18].copy_from_slice(&4u16.to_be_bytes()); // maxTwilightPoints
    maxp[18..20].copy_from_slice(&8u16.to_be_bytes()); // maxStorage
    maxp[20..22].copy_from_slice(&8u16.to_be_bytes()); // maxFunctionDefs
    maxp[24..26].copy_from_slice(&64u16.to_be_bytes()); // maxStackElements

    let mut hhea = vec![0u8; 50];
    hhea[4..6].copy_from_slice(&48i16.to_be_bytes()); // ascender
    hhea[6..8].copy_from_slice(&(-16i16).to_be_bytes()); // descender
    hhea[48..50].copy_from_slice(&(glyphs.len() as u16).to_be_bytes()); // numberOfHMetrics

    let mut hmtx = Vec::new();
    for (advance, lsb) in [(0u16, 0i16), (40, 0), (20, 0), (40, 4)] {
        push_u16(&mut hmtx, advance);
        push_i16(&mut hmtx, lsb);
    }

    let cmap = cmap_table(&[
        (0x20, 0x20, GLYPH_SPACE as i16 - 0x20),
        (0x41, 0x41, GLYPH_A as i16 - 0x41),
        (0x42, 0x42, GLYPH_B as i16 - 0x42),
    ]);

    let mut tables: Vec<([u8; 4], Vec<u8>)> = vec![
        (*b"cmap", cmap),
        (*b"glyf", glyf),
        (*b"head", head),
        (*b"hhea", hhea),
        (*b"hmtx", hmtx),
        (*b"loca", loca),
        (*b"maxp", maxp),
    ];

    if let Some(hinting) = hinting {
        let mut cvt = Vec::new();
        for v in &hinting.cvt {
            push_i16(&mut cvt, *v);
        }
        tables.push((*b"cvt ", cvt));
        tables.push((*b"fpgm", hinting.fpgm));
        tables.push((*b"prep", hinting.prep));
    }

    let mut blob = Vec::new();
    push_u32(&mut blob, 0x0001_0000);
    push_u16(&mut blob, tables.len() as u16);
    push_u16(&mut blob, 0); // searchRange
    push_u16(&mut blob, 0); // entrySelector
    push_u16(&mut blob, 0); // rangeShift

    let mut offset = 12 + 16 * tables.len() as u32;
    for (tag, contents) in &tables {
        blob.extend_from_slice(tag);
        push_u32(&mut blob, 0); // checksum
        push_u32(&mut blob, offset);
        push_u32(&mut blob, contents.len() as u32);
        offset += contents.len() as u32;
    }
    for (_, contents) in &tables {
        blob.extend_from_slice(contents);
    }

    blob
}
