//! `loca` lookup and simple-glyph outline decoding.

use bitflags::bitflags;

use super::{read_i16, read_u16, read_u32, read_u8, TableRecord};
use crate::numerics::V2;
use crate::RasterError;

bitflags! {
    pub struct GlyphPointFlags: u8 {
        const ON_CURVE_POINT = 0x01;
        const X_SHORT_VECTOR = 0x02;
        const Y_SHORT_VECTOR = 0x04;
        const REPEAT_FLAG    = 0x08;
        /// With `X_SHORT_VECTOR`: positive sign. Without: x delta is 0.
        const X_DUAL         = 0x10;
        const Y_DUAL         = 0x20;
        const OVERLAP_SIMPLE = 0x40;
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PointType {
    OnCurve,
    OffCurve,
}

/// Locate the `glyf` block for a glyph. `Ok(None)` means the glyph has
/// no outline (`loca[i] == loca[i + 1]`).
pub fn glyf_block(
    data: &[u8],
    loca: &TableRecord,
    glyf: &TableRecord,
    index_to_loc_format: i16,
    num_glyphs: u16,
    glyph_idx: u16,
) -> Result<Option<usize>, RasterError> {
    if glyph_idx >= num_glyphs {
        return Err(RasterError::MalformedFont("glyph index out of range"));
    }

    let read_offset = |idx: usize| -> Result<u32, RasterError> {
        if index_to_loc_format == 0 {
            Ok(read_u16(data, loca.offset() + 2 * idx)? as u32 * 2)
        } else {
            read_u32(data, loca.offset() + 4 * idx)
        }
    };

    let start = read_offset(glyph_idx as usize)?;
    let end = read_offset(glyph_idx as usize + 1)?;

    if start == end {
        return Ok(None);
    }
    if start > end || end > glyf.len {
        return Err(RasterError::MalformedFont("loca offsets are not monotonic"));
    }

    Ok(Some(glyf.offset() + start as usize))
}

/// A simple glyph's decoded outline, in absolute FUnits.
#[derive(Debug)]
pub struct DecodedOutline {
    pub num_contours: i16,
    pub x_min: i16,
    pub y_min: i16,
    pub x_max: i16,
    pub y_max: i16,
    /// Index of each contour's final point.
    pub end_points: Vec<u16>,
    /// Absolute offset of the glyph's instruction bytes.
    pub ins_off: usize,
    pub ins_len: usize,
    pub points: Vec<V2>,
    pub point_types: Vec<PointType>,
}

impl DecodedOutline {
    pub fn num_points(&self) -> usize {
        self.points.len()
    }
}

fn next_coord_delta(
    data: &[u8],
    off: &mut usize,
    flags: GlyphPointFlags,
    short: GlyphPointFlags,
    dual: GlyphPointFlags,
) -> Result<i32, RasterError> {
    if flags.contains(short) {
        let v = read_u8(data, *off)? as i32;
        *off += 1;
        Ok(if flags.contains(dual) { v } else { -v })
    } else if flags.contains(dual) {
        Ok(0)
    } else {
        let v = read_i16(data, *off)? as i32;
        *off += 2;
        Ok(v)
    }
}

/// Decompress a simple glyph's packed flag/x/y streams.
pub fn decode_simple_glyph(data: &[u8], block_off: usize) -> Result<DecodedOutline, RasterError> {
    let num_contours = read_i16(data, block_off)?;
    if num_contours < 0 {
        return Err(RasterError::UnsupportedFont("composite glyphs are not supported"));
    }

    let x_min = read_i16(data, block_off + 2)?;
    let y_min = read_i16(data, block_off + 4)?;
    let x_max = read_i16(data, block_off + 6)?;
    let y_max = read_i16(data, block_off + 8)?;

    let mut end_points = Vec::with_capacity(num_contours as usize);
    for i in 0..num_contours as usize {
        let ep = read_u16(data, block_off + 10 + 2 * i)?;
        if end_points.last().is_some_and(|&prev| ep <= prev) {
            return Err(RasterError::MalformedFont("contour end points are not increasing"));
        }
        end_points.push(ep);
    }

    let ins_len_off = block_off + 10 + 2 * num_contours as usize;
    let ins_len = read_u16(data, ins_len_off)? as usize;
    let ins_off = ins_len_off + 2;

    let num_points = match end_points.last() {
        Some(&last) => last as usize + 1,
        None => 0,
    };

    // Expand the run-length-encoded flag stream.
    let mut flags = Vec::with_capacity(num_points);
    let mut off = ins_off + ins_len;
    while flags.len() < num_points {
        let raw = read_u8(data, off)?;
        off += 1;
        let flag = GlyphPointFlags::from_bits_truncate(raw);

        let reps = if flag.contains(GlyphPointFlags::REPEAT_FLAG) {
            let count = read_u8(data, off)?;
            off += 1;
            1 + count as usize
        } else {
            1
        };

        for _ in 0..reps {
            if flags.len() == num_points {
                return Err(RasterError::MalformedFont("glyph flag run overflows point count"));
            }
            flags.push(flag);
        }
    }

    // Coordinates are cumulative deltas from (0, 0); x stream first,
    // then y.
    let mut points = vec![V2::default(); num_points];
    let mut point_types = Vec::with_capacity(num_points);

    let mut abs = 0i32;
    for (i, &flag) in flags.iter().enumerate() {
        abs += next_coord_delta(
            data,
            &mut off,
            flag,
            GlyphPointFlags::X_SHORT_VECTOR,
            GlyphPointFlags::X_DUAL,
        )?;
        points[i].x = abs;
    }

    abs = 0;
    for (i, &flag) in flags.iter().enumerate() {
        abs += next_coord_delta(
            data,
            &mut off,
            flag,
            GlyphPointFlags::Y_SHORT_VECTOR,
            GlyphPointFlags::Y_DUAL,
        )?;
        points[i].y = abs;

        point_types.push(if flag.contains(GlyphPointFlags::ON_CURVE_POINT) {
            PointType::OnCurve
        } else {
            PointType::OffCurve
        });
    }

    Ok(DecodedOutline {
        num_contours,
        x_min,
        y_min,
        x_max,
        y_max,
        end_points,
        ins_off,
        ins_len,
        points,
        point_types,
    })
}
