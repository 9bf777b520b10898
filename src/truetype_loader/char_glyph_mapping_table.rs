//! Code point to glyph index mapping via `cmap`.
//!
//! One encoding subtable is selected at font init. Unicode platform
//! subtables win over Windows ones regardless of their order in the
//! record list. Format 4 is the implemented lookup; the other supported
//! formats are recognized so selection does not reject the font, but
//! their lookups yield the missing-glyph index.

use log::warn;

use super::{read_i16, read_u16, read_u32, TableRecord};
use crate::RasterError;

/// The encoding subtable chosen for code point lookups.
#[derive(Copy, Clone, Debug)]
pub struct Encoding {
    pub platform_id: u16,
    pub encoding_id: u16,
    /// Subtable offset relative to the start of `cmap`.
    pub subtable_off: u32,
    pub format: u16,
}

fn format_is_supported(format: u16) -> bool {
    matches!(format, 4 | 6 | 8 | 10 | 12 | 13 | 14)
}

/// Scan the encoding records and pick the subtable used for all lookups.
pub fn select_encoding(data: &[u8], cmap: &TableRecord) -> Result<Encoding, RasterError> {
    let num_records = read_u16(data, cmap.offset() + 2)?;

    let passes: [fn(u16, u16) -> bool; 2] = [
        |platform, encoding| platform == 0 && (3..=6).contains(&encoding),
        |platform, encoding| platform == 3 && (encoding == 1 || encoding == 10),
    ];

    for accepts in passes {
        for i in 0..num_records as usize {
            let record = cmap.offset() + 4 + 8 * i;
            let platform_id = read_u16(data, record)?;
            let encoding_id = read_u16(data, record + 2)?;
            if !accepts(platform_id, encoding_id) {
                continue;
            }

            let subtable_off = read_u32(data, record + 4)?;
            let format = read_u16(data, cmap.offset() + subtable_off as usize)?;
            if format_is_supported(format) {
                return Ok(Encoding { platform_id, encoding_id, subtable_off, format });
            }
        }
    }

    Err(RasterError::UnsupportedFont("no supported cmap subtable"))
}

/// Map a code point through the selected subtable. 0 is the missing
/// glyph.
pub fn glyph_index(data: &[u8], cmap: &TableRecord, encoding: &Encoding, cp: u32) -> u16 {
    let subtable = cmap.offset() + encoding.subtable_off as usize;
    match encoding.format {
        4 => glyph_index_format_4(data, subtable, cp),
        6 | 8 | 10 | 12 | 13 | 14 => {
            warn!("cmap format {} lookup not implemented", encoding.format);
            0
        }
        _ => 0,
    }
}

/// Format 4 segment lookup: binary search the end-code array for the
/// first segment with `endCode >= cp`.
fn glyph_index_format_4(data: &[u8], subtable: usize, cp: u32) -> u16 {
    let Ok(subtable_len) = read_u16(data, subtable + 2) else { return 0 };
    let Ok(seg_count_x2) = read_u16(data, subtable + 6) else { return 0 };
    let seg_count = (seg_count_x2 >> 1) as usize;
    if seg_count == 0 {
        return 0;
    }

    let end_codes = subtable + 14;
    let mut left = 0usize;
    let mut right = seg_count - 1;

    while left <= right {
        let mid = (left + right) / 2;
        let Ok(end_code) = read_u16(data, end_codes + 2 * mid) else { return 0 };

        if end_code as u32 >= cp {
            let prev_ends_before = mid == 0
                || matches!(read_u16(data, end_codes + 2 * (mid - 1)), Ok(prev) if (prev as u32) < cp);

            if prev_ends_before {
                let off = 16 + 2 * mid;
                let id_range_offsets = subtable + 6 * seg_count + off;

                let Ok(id_range_offset) = read_u16(data, id_range_offsets) else { return 0 };
                let Ok(start_code) = read_u16(data, subtable + 2 * seg_count + off) else { return 0 };

                if start_code as u32 > cp {
                    return 0;
                }

                if id_range_offset == 0 {
                    let Ok(id_delta) = read_i16(data, subtable + 4 * seg_count + off) else { return 0 };
                    return (cp as u16).wrapping_add(id_delta as u16);
                }

                // "The character map offset points into the glyph index
                // array": the offset is relative to its own slot in the
                // idRangeOffset array.
                let glyph_off =
                    id_range_offsets + id_range_offset as usize + 2 * (cp as usize - start_code as usize);
                if glyph_off + 2 > subtable + subtable_len as usize {
                    return 0;
                }
                return read_u16(data, glyph_off).unwrap_or(0);
            }

            right = mid - 1;
        } else {
            left = mid + 1;
        }
    }

    0
}
