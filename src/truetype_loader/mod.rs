//! sfnt container parsing.
//!
//! All multi-byte values in a TrueType font use Motorola byte ordering
//! (big endian). Nothing in here copies table contents out of the font
//! blob; tables are located once and everything downstream reads through
//! the checked accessors with absolute byte offsets.

use byteorder::{BigEndian, ByteOrder};
use log::debug;

use crate::RasterError;

mod char_glyph_mapping_table;
pub use self::char_glyph_mapping_table::*;
mod glyph_data_table;
pub use self::glyph_data_table::*;

fn bytes_at(data: &[u8], off: usize, len: usize) -> Result<&[u8], RasterError> {
    off.checked_add(len)
        .and_then(|end| data.get(off..end))
        .ok_or(RasterError::MalformedFont("read past end of font data"))
}

pub(crate) fn read_u8(data: &[u8], off: usize) -> Result<u8, RasterError> {
    Ok(bytes_at(data, off, 1)?[0])
}

pub(crate) fn read_u16(data: &[u8], off: usize) -> Result<u16, RasterError> {
    Ok(BigEndian::read_u16(bytes_at(data, off, 2)?))
}

pub(crate) fn read_i16(data: &[u8], off: usize) -> Result<i16, RasterError> {
    Ok(BigEndian::read_i16(bytes_at(data, off, 2)?))
}

pub(crate) fn read_u32(data: &[u8], off: usize) -> Result<u32, RasterError> {
    Ok(BigEndian::read_u32(bytes_at(data, off, 4)?))
}

/// The table tags this engine recognizes in the directory.
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum TableTag {
    CharGlyphMapping,
    ControlValue,
    FontProgram,
    GlyphData,
    FontHeader,
    HorizHeader,
    HorizMetrics,
    LocationIndex,
    MaxProfile,
    WindowsOS2Metrics,
    CVProgram,
    VertMetrics,
}

impl TableTag {
    fn from_bytes(tag: &[u8]) -> Option<TableTag> {
        match tag {
            b"cmap" => Some(TableTag::CharGlyphMapping),
            b"cvt " => Some(TableTag::ControlValue),
            b"fpgm" => Some(TableTag::FontProgram),
            b"glyf" => Some(TableTag::GlyphData),
            b"head" => Some(TableTag::FontHeader),
            b"hhea" => Some(TableTag::HorizHeader),
            b"hmtx" => Some(TableTag::HorizMetrics),
            b"loca" => Some(TableTag::LocationIndex),
            b"maxp" => Some(TableTag::MaxProfile),
            b"OS/2" => Some(TableTag::WindowsOS2Metrics),
            b"prep" => Some(TableTag::CVProgram),
            b"vmtx" => Some(TableTag::VertMetrics),
            _ => None,
        }
    }

    pub fn as_bytes(self) -> &'static [u8; 4] {
        match self {
            TableTag::CharGlyphMapping => b"cmap",
            TableTag::ControlValue => b"cvt ",
            TableTag::FontProgram => b"fpgm",
            TableTag::GlyphData => b"glyf",
            TableTag::FontHeader => b"head",
            TableTag::HorizHeader => b"hhea",
            TableTag::HorizMetrics => b"hmtx",
            TableTag::LocationIndex => b"loca",
            TableTag::MaxProfile => b"maxp",
            TableTag::WindowsOS2Metrics => b"OS/2",
            TableTag::CVProgram => b"prep",
            TableTag::VertMetrics => b"vmtx",
        }
    }
}

impl std::fmt::Debug for TableTag {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let t = self.as_bytes();
        write!(
            f,
            "Table:{}{}{}{}",
            t[0] as char, t[1] as char, t[2] as char, t[3] as char
        )
    }
}

/// One located table. Invariant: if `present`, `off + len` is within the
/// font blob.
#[derive(Copy, Clone, Debug, Default)]
pub struct TableRecord {
    pub present: bool,
    pub off: u32,
    pub len: u32,
}

impl TableRecord {
    pub fn offset(&self) -> usize {
        self.off as usize
    }
}

/// The located tables of one font, plus whether the hinting trio
/// (`cvt `, `fpgm`, `prep`) is present.
#[derive(Debug, Default)]
pub struct TableDirectory {
    pub cmap: TableRecord,
    pub cvt: TableRecord,
    pub fpgm: TableRecord,
    pub glyf: TableRecord,
    pub head: TableRecord,
    pub hhea: TableRecord,
    pub hmtx: TableRecord,
    pub loca: TableRecord,
    pub maxp: TableRecord,
    pub os2: TableRecord,
    pub prep: TableRecord,
    pub vmtx: TableRecord,
    pub has_hinting: bool,
}

impl TableDirectory {
    pub fn parse(data: &[u8]) -> Result<TableDirectory, RasterError> {
        // 0x00010000 marks a font with TrueType outlines
        if read_u32(data, 0)? != 0x0001_0000 {
            return Err(RasterError::UnsupportedFont("sfnt version is not 0x00010000"));
        }

        let num_tables = read_u16(data, 4)?;
        let mut dir = TableDirectory::default();

        for i in 0..num_tables as usize {
            let record = 12 + 16 * i;
            let tag = bytes_at(data, record, 4)?;

            let slot = match TableTag::from_bytes(tag) {
                Some(TableTag::CharGlyphMapping) => &mut dir.cmap,
                Some(TableTag::ControlValue) => &mut dir.cvt,
                Some(TableTag::FontProgram) => &mut dir.fpgm,
                Some(TableTag::GlyphData) => &mut dir.glyf,
                Some(TableTag::FontHeader) => &mut dir.head,
                Some(TableTag::HorizHeader) => &mut dir.hhea,
                Some(TableTag::HorizMetrics) => &mut dir.hmtx,
                Some(TableTag::LocationIndex) => &mut dir.loca,
                Some(TableTag::MaxProfile) => &mut dir.maxp,
                Some(TableTag::WindowsOS2Metrics) => &mut dir.os2,
                Some(TableTag::CVProgram) => &mut dir.prep,
                Some(TableTag::VertMetrics) => &mut dir.vmtx,
                None => continue,
            };

            if slot.present {
                continue; // duplicate tag, keep the first
            }

            let off = read_u32(data, record + 8)?;
            let len = read_u32(data, record + 12)?;
            if off as u64 + len as u64 > data.len() as u64 {
                return Err(RasterError::MalformedFont("table extends past end of file"));
            }

            *slot = TableRecord { present: true, off, len };
        }

        let mandatory = [
            (&dir.cmap, TableTag::CharGlyphMapping),
            (&dir.glyf, TableTag::GlyphData),
            (&dir.head, TableTag::FontHeader),
            (&dir.hhea, TableTag::HorizHeader),
            (&dir.hmtx, TableTag::HorizMetrics),
            (&dir.loca, TableTag::LocationIndex),
            (&dir.maxp, TableTag::MaxProfile),
        ];
        for (record, tag) in mandatory {
            if !record.present {
                debug!("mandatory table {:?} missing", tag);
                return Err(RasterError::MalformedFont("mandatory table missing"));
            }
        }

        dir.has_hinting = dir.cvt.present && dir.fpgm.present && dir.prep.present;
        debug!("table directory parsed, hinting tables present: {}", dir.has_hinting);

        Ok(dir)
    }
}

/// Fields of `head` the engine uses.
#[derive(Copy, Clone, Debug)]
pub struct FontHeader {
    pub units_per_em: u16,
    pub index_to_loc_format: i16,
}

impl FontHeader {
    pub fn parse(data: &[u8], head: &TableRecord) -> Result<FontHeader, RasterError> {
        Ok(FontHeader {
            units_per_em: read_u16(data, head.offset() + 18)?,
            index_to_loc_format: read_i16(data, head.offset() + 50)?,
        })
    }
}

/// Fields of `maxp` the engine uses (version 1.0 layout).
#[derive(Copy, Clone, Debug)]
pub struct MaxProfile {
    pub num_glyphs: u16,
    pub max_twilight_points: u16,
    pub max_storage: u16,
    pub max_function_defs: u16,
    pub max_stack_elements: u16,
}

impl MaxProfile {
    pub fn parse(data: &[u8], maxp: &TableRecord) -> Result<MaxProfile, RasterError> {
        let off = maxp.offset();
        Ok(MaxProfile {
            num_glyphs: read_u16(data, off + 4)?,
            max_twilight_points: read_u16(data, off + 16)?,
            max_storage: read_u16(data, off + 18)?,
            max_function_defs: read_u16(data, off + 20)?,
            max_stack_elements: read_u16(data, off + 24)?,
        })
    }
}

/// Fields of `hhea` the engine uses.
#[derive(Copy, Clone, Debug)]
pub struct HorizHeader {
    pub ascender: i16,
    pub descender: i16,
    pub line_gap: i16,
    pub num_h_metrics: u16,
}

impl HorizHeader {
    pub fn parse(data: &[u8], hhea: &TableRecord) -> Result<HorizHeader, RasterError> {
        let off = hhea.offset();
        Ok(HorizHeader {
            ascender: read_i16(data, off + 4)?,
            descender: read_i16(data, off + 6)?,
            line_gap: read_i16(data, off + 8)?,
            num_h_metrics: read_u16(data, off + 48)?,
        })
    }
}

/// Typographic metrics from `OS/2`, preferred over `hhea` when present.
#[derive(Copy, Clone, Debug)]
pub struct Os2Metrics {
    pub ascender: i16,
    pub descender: i16,
    pub line_gap: i16,
}

impl Os2Metrics {
    pub fn parse(data: &[u8], os2: &TableRecord) -> Result<Os2Metrics, RasterError> {
        let off = os2.offset();
        Ok(Os2Metrics {
            ascender: read_i16(data, off + 68)?,
            descender: read_i16(data, off + 70)?,
            line_gap: read_i16(data, off + 72)?,
        })
    }
}

/// Unscaled horizontal advance from `hmtx`. Indices past the metrics
/// array share the final advance.
pub fn x_advance(
    data: &[u8],
    hmtx: &TableRecord,
    num_h_metrics: u16,
    glyph_idx: u16,
) -> Result<u16, RasterError> {
    if num_h_metrics == 0 {
        return Ok(0);
    }
    let idx = glyph_idx.min(num_h_metrics - 1) as usize;
    read_u16(data, hmtx.offset() + 4 * idx)
}

/// Unscaled left side bearing from `hmtx`. Indices past the metrics
/// array read from the trailing i16 array.
pub fn left_side_bearing(
    data: &[u8],
    hmtx: &TableRecord,
    num_h_metrics: u16,
    glyph_idx: u16,
) -> Result<i16, RasterError> {
    if glyph_idx < num_h_metrics {
        read_i16(data, hmtx.offset() + 4 * glyph_idx as usize + 2)
    } else {
        let trailing = (glyph_idx - num_h_metrics) as usize;
        read_i16(data, hmtx.offset() + 4 * num_h_metrics as usize + 2 * trailing)
    }
}
