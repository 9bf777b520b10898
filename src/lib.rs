//! A TrueType glyph rasterizer with bytecode hinting.
//!
//! The pipeline: load a font blob, bind it to a pixel size, map code
//! points to glyph indices, and render single glyphs to 8-bit coverage
//! bitmaps.
//!
//! ```no_run
//! use glyph_raster_rs::{Font, Glyph, Instance};
//!
//! # fn main() -> Result<(), glyph_raster_rs::RasterError> {
//! let font = Font::from_file("Roboto-Regular.ttf")?;
//! let mut instance = Instance::new(&font, 18)?;
//! let mut glyph = Glyph::new(font.glyph_index('A' as u32));
//! let bitmap = font.render_glyph(&mut instance, &mut glyph)?;
//! assert_eq!(bitmap.width as i32, glyph.size.x);
//! # Ok(())
//! # }
//! ```
//!
//! A `Font` is immutable once loaded and can be shared; an `Instance`
//! is mutated by every hinted render, so use one instance per thread.

pub mod numerics;
pub mod truetype_loader;

mod interp;
mod raster;

use std::path::Path;

use log::debug;
use thiserror::Error;

use interp::Zone;
use numerics::{
    f26dot6_ceil, f26dot6_floor, f26dot6_round, fix_mul, rounded_div, F10Dot22, F26Dot6, V2,
};
use truetype_loader::{
    decode_simple_glyph, glyf_block, glyph_index as cmap_glyph_index, left_side_bearing,
    read_i16, select_encoding, x_advance, DecodedOutline, Encoding, FontHeader, HorizHeader,
    MaxProfile, Os2Metrics, TableDirectory,
};

#[derive(Debug, Error)]
pub enum RasterError {
    /// Structural inconsistency: out-of-range offset, missing required
    /// table, broken glyph data.
    #[error("malformed font: {0}")]
    MalformedFont(&'static str),
    /// The font is well-formed but uses features this engine does not
    /// implement.
    #[error("unsupported font: {0}")]
    UnsupportedFont(&'static str),
    /// The hinting bytecode executed a `DIV` with a zero divisor.
    #[error("hinting bytecode divided by zero")]
    DivideByZero,
    /// The interpreter hit a bounds check or the instruction cap.
    #[error("hinting aborted: {0}")]
    HintingAborted(&'static str),
    #[error("allocation failed: {0}")]
    AllocationFailed(&'static str),
    #[error("failed to read font file: {0}")]
    Io(#[from] std::io::Error),
}

/// A loaded TrueType font. Owns the raw bytes; everything else in the
/// crate reads through offsets into them.
pub struct Font {
    pub(crate) data: Vec<u8>,
    pub(crate) dir: TableDirectory,
    pub(crate) header: FontHeader,
    pub(crate) maxp: MaxProfile,
    pub(crate) hhea: HorizHeader,
    pub(crate) encoding: Encoding,
    /// Function definitions recorded by the font program.
    pub(crate) funcs: interp::FuncTable,
    ascender: i16,
    descender: i16,
    line_gap: i16,
}

impl Font {
    /// Parse a font from raw sfnt bytes and, when the hinting tables
    /// are present, execute its font program.
    pub fn from_bytes(data: Vec<u8>) -> Result<Font, RasterError> {
        let dir = TableDirectory::parse(&data)?;

        let header = FontHeader::parse(&data, &dir.head)?;
        if header.units_per_em == 0 {
            return Err(RasterError::MalformedFont("unitsPerEm is zero"));
        }

        let maxp = MaxProfile::parse(&data, &dir.maxp)?;
        let hhea = HorizHeader::parse(&data, &dir.hhea)?;
        let encoding = select_encoding(&data, &dir.cmap)?;
        debug!(
            "selected cmap subtable: platform {} encoding {} format {}",
            encoding.platform_id, encoding.encoding_id, encoding.format
        );

        let (ascender, descender, line_gap) = if dir.os2.present {
            let os2 = Os2Metrics::parse(&data, &dir.os2)?;
            (os2.ascender, os2.descender, os2.line_gap)
        } else {
            (hhea.ascender, hhea.descender, hhea.line_gap)
        };

        let mut funcs: interp::FuncTable = vec![None; maxp.max_function_defs as usize];
        if dir.has_hinting {
            interp::run_font_program(&data, &dir.fpgm, &maxp, &mut funcs)?;
        }

        Ok(Font {
            data,
            dir,
            header,
            maxp,
            hhea,
            encoding,
            funcs,
            ascender,
            descender,
            line_gap,
        })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Font, RasterError> {
        Font::from_bytes(std::fs::read(path)?)
    }

    /// Map a code point to a glyph index; 0 is the missing glyph.
    pub fn glyph_index(&self, code_point: u32) -> u16 {
        let idx = cmap_glyph_index(&self.data, &self.dir.cmap, &self.encoding, code_point);
        if idx >= self.maxp.num_glyphs {
            0
        } else {
            idx
        }
    }

    pub fn num_glyphs(&self) -> u16 {
        self.maxp.num_glyphs
    }

    pub fn units_per_em(&self) -> u16 {
        self.header.units_per_em
    }

    /// Whether the hinting trio (`cvt `, `fpgm`, `prep`) is present.
    pub fn has_hinting(&self) -> bool {
        self.dir.has_hinting
    }

    /// Scaled typographic ascender in pixels.
    pub fn ascender(&self, instance: &Instance) -> i32 {
        f26dot6_ceil(fix_mul((self.ascender as i32) << 6, instance.scale, 22)) >> 6
    }

    /// Scaled typographic descender in pixels (negative below the
    /// baseline).
    pub fn descender(&self, instance: &Instance) -> i32 {
        f26dot6_floor(fix_mul((self.descender as i32) << 6, instance.scale, 22)) >> 6
    }

    pub fn line_gap(&self, instance: &Instance) -> i32 {
        f26dot6_round(fix_mul((self.line_gap as i32) << 6, instance.scale, 22)) >> 6
    }

    /// Baseline-to-baseline distance for consecutive lines.
    pub fn line_height(&self, instance: &Instance) -> i32 {
        self.ascender(instance) - self.descender(instance) + self.line_gap(instance)
    }

    /// Advance, left side bearing, and bounding box in pixels, without
    /// rendering. The box is the scaled `glyf` header box, so hinting
    /// may move the rendered box by a pixel.
    pub fn glyph_metrics(&self, instance: &Instance, glyph_idx: u16) -> Result<GlyphMetrics, RasterError> {
        let advance = self.scaled_advance(instance, glyph_idx)?;
        let lsb_units = left_side_bearing(&self.data, &self.dir.hmtx, self.hhea.num_h_metrics, glyph_idx)? as i32;
        let left_side_bearing = f26dot6_round(fix_mul(lsb_units << 6, instance.scale, 22)) >> 6;

        let block = glyf_block(
            &self.data,
            &self.dir.loca,
            &self.dir.glyf,
            self.header.index_to_loc_format,
            self.maxp.num_glyphs,
            glyph_idx,
        )?;

        let (width, height) = match block {
            None => (0, 0),
            Some(off) => {
                let x_min = read_i16(&self.data, off + 2)? as i32;
                let y_min = read_i16(&self.data, off + 4)? as i32;
                let x_max = read_i16(&self.data, off + 6)? as i32;
                let y_max = read_i16(&self.data, off + 8)? as i32;
                (
                    f26dot6_ceil(fix_mul((x_max - x_min) << 6, instance.scale, 22)) >> 6,
                    f26dot6_ceil(fix_mul((y_max - y_min) << 6, instance.scale, 22)) >> 6,
                )
            }
        };

        Ok(GlyphMetrics { advance, left_side_bearing, width, height })
    }

    /// Render one glyph into a tight bitmap. An outline-less glyph
    /// (a space, say) yields a 0x0 bitmap and a positive advance.
    pub fn render_glyph(&self, instance: &mut Instance, glyph: &mut Glyph) -> Result<Bitmap, RasterError> {
        match self.prepare_outline(instance, glyph)? {
            None => Ok(Bitmap { pixels: Vec::new(), width: 0, height: 0 }),
            Some(edges) => {
                let mut image = Bitmap::new(glyph.size.x as u32, glyph.size.y as u32)?;
                raster::rasterize(&edges, (glyph.size.x, glyph.size.y), &mut image, 0, 0);
                Ok(image)
            }
        }
    }

    /// Render one glyph into an existing image with its top-left corner
    /// at `(x, y)`. The image is untouched on error and for glyphs with
    /// no outline.
    pub fn render_glyph_into(
        &self,
        instance: &mut Instance,
        glyph: &mut Glyph,
        image: &mut Bitmap,
        x: u32,
        y: u32,
    ) -> Result<(), RasterError> {
        match self.prepare_outline(instance, glyph)? {
            None => Ok(()),
            Some(edges) => {
                if x as i64 + glyph.size.x as i64 > image.width as i64
                    || y as i64 + glyph.size.y as i64 > image.height as i64
                {
                    return Err(RasterError::AllocationFailed("glyph does not fit in the target image"));
                }
                raster::rasterize(&edges, (glyph.size.x, glyph.size.y), image, x, y);
                Ok(())
            }
        }
    }

    /// Decode, hint, and flatten a glyph. Fills in the glyph's metrics
    /// and returns the edge list in bitmap space, or `None` when there
    /// is nothing to rasterize.
    fn prepare_outline(
        &self,
        instance: &mut Instance,
        glyph: &mut Glyph,
    ) -> Result<Option<Vec<raster::Edge>>, RasterError> {
        glyph.advance = self.scaled_advance(instance, glyph.idx)?;
        glyph.offset = V2::default();
        glyph.size = V2::default();

        let block = glyf_block(
            &self.data,
            &self.dir.loca,
            &self.dir.glyf,
            self.header.index_to_loc_format,
            self.maxp.num_glyphs,
            glyph.idx,
        )?;
        let Some(block_off) = block else {
            return Ok(None);
        };

        let outline = decode_simple_glyph(&self.data, block_off)?;
        if outline.num_points() == 0 {
            return Ok(None);
        }

        let (mut points, point_types) = if instance.use_hinting {
            let phantom = self.phantom_points(&outline, glyph.idx)?;
            let mut zone1 = Zone::glyph_zone(&outline, phantom, instance.scale);
            interp::run_glyph_program(
                self,
                instance,
                &mut zone1,
                &outline.end_points,
                outline.ins_off,
                outline.ins_len,
            )?;
            zone1.cur.truncate(zone1.num_outline_points);
            (zone1.cur, outline.point_types)
        } else {
            let scaled = outline
                .points
                .iter()
                .map(|p| {
                    V2::new(
                        fix_mul(p.x << 6, instance.scale, 22),
                        fix_mul(p.y << 6, instance.scale, 22),
                    )
                })
                .collect();
            (scaled, outline.point_types)
        };

        let mut min = points[0];
        let mut max = points[0];
        for p in &points[1..] {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }

        // Translate so every coordinate is non-negative and flip y to
        // grow downward.
        let extent = max.sub(min);
        for p in points.iter_mut() {
            p.x -= min.x;
            p.y = extent.y - (p.y - min.y);
        }

        glyph.offset = V2::new(f26dot6_floor(min.x) >> 6, f26dot6_ceil(max.y) >> 6);
        glyph.size = V2::new(f26dot6_ceil(extent.x) >> 6, f26dot6_ceil(extent.y) >> 6);

        let curves = raster::build_curves(&points, &point_types, &outline.end_points);
        Ok(Some(raster::flatten_curves(&curves)))
    }

    /// The four phantom points, in FUnits: left side bearing reference,
    /// right advance, top side bearing reference, bottom advance.
    fn phantom_points(&self, outline: &DecodedOutline, glyph_idx: u16) -> Result<[V2; 4], RasterError> {
        let advance = x_advance(&self.data, &self.dir.hmtx, self.hhea.num_h_metrics, glyph_idx)? as i32;
        let lsb = left_side_bearing(&self.data, &self.dir.hmtx, self.hhea.num_h_metrics, glyph_idx)? as i32;

        let top_side_bearing = self.ascender as i32 - outline.y_max as i32;
        let y_advance = (self.ascender - self.descender) as i32;

        let left = outline.x_min as i32 - lsb;
        let top = outline.y_max as i32 + top_side_bearing;

        Ok([
            V2::new(left, 0),
            V2::new(left + advance, 0),
            V2::new(0, top),
            V2::new(0, top - y_advance),
        ])
    }

    fn scaled_advance(&self, instance: &Instance, glyph_idx: u16) -> Result<i32, RasterError> {
        let advance = x_advance(&self.data, &self.dir.hmtx, self.hhea.num_h_metrics, glyph_idx)? as i32;
        Ok(f26dot6_round(fix_mul(advance, instance.scale, 16)) >> 6)
    }
}

/// A font bound to one integer pixel-per-em size. Holds the CVT,
/// storage area, and twilight zone the hinting programs mutate, so it
/// is not shareable across threads.
pub struct Instance {
    pub(crate) ppem: u32,
    /// Pixels per FUnit in 10.22 fixed point.
    pub(crate) scale: F10Dot22,
    pub(crate) use_hinting: bool,
    pub(crate) is_rotated: bool,
    pub(crate) is_stretched: bool,
    pub(crate) cvt: Vec<F26Dot6>,
    pub(crate) storage: Vec<i32>,
    pub(crate) zone0: Zone,
}

impl Instance {
    /// Bind a font to a pixel size, hinted when the font carries the
    /// hinting tables. Runs the CV program.
    pub fn new(font: &Font, ppem: u32) -> Result<Instance, RasterError> {
        Instance::create(font, ppem, font.has_hinting())
    }

    /// Bind a font to a pixel size without hinting, regardless of the
    /// font's tables.
    pub fn unhinted(font: &Font, ppem: u32) -> Result<Instance, RasterError> {
        Instance::create(font, ppem, false)
    }

    fn create(font: &Font, ppem: u32, use_hinting: bool) -> Result<Instance, RasterError> {
        if ppem == 0 {
            return Err(RasterError::UnsupportedFont("ppem must be positive"));
        }

        // upem already has a scale factor of 1, so the quotient is 10.22.
        let scale = rounded_div((ppem as i64) << 22, font.units_per_em() as i64) as F10Dot22;

        let mut instance = Instance {
            ppem,
            scale,
            use_hinting,
            is_rotated: false,
            is_stretched: false,
            cvt: Vec::new(),
            storage: Vec::new(),
            zone0: Zone::default(),
        };

        if use_hinting {
            instance.storage = vec![0; font.maxp.max_storage as usize];
            instance.zone0 = Zone::twilight(font.maxp.max_twilight_points as usize);
            interp::run_cv_program(font, &mut instance)?;
            debug!("instance ready: ppem {} cvt entries {}", ppem, instance.cvt.len());
        }

        Ok(instance)
    }

    pub fn ppem(&self) -> u32 {
        self.ppem
    }

    pub fn is_hinted(&self) -> bool {
        self.use_hinting
    }
}

/// Per-glyph render results: advance, bitmap offset, bitmap size, all
/// in whole pixels.
#[derive(Copy, Clone, Debug, Default)]
pub struct Glyph {
    pub idx: u16,
    pub advance: i32,
    /// `(floor(xMin), ceil(yMax))` of the outline, i.e. where the
    /// bitmap's top-left corner sits relative to the pen position.
    pub offset: V2,
    pub size: V2,
}

impl Glyph {
    pub fn new(idx: u16) -> Glyph {
        Glyph { idx, ..Default::default() }
    }
}

/// Metrics-only view of a glyph at one size.
#[derive(Copy, Clone, Debug)]
pub struct GlyphMetrics {
    pub advance: i32,
    pub left_side_bearing: i32,
    pub width: i32,
    pub height: i32,
}

/// An 8-bit grayscale coverage image, one byte per pixel, row major.
/// Values are plain coverage, not premultiplied.
pub struct Bitmap {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Bitmap {
    pub fn new(width: u32, height: u32) -> Result<Bitmap, RasterError> {
        let len = (width as usize)
            .checked_mul(height as usize)
            .ok_or(RasterError::AllocationFailed("image dimensions overflow"))?;
        Ok(Bitmap { pixels: vec![0; len], width, height })
    }
}
