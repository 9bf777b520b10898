//! Mutable point sets the interpreter works on.
//!
//! Zone 0 (the twilight zone) belongs to an instance and is scratch
//! space for hinting; it has no unscaled coordinates. Zone 1 is built
//! per render from a decoded outline plus the four phantom points.

use bitflags::bitflags;

use crate::numerics::{f26dot6_round, fix_mul, F10Dot22, V2};
use crate::truetype_loader::{DecodedOutline, PointType};

bitflags! {
    /// Per-point, per-axis touch marks consumed by IUP.
    #[derive(Default)]
    pub struct TouchFlags: u8 {
        const X = 0x1;
        const Y = 0x2;
    }
}

pub(crate) const NUM_PHANTOM_POINTS: usize = 4;

#[derive(Debug, Default)]
pub struct Zone {
    /// Original positions in FUnits. Empty for the twilight zone.
    pub org: Vec<V2>,
    /// Original positions scaled to 26.6 pixels.
    pub org_scaled: Vec<V2>,
    /// Current (hinted) positions in 26.6 pixels.
    pub cur: Vec<V2>,
    pub touch: Vec<TouchFlags>,
    /// Empty for the twilight zone.
    pub point_types: Vec<PointType>,
    /// Point count excluding phantom points.
    pub num_outline_points: usize,
}

impl Zone {
    /// The twilight zone: `maxTwilightPoints + 4` zeroed points.
    pub fn twilight(max_twilight_points: usize) -> Zone {
        let cap = max_twilight_points + NUM_PHANTOM_POINTS;
        Zone {
            org: Vec::new(),
            org_scaled: vec![V2::default(); cap],
            cur: vec![V2::default(); cap],
            touch: vec![TouchFlags::empty(); cap],
            point_types: Vec::new(),
            num_outline_points: cap,
        }
    }

    /// Re-zero the twilight zone. Runs at the start of every CV program.
    pub fn reset_twilight(&mut self) {
        for p in self.org_scaled.iter_mut() {
            *p = V2::default();
        }
        for p in self.cur.iter_mut() {
            *p = V2::default();
        }
        for t in self.touch.iter_mut() {
            *t = TouchFlags::empty();
        }
    }

    /// Zone 1 for one glyph: the decoded outline followed by the four
    /// phantom points (in FUnits), everything scaled to pixels, with the
    /// phantom points' metric components rounded to the grid.
    pub fn glyph_zone(outline: &DecodedOutline, phantom: [V2; NUM_PHANTOM_POINTS], scale: F10Dot22) -> Zone {
        let n = outline.num_points();
        let cap = n + NUM_PHANTOM_POINTS;

        let mut org = Vec::with_capacity(cap);
        org.extend_from_slice(&outline.points);
        org.extend_from_slice(&phantom);

        let org_scaled: Vec<V2> = org
            .iter()
            .map(|p| V2::new(fix_mul(p.x << 6, scale, 22), fix_mul(p.y << 6, scale, 22)))
            .collect();

        let mut cur = org_scaled.clone();
        cur[n].x = f26dot6_round(cur[n].x);
        cur[n + 1].x = f26dot6_round(cur[n + 1].x);
        cur[n + 2].y = f26dot6_round(cur[n + 2].y);
        cur[n + 3].y = f26dot6_round(cur[n + 3].y);

        let mut point_types = outline.point_types.clone();
        point_types.resize(cap, PointType::OnCurve);

        Zone {
            org,
            org_scaled,
            cur,
            touch: vec![TouchFlags::empty(); cap],
            point_types,
            num_outline_points: n,
        }
    }

    pub fn cap(&self) -> usize {
        self.cur.len()
    }

    pub fn is_twilight(&self) -> bool {
        self.org.is_empty()
    }
}
