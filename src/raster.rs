//! Scanline rasterization of hinted outlines.
//!
//! The contour points are converted into quadratic curves, the curves
//! flattened into edges, and the edges swept by a scanline that samples
//! four times per pixel row, accumulating analytic coverage per pixel
//! in 26.6 fixed point.

use crate::numerics::{f26dot6_ceil, fix_div, fix_mul, F16Dot16, F26Dot6, V2};
use crate::truetype_loader::PointType;
use crate::Bitmap;

/// 26.6 squared distance below which a curve is close enough to a line.
const SUBDIVIDE_SQRD_ERROR: F26Dot6 = 0x1;

/// Scanline step in 26.6 pixels: four samples per pixel row.
const PIXELS_PER_SCANLINE: F26Dot6 = 0x10;

/// Active-edge nodes are grown in blocks of this many.
const EDGES_PER_CHUNK: usize = 10;

/// A quadratic Bezier in 26.6 bitmap coordinates. `p1 == p2` encodes a
/// straight line.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Curve {
    pub p0: V2,
    /// Control point.
    pub p1: V2,
    pub p2: V2,
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct Edge {
    pub p0: V2,
    pub p1: V2,
    pub y_min: F26Dot6,
    pub y_max: F26Dot6,
    pub x_min: F26Dot6,
    pub inv_slope: F16Dot16,
    /// +1 when the curve rises in bitmap space (p2.y < p0.y).
    pub dir: i8,
}

fn midpoint(a: V2, b: V2) -> V2 {
    V2::new(fix_mul(a.x + b.x, 0x20, 6), fix_mul(a.y + b.y, 0x20, 6))
}

/// Build the ordered curve list for one glyph's contours. Implied
/// on-curve points between consecutive off-curve points are
/// materialized as midpoints.
pub(crate) fn build_curves(points: &[V2], point_types: &[PointType], end_points: &[u16]) -> Vec<Curve> {
    let mut curves = Vec::with_capacity(points.len() + end_points.len());
    let mut start_idx = 0usize;

    for &ep in end_points {
        let end_idx = ep as usize;
        if end_idx < start_idx || end_idx >= points.len() {
            break;
        }

        let start_point = points[start_idx];
        let mut next_p0 = start_point;
        let mut add_final_curve = true;

        let mut j = start_idx + 1;
        while j <= end_idx {
            let p0 = next_p0;
            let p1 = points[j];

            let p2 = if point_types[j] == PointType::OnCurve {
                p1
            } else if j == end_idx {
                add_final_curve = false;
                start_point
            } else if point_types[j + 1] == PointType::OnCurve {
                j += 1;
                points[j]
            } else {
                // Implied on-curve point between two off-curve points.
                midpoint(p1, points[j + 1])
            };

            curves.push(Curve { p0, p1, p2 });
            next_p0 = p2;
            j += 1;
        }

        if add_final_curve {
            curves.push(Curve { p0: next_p0, p1: start_point, p2: start_point });
        }

        start_idx = end_idx + 1;
    }

    curves
}

fn inv_slope(p0: V2, p1: V2) -> F16Dot16 {
    if p0.x == p1.x || p0.y == p1.y {
        return 0;
    }
    let slope = fix_div(p1.y - p0.y, p1.x - p0.x, 16);
    fix_div(1 << 16, slope, 16)
}

fn push_edge(edges: &mut Vec<Edge>, a: V2, b: V2, dir: i8) {
    // Keep the lower-y endpoint in p0; the intersection formula is a
    // plain line equation either way.
    let (p0, p1) = if a.y <= b.y { (a, b) } else { (b, a) };
    edges.push(Edge {
        p0,
        p1,
        y_min: p0.y,
        y_max: p1.y,
        x_min: p0.x.min(p1.x),
        inv_slope: inv_slope(p0, p1),
        dir,
    });
}

fn subdivide_curve(p0: V2, p1: V2, p2: V2, dir: i8, edges: &mut Vec<Edge>) {
    let mid0 = midpoint(p0, p1);
    let mid1 = midpoint(p1, p2);
    let mid2 = midpoint(mid0, mid1);

    let d = midpoint(p0, p2).sub(mid2);
    let sqrd_error = fix_mul(d.x, d.x, 6) + fix_mul(d.y, d.y, 6);
    if sqrd_error <= SUBDIVIDE_SQRD_ERROR {
        push_edge(edges, p0, p2, dir);
        return;
    }

    subdivide_curve(p0, mid0, mid2, dir, edges);
    subdivide_curve(mid2, mid1, p2, dir, edges);
}

/// Flatten curves into edges sorted by ascending `y_min`.
///
/// Edges are what the scanline sweep intersects; a scanline/edge
/// intersection is much cheaper than a scanline/curve one.
pub(crate) fn flatten_curves(curves: &[Curve]) -> Vec<Edge> {
    let mut edges = Vec::with_capacity(curves.len());

    for curve in curves {
        let dir = if curve.p2.y < curve.p0.y { 1i8 } else { -1 };

        if curve.p1 == curve.p2 {
            // Already a straight line.
            push_edge(&mut edges, curve.p0, curve.p2, dir);
        } else {
            subdivide_curve(curve.p0, curve.p1, curve.p2, dir, &mut edges);
        }
    }

    edges.sort_by_key(|e| e.y_min);
    edges
}

fn scanline_x_intersection(edge: &Edge, scanline: F26Dot6) -> F26Dot6 {
    fix_mul(scanline - edge.p0.y, edge.inv_slope, 16) + edge.p0.x
}

#[derive(Copy, Clone, Default)]
struct ActiveEdge {
    edge: usize,
    x_intersection: F26Dot6,
    next: Option<usize>,
}

/// Singly linked list of active edges, arena-backed. Removed nodes go
/// on a free list and are reused within the same render.
#[derive(Default)]
struct ActiveEdgeList {
    nodes: Vec<ActiveEdge>,
    head: Option<usize>,
    free: Option<usize>,
}

impl ActiveEdgeList {
    fn new() -> ActiveEdgeList {
        ActiveEdgeList {
            nodes: Vec::with_capacity(EDGES_PER_CHUNK),
            head: None,
            free: None,
        }
    }

    fn alloc(&mut self, edge: usize, x_intersection: F26Dot6) -> usize {
        if let Some(idx) = self.free {
            self.free = self.nodes[idx].next;
            self.nodes[idx] = ActiveEdge { edge, x_intersection, next: None };
            return idx;
        }
        if self.nodes.len() == self.nodes.capacity() {
            self.nodes.reserve(EDGES_PER_CHUNK);
        }
        self.nodes.push(ActiveEdge { edge, x_intersection, next: None });
        self.nodes.len() - 1
    }

    fn insert_first(&mut self, edge: usize, x_intersection: F26Dot6) {
        let idx = self.alloc(edge, x_intersection);
        self.nodes[idx].next = self.head;
        self.head = Some(idx);
    }

    fn insert_after(&mut self, after: usize, edge: usize, x_intersection: F26Dot6) {
        let idx = self.alloc(edge, x_intersection);
        self.nodes[idx].next = self.nodes[after].next;
        self.nodes[after].next = Some(idx);
    }

    fn remove(&mut self, prev: Option<usize>, node: usize) {
        let next = self.nodes[node].next;
        match prev {
            None => self.head = next,
            Some(p) => self.nodes[p].next = next,
        }
        self.nodes[node].next = self.free;
        self.free = Some(node);
    }

    fn swap_with_next(&mut self, prev: Option<usize>, node: usize) {
        let next = self.nodes[node].next.expect("swap requires a successor");
        let after = self.nodes[next].next;
        self.nodes[next].next = Some(node);
        self.nodes[node].next = after;
        match prev {
            None => self.head = Some(next),
            Some(p) => self.nodes[p].next = Some(next),
        }
    }
}

/// Sweep sorted edges over the target image, writing 8-bit coverage.
/// `size` is the glyph bitmap extent in pixels; `(x, y)` is the origin
/// inside `image`.
pub(crate) fn rasterize(edges: &[Edge], size: (i32, i32), image: &mut Bitmap, x: u32, y: u32) {
    let (width, height) = size;
    if width <= 0 || height <= 0 {
        return;
    }

    let mut list = ActiveEdgeList::new();

    // Coverage accumulates here in 26.6; the image's bytes cannot hold
    // fractional values between scanlines.
    let mut pixel_row: Vec<F26Dot6> = vec![0; width as usize];

    let mut y_rel: F26Dot6 = 0;
    let mut y_abs: F26Dot6 = (y as i32) << 6;
    let y_end_abs: F26Dot6 = (height + y as i32).min(image.height as i32) << 6;
    let mut edge_idx = 0usize;

    while y_abs <= y_end_abs {
        // Drop edges the scanline has passed; refresh the intersection
        // of the ones still alive.
        {
            let mut prev: Option<usize> = None;
            let mut cur = list.head;
            while let Some(i) = cur {
                let next = list.nodes[i].next;
                let e = list.nodes[i].edge;
                if edges[e].y_max <= y_rel {
                    list.remove(prev, i);
                } else {
                    list.nodes[i].x_intersection = scanline_x_intersection(&edges[e], y_rel);
                    prev = Some(i);
                }
                cur = next;
            }
        }

        // The list is nearly sorted between scanlines; bubble passes
        // restore x order cheaply.
        loop {
            let mut swapped = false;
            let mut prev: Option<usize> = None;
            let mut cur = list.head;
            while let Some(i) = cur {
                match list.nodes[i].next {
                    Some(n) if list.nodes[i].x_intersection > list.nodes[n].x_intersection => {
                        list.swap_with_next(prev, i);
                        swapped = true;
                        prev = Some(n);
                    }
                    _ => {
                        prev = cur;
                        cur = list.nodes[i].next;
                    }
                }
            }
            if !swapped {
                break;
            }
        }

        // Ingest edges the scanline has reached, keeping x order with
        // ties broken by the edge's x_min.
        while edge_idx < edges.len() {
            if edges[edge_idx].y_min > y_rel {
                break;
            }
            if edges[edge_idx].y_max > y_rel {
                let x_int = scanline_x_intersection(&edges[edge_idx], y_rel);

                let mut prev: Option<usize> = None;
                let mut cur = list.head;
                while let Some(i) = cur {
                    let node = &list.nodes[i];
                    if x_int < node.x_intersection {
                        break;
                    }
                    if x_int == node.x_intersection && edges[edge_idx].x_min < edges[node.edge].x_min {
                        break;
                    }
                    prev = cur;
                    cur = node.next;
                }

                match prev {
                    None => list.insert_first(edge_idx, x_int),
                    Some(p) => list.insert_after(p, edge_idx, x_int),
                }
            }
            edge_idx += 1;
        }

        if let Some(head) = list.head {
            let weighted_alpha = fix_mul(0x3FC0, PIXELS_PER_SCANLINE, 6);
            let mut active = head;
            let mut winding = 0i32;

            let mut x_rel = f26dot6_ceil(list.nodes[active].x_intersection);
            if x_rel == 0 {
                x_rel += 0x40;
            }
            let mut x_idx = (x_rel >> 6) - 1;

            'scanline: loop {
                // Pixels only partially covered at an edge boundary.
                let mut coverage = if winding == 0 {
                    x_rel - list.nodes[active].x_intersection
                } else {
                    list.nodes[active].x_intersection - x_rel + 0x40
                };

                'partial: loop {
                    if (0..width).contains(&x_idx) {
                        pixel_row[x_idx as usize] += fix_mul(weighted_alpha, coverage, 6);
                    }

                    loop {
                        let Some(next) = list.nodes[active].next else { break 'scanline };

                        let prev_x = list.nodes[active].x_intersection;
                        winding += edges[list.nodes[active].edge].dir as i32;
                        active = next;

                        let ax = list.nodes[active].x_intersection;
                        if ax == prev_x || x_rel == ax {
                            continue;
                        }
                        if x_rel > ax {
                            if winding == 0 {
                                coverage = x_rel - ax;
                                continue 'partial;
                            }
                            continue;
                        }
                        break;
                    }
                    break 'partial;
                }

                x_rel += 0x40;
                x_idx += 1;

                let ax = list.nodes[active].x_intersection;
                if x_rel < ax {
                    if winding == 0 {
                        // Outside: hop straight to the next boundary.
                        x_rel = f26dot6_ceil(ax);
                        x_idx = (x_rel >> 6) - 1;
                    } else {
                        // Inside: full coverage up to the next boundary.
                        loop {
                            if (0..width).contains(&x_idx) {
                                pixel_row[x_idx as usize] += weighted_alpha;
                            }
                            x_rel += 0x40;
                            x_idx += 1;
                            if x_rel >= ax {
                                break;
                            }
                        }
                    }
                }
            }
        }

        y_abs += PIXELS_PER_SCANLINE;
        y_rel += PIXELS_PER_SCANLINE;

        if y_rel & 0x3F == 0 {
            // A whole pixel row is finished; convert 26.6 coverage to
            // 8-bit and flush.
            let row_y = (y_abs - 0x40) >> 6;
            if row_y >= 0 && (row_y as u32) < image.height {
                let row_start = row_y as usize * image.width as usize;
                for (i, cov) in pixel_row.iter().enumerate() {
                    debug_assert!(*cov >= 0 && (*cov >> 6) <= 255);
                    let col = x as usize + i;
                    if col < image.width as usize {
                        image.pixels[row_start + col] = (cov >> 6).clamp(0, 255) as u8;
                    }
                }
            }
            for cov in pixel_row.iter_mut() {
                *cov = 0;
            }
        }
    }
}
