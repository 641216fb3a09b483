//! Acceptance regions on the interpolated surface of a grid.
//!
//! Each cell is split into four triangles meeting at the cell centre, where
//! the surface takes the mean of the four corners. The surface is linear on
//! every triangle, so the part of a triangle whose values satisfy a set of
//! bands is a convex polygon: the triangle clipped against the lower and
//! upper edge of each band. Along cell edges the surface is the same linear
//! interpolation that [`iso_lines`](super::iso_lines) uses.

use std::collections::VecDeque;

use ndarray::Array2;
use serde::Serialize;

use crate::types::{Grid, TargetBand};

/// A convex polygon inside one triangle of a cell where every band holds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Piece {
    /// Vertices `[n, k]` in boundary order.
    pub vertices: Vec<[f64; 2]>,
    pub area: f64,
    pub centroid: [f64; 2],
    /// Surface value of each grid at `centroid`, in the order the grids were given.
    pub values: Vec<f64>,
}

#[derive(Debug, Clone)]
struct Vertex {
    point: [f64; 2],
    values: Vec<f64>,
}

impl Vertex {
    fn lerp(&self, other: &Vertex, t: f64) -> Vertex {
        Vertex {
            point: [
                self.point[0] + t * (other.point[0] - self.point[0]),
                self.point[1] + t * (other.point[1] - self.point[1]),
            ],
            values: self
                .values
                .iter()
                .zip(&other.values)
                .map(|(a, b)| a + t * (b - a))
                .collect(),
        }
    }
}

/// Keep the part of a convex polygon on one side of `values[channel] = level`.
fn clip(polygon: &[Vertex], channel: usize, level: f64, keep_above: bool) -> Vec<Vertex> {
    let side = |v: &Vertex| {
        let d = v.values[channel] - level;
        if keep_above {
            d
        } else {
            -d
        }
    };

    let mut out = Vec::with_capacity(polygon.len() + 1);
    for (i, a) in polygon.iter().enumerate() {
        let b = &polygon[(i + 1) % polygon.len()];
        let (da, db) = (side(a), side(b));
        if da >= 0.0 {
            out.push(a.clone());
        }
        if (da >= 0.0) != (db >= 0.0) {
            out.push(a.lerp(b, da / (da - db)));
        }
    }
    out
}

/// Area, centroid and centroid values of a polygon; `None` when degenerate.
///
/// The surface is linear on the polygon, so the values at the centroid use
/// the same affine weights as the centroid itself.
fn summarise(polygon: &[Vertex]) -> Option<Piece> {
    if polygon.len() < 3 {
        return None;
    }
    let channels = polygon[0].values.len();
    let origin = &polygon[0];
    let mut signed_area = 0.0;
    let mut point = [0.0; 2];
    let mut values = vec![0.0; channels];

    for pair in polygon[1..].windows(2) {
        let (b, c) = (&pair[0], &pair[1]);
        let a = 0.5
            * ((b.point[0] - origin.point[0]) * (c.point[1] - origin.point[1])
                - (c.point[0] - origin.point[0]) * (b.point[1] - origin.point[1]));
        signed_area += a;
        for v in [origin, b, c] {
            point[0] += a / 3.0 * v.point[0];
            point[1] += a / 3.0 * v.point[1];
            for (acc, x) in values.iter_mut().zip(&v.values) {
                *acc += a / 3.0 * x;
            }
        }
    }

    if signed_area == 0.0 || !signed_area.is_finite() {
        return None;
    }
    Some(Piece {
        vertices: polygon.iter().map(|v| v.point).collect(),
        area: signed_area.abs(),
        centroid: [point[0] / signed_area, point[1] / signed_area],
        values: values.into_iter().map(|v| v / signed_area).collect(),
    })
}

/// Pieces of cell `(row, col)` where every `grids[i]` lies inside `bands[i]`.
///
/// The cell spans nodes `row..=row + 1` and `col..=col + 1`. All grids must
/// share axes. Zero-area contact is not an overlap.
pub fn cell_overlap(grids: &[&Grid], bands: &[TargetBand], row: usize, col: usize) -> Vec<Piece> {
    let corners = [(row, col), (row, col + 1), (row + 1, col + 1), (row + 1, col)];
    let corner_values: Vec<[f64; 4]> = grids
        .iter()
        .map(|g| corners.map(|(r, c)| g.values()[[r, c]]))
        .collect();

    // Cheap rejection: the surface never leaves the range of the corners.
    let outside = corner_values.iter().zip(bands).any(|(v, band)| {
        let lo = v.iter().cloned().fold(f64::INFINITY, f64::min);
        let hi = v.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        hi < band.lower() || lo > band.upper()
    });
    if outside {
        return Vec::new();
    }

    let grid = grids[0];
    let vertex = |i: usize| {
        let (n, k) = grid.coordinate(corners[i].0, corners[i].1);
        Vertex {
            point: [n, k],
            values: corner_values.iter().map(|v| v[i]).collect(),
        }
    };
    let centre = {
        let (n0, k0) = grid.coordinate(row, col);
        let (n1, k1) = grid.coordinate(row + 1, col + 1);
        Vertex {
            point: [0.5 * (n0 + n1), 0.5 * (k0 + k1)],
            values: corner_values.iter().map(|v| v.iter().sum::<f64>() / 4.0).collect(),
        }
    };

    let mut pieces = Vec::new();
    for i in 0..4 {
        let mut polygon = vec![vertex(i), vertex((i + 1) % 4), centre.clone()];
        for (channel, band) in bands.iter().enumerate() {
            polygon = clip(&polygon, channel, band.lower(), true);
            polygon = clip(&polygon, channel, band.upper(), false);
            if polygon.is_empty() {
                break;
            }
        }
        pieces.extend(summarise(&polygon));
    }
    pieces
}

/// Cell index and fractional position of `x` along a monotonic axis.
fn locate(axis: &[f64], x: f64) -> Option<(usize, f64)> {
    let last = axis.len() - 1;
    let increasing = axis[last] > axis[0];
    let (lo, hi) = if increasing {
        (axis[0], axis[last])
    } else {
        (axis[last], axis[0])
    };
    if !(x >= lo && x <= hi) {
        return None;
    }
    let i = axis
        .partition_point(|&a| if increasing { a <= x } else { a >= x })
        .saturating_sub(1)
        .min(last - 1);
    Some((i, (x - axis[i]) / (axis[i + 1] - axis[i])))
}

/// The interpolated surface at `(n, k)`, or `None` outside the grid.
pub fn value_at(grid: &Grid, n: f64, k: f64) -> Option<f64> {
    let (col, u) = locate(grid.n_axis(), n)?;
    let (row, v) = locate(grid.k_axis(), k)?;
    let z = grid.values();
    let (bl, br) = (z[[row, col]], z[[row, col + 1]]);
    let (tl, tr) = (z[[row + 1, col]], z[[row + 1, col + 1]]);
    let centre = 0.25 * (bl + br + tl + tr);

    let value = if v <= u.min(1.0 - u) {
        bl + (br - bl) * u + (2.0 * centre - bl - br) * v
    } else if v >= u.max(1.0 - u) {
        tl + (tr - tl) * u + (2.0 * centre - tl - tr) * (1.0 - v)
    } else if u <= v.min(1.0 - v) {
        bl + (tl - bl) * v + (2.0 * centre - bl - tl) * u
    } else {
        br + (tr - br) * v + (2.0 * centre - br - tr) * (1.0 - u)
    };
    Some(value)
}

/// 8-connected components of a mask, each as a list of `(row, col)` entries.
///
/// Components are returned in row-major order of their first entry, and the
/// entries of each component in breadth-first order from that entry.
pub fn connected_components(mask: &Array2<bool>) -> Vec<Vec<(usize, usize)>> {
    let (rows, cols) = mask.dim();
    let mut seen = Array2::from_elem((rows, cols), false);
    let mut components = Vec::new();

    for ((row, col), &inside) in mask.indexed_iter() {
        if !inside || seen[[row, col]] {
            continue;
        }
        seen[[row, col]] = true;
        let mut queue = VecDeque::from([(row, col)]);
        let mut members = Vec::new();

        while let Some((r, c)) = queue.pop_front() {
            members.push((r, c));
            for nr in r.saturating_sub(1)..=(r + 1).min(rows - 1) {
                for nc in c.saturating_sub(1)..=(c + 1).min(cols - 1) {
                    if mask[[nr, nc]] && !seen[[nr, nc]] {
                        seen[[nr, nc]] = true;
                        queue.push_back((nr, nc));
                    }
                }
            }
        }
        components.push(members);
    }
    components
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::linspace;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn unit_grid(f: impl Fn(f64, f64) -> f64) -> Grid {
        Grid::from_fn(vec![0.0, 1.0], vec![0.0, 1.0], f).unwrap()
    }

    // ─────────────────────────────────────────────────────────────
    // Interpolated surface
    // ─────────────────────────────────────────────────────────────

    #[test]
    fn test_value_at_reproduces_planes() {
        let grid = Grid::from_fn(linspace(1.0, 3.0, 5), linspace(0.0, 1.0, 4), |n, k| 2.0 * n - 3.0 * k).unwrap();
        for &(n, k) in &[(1.0, 0.0), (1.3, 0.2), (2.71, 0.95), (3.0, 1.0), (1.75, 0.5)] {
            assert_relative_eq!(value_at(&grid, n, k).unwrap(), 2.0 * n - 3.0 * k, epsilon = 1e-12);
        }
        assert!(value_at(&grid, 0.99, 0.5).is_none());
        assert!(value_at(&grid, 2.0, 1.01).is_none());
    }

    #[test]
    fn test_value_at_centre_is_corner_mean() {
        let grid = unit_grid(|n, k| n * k);
        assert_relative_eq!(value_at(&grid, 0.5, 0.5).unwrap(), 0.25, epsilon = 1e-15);
        assert_relative_eq!(value_at(&grid, 1.0, 1.0).unwrap(), 1.0, epsilon = 1e-15);
    }

    #[test]
    fn test_value_at_decreasing_axis() {
        let grid = Grid::from_fn(vec![2.0, 1.0, 0.0], vec![0.0, 1.0], |n, _| n).unwrap();
        assert_relative_eq!(value_at(&grid, 0.25, 0.5).unwrap(), 0.25, epsilon = 1e-15);
    }

    // ─────────────────────────────────────────────────────────────
    // Cell overlap
    // ─────────────────────────────────────────────────────────────

    #[test]
    fn test_strip_inside_a_single_cell() {
        let grid = unit_grid(|n, _| n);
        let band = TargetBand::new(0.5, 0.1).unwrap();
        let pieces = cell_overlap(&[&grid], &[band], 0, 0);

        let area: f64 = pieces.iter().map(|p| p.area).sum();
        assert_relative_eq!(area, 0.1, epsilon = 1e-12);
        let n_mean: f64 = pieces.iter().map(|p| p.area * p.centroid[0]).sum::<f64>() / area;
        let k_mean: f64 = pieces.iter().map(|p| p.area * p.centroid[1]).sum::<f64>() / area;
        assert_relative_eq!(n_mean, 0.5, epsilon = 1e-12);
        assert_relative_eq!(k_mean, 0.5, epsilon = 1e-12);
        for p in &pieces {
            assert_relative_eq!(p.values[0], p.centroid[0], epsilon = 1e-12);
            assert!(band.contains(p.values[0]));
        }
    }

    #[test]
    fn test_two_bands_meet_between_nodes() {
        let n = unit_grid(|n, _| n);
        let k = unit_grid(|_, k| k);
        let bands = [TargetBand::new(0.3, 0.01).unwrap(), TargetBand::new(0.6, 0.01).unwrap()];
        let pieces = cell_overlap(&[&n, &k], &bands, 0, 0);

        let area: f64 = pieces.iter().map(|p| p.area).sum();
        assert_relative_eq!(area, 0.006 * 0.012, max_relative = 1e-9);
        for p in &pieces {
            assert!(bands[0].contains(p.values[0]) && bands[1].contains(p.values[1]));
        }
    }

    #[test]
    fn test_band_outside_cell_range_is_rejected() {
        let grid = unit_grid(|n, k| n + k);
        assert!(cell_overlap(&[&grid], &[TargetBand::new(5.0, 0.1).unwrap()], 0, 0).is_empty());
        // Touching a corner has no area.
        assert!(cell_overlap(&[&grid], &[TargetBand::new(2.0, 0.0).unwrap()], 0, 0).is_empty());
    }

    // ─────────────────────────────────────────────────────────────
    // Connectivity
    // ─────────────────────────────────────────────────────────────

    #[test]
    fn test_diagonal_neighbours_are_connected() {
        let mask = array![[true, false, false], [false, true, false], [false, false, true]];
        let comps = connected_components(&mask);
        assert_eq!(comps.len(), 1);
        assert_eq!(comps[0].len(), 3);
    }

    #[test]
    fn test_separate_blobs() {
        let mask = array![
            [true, true, false, false],
            [false, false, false, false],
            [false, false, true, true],
        ];
        let comps = connected_components(&mask);
        assert_eq!(comps.len(), 2);
        assert_eq!(comps[0], vec![(0, 0), (0, 1)]);
        assert_eq!(comps[1], vec![(2, 2), (2, 3)]);
    }

    #[test]
    fn test_empty_mask() {
        let mask = Array2::from_elem((4, 4), false);
        assert!(connected_components(&mask).is_empty());
    }
}
