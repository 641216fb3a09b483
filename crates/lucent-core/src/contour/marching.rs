//! Iso-line extraction by marching squares.
//!
//! Each grid cell is classified by which of its four corners lie at or above
//! the level. Crossing points are placed by linear interpolation along the
//! cell edges, in `(n, k)` coordinates. Segments from neighbouring cells share
//! edge crossings and are stitched into polylines; chains that return to
//! their starting edge are closed loops, the rest end on the grid boundary.
//! Saddle cells (diagonally opposite corners above the level) are resolved by
//! comparing the mean of the four corners with the level.

use std::collections::HashMap;

use serde::Serialize;

use crate::types::Grid;

/// A contour line in `(n, k)` coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Polyline {
    /// Vertices as `[n, k]`.
    pub points: Vec<[f64; 2]>,
    /// Whether the last vertex connects back to the first.
    pub closed: bool,
}

impl Polyline {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Identifies a grid edge: `H(row, col)` joins nodes `(row, col)` and
/// `(row, col + 1)`, `V(row, col)` joins `(row, col)` and `(row + 1, col)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Edge {
    H(usize, usize),
    V(usize, usize),
}

/// Cell-local edge names.
#[derive(Clone, Copy)]
enum Side {
    Bottom,
    Right,
    Top,
    Left,
}

impl Side {
    fn edge(self, row: usize, col: usize) -> Edge {
        match self {
            Side::Bottom => Edge::H(row, col),
            Side::Right => Edge::V(row, col + 1),
            Side::Top => Edge::H(row + 1, col),
            Side::Left => Edge::V(row, col),
        }
    }
}

/// Segments crossing a cell, given its corner case and saddle resolution.
///
/// Corner bits: bottom-left 1, bottom-right 2, top-right 4, top-left 8.
fn cell_segments(case: u8, centre_above: bool) -> &'static [(Side, Side)] {
    use Side::*;
    match case {
        1 | 14 => &[(Left, Bottom)],
        2 | 13 => &[(Bottom, Right)],
        3 | 12 => &[(Left, Right)],
        4 | 11 => &[(Right, Top)],
        6 | 9 => &[(Bottom, Top)],
        7 | 8 => &[(Left, Top)],
        5 if centre_above => &[(Bottom, Right), (Top, Left)],
        5 => &[(Left, Bottom), (Right, Top)],
        10 if centre_above => &[(Left, Bottom), (Right, Top)],
        10 => &[(Bottom, Right), (Top, Left)],
        _ => &[],
    }
}

/// Extract all iso-lines of `grid` at `level`.
///
/// Nodes with value `>= level` count as above. Output order is deterministic:
/// open polylines first, in the row-major order of their first cell, then
/// closed loops in the same order.
pub fn iso_lines(grid: &Grid, level: f64) -> Vec<Polyline> {
    if !level.is_finite() {
        return Vec::new();
    }

    let values = grid.values();
    let (rows, cols) = grid.shape();
    let point = |a: (usize, usize), b: (usize, usize)| -> [f64; 2] {
        let (va, vb) = (values[a], values[b]);
        let t = (level - va) / (vb - va);
        let (na, ka) = grid.coordinate(a.0, a.1);
        let (nb, kb) = grid.coordinate(b.0, b.1);
        [na + t * (nb - na), ka + t * (kb - ka)]
    };

    let mut crossings: HashMap<Edge, [f64; 2]> = HashMap::new();
    let mut segments: Vec<(Edge, Edge)> = Vec::new();

    for row in 0..rows - 1 {
        for col in 0..cols - 1 {
            let corners = [
                values[[row, col]],
                values[[row, col + 1]],
                values[[row + 1, col + 1]],
                values[[row + 1, col]],
            ];
            let case = corners
                .iter()
                .enumerate()
                .fold(0u8, |acc, (bit, &v)| if v >= level { acc | (1 << bit) } else { acc });
            let centre_above = corners.iter().sum::<f64>() / 4.0 >= level;

            for &(from, to) in cell_segments(case, centre_above) {
                let (a, b) = (from.edge(row, col), to.edge(row, col));
                for edge in [a, b] {
                    crossings.entry(edge).or_insert_with(|| match edge {
                        Edge::H(r, c) => point((r, c), (r, c + 1)),
                        Edge::V(r, c) => point((r, c), (r + 1, c)),
                    });
                }
                segments.push((a, b));
            }
        }
    }

    stitch(&segments, &crossings)
}

fn stitch(segments: &[(Edge, Edge)], crossings: &HashMap<Edge, [f64; 2]>) -> Vec<Polyline> {
    let mut incident: HashMap<Edge, Vec<usize>> = HashMap::new();
    for (i, &(a, b)) in segments.iter().enumerate() {
        incident.entry(a).or_default().push(i);
        incident.entry(b).or_default().push(i);
    }
    let degree = |e: Edge| incident.get(&e).map_or(0, Vec::len);

    let mut used = vec![false; segments.len()];
    let mut lines = Vec::new();

    let trace = |start: Edge, first: usize, used: &mut Vec<bool>| -> Polyline {
        let mut edges = vec![start];
        let mut current = start;
        let mut seg = Some(first);
        while let Some(i) = seg {
            used[i] = true;
            let (a, b) = segments[i];
            current = if a == current { b } else { a };
            edges.push(current);
            seg = incident
                .get(&current)
                .and_then(|list| list.iter().copied().find(|&j| !used[j]));
        }
        let closed = edges.len() > 2 && current == start;
        if closed {
            edges.pop();
        }
        Polyline {
            points: edges.iter().filter_map(|e| crossings.get(e).copied()).collect(),
            closed,
        }
    };

    // Open chains start at a boundary crossing.
    for i in 0..segments.len() {
        if used[i] {
            continue;
        }
        let (a, b) = segments[i];
        if degree(a) == 1 {
            lines.push(trace(a, i, &mut used));
        } else if degree(b) == 1 {
            lines.push(trace(b, i, &mut used));
        }
    }
    for i in 0..segments.len() {
        if !used[i] {
            lines.push(trace(segments[i].0, i, &mut used));
        }
    }
    lines
}
