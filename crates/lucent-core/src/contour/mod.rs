//! Refractive-index inversion by contour intersection.
//!
//! Each measured efficiency defines an acceptance band around its value. For
//! every (grid, band) pair the solver extracts the iso-lines at the band
//! edges and at the measured value, and finds the cells where the
//! interpolated surface enters the band. The intersection of all acceptance
//! regions is computed cell by cell as convex polygons on the interpolated
//! surfaces (see [`region`]), so overlaps narrower than a cell are found.
//! Overlapping cells are grouped into connected components and each
//! component is returned as a candidate [`Solution`]; when there is more
//! than one the result is ambiguous and the caller has to choose.
//!
//! ```no_run
//! # use lucent_core::contour::ContourSolver;
//! # use lucent_core::types::{Grid, TargetBand};
//! # fn demo(qsca: &Grid, qabs: &Grid) -> Result<(), Box<dyn std::error::Error>> {
//! let mut solver = ContourSolver::new();
//! solver.add("Qsca", qsca, TargetBand::new(1.31, 0.01)?)?;
//! solver.add("Qabs", qabs, TargetBand::new(1.54, 0.01)?)?;
//! let result = solver.solve()?;
//! if result.is_ambiguous() {
//!     println!("{} candidate regions", result.solutions.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod marching;
pub mod region;

pub use marching::{iso_lines, Polyline};
pub use region::{cell_overlap, connected_components, value_at, Piece};

use ndarray::Array2;
use num_complex::Complex64;
use serde::Serialize;
use thiserror::Error;

use crate::types::{Grid, TargetBand};

/// Errors from the contour solver.
#[derive(Debug, Error)]
pub enum ContourError {
    #[error("No targets were added to the solver")]
    NoTargets,

    #[error("Grid '{label}' is not sampled on the same axes as '{reference}'")]
    AxisMismatch { label: String, reference: String },

    #[error("No refractive index satisfies all targets (accepted cells per target: {})", summarise(.accepted))]
    NoIntersectionFound { accepted: Vec<(String, usize)> },
}

fn summarise(accepted: &[(String, usize)]) -> String {
    accepted
        .iter()
        .map(|(label, count)| format!("{} = {}", label, count))
        .collect::<Vec<_>>()
        .join(", ")
}

/// The acceptance region of a single (grid, band) pair: every point whose
/// interpolated value lies inside the band.
///
/// The region is bounded by `lower_contours` and `upper_contours`.
#[derive(Debug, Clone, Serialize)]
pub struct BandRegion {
    pub label: String,
    pub band: TargetBand,
    /// Iso-lines at `band.lower()`.
    pub lower_contours: Vec<Polyline>,
    /// Iso-lines at `band.value()`.
    pub target_contours: Vec<Polyline>,
    /// Iso-lines at `band.upper()`.
    pub upper_contours: Vec<Polyline>,
    /// `true` for cells that hold part of the region, shape `(rows − 1, cols − 1)`.
    pub cells: Array2<bool>,
    pub accepted_cells: usize,
    /// Area of the region in `(n, k)` units.
    pub area: f64,
}

/// One connected component of the intersection of all acceptance regions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Solution {
    /// Area-weighted centroid `[n, k]` of the overlap polygons.
    ///
    /// For a curved component this may lie outside the overlap; `best_fit`
    /// never does.
    pub centroid: [f64; 2],
    /// Area of the overlap in `(n, k)` units.
    pub area: f64,
    pub cell_count: usize,
    /// `[n_min, n_max, k_min, k_max]` of the overlap polygons.
    pub bounds: [f64; 4],
    /// Representative point inside the overlap: the centroid of the piece
    /// with the smallest worst-case relative misfit.
    pub best_fit: [f64; 2],
    pub best_fit_misfit: f64,
    /// `[row, col]` of the member cells.
    pub cells: Vec<[usize; 2]>,
    /// The overlap polygons, vertices as `[n, k]`.
    pub polygons: Vec<Vec<[f64; 2]>>,
}

impl Solution {
    /// The centroid as a complex refractive index `n + ik`.
    pub fn refractive_index(&self) -> Complex64 {
        Complex64::new(self.centroid[0], self.centroid[1])
    }

    fn distance_to(&self, n: f64, k: f64) -> f64 {
        (self.centroid[0] - n).hypot(self.centroid[1] - k)
    }
}

/// The outcome of a successful solve.
#[derive(Debug, Clone, Serialize)]
pub struct ContourIntersection {
    /// Per-target regions, in the order the targets were added.
    pub regions: Vec<BandRegion>,
    /// Candidate solutions, largest overlap first.
    pub solutions: Vec<Solution>,
}

impl ContourIntersection {
    /// More than one disjoint candidate region was found.
    pub fn is_ambiguous(&self) -> bool {
        self.solutions.len() > 1
    }

    /// The candidate whose centroid lies closest to `(n, k)`.
    pub fn nearest_to(&self, n: f64, k: f64) -> Option<&Solution> {
        self.solutions
            .iter()
            .min_by(|a, b| a.distance_to(n, k).total_cmp(&b.distance_to(n, k)))
    }
}

struct Target<'a> {
    label: String,
    grid: &'a Grid,
    band: TargetBand,
}

/// Intersects the acceptance regions of several efficiency grids.
#[derive(Default)]
pub struct ContourSolver<'a> {
    targets: Vec<Target<'a>>,
}

impl<'a> ContourSolver<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a (grid, band) pair. All grids must share the first grid's axes.
    pub fn add(
        &mut self,
        label: impl Into<String>,
        grid: &'a Grid,
        band: TargetBand,
    ) -> Result<&mut Self, ContourError> {
        let label = label.into();
        if let Some(first) = self.targets.first() {
            if !first.grid.same_axes(grid) {
                return Err(ContourError::AxisMismatch {
                    label,
                    reference: first.label.clone(),
                });
            }
        }
        self.targets.push(Target { label, grid, band });
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Compute contours, regions and the candidate solutions.
    pub fn solve(&self) -> Result<ContourIntersection, ContourError> {
        let first = self.targets.first().ok_or(ContourError::NoTargets)?;
        let (rows, cols) = first.grid.shape();
        let cell_shape = (rows - 1, cols - 1);

        let regions: Vec<BandRegion> = self.targets.iter().map(|t| region_of(t, cell_shape)).collect();

        let grids: Vec<&Grid> = self.targets.iter().map(|t| t.grid).collect();
        let bands: Vec<TargetBand> = self.targets.iter().map(|t| t.band).collect();
        let pieces = Array2::from_shape_fn(cell_shape, |(row, col)| {
            if regions.iter().all(|r| r.cells[[row, col]]) {
                cell_overlap(&grids, &bands, row, col)
            } else {
                Vec::new()
            }
        });
        let overlap = pieces.map(|p| !p.is_empty());

        let components = connected_components(&overlap);
        if components.is_empty() {
            return Err(ContourError::NoIntersectionFound {
                accepted: regions
                    .iter()
                    .map(|r| (r.label.clone(), r.accepted_cells))
                    .collect(),
            });
        }

        // Components arrive in row-major order; the stable sort keeps it as
        // the final tie-break.
        let mut solutions: Vec<Solution> = components
            .iter()
            .map(|members| self.describe(members, &pieces))
            .collect();
        solutions.sort_by(|a, b| {
            b.area
                .total_cmp(&a.area)
                .then(a.best_fit_misfit.total_cmp(&b.best_fit_misfit))
        });

        if solutions.len() > 1 {
            log::warn!(
                "Intersection has {} disjoint components; returning all of them",
                solutions.len()
            );
        }
        log::info!(
            "Contour intersection: {} candidate(s), largest spans {} cells around n = {:.4}, k = {:.4}",
            solutions.len(),
            solutions[0].cell_count,
            solutions[0].centroid[0],
            solutions[0].centroid[1]
        );

        Ok(ContourIntersection { regions, solutions })
    }

    /// Worst-case relative misfit across all targets.
    fn misfit(&self, values: &[f64]) -> f64 {
        self.targets
            .iter()
            .zip(values)
            .map(|(t, &v)| t.band.misfit(v))
            .fold(0.0, f64::max)
    }

    fn describe(&self, members: &[(usize, usize)], pieces: &Array2<Vec<Piece>>) -> Solution {
        let parts: Vec<&Piece> = members
            .iter()
            .flat_map(|&(row, col)| pieces[[row, col]].iter())
            .collect();

        let area: f64 = parts.iter().map(|p| p.area).sum();
        let centroid = [
            parts.iter().map(|p| p.area * p.centroid[0]).sum::<f64>() / area,
            parts.iter().map(|p| p.area * p.centroid[1]).sum::<f64>() / area,
        ];
        let bounds = parts.iter().flat_map(|p| &p.vertices).fold(
            [f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY],
            |b, v| [b[0].min(v[0]), b[1].max(v[0]), b[2].min(v[1]), b[3].max(v[1])],
        );
        let (best_fit, best_fit_misfit) = parts
            .iter()
            .map(|p| (p.centroid, self.misfit(&p.values)))
            .fold(([f64::NAN; 2], f64::INFINITY), |acc, cur| if cur.1 < acc.1 { cur } else { acc });

        Solution {
            centroid,
            area,
            cell_count: members.len(),
            bounds,
            best_fit,
            best_fit_misfit,
            cells: members.iter().map(|&(row, col)| [row, col]).collect(),
            polygons: parts.iter().map(|p| p.vertices.clone()).collect(),
        }
    }
}

fn region_of(target: &Target<'_>, cell_shape: (usize, usize)) -> BandRegion {
    let mut area = 0.0;
    let cells = Array2::from_shape_fn(cell_shape, |(row, col)| {
        let pieces = cell_overlap(&[target.grid], &[target.band], row, col);
        area += pieces.iter().map(|p| p.area).sum::<f64>();
        !pieces.is_empty()
    });
    let accepted_cells = cells.iter().filter(|&&inside| inside).count();
    log::debug!(
        "{}: band [{:.6}, {:.6}] covers {} cells, area {:.3e}",
        target.label,
        target.band.lower(),
        target.band.upper(),
        accepted_cells,
        area
    );

    BandRegion {
        label: target.label.clone(),
        band: target.band,
        lower_contours: iso_lines(target.grid, target.band.lower()),
        target_contours: iso_lines(target.grid, target.band.value()),
        upper_contours: iso_lines(target.grid, target.band.upper()),
        cells,
        accepted_cells,
        area,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::linspace;
    use approx::assert_relative_eq;

    fn sum_grid() -> Grid {
        Grid::from_fn(linspace(1.0, 3.0, 81), linspace(0.0, 1.0, 41), |n, k| n + k).unwrap()
    }

    #[test]
    fn test_band_region_contains_target_line() {
        let grid = sum_grid();
        let band = TargetBand::new(2.0, 0.05).unwrap();
        let mut solver = ContourSolver::new();
        solver.add("sum", &grid, band).unwrap();
        let result = solver.solve().unwrap();
        let region = &result.regions[0];

        // Every point of n + k = 2 is inside, including points between nodes.
        for n in linspace(1.0, 2.0, 97) {
            let v = value_at(&grid, n, 2.0 - n).unwrap();
            assert!(band.contains(v), "({n}, {}) on the target line rejected", 2.0 - n);
        }
        for n in linspace(1.0, 3.0, 53) {
            for k in linspace(0.0, 1.0, 29) {
                let v = value_at(&grid, n, k).unwrap();
                if ((n + k - 2.0) / 2.0).abs() > 0.05 + 1e-9 {
                    assert!(!band.contains(v), "({n}, {k}) with n + k = {} accepted", n + k);
                }
            }
        }

        for ((row, col), &inside) in region.cells.indexed_iter() {
            let (n0, k0) = grid.coordinate(row, col);
            let (n1, k1) = grid.coordinate(row + 1, col + 1);
            if n0 + k0 < 2.0 && n1 + k1 > 2.0 {
                assert!(inside, "cell ({row}, {col}) crosses n + k = 2");
            }
            if n1 + k1 < 1.9 || n0 + k0 > 2.1 {
                assert!(!inside, "cell ({row}, {col}) lies outside the band");
            }
        }
        // {1.9 <= n + k <= 2.1} clipped to [1, 3] x [0, 1].
        assert_relative_eq!(region.area, 0.195, epsilon = 1e-9);

        // Target line inside the region, band edges at 1.9 and 2.1.
        assert!(!region.target_contours.is_empty());
        for line in &region.target_contours {
            for p in &line.points {
                assert_relative_eq!(p[0] + p[1], 2.0, epsilon = 1e-9);
            }
        }
        for p in region.lower_contours.iter().flat_map(|l| &l.points) {
            assert_relative_eq!(p[0] + p[1], 1.9, epsilon = 1e-9);
        }
        for p in region.upper_contours.iter().flat_map(|l| &l.points) {
            assert_relative_eq!(p[0] + p[1], 2.1, epsilon = 1e-9);
        }

        assert_eq!(result.solutions.len(), 1);
        assert!(!result.is_ambiguous());
    }

    #[test]
    fn test_disjoint_bands_find_no_intersection() {
        let n_grid = Grid::from_fn(linspace(1.0, 3.0, 41), linspace(0.0, 1.0, 21), |n, _| n).unwrap();
        let mut solver = ContourSolver::new();
        solver
            .add("low", &n_grid, TargetBand::new(1.2, 0.02).unwrap())
            .unwrap()
            .add("high", &n_grid, TargetBand::new(2.8, 0.02).unwrap())
            .unwrap();
        match solver.solve() {
            Err(ContourError::NoIntersectionFound { accepted }) => {
                assert_eq!(accepted.len(), 2);
                assert!(accepted.iter().all(|(_, count)| *count > 0));
            }
            other => panic!("expected NoIntersectionFound, got {:?}", other.map(|r| r.solutions)),
        }
    }

    #[test]
    fn test_overlap_between_nodes_is_found() {
        // Nodes at 0, 1, 2 on both axes; both bands are far narrower than a cell.
        let axis = linspace(0.0, 2.0, 3);
        let n_grid = Grid::from_fn(axis.clone(), axis.clone(), |n, _| n).unwrap();
        let k_grid = Grid::from_fn(axis.clone(), axis, |_, k| k).unwrap();
        let n_band = TargetBand::new(0.5, 0.01).unwrap();
        let k_band = TargetBand::new(0.5, 0.01).unwrap();

        let mut solver = ContourSolver::new();
        solver
            .add("n", &n_grid, n_band)
            .unwrap()
            .add("k", &k_grid, k_band)
            .unwrap();
        let result = solver.solve().unwrap();

        assert_eq!(result.solutions.len(), 1);
        let s = &result.solutions[0];
        assert_relative_eq!(s.centroid[0], 0.5, epsilon = 1e-12);
        assert_relative_eq!(s.centroid[1], 0.5, epsilon = 1e-12);
        assert_relative_eq!(s.area, 0.01 * 0.01, max_relative = 1e-9);
        assert_eq!(s.cells, vec![[0, 0]]);
        assert!(s.best_fit_misfit <= 0.01);
        assert!(n_band.contains(value_at(&n_grid, s.best_fit[0], s.best_fit[1]).unwrap()));
        assert!(k_band.contains(value_at(&k_grid, s.best_fit[0], s.best_fit[1]).unwrap()));
    }

    #[test]
    fn test_crossing_bands_locate_point() {
        let n_axis = linspace(1.0, 3.0, 101);
        let k_axis = linspace(0.0, 1.0, 51);
        let sum = Grid::from_fn(n_axis.clone(), k_axis.clone(), |n, k| n + k).unwrap();
        let diff = Grid::from_fn(n_axis, k_axis, |n, k| n - k).unwrap();

        let mut solver = ContourSolver::new();
        solver
            .add("sum", &sum, TargetBand::new(2.5, 0.01).unwrap())
            .unwrap()
            .add("diff", &diff, TargetBand::new(1.5, 0.01).unwrap())
            .unwrap();
        let result = solver.solve().unwrap();
        assert_eq!(result.solutions.len(), 1);
        let s = &result.solutions[0];

        // The overlap is a parallelogram centred on (2.0, 0.5).
        assert_relative_eq!(s.centroid[0], 2.0, epsilon = 1e-9);
        assert_relative_eq!(s.centroid[1], 0.5, epsilon = 1e-9);
        assert_relative_eq!(s.area, 0.5 * 0.05 * 0.03, max_relative = 1e-9);
        assert!((s.best_fit[0] - 2.0).abs() < 0.03 && (s.best_fit[1] - 0.5).abs() < 0.03);
        assert!(s.best_fit_misfit <= 0.01);
        assert!(s.bounds[0] <= 2.0 && s.bounds[1] >= 2.0);
        assert!(s.bounds[2] <= 0.5 && s.bounds[3] >= 0.5);
        assert!(s.polygons.len() >= s.cells.len());
        assert_eq!(s.refractive_index(), Complex64::new(s.centroid[0], s.centroid[1]));
    }

    #[test]
    fn test_disjoint_components_are_all_returned() {
        // |n − 2| has two branches at the same value.
        let grid = Grid::from_fn(linspace(1.0, 3.0, 41), linspace(0.0, 1.0, 11), |n, _| (n - 2.0).abs()).unwrap();
        let mut solver = ContourSolver::new();
        solver.add("abs", &grid, TargetBand::new(0.5, 0.15).unwrap()).unwrap();
        let result = solver.solve().unwrap();

        assert!(result.is_ambiguous());
        assert_eq!(result.solutions.len(), 2);
        let left = result.nearest_to(1.5, 0.5).unwrap();
        let right = result.nearest_to(2.5, 0.5).unwrap();
        assert_relative_eq!(left.centroid[0], 1.5, epsilon = 1e-9);
        assert_relative_eq!(right.centroid[0], 2.5, epsilon = 1e-9);
        assert_relative_eq!(left.area, 0.15, epsilon = 1e-9);
        assert_relative_eq!(right.area, 0.15, epsilon = 1e-9);
        assert_eq!(left.cell_count, right.cell_count);
        assert!(result.solutions[0].area >= result.solutions[1].area);
    }

    #[test]
    fn test_axis_mismatch_is_rejected() {
        let a = sum_grid();
        let b = Grid::from_fn(linspace(1.0, 3.0, 80), linspace(0.0, 1.0, 41), |n, k| n * k).unwrap();
        let band = TargetBand::new(1.0, 0.1).unwrap();
        let mut solver = ContourSolver::new();
        solver.add("a", &a, band).unwrap();
        assert!(matches!(
            solver.add("b", &b, band),
            Err(ContourError::AxisMismatch { .. })
        ));
        assert_eq!(solver.len(), 1);
    }

    #[test]
    fn test_empty_solver() {
        assert!(matches!(ContourSolver::new().solve(), Err(ContourError::NoTargets)));
    }
}
