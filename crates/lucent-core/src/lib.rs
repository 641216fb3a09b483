//! # Lucent Core
//!
//! The numerical backbone of the Lucent toolkit. This crate sweeps Mie
//! efficiencies over the complex refractive-index plane, upsamples the
//! resulting grids, inverts measured efficiencies to candidate refractive
//! indices by contour intersection, and integrates angle-resolved intensity
//! curves over detector windows.
//!
//! ## Architecture
//!
//! All physics goes through the [`model::ScatteringModel`] trait. The bundled
//! implementation is [`model::LorenzMie`] (homogeneous spheres). Sweeps run on
//! a [`lucent_compute::ComputeBackend`], so grid nodes are evaluated in
//! parallel without the rest of the pipeline knowing about threads.
//!
//! ```text
//! GridEvaluator ──> upsample ──> ContourSolver ──> Solution(s)
//! scattering_functions ──> Curve ──> integrate ──> window intensity
//! ```
//!
//! ## Modules
//!
//! - [`types`]: Grids, target bands and curves.
//! - [`model`]: Scattering model trait, Lorenz–Mie and size distributions.
//! - [`sweep`]: Efficiency sweeps over (n, k).
//! - [`spline`]: Linear and natural cubic splines.
//! - [`interpolate`]: Grid upsampling.
//! - [`contour`]: Marching squares and contour intersection.
//! - [`integrate`]: Trapezoidal integration over sub-ranges.

pub mod contour;
pub mod integrate;
pub mod interpolate;
pub mod model;
pub mod spline;
pub mod sweep;
pub mod types;
