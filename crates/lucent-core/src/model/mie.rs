//! Lorenz–Mie theory for homogeneous spheres.
//!
//! Provides efficiency factors and angle-resolved amplitude functions for a
//! homogeneous sphere in a non-absorbing medium, from the multipole
//! coefficients $a_n$, $b_n$.
//!
//! # Reference
//! Bohren & Huffman, *Absorption and Scattering of Light by Small Particles* (1983).

use std::f64::consts::PI;

use num_complex::Complex64;

use super::{AngularGrid, Efficiencies, ModelError, ScatteringFunctions, ScatteringModel};

/// Mie scattering by a homogeneous sphere embedded in a medium of real
/// refractive index `n_medium`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LorenzMie {
    pub n_medium: f64,
}

impl Default for LorenzMie {
    fn default() -> Self {
        Self { n_medium: 1.0 }
    }
}

impl LorenzMie {
    pub fn new(n_medium: f64) -> Self {
        Self { n_medium }
    }

    /// Size parameter $x = \pi d n_\text{med} / \lambda$.
    pub fn size_parameter(&self, wavelength_nm: f64, diameter_nm: f64) -> f64 {
        PI * diameter_nm * self.n_medium / wavelength_nm
    }

    fn check_inputs(&self, m: Complex64, wavelength_nm: f64, diameter_nm: f64) -> Result<(), ModelError> {
        if !(self.n_medium.is_finite() && self.n_medium > 0.0) {
            return Err(ModelError::InvalidInput(format!(
                "medium index must be positive, got {}",
                self.n_medium
            )));
        }
        if !(wavelength_nm.is_finite() && wavelength_nm > 0.0) {
            return Err(ModelError::InvalidInput(format!(
                "wavelength must be positive, got {} nm",
                wavelength_nm
            )));
        }
        if !(diameter_nm.is_finite() && diameter_nm >= 0.0) {
            return Err(ModelError::InvalidInput(format!(
                "diameter must be non-negative, got {} nm",
                diameter_nm
            )));
        }
        if !(m.re.is_finite() && m.im.is_finite()) || m.norm() == 0.0 {
            return Err(ModelError::InvalidInput(format!("refractive index {} is not usable", m)));
        }
        Ok(())
    }
}

/// Number of series terms, $N = \mathrm{round}(2 + x + 4x^{1/3})$.
pub fn series_length(x: f64) -> usize {
    (2.0 + x + 4.0 * x.cbrt()).round() as usize
}

/// Compute the Mie coefficients $a_n$ and $b_n$ for $n = 1 \ldots N$.
///
/// `m` is the refractive index relative to the medium and `x` the size
/// parameter in the medium. The logarithmic derivative $D_n(mx)$ is obtained
/// by downward recurrence; the Riccati–Bessel functions $\psi_n$, $\chi_n$ of
/// the real argument by upward recurrence.
pub fn mie_coefficients(m: Complex64, x: f64) -> (Vec<Complex64>, Vec<Complex64>) {
    let n_max = series_length(x);
    let mx = m * x;
    let n_start = (n_max as f64).max(mx.norm()).round() as usize + 16;

    let mut d = vec![Complex64::new(0.0, 0.0); n_start + 1];
    for n in (1..=n_start).rev() {
        let nu = n as f64 / mx;
        d[n - 1] = nu - 1.0 / (d[n] + nu);
    }

    let mut a = Vec::with_capacity(n_max);
    let mut b = Vec::with_capacity(n_max);

    let mut psi0 = x.cos();
    let mut psi1 = x.sin();
    let mut chi0 = -x.sin();
    let mut chi1 = x.cos();
    let mut xi1 = Complex64::new(psi1, -chi1);

    for n in 1..=n_max {
        let nf = n as f64;
        let psi = (2.0 * nf - 1.0) * psi1 / x - psi0;
        let chi = (2.0 * nf - 1.0) * chi1 / x - chi0;
        let xi = Complex64::new(psi, -chi);

        let da = d[n] / m + nf / x;
        let db = m * d[n] + nf / x;
        a.push((da * psi - psi1) / (da * xi - xi1));
        b.push((db * psi - psi1) / (db * xi - xi1));

        psi0 = psi1;
        psi1 = psi;
        chi0 = chi1;
        chi1 = chi;
        xi1 = Complex64::new(psi1, -chi1);
    }

    (a, b)
}

/// Efficiency factors from precomputed coefficients.
pub fn efficiencies_from_coefficients(a: &[Complex64], b: &[Complex64], x: f64) -> Efficiencies {
    let x2 = x * x;
    let mut ext = 0.0;
    let mut sca = 0.0;
    let mut back = Complex64::new(0.0, 0.0);
    let mut g_sum = 0.0;

    for (i, (an, bn)) in a.iter().zip(b.iter()).enumerate() {
        let n = (i + 1) as f64;
        let w = 2.0 * n + 1.0;
        ext += w * (an.re + bn.re);
        sca += w * (an.norm_sqr() + bn.norm_sqr());
        let sign = if (i + 1) % 2 == 0 { 1.0 } else { -1.0 };
        back += w * sign * (an - bn);

        g_sum += w / (n * (n + 1.0)) * (an * bn.conj()).re;
        if let (Some(an1), Some(bn1)) = (a.get(i + 1), b.get(i + 1)) {
            g_sum += n * (n + 2.0) / (n + 1.0) * (an * an1.conj() + bn * bn1.conj()).re;
        }
    }

    let qext = 2.0 / x2 * ext;
    let qsca = 2.0 / x2 * sca;
    let qabs = qext - qsca;
    let qback = back.norm_sqr() / x2;
    let (g, qratio) = if qsca > 0.0 {
        (4.0 / (x2 * qsca) * g_sum, qback / qsca)
    } else {
        (0.0, 0.0)
    };

    Efficiencies {
        qext,
        qsca,
        qabs,
        g,
        qpr: qext - g * qsca,
        qback,
        qratio,
    }
}

/// Amplitude scattering functions $S_1(\mu)$, $S_2(\mu)$ at $\mu = \cos\theta$.
pub fn amplitude_functions(a: &[Complex64], b: &[Complex64], mu: f64) -> (Complex64, Complex64) {
    let mut s1 = Complex64::new(0.0, 0.0);
    let mut s2 = Complex64::new(0.0, 0.0);

    // Angular functions π_n, τ_n by upward recurrence, π_0 = 0, π_1 = 1.
    let mut pi0 = 0.0;
    let mut pi1 = 1.0;
    for (i, (an, bn)) in a.iter().zip(b.iter()).enumerate() {
        let n = (i + 1) as f64;
        let tau = n * mu * pi1 - (n + 1.0) * pi0;
        let w = (2.0 * n + 1.0) / (n * (n + 1.0));
        s1 += w * (an * pi1 + bn * tau);
        s2 += w * (an * tau + bn * pi1);

        let next = ((2.0 * n + 1.0) * mu * pi1 - (n + 1.0) * pi0) / n;
        pi0 = pi1;
        pi1 = next;
    }

    (s1, s2)
}

impl ScatteringModel for LorenzMie {
    fn efficiencies(
        &self,
        m: Complex64,
        wavelength_nm: f64,
        diameter_nm: f64,
    ) -> Result<Efficiencies, ModelError> {
        self.check_inputs(m, wavelength_nm, diameter_nm)?;
        let x = self.size_parameter(wavelength_nm, diameter_nm);
        if x == 0.0 {
            return Ok(Efficiencies::default());
        }

        let (a, b) = mie_coefficients(m / self.n_medium, x);
        let q = efficiencies_from_coefficients(&a, &b, x);
        if !q.is_finite() {
            return Err(ModelError::NonFinite {
                quantity: "efficiency",
                m,
                wavelength_nm,
                diameter_nm,
            });
        }
        Ok(q)
    }

    fn scattering_functions(
        &self,
        m: Complex64,
        wavelength_nm: f64,
        diameter_nm: f64,
        grid: &AngularGrid,
    ) -> Result<ScatteringFunctions, ModelError> {
        self.check_inputs(m, wavelength_nm, diameter_nm)?;
        grid.validate()?;

        let angles = grid.angles_rad();
        let x = self.size_parameter(wavelength_nm, diameter_nm);
        let (a, b) = if x == 0.0 {
            (Vec::new(), Vec::new())
        } else {
            mie_coefficients(m / self.n_medium, x)
        };

        let mut parallel = Vec::with_capacity(angles.len());
        let mut perpendicular = Vec::with_capacity(angles.len());
        let mut unpolarised = Vec::with_capacity(angles.len());
        for &theta in &angles {
            let (s1, s2) = amplitude_functions(&a, &b, theta.cos());
            let perp = s1.norm_sqr();
            let par = s2.norm_sqr();
            if !(perp.is_finite() && par.is_finite()) {
                return Err(ModelError::NonFinite {
                    quantity: "amplitude function",
                    m,
                    wavelength_nm,
                    diameter_nm,
                });
            }
            parallel.push(par);
            perpendicular.push(perp);
            unpolarised.push(0.5 * (par + perp));
        }

        let mut functions = ScatteringFunctions {
            space: grid.space,
            abscissa: grid.abscissa(&angles, wavelength_nm, diameter_nm),
            parallel,
            perpendicular,
            unpolarised,
        };
        functions.normalise(grid.normalisation)?;
        Ok(functions)
    }

    fn name(&self) -> &str {
        "Lorenz-Mie (homogeneous sphere)"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_series_length() {
        assert_eq!(series_length(1.0), 7);
        assert_eq!(series_length(8.0), 18);
    }

    #[test]
    fn test_first_coefficients_dominate_for_small_spheres() {
        let (a, b) = mie_coefficients(Complex64::new(1.5, 0.0), 0.1);
        assert!(a[0].norm() > 100.0 * a[1].norm());
        assert!(a[0].norm() > 100.0 * b[0].norm());
    }

    #[test]
    fn test_non_absorbing_sphere_has_no_absorption() {
        let mie = LorenzMie::default();
        let q = mie.efficiencies(Complex64::new(1.5, 0.0), 500.0, 400.0).unwrap();
        assert_relative_eq!(q.qext, q.qsca, max_relative = 1e-10);
        assert!(q.qabs.abs() < 1e-10);
    }

    #[test]
    fn test_zero_diameter_gives_zero_efficiencies() {
        let mie = LorenzMie::default();
        let q = mie.efficiencies(Complex64::new(1.5, 0.1), 500.0, 0.0).unwrap();
        assert_eq!(q, Efficiencies::default());
    }

    #[test]
    fn test_rejects_non_positive_wavelength() {
        let mie = LorenzMie::default();
        assert!(matches!(
            mie.efficiencies(Complex64::new(1.5, 0.0), 0.0, 100.0),
            Err(ModelError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_forward_amplitudes_are_polarisation_independent() {
        let (a, b) = mie_coefficients(Complex64::new(1.7, 0.5), 3.0);
        let (s1, s2) = amplitude_functions(&a, &b, 1.0);
        assert_relative_eq!(s1.re, s2.re, max_relative = 1e-12);
        assert_relative_eq!(s1.im, s2.im, max_relative = 1e-12);
    }
}
