//! Testing functions and utilities useful for benchmarking, debugging and
//! smoke testing.
//!
//! [`Rosenbrock`] and [`Quadratic`] are recommended for first tests of scalar
//! functions, [`ExtendedRosenbrock`] (bulk) and [`Trigonometric`]
//! (component-wise) for vector functions. [`LogBarrier`] fails outside of its
//! domain and is useful for testing the error paths.
//!
//! # References
//!
//! \[1\] [A Literature Survey of Benchmark Functions For Global Optimization
//! Problems](https://arxiv.org/abs/1308.4008)
//!
//! \[2\] [Numerical Methods for Unconstrained Optimization and Nonlinear
//! Equations](https://epubs.siam.org/doi/book/10.1137/1.9781611971200)

#![allow(unused)]

use std::sync::atomic::{AtomicUsize, Ordering};

use nalgebra::{dmatrix, dvector, DMatrix, DVector};
use rand::Rng;
use rand_distr::{Distribution, Uniform};

use crate::core::{
    BulkFunction, ComponentFunction, Error, Evaluation, Problem, ScalarFunction, VectorEvaluation,
};
use crate::parametric::FamilyReference;

/// Extension of the [`Problem`] trait that provides additional information
/// that is useful for testing and benchmarking.
pub trait TestProblem: Problem {
    /// Standard initial values for the problem. Using the same initial values
    /// is essential for fair comparison.
    fn initials(&self) -> Vec<DVector<f64>>;
}

/// Quadratic function `1/2 x^T A x + b^T x + c` with symmetric `A`.
#[derive(Debug, Clone)]
pub struct Quadratic {
    a: DMatrix<f64>,
    b: DVector<f64>,
    c: f64,
}

impl Quadratic {
    /// Initializes the function with given coefficients.
    ///
    /// The matrix **must** be square, symmetric and of the dimension of `b`.
    pub fn new(a: DMatrix<f64>, b: DVector<f64>, c: f64) -> Self {
        assert!(a.is_square(), "a must be square");
        assert_eq!(a.nrows(), b.len(), "a and b must have the same dimension");
        assert!(a == a.transpose(), "a must be symmetric");
        Self { a, b, c }
    }

    /// A two-dimensional positive definite example.
    pub fn example() -> Self {
        Self::new(dmatrix![3.0, 1.0; 1.0, 2.0], dvector![-1.0, 0.5], 1.0)
    }
}

impl Problem for Quadratic {
    fn num_parameters(&self) -> usize {
        self.b.len()
    }
}

impl ScalarFunction for Quadratic {
    fn gradient_defined(&self) -> bool {
        true
    }

    fn hessian_defined(&self) -> bool {
        true
    }

    fn value(&self, x: &DVector<f64>) -> Result<f64, Error> {
        Ok(0.5 * x.dot(&(&self.a * x)) + self.b.dot(x) + self.c)
    }

    fn gradient_plain(&self, x: &DVector<f64>, out: &mut DVector<f64>) -> Result<(), Error> {
        out.copy_from(&self.b);
        out.gemv(1.0, &self.a, x, 1.0);
        Ok(())
    }

    fn hessian_plain(&self, _x: &DVector<f64>, out: &mut DMatrix<f64>) -> Result<(), Error> {
        out.copy_from(&self.a);
        Ok(())
    }
}

/// [Rosenbrock function](https://en.wikipedia.org/wiki/Rosenbrock_function)
/// \[1\] of two variables (also known as Rosenbrock's valley or banana
/// function).
///
/// The global minimum `(a, a^2)` is inside a long, narrow, parabolic shaped
/// flat valley.
#[derive(Debug, Clone, Copy)]
pub struct Rosenbrock {
    a: f64,
    b: f64,
}

impl Rosenbrock {
    /// Initializes the function with given coefficients.
    pub fn new(a: f64, b: f64) -> Self {
        Self { a, b }
    }
}

impl Default for Rosenbrock {
    fn default() -> Self {
        Self::new(1.0, 100.0)
    }
}

impl Problem for Rosenbrock {
    fn num_parameters(&self) -> usize {
        2
    }
}

impl ScalarFunction for Rosenbrock {
    fn gradient_defined(&self) -> bool {
        true
    }

    fn hessian_defined(&self) -> bool {
        true
    }

    fn value(&self, x: &DVector<f64>) -> Result<f64, Error> {
        Ok((self.a - x[0]).powi(2) + self.b * (x[1] - x[0].powi(2)).powi(2))
    }

    fn gradient_plain(&self, x: &DVector<f64>, out: &mut DVector<f64>) -> Result<(), Error> {
        let r = x[1] - x[0].powi(2);
        out[0] = -2.0 * (self.a - x[0]) - 4.0 * self.b * x[0] * r;
        out[1] = 2.0 * self.b * r;
        Ok(())
    }

    fn hessian_plain(&self, x: &DVector<f64>, out: &mut DMatrix<f64>) -> Result<(), Error> {
        out[(0, 0)] = 2.0 - 4.0 * self.b * (x[1] - 3.0 * x[0].powi(2));
        out[(0, 1)] = -4.0 * self.b * x[0];
        out[(1, 0)] = out[(0, 1)];
        out[(1, 1)] = 2.0 * self.b;
        Ok(())
    }
}

impl TestProblem for Rosenbrock {
    fn initials(&self) -> Vec<DVector<f64>> {
        vec![dvector![-1.2, 1.0], dvector![6.39, -0.221]]
    }
}

/// Logarithmic barrier `-sum(ln x_i)`, defined only for positive variables.
///
/// Evaluation in a point with a non-positive component fails with a domain
/// error.
#[derive(Debug, Clone, Copy)]
pub struct LogBarrier {
    n: usize,
}

impl LogBarrier {
    /// Initializes the function with given dimension.
    pub fn new(n: usize) -> Self {
        assert!(n > 0, "n must be greater than zero");
        Self { n }
    }

    fn check(&self, x: &DVector<f64>) -> Result<(), Error> {
        match x.iter().position(|xi| *xi <= 0.0) {
            Some(i) => Err(Error::domain(format!(
                "x[{}] = {} is not positive",
                i, x[i]
            ))),
            None => Ok(()),
        }
    }
}

impl Problem for LogBarrier {
    fn num_parameters(&self) -> usize {
        self.n
    }
}

impl ScalarFunction for LogBarrier {
    fn gradient_defined(&self) -> bool {
        true
    }

    fn hessian_defined(&self) -> bool {
        true
    }

    fn value(&self, x: &DVector<f64>) -> Result<f64, Error> {
        self.check(x)?;
        Ok(-x.iter().map(|xi| xi.ln()).sum::<f64>())
    }

    fn gradient_plain(&self, x: &DVector<f64>, out: &mut DVector<f64>) -> Result<(), Error> {
        self.check(x)?;
        out.zip_apply(x, |gi, xi| *gi = -1.0 / xi);
        Ok(())
    }

    fn hessian_plain(&self, x: &DVector<f64>, out: &mut DMatrix<f64>) -> Result<(), Error> {
        self.check(x)?;
        out.fill(0.0);
        out.set_diagonal(&x.map(|xi| 1.0 / (xi * xi)));
        Ok(())
    }
}

/// [Extended Rosenbrock
/// function](https://en.wikipedia.org/wiki/Rosenbrock_function) \[1,2\] as a
/// vector of residuals, evaluated in bulk.
///
/// Each pair of variables `(x1, x2)` contributes residuals `10 (x2 - x1^2)`
/// and `1 - x1`. The function counts its bulk evaluations, which is useful for
/// checking that the results are reused.
#[derive(Debug)]
pub struct ExtendedRosenbrock {
    n: usize,
    alpha: f64,
    evaluations: AtomicUsize,
}

impl ExtendedRosenbrock {
    /// Initializes the function with given dimension.
    ///
    /// The dimension **must** be a multiplier of 2.
    pub fn new(n: usize) -> Self {
        Self::with_scaling(n, 1.0)
    }

    /// Initializes the function with given dimension and scaling factor.
    ///
    /// The dimension **must** be a multiplier of 2. The higher the scaling
    /// factor is, the more difficult the problem is.
    pub fn with_scaling(n: usize, alpha: f64) -> Self {
        assert!(n > 0, "n must be greater than zero");
        assert!(n % 2 == 0, "n must be a multiple of 2");
        assert!(alpha > 0.0, "alpha must be greater than zero");
        Self {
            n,
            alpha,
            evaluations: AtomicUsize::new(0),
        }
    }

    /// Number of bulk evaluations so far.
    pub fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::SeqCst)
    }
}

impl Default for ExtendedRosenbrock {
    fn default() -> Self {
        Self::new(2)
    }
}

impl Problem for ExtendedRosenbrock {
    fn num_parameters(&self) -> usize {
        self.n
    }
}

impl BulkFunction for ExtendedRosenbrock {
    fn num_values(&self) -> Option<usize> {
        Some(self.n)
    }

    fn gradient_defined(&self) -> bool {
        true
    }

    fn hessian_defined(&self) -> bool {
        true
    }

    fn evaluate_bulk(&self, eval: &mut VectorEvaluation) -> Result<(), Error> {
        self.evaluations.fetch_add(1, Ordering::SeqCst);

        let x = eval
            .parameters_shared()
            .ok_or_else(|| Error::InvalidOperation("parameters are not set".to_string()))?;
        let flags = *eval.flags();
        let alpha = self.alpha;

        for i in 0..(self.n / 2) {
            let i1 = 2 * i;
            let i2 = 2 * i + 1;

            let x1 = x[i1] * alpha;
            let x2 = x[i2] / alpha;

            if flags.req_value() {
                eval.set_value(i1, 10.0 * (x2 - x1 * x1))?;
                eval.set_value(i2, 1.0 - x1)?;
            }

            if flags.req_gradient() {
                let g1 = eval.gradient_mut(i1)?;
                g1.fill(0.0);
                g1[i1] = -20.0 * x1 * alpha;
                g1[i2] = 10.0 / alpha;

                let g2 = eval.gradient_mut(i2)?;
                g2.fill(0.0);
                g2[i1] = -alpha;
            }

            if flags.req_hessian() {
                let h1 = eval.hessian_mut(i1)?;
                h1.fill(0.0);
                h1[(i1, i1)] = -20.0 * alpha * alpha;

                eval.hessian_mut(i2)?.fill(0.0);
            }
        }

        eval.set_calculated(true);
        Ok(())
    }
}

impl TestProblem for ExtendedRosenbrock {
    fn initials(&self) -> Vec<DVector<f64>> {
        let init1 = DVector::from_iterator(
            self.n,
            (0..self.n).map(|i| if i % 2 == 0 { -1.2 } else { 1.0 }),
        );

        let init2 = DVector::from_iterator(
            self.n,
            (0..self.n).map(|i| if i % 2 == 0 { 6.39 } else { -0.221 }),
        );

        vec![init1, init2]
    }
}

/// Vector of independent outputs `sin(x_i) + cos(x_{i+1})` (indices wrap
/// around), evaluated component-wise.
#[derive(Debug, Clone, Copy)]
pub struct Trigonometric {
    n: usize,
}

impl Trigonometric {
    /// Initializes the function with given dimension.
    pub fn new(n: usize) -> Self {
        assert!(n > 0, "n must be greater than zero");
        Self { n }
    }

    fn next(&self, which: usize) -> usize {
        (which + 1) % self.n
    }
}

impl Problem for Trigonometric {
    fn num_parameters(&self) -> usize {
        self.n
    }
}

impl ComponentFunction for Trigonometric {
    fn num_values(&self) -> usize {
        self.n
    }

    fn gradient_defined(&self) -> bool {
        true
    }

    fn hessian_defined(&self) -> bool {
        true
    }

    fn component_value(&self, x: &DVector<f64>, which: usize) -> Result<f64, Error> {
        Ok(x[which].sin() + x[self.next(which)].cos())
    }

    fn component_gradient_plain(
        &self,
        x: &DVector<f64>,
        which: usize,
        out: &mut DVector<f64>,
    ) -> Result<(), Error> {
        let next = self.next(which);
        out.fill(0.0);
        out[which] += x[which].cos();
        out[next] -= x[next].sin();
        Ok(())
    }

    fn component_hessian_plain(
        &self,
        x: &DVector<f64>,
        which: usize,
        out: &mut DMatrix<f64>,
    ) -> Result<(), Error> {
        let next = self.next(which);
        out.fill(0.0);
        out[(which, which)] -= x[which].sin();
        out[(next, next)] -= x[next].cos();
        Ok(())
    }
}

impl TestProblem for Trigonometric {
    fn initials(&self) -> Vec<DVector<f64>> {
        vec![DVector::from_fn(self.n, |i, _| 0.1 * (i + 1) as f64)]
    }
}

/// Family of spheres `a * sum((x_i - c)^2)` selected by family parameters
/// `(a, c)`, both of which must be finite.
#[derive(Debug, Clone, Copy)]
pub struct ScaledSphere {
    n: usize,
}

impl ScaledSphere {
    /// Initializes the family with given dimension.
    pub fn new(n: usize) -> Self {
        assert!(n > 0, "n must be greater than zero");
        Self { n }
    }
}

impl FamilyReference for ScaledSphere {
    fn num_parameters(&self) -> usize {
        self.n
    }

    fn num_family_parameters(&self) -> usize {
        2
    }

    fn validate(&self, family: &DVector<f64>) -> Result<(), Error> {
        if family.iter().all(|p| p.is_finite()) {
            Ok(())
        } else {
            Err(Error::InvalidParameter(format!(
                "sphere parameters must be finite, got {:?}",
                family.as_slice()
            )))
        }
    }

    fn gradient_defined(&self) -> bool {
        true
    }

    fn hessian_defined(&self) -> bool {
        true
    }

    fn family_value(&self, x: &DVector<f64>, family: &DVector<f64>) -> Result<f64, Error> {
        let (a, c) = (family[0], family[1]);
        Ok(a * x.iter().map(|xi| (xi - c).powi(2)).sum::<f64>())
    }

    fn family_gradient_plain(
        &self,
        x: &DVector<f64>,
        family: &DVector<f64>,
        out: &mut DVector<f64>,
    ) -> Result<(), Error> {
        let (a, c) = (family[0], family[1]);
        out.zip_apply(x, |gi, xi| *gi = 2.0 * a * (xi - c));
        Ok(())
    }

    fn family_hessian_plain(
        &self,
        _x: &DVector<f64>,
        family: &DVector<f64>,
        out: &mut DMatrix<f64>,
    ) -> Result<(), Error> {
        out.fill(0.0);
        out.fill_diagonal(2.0 * family[0]);
        Ok(())
    }
}

/// Samples `count` points of dimension `n` uniformly from `[low, high)` in
/// each coordinate.
pub fn sample_points<R: Rng + ?Sized>(
    rng: &mut R,
    n: usize,
    count: usize,
    low: f64,
    high: f64,
) -> Vec<DVector<f64>> {
    let uniform = Uniform::new(low, high);
    (0..count)
        .map(|_| DVector::from_fn(n, |_, _| uniform.sample(rng)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derivatives::{Gradient, Hessian};

    use approx::assert_abs_diff_eq;
    use rand::{rngs::StdRng, SeedableRng};

    fn check_derivatives<F: ScalarFunction>(f: &F, points: Vec<DVector<f64>>) {
        let scale = DVector::from_element(f.num_parameters(), 1.0);
        for mut x in points {
            let fx = f.value(&x).unwrap();
            let gradient = f.gradient(&x).unwrap();
            let hessian = f.hessian(&x).unwrap();

            let numeric = Gradient::new(f, &mut x, &scale, fx).unwrap();
            assert_abs_diff_eq!(gradient, *numeric, epsilon = 1e-4 * (1.0 + gradient.norm()));

            let numeric = Hessian::new(f, &mut x, &scale, fx).unwrap();
            assert_abs_diff_eq!(hessian, *numeric, epsilon = 1e-2 * (1.0 + hessian.norm()));
        }
    }

    #[test]
    fn analytic_derivatives_agree() {
        let mut rng = StdRng::seed_from_u64(42);

        check_derivatives(&Quadratic::example(), sample_points(&mut rng, 2, 5, -2.0, 2.0));
        check_derivatives(&Rosenbrock::default(), sample_points(&mut rng, 2, 5, -2.0, 2.0));
        check_derivatives(&LogBarrier::new(3), sample_points(&mut rng, 3, 5, 0.5, 3.0));
    }

    #[test]
    fn sample_points_within_bounds() {
        let mut rng = StdRng::seed_from_u64(1);
        let points = sample_points(&mut rng, 4, 20, -1.0, 2.0);

        assert_eq!(points.len(), 20);
        for x in points {
            assert_eq!(x.len(), 4);
            assert!(x.iter().all(|xi| (-1.0..2.0).contains(xi)));
        }
    }

    #[test]
    fn rosenbrock_minimum() {
        let f = Rosenbrock::default();
        assert_eq!(f.value(&dvector![1.0, 1.0]), Ok(0.0));
        assert_eq!(f.gradient(&dvector![1.0, 1.0]), Ok(dvector![0.0, 0.0]));
    }

    #[test]
    fn log_barrier_outside_domain() {
        let f = LogBarrier::new(2);
        assert!(matches!(
            f.value(&dvector![1.0, 0.0]),
            Err(Error::Evaluation { .. })
        ));
    }
}
