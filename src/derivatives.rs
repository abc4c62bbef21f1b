//! Finite difference approximations of derivatives.
//!
//! Useful for functions that do not implement their gradient or Hessian, and
//! for checking the analytic ones.

use std::ops::Deref;

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

use crate::core::{Error, ScalarFunction, VectorFunction};

/// Square root of double precision machine epsilon. This value is a standard
/// constant for epsilons in approximating first-order derivate-based concepts.
pub const EPSILON_SQRT: f64 = 0.000000014901161193847656;

/// Cubic root of double precision machine epsilon. This value is a standard
/// constant for epsilons in approximating second-order derivate-based concepts.
pub const EPSILON_CBRT: f64 = 0.0000060554544523933395;

/// Step size for variable `x` with typical magnitude `1 / scale`.
///
/// We would like to have the step as small as possible (to be as close to
/// the real derivative as possible). But at the same time, very small step
/// could cause f(x + step) ~= f(x) with very small number of good digits.
///
/// A reasonable way to balance these competing needs is to scale the step by
/// x itself. To avoid problems when x is close to zero, it is modified to take
/// the typical magnitude instead.
fn step(eps: f64, x: f64, scale: f64) -> f64 {
    let magnitude = 1.0 / scale;
    let step = eps * x.abs().max(magnitude) * 1f64.copysign(x);
    if step == 0.0 {
        eps
    } else {
        step
    }
}

/// Error when computing the Jacobian matrix.
#[derive(Debug, Error)]
pub enum JacobianError {
    /// Error that occurred when evaluating the function.
    #[error("{0}")]
    Function(#[from] Error),
}

/// Jacobian matrix of a vector function. Row `i` is the gradient of output
/// `i`.
#[derive(Debug)]
pub struct Jacobian {
    jac: DMatrix<f64>,
}

impl Jacobian {
    /// Initializes the Jacobian matrix with zeros.
    pub fn zeros(num_values: usize, num_parameters: usize) -> Self {
        Self {
            jac: DMatrix::zeros(num_values, num_parameters),
        }
    }

    /// Compute the Jacobian matrix of the function in given point with given
    /// scale of variables. See [`compute`](Jacobian::compute) for more
    /// details.
    pub fn new<F: VectorFunction>(
        f: &F,
        x: &mut DVector<f64>,
        scale: &DVector<f64>,
        fx: &DVector<f64>,
    ) -> Result<Self, JacobianError> {
        let mut jac = Self::zeros(fx.len(), x.len());
        jac.compute(f, x, scale, fx)?;
        Ok(jac)
    }

    /// Compute the Jacobian matrix of the function in given point with given
    /// scale of variables. The values `fx` in the point must be given.
    ///
    /// The parameter `x` is mutable to allow temporary mutations avoiding
    /// unnecessary allocations, but after this method ends, the content of the
    /// vector is exactly the same as before.
    ///
    /// Information about variable scale is useful for problematic cases of
    /// finite differentiation (e.g., when the value is near zero).
    pub fn compute<F: VectorFunction>(
        &mut self,
        f: &F,
        x: &mut DVector<f64>,
        scale: &DVector<f64>,
        fx: &DVector<f64>,
    ) -> Result<&mut Self, JacobianError> {
        for (j, mut col) in self.jac.column_iter_mut().enumerate() {
            let xj = x[j];
            let step = step(EPSILON_SQRT, xj, scale[j]);

            x[j] = xj + step;
            let result = f.values_at(x);

            // Restore the original value before propagating the error.
            x[j] = xj;

            // J[i, j] = (F(x + e_j * step_j) - F(x)) / step_j.
            col.copy_from(&result?);
            col -= fx;
            col /= step;
        }

        Ok(self)
    }
}

impl Deref for Jacobian {
    type Target = DMatrix<f64>;

    fn deref(&self) -> &Self::Target {
        &self.jac
    }
}

/// Error when computing the gradient vector.
#[derive(Debug, Error)]
pub enum GradientError {
    /// Error that occurred when evaluating the function.
    #[error("{0}")]
    Function(#[from] Error),
}

/// Gradient vector of a scalar function.
#[derive(Debug)]
pub struct Gradient {
    grad: DVector<f64>,
}

impl Gradient {
    /// Initializes the gradient vector with zeros.
    pub fn zeros(num_parameters: usize) -> Self {
        Self {
            grad: DVector::zeros(num_parameters),
        }
    }

    /// Compute the gradient vector of the function in given point with given
    /// scale of variables. See [`compute`](Gradient::compute) for more
    /// details.
    pub fn new<F: ScalarFunction>(
        f: &F,
        x: &mut DVector<f64>,
        scale: &DVector<f64>,
        fx: f64,
    ) -> Result<Self, GradientError> {
        let mut grad = Self::zeros(x.len());
        grad.compute(f, x, scale, fx)?;
        Ok(grad)
    }

    /// Compute the gradient vector of the function in given point with given
    /// scale of variables. The value `fx` in the point must be given.
    ///
    /// The parameter `x` is mutable to allow temporary mutations avoiding
    /// unnecessary allocations, but after this method ends, the content of the
    /// vector is exactly the same as before.
    pub fn compute<F: ScalarFunction>(
        &mut self,
        f: &F,
        x: &mut DVector<f64>,
        scale: &DVector<f64>,
        fx: f64,
    ) -> Result<&mut Self, GradientError> {
        for i in 0..x.len() {
            let xi = x[i];
            let step = step(EPSILON_SQRT, xi, scale[i]);

            x[i] = xi + step;
            let fxi = f.value(x);
            x[i] = xi;

            // grad[i] = (f(x + e_i * step_i) - f(x)) / step_i.
            self.grad[i] = (fxi? - fx) / step;
        }

        Ok(self)
    }
}

impl Deref for Gradient {
    type Target = DVector<f64>;

    fn deref(&self) -> &Self::Target {
        &self.grad
    }
}

/// Error when computing the Hessian matrix.
#[derive(Debug, Error)]
pub enum HessianError {
    /// Error that occurred when evaluating the function.
    #[error("{0}")]
    Function(#[from] Error),
}

/// Hessian matrix of a scalar function.
#[derive(Debug)]
pub struct Hessian {
    hes: DMatrix<f64>,
    steps: DVector<f64>,
    neighbors: DVector<f64>,
}

impl Hessian {
    /// Initializes the Hessian matrix with zeros.
    pub fn zeros(num_parameters: usize) -> Self {
        Self {
            hes: DMatrix::zeros(num_parameters, num_parameters),
            steps: DVector::zeros(num_parameters),
            neighbors: DVector::zeros(num_parameters),
        }
    }

    /// Compute the Hessian matrix of the function in given point with given
    /// scale of variables. See [`compute`](Hessian::compute) for more
    /// details.
    pub fn new<F: ScalarFunction>(
        f: &F,
        x: &mut DVector<f64>,
        scale: &DVector<f64>,
        fx: f64,
    ) -> Result<Self, HessianError> {
        let mut hes = Self::zeros(x.len());
        hes.compute(f, x, scale, fx)?;
        Ok(hes)
    }

    /// Compute the Hessian matrix of the function in given point with given
    /// scale of variables. The value `fx` in the point must be given.
    ///
    /// The parameter `x` is mutable to allow temporary mutations avoiding
    /// unnecessary allocations, but after this method ends, the content of the
    /// vector is exactly the same as before.
    pub fn compute<F: ScalarFunction>(
        &mut self,
        f: &F,
        x: &mut DVector<f64>,
        scale: &DVector<f64>,
        fx: f64,
    ) -> Result<&mut Self, HessianError> {
        let n = x.len();
        let original = x.clone();

        let result = self.compute_inner(f, x, scale, fx, n);
        if result.is_err() {
            x.copy_from(&original);
        }
        result?;

        Ok(self)
    }

    fn compute_inner<F: ScalarFunction>(
        &mut self,
        f: &F,
        x: &mut DVector<f64>,
        scale: &DVector<f64>,
        fx: f64,
        n: usize,
    ) -> Result<(), Error> {
        for i in 0..n {
            let xi = x[i];
            let step = step(EPSILON_CBRT, xi, scale[i]);

            // Store the step for Hessian calculation.
            self.steps[i] = step;

            // Update the point and store the function output.
            x[i] = xi + step;
            self.neighbors[i] = f.value(x)?;
            x[i] = xi;
        }

        for i in 0..n {
            let xi = x[i];
            let stepi = self.steps[i];

            // Prepare x_i + 2 * e_i.
            x[i] = xi + stepi + stepi;

            let fxi = f.value(x)?;
            let fni = self.neighbors[i];

            x[i] = xi + stepi;

            self.hes[(i, i)] = ((fx - fni) + (fxi - fni)) / (stepi * stepi);

            for j in (i + 1)..n {
                let xj = x[j];
                let stepj = self.steps[j];

                x[j] = xj + stepj;

                let fxj = f.value(x)?;
                let fnj = self.neighbors[j];

                let hij = ((fx - fni) + (fxj - fnj)) / (stepi * stepj);
                self.hes[(i, j)] = hij;
                self.hes[(j, i)] = hij;

                x[j] = xj;
            }

            x[i] = xi;
        }

        Ok(())
    }
}

impl Deref for Hessian {
    type Target = DMatrix<f64>;

    fn deref(&self) -> &Self::Target {
        &self.hes
    }
}
