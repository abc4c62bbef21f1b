//! Elementary real functions of one variable.
//!
//! An elementary function implements [`RealFunction`] in its reference form
//! `g(u)`. The [`Real`] wrapper adds an affine change of both the argument
//! and the value,
//!
//! ```text
//! y(x) = y_scale * g(x_scale * x + x_shift) + y_shift
//! ```
//!
//! and exposes the result as a [`ScalarFunction`] of one parameter.
//!
//! ```rust
//! use feval::real::{Exp, Real};
//!
//! // 2 * exp(x - 1) + 3
//! let f = Real::with_affine(Exp, 1.0, -1.0, 2.0, 3.0).unwrap();
//!
//! assert_eq!(f.value(1.0), Ok(5.0));
//! assert_eq!(f.derivative(1.0), Ok(2.0));
//! assert_eq!(f.inverse(5.0), Ok(1.0));
//! ```

use getset::CopyGetters;
use nalgebra::{DMatrix, DVector};

use crate::core::{check_dim, ensure_len, Error, Problem, ScalarFunction};
use crate::parametric::OneParametric;

mod constant;
mod exp;
mod identity;
mod power;

pub use constant::*;
pub use exp::*;
pub use identity::*;
pub use power::*;

/// An elementary function of one variable in its reference form.
///
/// Only the value is required. Other quantities are reported as
/// [`Error::Unsupported`] unless the function overrides them together with
/// the corresponding `*_defined` query.
pub trait RealFunction {
    /// Value in `u`.
    fn ref_value(&self, u: f64) -> Result<f64, Error>;

    /// First derivative in `u`.
    fn ref_derivative(&self, _u: f64) -> Result<f64, Error> {
        Err(Error::unsupported("derivative is not defined"))
    }

    /// Second derivative in `u`.
    fn ref_second_derivative(&self, _u: f64) -> Result<f64, Error> {
        Err(Error::unsupported("second derivative is not defined"))
    }

    /// Definite integral from 0 to `u`.
    fn ref_integral(&self, _u: f64) -> Result<f64, Error> {
        Err(Error::unsupported("integral is not defined"))
    }

    /// Inverse, i.e., the `u` for which `ref_value(u) == v`.
    fn ref_inverse(&self, _v: f64) -> Result<f64, Error> {
        Err(Error::unsupported("inverse is not defined"))
    }

    /// Whether the first derivative can be calculated.
    fn derivative_defined(&self) -> bool {
        false
    }

    /// Whether the second derivative can be calculated.
    fn second_derivative_defined(&self) -> bool {
        false
    }

    /// Whether the integral can be calculated.
    fn integral_defined(&self) -> bool {
        false
    }

    /// Whether the inverse can be calculated.
    fn inverse_defined(&self) -> bool {
        false
    }

    /// Whether the derivative of given order can be calculated. Order 0 is
    /// the value itself.
    fn higher_derivative_defined(&self, order: usize) -> bool {
        match order {
            0 => true,
            1 => self.derivative_defined(),
            2 => self.second_derivative_defined(),
            _ => false,
        }
    }
}

/// Turns a non-finite result of a formula into an evaluation failure.
pub(crate) fn finite(value: f64, what: &str) -> Result<f64, Error> {
    if value.is_nan() {
        Err(Error::domain(format!("{} is not a number", what)))
    } else if value.is_infinite() {
        Err(Error::overflow(format!("{} overflows", what)))
    } else {
        Ok(value)
    }
}

/// Elementary function with an affine change of the argument and the value.
#[derive(Debug, Clone, CopyGetters)]
pub struct Real<F> {
    f: F,
    /// Scale of the argument.
    #[getset(get_copy = "pub")]
    x_scale: f64,
    /// Shift of the argument.
    #[getset(get_copy = "pub")]
    x_shift: f64,
    /// Scale of the value.
    #[getset(get_copy = "pub")]
    y_scale: f64,
    /// Shift of the value.
    #[getset(get_copy = "pub")]
    y_shift: f64,
}

impl<F: RealFunction> Real<F> {
    /// Wraps the function without any change of the argument or the value.
    pub fn new(f: F) -> Self {
        Self {
            f,
            x_scale: 1.0,
            x_shift: 0.0,
            y_scale: 1.0,
            y_shift: 0.0,
        }
    }

    /// Wraps the function with given affine change. Both scales must be
    /// finite and nonzero, both shifts finite.
    pub fn with_affine(
        f: F,
        x_scale: f64,
        x_shift: f64,
        y_scale: f64,
        y_shift: f64,
    ) -> Result<Self, Error> {
        let mut real = Self::new(f);
        real.set_affine(x_scale, x_shift, y_scale, y_shift)?;
        Ok(real)
    }

    /// Changes the affine change of the argument and the value.
    pub fn set_affine(
        &mut self,
        x_scale: f64,
        x_shift: f64,
        y_scale: f64,
        y_shift: f64,
    ) -> Result<(), Error> {
        if [x_scale, x_shift, y_scale, y_shift]
            .iter()
            .any(|v| !v.is_finite())
        {
            return Err(Error::InvalidParameter(
                "affine coefficients must be finite".to_string(),
            ));
        }

        if x_scale == 0.0 || y_scale == 0.0 {
            return Err(Error::InvalidParameter(
                "scales must be nonzero".to_string(),
            ));
        }

        self.x_scale = x_scale;
        self.x_shift = x_shift;
        self.y_scale = y_scale;
        self.y_shift = y_shift;
        Ok(())
    }

    /// The function in its reference form.
    pub fn inner(&self) -> &F {
        &self.f
    }

    /// Mutable access to the function in its reference form.
    pub fn inner_mut(&mut self) -> &mut F {
        &mut self.f
    }

    fn reference(&self, x: f64) -> f64 {
        self.x_scale * x + self.x_shift
    }

    /// Value in `x`.
    pub fn value(&self, x: f64) -> Result<f64, Error> {
        Ok(self.y_scale * self.f.ref_value(self.reference(x))? + self.y_shift)
    }

    /// First derivative in `x`.
    pub fn derivative(&self, x: f64) -> Result<f64, Error> {
        Ok(self.y_scale * self.x_scale * self.f.ref_derivative(self.reference(x))?)
    }

    /// Second derivative in `x`.
    pub fn second_derivative(&self, x: f64) -> Result<f64, Error> {
        let u = self.reference(x);
        Ok(self.y_scale * self.x_scale * self.x_scale * self.f.ref_second_derivative(u)?)
    }

    /// Definite integral from 0 to `x`.
    pub fn integral(&self, x: f64) -> Result<f64, Error> {
        let upper = self.f.ref_integral(self.reference(x))?;
        let lower = self.f.ref_integral(self.x_shift)?;
        Ok(self.y_scale / self.x_scale * (upper - lower) + self.y_shift * x)
    }

    /// The `x` for which `value(x) == y`.
    ///
    /// The result is not gated by [`RealFunction::inverse_defined`], a
    /// function may still invert isolated values (such as a constant
    /// function in its only value).
    pub fn inverse(&self, y: f64) -> Result<f64, Error> {
        let u = self.f.ref_inverse((y - self.y_shift) / self.y_scale)?;
        Ok((u - self.x_shift) / self.x_scale)
    }
}

impl<F: RealFunction> Problem for Real<F> {
    fn num_parameters(&self) -> usize {
        1
    }
}

impl<F: RealFunction> ScalarFunction for Real<F> {
    fn gradient_defined(&self) -> bool {
        self.f.derivative_defined()
    }

    fn hessian_defined(&self) -> bool {
        self.f.second_derivative_defined()
    }

    fn value(&self, x: &DVector<f64>) -> Result<f64, Error> {
        check_dim(1, x.len())?;
        Real::value(self, x[0])
    }

    fn gradient_plain(&self, x: &DVector<f64>, out: &mut DVector<f64>) -> Result<(), Error> {
        check_dim(1, x.len())?;
        let derivative = self.derivative(x[0])?;
        ensure_len(out, 1);
        out[0] = derivative;
        Ok(())
    }

    fn hessian_plain(&self, x: &DVector<f64>, out: &mut DMatrix<f64>) -> Result<(), Error> {
        check_dim(1, x.len())?;
        let second_derivative = self.second_derivative(x[0])?;
        if out.shape() != (1, 1) {
            *out = DMatrix::zeros(1, 1);
        }
        out[(0, 0)] = second_derivative;
        Ok(())
    }
}

impl<F: OneParametric> OneParametric for Real<F> {
    fn param(&self) -> f64 {
        self.f.param()
    }

    fn set_param(&mut self, value: f64) -> Result<(), Error> {
        self.f.set_param(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AffineTransform, Evaluation, ScalarEvaluation, TransformedFunction};
    use crate::derivatives::{Gradient, Hessian};

    use std::sync::Arc;

    use approx::assert_abs_diff_eq;
    use nalgebra::dvector;

    #[test]
    fn plain_outputs_are_resized() {
        let f = Real::with_affine(Exp, 2.0, 0.0, 1.0, 0.0).unwrap();
        let x = dvector![0.0];

        let mut gradient = DVector::zeros(0);
        f.gradient_plain(&x, &mut gradient).unwrap();
        assert_eq!(gradient, dvector![2.0]);

        let mut hessian = DMatrix::zeros(3, 2);
        f.hessian_plain(&x, &mut hessian).unwrap();
        assert_eq!(hessian.shape(), (1, 1));
        assert_abs_diff_eq!(hessian[(0, 0)], 4.0);
    }

    #[test]
    fn exp_edge_cases() {
        let f = Real::with_affine(Exp, 1.0, 0.0, 1.0, 0.0).unwrap();
        assert_eq!(f.value(0.0), Ok(1.0));
        assert_eq!(f.inverse(0.0), Ok(f64::NEG_INFINITY));
        assert!(matches!(
            f.inverse(-1.0),
            Err(Error::Evaluation { .. })
        ));
    }

    #[test]
    fn reciprocal_power_edge_cases() {
        let f = Real::new(ReciprocalPower::new(2.0).unwrap());
        assert_eq!(f.value(2.0), Ok(0.25));
        assert_eq!(f.derivative(2.0), Ok(-0.25));
        assert_eq!(f.inner().ref_inverse(0.0), Ok(f64::NEG_INFINITY));
    }

    #[test]
    fn constant_edge_cases() {
        let f = Real::new(Constant::new(5.0).unwrap());
        assert_eq!(f.inverse(5.0), Ok(0.0));
        assert!(f.inverse(3.0).is_err());
        assert!(!f.inner().inverse_defined());
    }

    #[test]
    fn identity_edge_cases() {
        let f = Real::new(Identity);
        assert_eq!(f.integral(4.0), Ok(8.0));
        assert_eq!(f.inverse(-3.0), Ok(-3.0));
    }

    #[test]
    fn affine_change_applies() {
        // 2 * exp(3x + 1) - 1
        let f = Real::with_affine(Exp, 3.0, 1.0, 2.0, -1.0).unwrap();
        let x = 0.2f64;
        let e = (3.0 * x + 1.0).exp();

        assert_abs_diff_eq!(f.value(x).unwrap(), 2.0 * e - 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(f.derivative(x).unwrap(), 6.0 * e, epsilon = 1e-12);
        assert_abs_diff_eq!(f.second_derivative(x).unwrap(), 18.0 * e, epsilon = 1e-11);
        assert_abs_diff_eq!(f.inverse(2.0 * e - 1.0).unwrap(), x, epsilon = 1e-12);

        let expected = 2.0 / 3.0 * (e - 1.0f64.exp()) - x;
        assert_abs_diff_eq!(f.integral(x).unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn invalid_affine_rejected() {
        assert!(matches!(
            Real::with_affine(Identity, 0.0, 0.0, 1.0, 0.0),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            Real::with_affine(Identity, 1.0, f64::NAN, 1.0, 0.0),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn higher_derivatives_reported() {
        assert!(Exp.higher_derivative_defined(0));
        assert!(Exp.higher_derivative_defined(2));
        assert!(!Exp.higher_derivative_defined(3));
        assert!(!Constant::new(1.0).unwrap().inverse_defined());
        assert!(!ReciprocalPower::new(2.0).unwrap().integral_defined());
        assert!(ReciprocalPower::new(0.5).unwrap().integral_defined());
    }

    #[test]
    fn scalar_function_matches_finite_differences() {
        let f = Real::with_affine(Power::new(3.0).unwrap(), 0.5, 1.0, -2.0, 0.5).unwrap();
        let mut x = dvector![1.3];
        let scale = dvector![1.0];

        let fx = ScalarFunction::value(&f, &x).unwrap();
        let analytic = f.gradient(&x).unwrap();
        let numeric = Gradient::new(&f, &mut x, &scale, fx).unwrap();
        assert_abs_diff_eq!(analytic, *numeric, epsilon = 1e-6);

        let analytic = f.hessian(&x).unwrap();
        let numeric = Hessian::new(&f, &mut x, &scale, fx).unwrap();
        assert_abs_diff_eq!(analytic, *numeric, epsilon = 1e-3);
    }

    #[test]
    fn evaluation_records_domain_failure() {
        let f = Real::new(ReciprocalPower::new(0.5).unwrap());
        let mut eval = ScalarEvaluation::new(1)
            .with_request(true, true, false)
            .with_parameters(&dvector![-4.0])
            .unwrap();

        f.evaluate(&mut eval).unwrap();
        assert!(!eval.calculated());
        assert_eq!(eval.error_code(), crate::core::ERROR_DOMAIN);
    }

    #[test]
    fn transform_agrees_with_affine_argument() {
        // exp((x - 1) / 2) both ways
        let transform = Arc::new(AffineTransform::one_dim(2.0, 1.0).unwrap());
        let transformed = TransformedFunction::new(Real::new(Exp), Some(transform)).unwrap();
        let direct = Real::with_affine(Exp, 0.5, -0.5, 1.0, 0.0).unwrap();

        for x in [-1.0, 0.0, 0.5, 3.0] {
            let point = dvector![x];
            assert_abs_diff_eq!(
                transformed.value(&point).unwrap(),
                direct.value(x).unwrap(),
                epsilon = 1e-12
            );
            assert_abs_diff_eq!(
                transformed.gradient(&point).unwrap()[0],
                direct.derivative(x).unwrap(),
                epsilon = 1e-12
            );
            assert_abs_diff_eq!(
                transformed.hessian(&point).unwrap()[(0, 0)],
                direct.second_derivative(x).unwrap(),
                epsilon = 1e-12
            );
        }
    }
}
