use approx::relative_eq;

use super::RealFunction;
use crate::core::Error;
use crate::parametric::OneParametric;

/// Constant function `c`.
///
/// The inverse is not defined in general. As a convention,
/// [`ref_inverse`](RealFunction::ref_inverse) maps the constant itself to
/// zero and fails for any other value.
#[derive(Debug, Clone, Copy, Default)]
pub struct Constant {
    c: f64,
}

impl Constant {
    /// Initializes the function with given constant, which must be finite.
    pub fn new(c: f64) -> Result<Self, Error> {
        let mut f = Self { c: 0.0 };
        f.set_param(c)?;
        Ok(f)
    }
}

impl OneParametric for Constant {
    fn param(&self) -> f64 {
        self.c
    }

    fn set_param(&mut self, value: f64) -> Result<(), Error> {
        if !value.is_finite() {
            return Err(Error::InvalidParameter(format!(
                "constant must be finite, got {}",
                value
            )));
        }

        self.c = value;
        Ok(())
    }
}

impl RealFunction for Constant {
    fn ref_value(&self, _u: f64) -> Result<f64, Error> {
        Ok(self.c)
    }

    fn ref_derivative(&self, _u: f64) -> Result<f64, Error> {
        Ok(0.0)
    }

    fn ref_second_derivative(&self, _u: f64) -> Result<f64, Error> {
        Ok(0.0)
    }

    fn ref_integral(&self, u: f64) -> Result<f64, Error> {
        Ok(self.c * u)
    }

    fn ref_inverse(&self, v: f64) -> Result<f64, Error> {
        if relative_eq!(v, self.c) {
            Ok(0.0)
        } else {
            Err(Error::domain(format!("constant {} never attains {}", self.c, v)))
        }
    }

    fn derivative_defined(&self) -> bool {
        true
    }

    fn second_derivative_defined(&self) -> bool {
        true
    }

    fn integral_defined(&self) -> bool {
        true
    }

    fn higher_derivative_defined(&self, _order: usize) -> bool {
        true
    }
}
