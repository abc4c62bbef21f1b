use super::{finite, RealFunction};
use crate::core::Error;

/// Exponential function `e^u`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Exp;

impl RealFunction for Exp {
    fn ref_value(&self, u: f64) -> Result<f64, Error> {
        finite(u.exp(), "exp")
    }

    fn ref_derivative(&self, u: f64) -> Result<f64, Error> {
        self.ref_value(u)
    }

    fn ref_second_derivative(&self, u: f64) -> Result<f64, Error> {
        self.ref_value(u)
    }

    fn ref_integral(&self, u: f64) -> Result<f64, Error> {
        Ok(self.ref_value(u)? - 1.0)
    }

    /// Natural logarithm. The inverse of zero is negative infinity, negative
    /// values are outside of the range.
    fn ref_inverse(&self, v: f64) -> Result<f64, Error> {
        if v < 0.0 || v.is_nan() {
            Err(Error::domain(format!("exp never attains {}", v)))
        } else {
            Ok(v.ln())
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

    fn inverse_defined(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_is_reported() {
        assert!(matches!(
            Exp.ref_value(1000.0),
            Err(Error::Evaluation {
                code: crate::core::ERROR_OVERFLOW,
                ..
            })
        ));
    }

    #[test]
    fn inverse_of_zero() {
        assert_eq!(Exp.ref_inverse(0.0), Ok(f64::NEG_INFINITY));
        assert_eq!(Exp.ref_inverse(1.0), Ok(0.0));
    }
}
