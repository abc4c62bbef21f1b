use super::RealFunction;
use crate::core::Error;

/// Identity function `u`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl RealFunction for Identity {
    fn ref_value(&self, u: f64) -> Result<f64, Error> {
        Ok(u)
    }

    fn ref_derivative(&self, _u: f64) -> Result<f64, Error> {
        Ok(1.0)
    }

    fn ref_second_derivative(&self, _u: f64) -> Result<f64, Error> {
        Ok(0.0)
    }

    fn ref_integral(&self, u: f64) -> Result<f64, Error> {
        Ok(0.5 * u * u)
    }

    fn ref_inverse(&self, v: f64) -> Result<f64, Error> {
        Ok(v)
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

    fn higher_derivative_defined(&self, _order: usize) -> bool {
        true
    }
}
