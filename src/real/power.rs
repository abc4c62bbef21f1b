use super::{finite, RealFunction};
use crate::core::Error;
use crate::parametric::OneParametric;

/// Power function `u^p`.
#[derive(Debug, Clone, Copy)]
pub struct Power {
    p: f64,
}

impl Power {
    /// Initializes the function with given exponent, which must be finite.
    pub fn new(p: f64) -> Result<Self, Error> {
        let mut f = Self { p: 1.0 };
        f.set_param(p)?;
        Ok(f)
    }

    fn is_odd_integer(&self) -> bool {
        self.p.fract() == 0.0 && self.p % 2.0 != 0.0
    }
}

impl OneParametric for Power {
    fn param(&self) -> f64 {
        self.p
    }

    fn set_param(&mut self, value: f64) -> Result<(), Error> {
        if !value.is_finite() {
            return Err(Error::InvalidParameter(format!(
                "exponent must be finite, got {}",
                value
            )));
        }

        self.p = value;
        Ok(())
    }
}

impl RealFunction for Power {
    fn ref_value(&self, u: f64) -> Result<f64, Error> {
        finite(u.powf(self.p), "power")
    }

    fn ref_derivative(&self, u: f64) -> Result<f64, Error> {
        if self.p == 0.0 {
            return Ok(0.0);
        }

        finite(self.p * u.powf(self.p - 1.0), "derivative of power")
    }

    fn ref_second_derivative(&self, u: f64) -> Result<f64, Error> {
        if self.p == 0.0 || self.p == 1.0 {
            return Ok(0.0);
        }

        finite(
            self.p * (self.p - 1.0) * u.powf(self.p - 2.0),
            "second derivative of power",
        )
    }

    fn ref_integral(&self, u: f64) -> Result<f64, Error> {
        if !self.integral_defined() {
            return Err(Error::unsupported(format!(
                "integral of power {} from zero diverges",
                self.p
            )));
        }

        let q = self.p + 1.0;
        finite(u.powf(q) / q, "integral of power")
    }

    fn ref_inverse(&self, v: f64) -> Result<f64, Error> {
        if !self.inverse_defined() {
            return Err(Error::unsupported("inverse of constant power"));
        }

        if v < 0.0 {
            if self.is_odd_integer() {
                return finite(-(-v).powf(1.0 / self.p), "inverse of power");
            }

            return Err(Error::domain(format!("power {} never attains {}", self.p, v)));
        }

        finite(v.powf(1.0 / self.p), "inverse of power")
    }

    fn derivative_defined(&self) -> bool {
        true
    }

    fn second_derivative_defined(&self) -> bool {
        true
    }

    fn integral_defined(&self) -> bool {
        self.p > -1.0
    }

    fn inverse_defined(&self) -> bool {
        self.p != 0.0
    }
}

/// Reciprocal power function `u^(-p)` for `p > 0`.
#[derive(Debug, Clone, Copy)]
pub struct ReciprocalPower {
    p: f64,
}

impl ReciprocalPower {
    /// Initializes the function with given power, which must be positive and
    /// finite.
    pub fn new(p: f64) -> Result<Self, Error> {
        let mut f = Self { p: 1.0 };
        f.set_param(p)?;
        Ok(f)
    }
}

impl OneParametric for ReciprocalPower {
    fn param(&self) -> f64 {
        self.p
    }

    fn set_param(&mut self, value: f64) -> Result<(), Error> {
        if !(value.is_finite() && value > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "reciprocal power must be positive, got {}",
                value
            )));
        }

        self.p = value;
        Ok(())
    }
}

impl RealFunction for ReciprocalPower {
    fn ref_value(&self, u: f64) -> Result<f64, Error> {
        finite(u.powf(-self.p), "reciprocal power")
    }

    fn ref_derivative(&self, u: f64) -> Result<f64, Error> {
        finite(
            -self.p * u.powf(-self.p - 1.0),
            "derivative of reciprocal power",
        )
    }

    fn ref_second_derivative(&self, u: f64) -> Result<f64, Error> {
        finite(
            self.p * (self.p + 1.0) * u.powf(-self.p - 2.0),
            "second derivative of reciprocal power",
        )
    }

    fn ref_integral(&self, u: f64) -> Result<f64, Error> {
        if !self.integral_defined() {
            return Err(Error::unsupported(format!(
                "integral of reciprocal power {} from zero diverges",
                self.p
            )));
        }

        let q = 1.0 - self.p;
        finite(u.powf(q) / q, "integral of reciprocal power")
    }

    /// The inverse of zero is negative infinity, negative values are outside
    /// of the range.
    fn ref_inverse(&self, v: f64) -> Result<f64, Error> {
        if v == 0.0 {
            Ok(f64::NEG_INFINITY)
        } else if v < 0.0 || v.is_nan() {
            Err(Error::domain(format!(
                "reciprocal power {} never attains {}",
                self.p, v
            )))
        } else {
            finite(v.powf(-1.0 / self.p), "inverse of reciprocal power")
        }
    }

    fn derivative_defined(&self) -> bool {
        true
    }

    fn second_derivative_defined(&self) -> bool {
        true
    }

    fn integral_defined(&self) -> bool {
        self.p < 1.0
    }

    fn inverse_defined(&self) -> bool {
        true
    }
}
