//! Families of functions selected by a vector of family parameters.
//!
//! A family is any type implementing [`Parametric`]. Families with exactly
//! one parameter implement the simpler [`OneParametric`] trait instead and
//! get [`Parametric`] for free.
//!
//! The family parameters are not the parameters (variables) of the function.
//! For the family `f(x; a) = x^a`, `x` is the variable and `a` is the family
//! parameter.

use nalgebra::{DMatrix, DVector};

use crate::core::{check_dim, check_index, Error, Problem, ScalarFunction};

/// A family of functions selected by a vector of parameters.
pub trait Parametric {
    /// Number of family parameters.
    fn num_family_parameters(&self) -> usize;

    /// Current family parameters.
    fn parameters(&self) -> DVector<f64>;

    /// Selects a member of the family. Fails with
    /// [`Error::DimensionMismatch`] if the length is wrong and with
    /// [`Error::InvalidParameter`] if the values are outside of the valid
    /// range of the family.
    fn set_parameters(&mut self, parameters: &DVector<f64>) -> Result<(), Error>;

    /// A single family parameter.
    fn parameter(&self, i: usize) -> Result<f64, Error> {
        check_index(i, self.num_family_parameters())?;
        Ok(self.parameters()[i])
    }

    /// Sets a single family parameter.
    fn set_parameter(&mut self, i: usize, value: f64) -> Result<(), Error> {
        check_index(i, self.num_family_parameters())?;
        let mut parameters = self.parameters();
        parameters[i] = value;
        self.set_parameters(&parameters)
    }
}

/// A family of functions with a single parameter.
pub trait OneParametric {
    /// The family parameter.
    fn param(&self) -> f64;

    /// Sets the family parameter. Fails with [`Error::InvalidParameter`] if
    /// the value is outside of the valid range of the family.
    fn set_param(&mut self, value: f64) -> Result<(), Error>;
}

impl<T: OneParametric> Parametric for T {
    fn num_family_parameters(&self) -> usize {
        1
    }

    fn parameters(&self) -> DVector<f64> {
        DVector::from_element(1, self.param())
    }

    fn set_parameters(&mut self, parameters: &DVector<f64>) -> Result<(), Error> {
        check_dim(1, parameters.len())?;
        self.set_param(parameters[0])
    }

    fn parameter(&self, i: usize) -> Result<f64, Error> {
        check_index(i, 1)?;
        Ok(self.param())
    }

    fn set_parameter(&mut self, i: usize, value: f64) -> Result<(), Error> {
        check_index(i, 1)?;
        self.set_param(value)
    }
}

/// Formula of a parametric family, evaluated for explicitly given family
/// parameters. Wrap it in [`ParametricFunction`] to get a scalar function.
pub trait FamilyReference {
    /// Number of variables of the members.
    fn num_parameters(&self) -> usize;

    /// Number of family parameters.
    fn num_family_parameters(&self) -> usize;

    /// Checks that the family parameters select a valid member. The length is
    /// checked by the caller.
    fn validate(&self, _family: &DVector<f64>) -> Result<(), Error> {
        Ok(())
    }

    /// Whether the gradient of the members can be calculated.
    fn gradient_defined(&self) -> bool {
        false
    }

    /// Whether the Hessian of the members can be calculated.
    fn hessian_defined(&self) -> bool {
        false
    }

    /// Value of the member selected by `family` in point `x`.
    fn family_value(&self, x: &DVector<f64>, family: &DVector<f64>) -> Result<f64, Error>;

    /// Gradient of the member selected by `family` in point `x`.
    fn family_gradient_plain(
        &self,
        _x: &DVector<f64>,
        _family: &DVector<f64>,
        _out: &mut DVector<f64>,
    ) -> Result<(), Error> {
        Err(Error::unsupported("gradient is not defined"))
    }

    /// Hessian of the member selected by `family` in point `x`.
    fn family_hessian_plain(
        &self,
        _x: &DVector<f64>,
        _family: &DVector<f64>,
        _out: &mut DMatrix<f64>,
    ) -> Result<(), Error> {
        Err(Error::unsupported("hessian is not defined"))
    }
}

/// A member of a parametric family, usable as a [`ScalarFunction`].
#[derive(Debug, Clone)]
pub struct ParametricFunction<R> {
    reference: R,
    family: DVector<f64>,
}

impl<R: FamilyReference> ParametricFunction<R> {
    /// Selects the member of the family given by `family` parameters.
    pub fn new(reference: R, family: DVector<f64>) -> Result<Self, Error> {
        check_dim(reference.num_family_parameters(), family.len())?;
        reference.validate(&family)?;
        Ok(Self { reference, family })
    }

    /// The formula of the family.
    pub fn reference(&self) -> &R {
        &self.reference
    }
}

impl<R: FamilyReference> Parametric for ParametricFunction<R> {
    fn num_family_parameters(&self) -> usize {
        self.reference.num_family_parameters()
    }

    fn parameters(&self) -> DVector<f64> {
        self.family.clone()
    }

    fn set_parameters(&mut self, parameters: &DVector<f64>) -> Result<(), Error> {
        check_dim(self.reference.num_family_parameters(), parameters.len())?;
        self.reference.validate(parameters)?;
        self.family.copy_from(parameters);
        Ok(())
    }

    fn parameter(&self, i: usize) -> Result<f64, Error> {
        check_index(i, self.family.len())?;
        Ok(self.family[i])
    }
}

impl<R: FamilyReference> Problem for ParametricFunction<R> {
    fn num_parameters(&self) -> usize {
        self.reference.num_parameters()
    }
}

impl<R: FamilyReference> ScalarFunction for ParametricFunction<R> {
    fn gradient_defined(&self) -> bool {
        self.reference.gradient_defined()
    }

    fn hessian_defined(&self) -> bool {
        self.reference.hessian_defined()
    }

    fn value(&self, x: &DVector<f64>) -> Result<f64, Error> {
        check_dim(self.num_parameters(), x.len())?;
        self.reference.family_value(x, &self.family)
    }

    fn gradient_plain(&self, x: &DVector<f64>, out: &mut DVector<f64>) -> Result<(), Error> {
        check_dim(self.num_parameters(), x.len())?;
        self.reference.family_gradient_plain(x, &self.family, out)
    }

    fn hessian_plain(&self, x: &DVector<f64>, out: &mut DMatrix<f64>) -> Result<(), Error> {
        check_dim(self.num_parameters(), x.len())?;
        self.reference.family_hessian_plain(x, &self.family, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Evaluation, ScalarEvaluation};
    use crate::derivatives::Gradient;
    use crate::real::{Power, ReciprocalPower, Real};
    use crate::testing::ScaledSphere;

    use approx::assert_abs_diff_eq;
    use nalgebra::dvector;

    #[test]
    fn one_parametric_dimension_checked() {
        let mut f = ReciprocalPower::new(2.0).unwrap();
        assert_eq!(f.num_family_parameters(), 1);
        assert_eq!(f.parameters(), dvector![2.0]);

        assert_eq!(
            f.set_parameters(&dvector![1.0, 2.0]),
            Err(Error::DimensionMismatch {
                expected: 1,
                actual: 2
            })
        );
        assert_eq!(f.parameter(1), Err(Error::OutOfRange { index: 1, len: 1 }));

        f.set_parameters(&dvector![3.0]).unwrap();
        assert_eq!(f.param(), 3.0);
    }

    #[test]
    fn one_parametric_range_checked() {
        let mut f = ReciprocalPower::new(2.0).unwrap();
        assert!(matches!(
            f.set_parameter(0, -1.0),
            Err(Error::InvalidParameter(_))
        ));
        assert_eq!(f.param(), 2.0);
    }

    #[test]
    fn real_wrapper_forwards_family_parameter() {
        let mut f = Real::new(Power::new(2.0).unwrap());
        assert_eq!(f.value(3.0), Ok(9.0));

        f.set_parameter(0, 3.0).unwrap();
        assert_eq!(f.value(2.0), Ok(8.0));
        assert_eq!(f.parameters(), dvector![3.0]);
    }

    #[test]
    fn parametric_function_selects_member() {
        let mut f = ParametricFunction::new(ScaledSphere::new(2), dvector![2.0, 1.0]).unwrap();
        let x = dvector![3.0, 1.0];

        assert_eq!(f.value(&x), Ok(8.0));

        f.set_parameter(1, 0.0).unwrap();
        assert_eq!(f.value(&x), Ok(20.0));
        assert_eq!(f.parameters(), dvector![2.0, 0.0]);
    }

    #[test]
    fn parametric_function_checks_parameters() {
        assert!(matches!(
            ParametricFunction::new(ScaledSphere::new(2), dvector![1.0]),
            Err(Error::DimensionMismatch { .. })
        ));
        assert!(matches!(
            ParametricFunction::new(ScaledSphere::new(2), dvector![f64::NAN, 0.0]),
            Err(Error::InvalidParameter(_))
        ));

        let mut f = ParametricFunction::new(ScaledSphere::new(2), dvector![1.0, 0.0]).unwrap();
        assert!(f.set_parameters(&dvector![f64::INFINITY, 0.0]).is_err());
        assert_eq!(f.parameters(), dvector![1.0, 0.0]);
    }

    #[test]
    fn parametric_function_evaluates_through_container() {
        let f = ParametricFunction::new(ScaledSphere::new(3), dvector![0.5, -1.0]).unwrap();
        let mut x = dvector![0.0, 1.0, -2.0];
        let mut eval = ScalarEvaluation::new(3)
            .with_request(true, true, true)
            .with_parameters(&x)
            .unwrap();

        f.evaluate(&mut eval).unwrap();
        assert!(eval.calculated());
        assert_abs_diff_eq!(eval.value(), 3.0);

        let scale = dvector![1.0, 1.0, 1.0];
        let fx = eval.value();
        let numeric = Gradient::new(&f, &mut x, &scale, fx).unwrap();
        assert_abs_diff_eq!(*eval.gradient().unwrap(), *numeric, epsilon = 1e-6);
        assert_abs_diff_eq!(eval.hessian_component(1, 1).unwrap(), 1.0);
    }
}
