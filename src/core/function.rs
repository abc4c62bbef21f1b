use std::sync::Arc;

use log::{debug, trace};
use nalgebra::{DMatrix, DVector};

use super::{
    base::{check_dim, Error, Problem},
    evaluation::{Evaluation, ScalarEvaluation},
    scratch::with_scratch,
    transform::AffineTransform,
};

/// Definition of a scalar function of many variables.
///
/// ## Defining a function
///
/// A function is any type that implements [`ScalarFunction`] and [`Problem`]
/// traits. The only required method is [`value`](ScalarFunction::value);
/// functions that know their derivatives declare it by overriding
/// [`gradient_defined`](ScalarFunction::gradient_defined) (and
/// [`hessian_defined`](ScalarFunction::hessian_defined)) and implementing
/// the corresponding `*_plain` methods.
///
/// ```rust
/// use feval::nalgebra::{dvector, DVector};
/// use feval::{Error, Problem, ScalarFunction};
///
/// struct Rosenbrock {
///     a: f64,
///     b: f64,
/// }
///
/// impl Problem for Rosenbrock {
///     fn num_parameters(&self) -> usize {
///         2
///     }
/// }
///
/// impl ScalarFunction for Rosenbrock {
///     fn value(&self, x: &DVector<f64>) -> Result<f64, Error> {
///         Ok((self.a - x[0]).powi(2) + self.b * (x[1] - x[0].powi(2)).powi(2))
///     }
/// }
///
/// let f = Rosenbrock { a: 1.0, b: 100.0 };
/// assert_eq!(f.value(&dvector![1.0, 1.0]), Ok(0.0));
/// assert!(f.gradient(&dvector![1.0, 1.0]).is_err());
/// ```
///
/// The capability queries have no setters. Whether a function has a
/// derivative is a fact about the function, not a runtime switch.
pub trait ScalarFunction: Problem {
    /// Whether the value can be calculated.
    fn value_defined(&self) -> bool {
        true
    }

    /// Whether the gradient can be calculated.
    fn gradient_defined(&self) -> bool {
        false
    }

    /// Whether the Hessian can be calculated.
    fn hessian_defined(&self) -> bool {
        false
    }

    /// Calculates the function value in given point.
    fn value(&self, x: &DVector<f64>) -> Result<f64, Error>;

    /// Calculates the gradient in given point into `out`.
    fn gradient_plain(&self, _x: &DVector<f64>, _out: &mut DVector<f64>) -> Result<(), Error> {
        Err(Error::unsupported("gradient is not defined"))
    }

    /// Calculates the Hessian in given point into `out`.
    fn hessian_plain(&self, _x: &DVector<f64>, _out: &mut DMatrix<f64>) -> Result<(), Error> {
        Err(Error::unsupported("hessian is not defined"))
    }

    /// Calculates the gradient in given point into a new vector.
    fn gradient(&self, x: &DVector<f64>) -> Result<DVector<f64>, Error> {
        let mut out = DVector::zeros(self.num_parameters());
        self.gradient_plain(x, &mut out)?;
        Ok(out)
    }

    /// Calculates the Hessian in given point into a new matrix.
    fn hessian(&self, x: &DVector<f64>) -> Result<DMatrix<f64>, Error> {
        let n = self.num_parameters();
        let mut out = DMatrix::zeros(n, n);
        self.hessian_plain(x, &mut out)?;
        Ok(out)
    }

    /// Calculates the requested quantities that are not calculated yet.
    ///
    /// Dimension mismatches and requests for undefined quantities are
    /// returned as errors. Evaluation failures are recorded on the container
    /// (see [`Evaluation::error_code`]) and leave the corresponding
    /// calculated flag unset.
    fn evaluate(&self, eval: &mut ScalarEvaluation) -> Result<(), Error> {
        check_dim(self.num_parameters(), eval.num_parameters())?;
        let x = eval
            .parameters_shared()
            .ok_or_else(|| Error::InvalidOperation("parameters are not set".to_string()))?;

        let flags = *eval.flags();
        check_defined(
            flags.req_value() && !self.value_defined(),
            flags.req_gradient() && !self.gradient_defined(),
            flags.req_hessian() && !self.hessian_defined(),
        )?;

        if flags.calculated() {
            return Ok(());
        }
        eval.clear_error();

        if flags.req_value() && !flags.calculated_value() {
            match self.value(&x) {
                Ok(value) => {
                    eval.set_value(value);
                    eval.flags_mut().set_calculated_value(true);
                }
                Err(error) => record_failure(eval, error)?,
            }
        }

        if flags.req_gradient() && !flags.calculated_gradient() {
            match self.gradient_plain(&x, eval.gradient_mut()) {
                Ok(()) => {
                    eval.flags_mut().set_calculated_gradient(true);
                }
                Err(error) => record_failure(eval, error)?,
            }
        }

        if flags.req_hessian() && !flags.calculated_hessian() {
            match self.hessian_plain(&x, eval.hessian_mut()) {
                Ok(()) => {
                    eval.flags_mut().set_calculated_hessian(true);
                }
                Err(error) => record_failure(eval, error)?,
            }
        }

        Ok(())
    }
}

impl<F: ScalarFunction + ?Sized> ScalarFunction for &F {
    fn value_defined(&self) -> bool {
        (**self).value_defined()
    }

    fn gradient_defined(&self) -> bool {
        (**self).gradient_defined()
    }

    fn hessian_defined(&self) -> bool {
        (**self).hessian_defined()
    }

    fn value(&self, x: &DVector<f64>) -> Result<f64, Error> {
        (**self).value(x)
    }

    fn gradient_plain(&self, x: &DVector<f64>, out: &mut DVector<f64>) -> Result<(), Error> {
        (**self).gradient_plain(x, out)
    }

    fn hessian_plain(&self, x: &DVector<f64>, out: &mut DMatrix<f64>) -> Result<(), Error> {
        (**self).hessian_plain(x, out)
    }

    fn evaluate(&self, eval: &mut ScalarEvaluation) -> Result<(), Error> {
        (**self).evaluate(eval)
    }
}

impl<F: Problem + ?Sized> Problem for &F {
    fn num_parameters(&self) -> usize {
        (**self).num_parameters()
    }
}

/// Fails with [`Error::Unsupported`] naming the first undefined quantity that
/// is requested.
pub(crate) fn check_defined(value: bool, gradient: bool, hessian: bool) -> Result<(), Error> {
    if value {
        Err(Error::unsupported("value is not defined"))
    } else if gradient {
        Err(Error::unsupported("gradient is not defined"))
    } else if hessian {
        Err(Error::unsupported("hessian is not defined"))
    } else {
        Ok(())
    }
}

/// Records a recoverable failure on the container, propagates the rest.
pub(crate) fn record_failure<E: Evaluation + ?Sized>(
    eval: &mut E,
    error: Error,
) -> Result<(), Error> {
    match error {
        Error::Evaluation { code, message } => {
            debug!("evaluation failed with code {}: {}", code, message);
            eval.set_error(code, message);
            Ok(())
        }
        error => Err(error),
    }
}

/// A function evaluated in reference coordinates and exposed in actual
/// coordinates through an optional [`AffineTransform`].
///
/// Without a transform, all calls are delegated to the inner function. With
/// a transform, the point is mapped to reference coordinates, the inner
/// function is evaluated there and the derivatives are propagated back by
/// the chain rule.
///
/// ```rust
/// use std::sync::Arc;
///
/// use feval::nalgebra::dvector;
/// use feval::real::{Exp, Real};
/// use feval::{AffineTransform, ScalarFunction, TransformedFunction};
///
/// // exp((x - 1) / 2)
/// let transform = Arc::new(AffineTransform::one_dim(2.0, 1.0).unwrap());
/// let f = TransformedFunction::new(Real::new(Exp), Some(transform)).unwrap();
///
/// assert_eq!(f.value(&dvector![1.0]), Ok(1.0));
/// assert_eq!(f.gradient(&dvector![1.0]).unwrap()[0], 0.5);
/// ```
#[derive(Debug, Clone)]
pub struct TransformedFunction<F> {
    inner: F,
    transform: Option<Arc<AffineTransform>>,
}

impl<F: ScalarFunction> TransformedFunction<F> {
    /// Attaches the transform to the function. The dimension of the
    /// transform must match the number of parameters of the function.
    pub fn new(inner: F, transform: Option<Arc<AffineTransform>>) -> Result<Self, Error> {
        if let Some(transform) = &transform {
            check_dim(inner.num_parameters(), transform.dim())?;
        }

        Ok(Self { inner, transform })
    }

    /// Function without a transform.
    pub fn untransformed(inner: F) -> Self {
        Self {
            inner,
            transform: None,
        }
    }

    /// The attached transform, if any.
    pub fn transform(&self) -> Option<&Arc<AffineTransform>> {
        self.transform.as_ref()
    }

    /// Replaces the attached transform.
    pub fn set_transform(&mut self, transform: Option<Arc<AffineTransform>>) -> Result<(), Error> {
        if let Some(transform) = &transform {
            check_dim(self.inner.num_parameters(), transform.dim())?;
        }

        self.transform = transform;
        Ok(())
    }

    /// The function in reference coordinates.
    pub fn inner(&self) -> &F {
        &self.inner
    }

    /// Mutable access to the function in reference coordinates.
    pub fn inner_mut(&mut self) -> &mut F {
        &mut self.inner
    }

    /// Unwraps the function in reference coordinates.
    pub fn into_inner(self) -> F {
        self.inner
    }
}

impl<F: ScalarFunction> Problem for TransformedFunction<F> {
    fn num_parameters(&self) -> usize {
        self.inner.num_parameters()
    }
}

impl<F: ScalarFunction> ScalarFunction for TransformedFunction<F> {
    fn value_defined(&self) -> bool {
        self.inner.value_defined()
    }

    fn gradient_defined(&self) -> bool {
        self.inner.gradient_defined()
    }

    fn hessian_defined(&self) -> bool {
        self.inner.hessian_defined()
    }

    fn value(&self, x: &DVector<f64>) -> Result<f64, Error> {
        check_dim(self.num_parameters(), x.len())?;

        let transform = match &self.transform {
            Some(transform) => transform,
            None => return self.inner.value(x),
        };

        with_scratch(|scratch| {
            let reference = scratch.point(x.len());
            transform.transform_back_coordinates_into(x, reference)?;
            trace!("value in reference point {:?}", reference.as_slice());
            self.inner.value(reference)
        })
    }

    fn gradient_plain(&self, x: &DVector<f64>, out: &mut DVector<f64>) -> Result<(), Error> {
        check_dim(self.num_parameters(), x.len())?;
        if !self.gradient_defined() {
            return Err(Error::unsupported("gradient is not defined"));
        }

        let transform = match &self.transform {
            Some(transform) => transform,
            None => return self.inner.gradient_plain(x, out),
        };

        with_scratch(|scratch| {
            let (reference, gradient) = scratch.point_and_gradient(x.len());
            transform.transform_back_coordinates_into(x, reference)?;
            self.inner.gradient_plain(reference, gradient)?;
            transform.transform_gradient_plain(gradient, out)
        })
    }

    fn hessian_plain(&self, x: &DVector<f64>, out: &mut DMatrix<f64>) -> Result<(), Error> {
        check_dim(self.num_parameters(), x.len())?;
        if !self.hessian_defined() {
            return Err(Error::unsupported("hessian is not defined"));
        }

        let transform = match &self.transform {
            Some(transform) => transform,
            None => return self.inner.hessian_plain(x, out),
        };

        with_scratch(|scratch| {
            let (reference, hessian, work) = scratch.point_and_hessian(x.len());
            transform.transform_back_coordinates_into(x, reference)?;
            self.inner.hessian_plain(reference, hessian)?;
            transform.transform_hessian_with_workspace(hessian, out, work)
        })
    }
}
