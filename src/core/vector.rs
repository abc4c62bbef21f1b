//! Vector functions and their evaluation strategies.
//!
//! A vector function has `num_values` outputs, each with its own value,
//! gradient and Hessian. There are two ways to implement one:
//!
//! * [`BulkFunction`] computes all requested outputs together, typically
//!   because they share intermediate results. Wrap it in [`Bulk`].
//! * [`ComponentFunction`] computes each output independently. Wrap it in
//!   [`ComponentWise`].
//!
//! Both wrappers implement the unified [`VectorFunction`] interface. The
//! strategy is fixed by the wrapper type and reported by
//! [`component_wise`](VectorFunction::component_wise).

use log::debug;
use nalgebra::{DMatrix, DVector};

use super::{
    base::{check_dim, check_index, Error, Problem},
    evaluation::{Evaluation, Flags, VectorEvaluation},
    function::{check_defined, record_failure},
    pool::{EvaluationPool, PoolOptions},
};

/// Unified interface of vector functions.
pub trait VectorFunction: Problem {
    /// Number of outputs, `None` if it is variable or undefined.
    fn num_values(&self) -> Option<usize>;

    /// Whether every output is computed independently of the others.
    fn component_wise(&self) -> bool;

    /// Whether the values can be calculated.
    fn value_defined(&self) -> bool {
        true
    }

    /// Whether the gradients can be calculated.
    fn gradient_defined(&self) -> bool {
        false
    }

    /// Whether the Hessians can be calculated.
    fn hessian_defined(&self) -> bool {
        false
    }

    /// Calculates the requested quantities of all outputs.
    ///
    /// Same contract as [`ScalarFunction::evaluate`](crate::ScalarFunction::evaluate):
    /// programming errors are returned, evaluation failures are recorded on
    /// the container.
    fn evaluate(&self, eval: &mut VectorEvaluation) -> Result<(), Error>;

    /// Value of output `which` at the point of the container, evaluating if
    /// it is not calculated yet.
    fn value(&self, eval: &mut VectorEvaluation, which: usize) -> Result<f64, Error>;

    /// Component `k` of the gradient of output `which` at the point of the
    /// container, evaluating if it is not calculated yet.
    fn derivative(&self, eval: &mut VectorEvaluation, which: usize, k: usize)
        -> Result<f64, Error>;

    /// Element `(i, j)` of the Hessian of output `which` at the point of the
    /// container, evaluating if it is not calculated yet.
    fn second_derivative(
        &self,
        eval: &mut VectorEvaluation,
        which: usize,
        i: usize,
        j: usize,
    ) -> Result<f64, Error>;

    /// Value of output `which` in given point.
    fn value_at(&self, x: &DVector<f64>, which: usize) -> Result<f64, Error>;

    /// Gradient of output `which` in given point.
    fn gradient_at(&self, x: &DVector<f64>, which: usize) -> Result<DVector<f64>, Error>;

    /// Hessian of output `which` in given point.
    fn hessian_at(&self, x: &DVector<f64>, which: usize) -> Result<DMatrix<f64>, Error>;

    /// Values of all outputs in given point.
    fn values_at(&self, x: &DVector<f64>) -> Result<DVector<f64>, Error>;
}

/// A vector function whose outputs are computed together.
///
/// The implementation of [`evaluate_bulk`](BulkFunction::evaluate_bulk)
/// computes the requested quantities of all outputs, stores them in the
/// container and raises the calculated flags. The container is guaranteed
/// to have parameters set and to be sized for the function.
pub trait BulkFunction: Problem {
    /// Number of outputs, `None` if it is variable or undefined.
    fn num_values(&self) -> Option<usize>;

    /// Whether the gradients can be calculated.
    fn gradient_defined(&self) -> bool {
        false
    }

    /// Whether the Hessians can be calculated.
    fn hessian_defined(&self) -> bool {
        false
    }

    /// Calculates the requested quantities of all outputs.
    fn evaluate_bulk(&self, eval: &mut VectorEvaluation) -> Result<(), Error>;
}

/// A vector function whose outputs are computed independently.
pub trait ComponentFunction: Problem {
    /// Number of outputs.
    fn num_values(&self) -> usize;

    /// Whether the gradients can be calculated.
    fn gradient_defined(&self) -> bool {
        false
    }

    /// Whether the Hessians can be calculated.
    fn hessian_defined(&self) -> bool {
        false
    }

    /// Value of output `which`.
    fn component_value(&self, x: &DVector<f64>, which: usize) -> Result<f64, Error>;

    /// Gradient of output `which` into `out`.
    fn component_gradient_plain(
        &self,
        _x: &DVector<f64>,
        _which: usize,
        _out: &mut DVector<f64>,
    ) -> Result<(), Error> {
        Err(Error::unsupported("gradient is not defined"))
    }

    /// Hessian of output `which` into `out`.
    fn component_hessian_plain(
        &self,
        _x: &DVector<f64>,
        _which: usize,
        _out: &mut DMatrix<f64>,
    ) -> Result<(), Error> {
        Err(Error::unsupported("hessian is not defined"))
    }
}

#[derive(Debug, Clone, Copy)]
enum Quantity {
    Value,
    Gradient,
    Hessian,
}

impl Quantity {
    fn is_calculated(self, flags: &Flags) -> bool {
        match self {
            Quantity::Value => flags.calculated_value(),
            Quantity::Gradient => flags.calculated_gradient(),
            Quantity::Hessian => flags.calculated_hessian(),
        }
    }

    fn raise_request(self, flags: &mut Flags) {
        match self {
            Quantity::Value => flags.set_req_value(true),
            Quantity::Gradient => flags.set_req_gradient(true),
            Quantity::Hessian => flags.set_req_hessian(true),
        };
    }

    fn name(self) -> &'static str {
        match self {
            Quantity::Value => "value",
            Quantity::Gradient => "gradient",
            Quantity::Hessian => "hessian",
        }
    }
}

/// Fails with [`Error::InvalidOperation`] if the quantity is still not
/// calculated. The message names the requested indices and the error state of
/// the container.
fn ensure_calculated(
    eval: &VectorEvaluation,
    quantity: Quantity,
    indices: &[usize],
) -> Result<(), Error> {
    if quantity.is_calculated(eval.flags()) {
        return Ok(());
    }

    Err(Error::InvalidOperation(format!(
        "{} {:?} was requested but not calculated (error code {}: {})",
        quantity.name(),
        indices,
        eval.error_code(),
        eval.error_string().unwrap_or("no error reported"),
    )))
}

/// Validates the container against the function dimensions and returns the
/// number of outputs.
fn prepare<F: VectorFunction + ?Sized>(f: &F, eval: &mut VectorEvaluation) -> Result<usize, Error> {
    check_dim(f.num_parameters(), eval.num_parameters())?;

    if let Some(num_values) = f.num_values() {
        check_dim(num_values, eval.num_functions())?;
    }

    if eval.parameters().is_none() {
        return Err(Error::InvalidOperation("parameters are not set".to_string()));
    }

    let flags = eval.flags();
    check_defined(
        flags.req_value() && !f.value_defined(),
        flags.req_gradient() && !f.gradient_defined(),
        flags.req_hessian() && !f.hessian_defined(),
    )?;

    Ok(eval.num_functions())
}

/// Bulk evaluation strategy. See the [module](self) documentation.
///
/// Queries of a single output go through [`VectorFunction::evaluate`]. A
/// query that has to evaluate requests every quantity the function defines,
/// so asking for several outputs or derivatives of an unmodified container
/// evaluates the function at most once.
#[derive(Debug)]
pub struct Bulk<F> {
    f: F,
    pool: EvaluationPool,
}

impl<F: BulkFunction> Bulk<F> {
    /// Wraps the function, with a pool of default options.
    pub fn new(f: F) -> Self {
        Self::with_options(f, PoolOptions::default())
    }

    /// Wraps the function, with a pool of given options.
    pub fn with_options(f: F, options: PoolOptions) -> Self {
        Self {
            f,
            pool: EvaluationPool::with_options(options),
        }
    }

    /// The wrapped function.
    pub fn inner(&self) -> &F {
        &self.f
    }

    /// Pool of containers used by the single-shot conveniences.
    pub fn pool(&self) -> &EvaluationPool {
        &self.pool
    }

    /// Creates a container sized for the function, or `None` if the number of
    /// values is undefined.
    pub fn new_evaluation(&self) -> Option<VectorEvaluation> {
        self.f
            .num_values()
            .map(|m| VectorEvaluation::new(self.f.num_parameters(), m))
    }

    /// Reads a quantity of the container, evaluating first if it is not
    /// calculated. With `prefetch`, the evaluation also computes every other
    /// quantity the function defines.
    fn query<R>(
        &self,
        eval: &mut VectorEvaluation,
        quantity: Quantity,
        indices: &[usize],
        prefetch: bool,
        read: impl FnOnce(&VectorEvaluation) -> Result<R, Error>,
    ) -> Result<R, Error> {
        if !quantity.is_calculated(eval.flags()) {
            quantity.raise_request(eval.flags_mut());
            if prefetch {
                let flags = eval.flags_mut();
                flags.set_req_value(true);
                if self.f.gradient_defined() {
                    flags.set_req_gradient(true);
                }
                if self.f.hessian_defined() {
                    flags.set_req_hessian(true);
                }
            }
            self.evaluate(eval)?;
            ensure_calculated(eval, quantity, indices)?;
        }

        read(eval)
    }

    fn borrowed<R>(
        &self,
        x: &DVector<f64>,
        f: impl FnOnce(&mut VectorEvaluation) -> Result<R, Error>,
    ) -> Result<R, Error> {
        check_dim(self.f.num_parameters(), x.len())?;
        self.pool
            .with_borrowed(self.f.num_parameters(), self.f.num_values(), |eval| {
                eval.set_parameters_from(x)?;
                f(eval)
            })
    }
}

impl<F: BulkFunction> Problem for Bulk<F> {
    fn num_parameters(&self) -> usize {
        self.f.num_parameters()
    }
}

impl<F: BulkFunction> VectorFunction for Bulk<F> {
    fn num_values(&self) -> Option<usize> {
        self.f.num_values()
    }

    fn component_wise(&self) -> bool {
        false
    }

    fn gradient_defined(&self) -> bool {
        self.f.gradient_defined()
    }

    fn hessian_defined(&self) -> bool {
        self.f.hessian_defined()
    }

    fn evaluate(&self, eval: &mut VectorEvaluation) -> Result<(), Error> {
        prepare(self, eval)?;

        if eval.calculated() {
            return Ok(());
        }
        eval.clear_error();

        match self.f.evaluate_bulk(eval) {
            Ok(()) => {
                if !eval.calculated() && !eval.is_errored() {
                    debug!("bulk evaluation left {:?} uncalculated", eval.flags().missing());
                }
                Ok(())
            }
            Err(error) => record_failure(eval, error),
        }
    }

    fn value(&self, eval: &mut VectorEvaluation, which: usize) -> Result<f64, Error> {
        check_index(which, eval.num_functions())?;
        self.query(eval, Quantity::Value, &[which], true, |eval| {
            eval.value(which)
        })
    }

    fn derivative(
        &self,
        eval: &mut VectorEvaluation,
        which: usize,
        k: usize,
    ) -> Result<f64, Error> {
        check_index(which, eval.num_functions())?;
        check_index(k, eval.num_parameters())?;
        self.query(eval, Quantity::Gradient, &[which, k], true, |eval| {
            eval.derivative(which, k)
        })
    }

    fn second_derivative(
        &self,
        eval: &mut VectorEvaluation,
        which: usize,
        i: usize,
        j: usize,
    ) -> Result<f64, Error> {
        check_index(which, eval.num_functions())?;
        check_index(i, eval.num_parameters())?;
        check_index(j, eval.num_parameters())?;
        self.query(eval, Quantity::Hessian, &[which, i, j], true, |eval| {
            eval.second_derivative(which, i, j)
        })
    }

    fn value_at(&self, x: &DVector<f64>, which: usize) -> Result<f64, Error> {
        self.borrowed(x, |eval| {
            check_index(which, eval.num_functions())?;
            eval.request(true, false, false);
            self.query(eval, Quantity::Value, &[which], false, |eval| {
                eval.value(which)
            })
        })
    }

    fn gradient_at(&self, x: &DVector<f64>, which: usize) -> Result<DVector<f64>, Error> {
        self.borrowed(x, |eval| {
            check_index(which, eval.num_functions())?;
            eval.request(false, true, false);
            self.query(eval, Quantity::Gradient, &[which], false, |eval| {
                eval.gradient(which)?
                    .cloned()
                    .ok_or_else(|| Error::InvalidOperation(format!("gradient {} is missing", which)))
            })
        })
    }

    fn hessian_at(&self, x: &DVector<f64>, which: usize) -> Result<DMatrix<f64>, Error> {
        self.borrowed(x, |eval| {
            check_index(which, eval.num_functions())?;
            eval.request(false, false, true);
            self.query(eval, Quantity::Hessian, &[which], false, |eval| {
                eval.hessian(which)?
                    .cloned()
                    .ok_or_else(|| Error::InvalidOperation(format!("hessian {} is missing", which)))
            })
        })
    }

    fn values_at(&self, x: &DVector<f64>) -> Result<DVector<f64>, Error> {
        self.borrowed(x, |eval| {
            eval.request(true, false, false);
            let indices = (0..eval.num_functions()).collect::<Vec<_>>();
            self.query(eval, Quantity::Value, &indices, false, |eval| {
                Ok(DVector::from_column_slice(eval.values()))
            })
        })
    }
}

/// Component-wise evaluation strategy. See the [module](self)
/// documentation.
///
/// [`VectorFunction::evaluate`] is derived by computing every requested
/// quantity of every output one by one.
#[derive(Debug, Clone)]
pub struct ComponentWise<F> {
    f: F,
}

impl<F: ComponentFunction> ComponentWise<F> {
    /// Wraps the function.
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// The wrapped function.
    pub fn inner(&self) -> &F {
        &self.f
    }

    /// Creates a container sized for the function.
    pub fn new_evaluation(&self) -> VectorEvaluation {
        VectorEvaluation::new(self.f.num_parameters(), self.f.num_values())
    }

    /// Computes one quantity of one output into the container. Evaluation
    /// failures are recorded on the container and reported as
    /// [`Error::InvalidOperation`].
    fn compute(
        &self,
        eval: &mut VectorEvaluation,
        quantity: Quantity,
        which: usize,
        indices: &[usize],
    ) -> Result<(), Error> {
        let x = eval
            .parameters_shared()
            .ok_or_else(|| Error::InvalidOperation("parameters are not set".to_string()))?;

        let result = match quantity {
            Quantity::Value => self
                .f
                .component_value(&x, which)
                .and_then(|value| eval.set_value(which, value)),
            Quantity::Gradient => {
                let out = eval.gradient_mut(which)?;
                self.f.component_gradient_plain(&x, which, out)
            }
            Quantity::Hessian => {
                let out = eval.hessian_mut(which)?;
                self.f.component_hessian_plain(&x, which, out)
            }
        };

        match result {
            Ok(()) => Ok(()),
            Err(error) => {
                record_failure(eval, error)?;
                ensure_calculated(eval, quantity, indices)
            }
        }
    }

    fn single<R>(
        &self,
        eval: &mut VectorEvaluation,
        quantity: Quantity,
        which: usize,
        indices: &[usize],
        read: impl FnOnce(&VectorEvaluation) -> Result<R, Error>,
    ) -> Result<R, Error> {
        prepare(self, eval)?;
        check_index(which, eval.num_functions())?;

        let defined = match quantity {
            Quantity::Value => true,
            Quantity::Gradient => self.f.gradient_defined(),
            Quantity::Hessian => self.f.hessian_defined(),
        };
        if !defined {
            return Err(Error::unsupported(format!("{} is not defined", quantity.name())));
        }

        if !quantity.is_calculated(eval.flags()) {
            self.compute(eval, quantity, which, indices)?;
        }

        read(eval)
    }
}

impl<F: ComponentFunction> Problem for ComponentWise<F> {
    fn num_parameters(&self) -> usize {
        self.f.num_parameters()
    }
}

impl<F: ComponentFunction> VectorFunction for ComponentWise<F> {
    fn num_values(&self) -> Option<usize> {
        Some(self.f.num_values())
    }

    fn component_wise(&self) -> bool {
        true
    }

    fn gradient_defined(&self) -> bool {
        self.f.gradient_defined()
    }

    fn hessian_defined(&self) -> bool {
        self.f.hessian_defined()
    }

    fn evaluate(&self, eval: &mut VectorEvaluation) -> Result<(), Error> {
        let num_values = prepare(self, eval)?;
        let flags = *eval.flags();

        if flags.calculated() {
            return Ok(());
        }
        eval.clear_error();

        let pending = [
            (Quantity::Value, flags.req_value() && !flags.calculated_value()),
            (
                Quantity::Gradient,
                flags.req_gradient() && !flags.calculated_gradient(),
            ),
            (
                Quantity::Hessian,
                flags.req_hessian() && !flags.calculated_hessian(),
            ),
        ];

        for (quantity, needed) in pending {
            if !needed {
                continue;
            }

            for which in 0..num_values {
                match self.compute(eval, quantity, which, &[which]) {
                    Ok(()) => {}
                    Err(Error::InvalidOperation(message)) if eval.is_errored() => {
                        debug!("component-wise evaluation stopped: {}", message);
                        return Ok(());
                    }
                    Err(error) => return Err(error),
                }
            }

            match quantity {
                Quantity::Value => eval.flags_mut().set_calculated_value(true),
                Quantity::Gradient => eval.flags_mut().set_calculated_gradient(true),
                Quantity::Hessian => eval.flags_mut().set_calculated_hessian(true),
            };
        }

        Ok(())
    }

    fn value(&self, eval: &mut VectorEvaluation, which: usize) -> Result<f64, Error> {
        self.single(eval, Quantity::Value, which, &[which], |eval| {
            eval.value(which)
        })
    }

    fn derivative(
        &self,
        eval: &mut VectorEvaluation,
        which: usize,
        k: usize,
    ) -> Result<f64, Error> {
        check_index(k, eval.num_parameters())?;
        self.single(eval, Quantity::Gradient, which, &[which, k], |eval| {
            eval.derivative(which, k)
        })
    }

    fn second_derivative(
        &self,
        eval: &mut VectorEvaluation,
        which: usize,
        i: usize,
        j: usize,
    ) -> Result<f64, Error> {
        check_index(i, eval.num_parameters())?;
        check_index(j, eval.num_parameters())?;
        self.single(eval, Quantity::Hessian, which, &[which, i, j], |eval| {
            eval.second_derivative(which, i, j)
        })
    }

    fn value_at(&self, x: &DVector<f64>, which: usize) -> Result<f64, Error> {
        check_dim(self.f.num_parameters(), x.len())?;
        check_index(which, self.f.num_values())?;
        self.f.component_value(x, which)
    }

    fn gradient_at(&self, x: &DVector<f64>, which: usize) -> Result<DVector<f64>, Error> {
        check_dim(self.f.num_parameters(), x.len())?;
        check_index(which, self.f.num_values())?;
        if !self.f.gradient_defined() {
            return Err(Error::unsupported("gradient is not defined"));
        }

        let mut out = DVector::zeros(self.f.num_parameters());
        self.f.component_gradient_plain(x, which, &mut out)?;
        Ok(out)
    }

    fn hessian_at(&self, x: &DVector<f64>, which: usize) -> Result<DMatrix<f64>, Error> {
        check_dim(self.f.num_parameters(), x.len())?;
        check_index(which, self.f.num_values())?;
        if !self.f.hessian_defined() {
            return Err(Error::unsupported("hessian is not defined"));
        }

        let n = self.f.num_parameters();
        let mut out = DMatrix::zeros(n, n);
        self.f.component_hessian_plain(x, which, &mut out)?;
        Ok(out)
    }

    fn values_at(&self, x: &DVector<f64>) -> Result<DVector<f64>, Error> {
        check_dim(self.f.num_parameters(), x.len())?;
        let mut values = DVector::zeros(self.f.num_values());
        for (which, value) in values.iter_mut().enumerate() {
            *value = self.f.component_value(x, which)?;
        }
        Ok(values)
    }
}
