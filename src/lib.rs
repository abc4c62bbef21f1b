#![allow(clippy::many_single_char_names)]
#![allow(clippy::type_complexity)]
#![warn(missing_docs)]

//! # feval
//!
//! A pure Rust framework for evaluating scalar and vector functions of many
//! real variables together with their gradients and Hessians.
//!
//! The caller describes what it needs in an evaluation container (the point
//! and the request flags), the function computes only what was requested and
//! not computed yet and marks it as calculated. Failures of the formula in
//! a particular point are recorded on the container, so a caller exploring
//! many points does not have to unwind on every one of them.
//!
//! ## Functions
//!
//! * [`ScalarFunction`] -- a function of many variables with an optional
//!   gradient and Hessian.
//! * [`VectorFunction`] -- a function with many outputs, implemented either
//!   in [bulk](Bulk) or [component-wise](ComponentWise).
//! * [`TransformedFunction`] -- a scalar function defined in reference
//!   coordinates and exposed in actual coordinates through an
//!   [`AffineTransform`].
//! * [Parametric families](parametric) -- functions selected by a vector of
//!   family parameters.
//! * [Elementary real functions](real) -- exponential, powers, constant and
//!   identity with an affine change of both the argument and the value.
//!
//! ## Evaluation
//!
//! ```rust
//! use feval::nalgebra::{dvector, DVector};
//! use feval::{Error, Evaluation, Problem, ScalarEvaluation, ScalarFunction};
//!
//! struct Sphere;
//!
//! impl Problem for Sphere {
//!     fn num_parameters(&self) -> usize {
//!         2
//!     }
//! }
//!
//! impl ScalarFunction for Sphere {
//!     fn gradient_defined(&self) -> bool {
//!         true
//!     }
//!
//!     fn value(&self, x: &DVector<f64>) -> Result<f64, Error> {
//!         Ok(x.norm_squared())
//!     }
//!
//!     fn gradient_plain(&self, x: &DVector<f64>, out: &mut DVector<f64>) -> Result<(), Error> {
//!         out.copy_from(&(x * 2.0));
//!         Ok(())
//!     }
//! }
//!
//! let mut eval = ScalarEvaluation::new(2)
//!     .with_request(true, true, false)
//!     .with_parameters(&dvector![1.0, 2.0])?;
//!
//! Sphere.evaluate(&mut eval)?;
//!
//! assert!(eval.calculated());
//! assert_eq!(eval.value(), 5.0);
//! assert_eq!(eval.gradient(), Some(&dvector![2.0, 4.0]));
//! # Ok::<(), Error>(())
//! ```
//!
//! There is no need for the gradient or Hessian to be implemented. The
//! [derivatives] module provides
//! [finite difference](https://en.wikipedia.org/wiki/Finite_difference_method)
//! approximations that can be used instead, or to check the analytic ones.
//!
//! ## License
//!
//! Licensed under MIT.

mod core;
pub mod derivatives;
pub mod parametric;
pub mod real;

pub use core::*;

#[cfg(feature = "testing")]
pub mod testing;

#[cfg(not(feature = "testing"))]
pub(crate) mod testing;

pub use nalgebra;
