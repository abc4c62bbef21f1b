//! Core abstractions and types for feval.
//!
//! *Users* are mainly interested in implementing the [`ScalarFunction`]
//! trait, or [`BulkFunction`] / [`ComponentFunction`] for vector functions,
//! and in requesting quantities through [`ScalarEvaluation`] and
//! [`VectorEvaluation`] containers.
//!
//! Coordinates can be transformed by an [`AffineTransform`] attached to a
//! function through [`TransformedFunction`].

mod base;
mod evaluation;
mod function;
mod pool;
mod scratch;
mod transform;
mod vector;

pub use base::*;
pub use evaluation::*;
pub use function::*;
pub use pool::*;
pub use transform::*;
pub use vector::*;
