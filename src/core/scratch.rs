//! Per-thread scratch buffers for evaluation in reference coordinates.
//!
//! Evaluating a transformed function needs temporary storage for the point,
//! the gradient and the Hessian in reference coordinates. These buffers are
//! kept per thread and resized on demand, so repeated evaluations do not
//! allocate and concurrent evaluations of the same function never share them.

use std::cell::RefCell;

use nalgebra::{DMatrix, DVector};

use super::transform::ensure_len;

#[derive(Debug)]
pub(crate) struct Scratch {
    point: DVector<f64>,
    gradient: DVector<f64>,
    hessian: DMatrix<f64>,
    work: DVector<f64>,
}

impl Default for Scratch {
    fn default() -> Self {
        Self {
            point: DVector::zeros(0),
            gradient: DVector::zeros(0),
            hessian: DMatrix::zeros(0, 0),
            work: DVector::zeros(0),
        }
    }
}

impl Scratch {
    /// Buffers for point and gradient, both of dimension `n`.
    pub(crate) fn point_and_gradient(&mut self, n: usize) -> (&mut DVector<f64>, &mut DVector<f64>) {
        ensure_len(&mut self.point, n);
        ensure_len(&mut self.gradient, n);
        (&mut self.point, &mut self.gradient)
    }

    /// Buffers for point and Hessian, of dimension `n` and `n x n`, and a
    /// work vector of dimension `n`.
    pub(crate) fn point_and_hessian(
        &mut self,
        n: usize,
    ) -> (&mut DVector<f64>, &mut DMatrix<f64>, &mut DVector<f64>) {
        ensure_len(&mut self.point, n);
        ensure_len(&mut self.work, n);
        if self.hessian.shape() != (n, n) {
            self.hessian = DMatrix::zeros(n, n);
        }
        (&mut self.point, &mut self.hessian, &mut self.work)
    }

    pub(crate) fn point(&mut self, n: usize) -> &mut DVector<f64> {
        ensure_len(&mut self.point, n);
        &mut self.point
    }
}

thread_local! {
    static SCRATCH: RefCell<Scratch> = RefCell::new(Scratch::default());
}

/// Runs `f` with the scratch buffers of the current thread.
///
/// Nested evaluations (a reference function that itself evaluates a
/// transformed function) find the buffers borrowed and get a fresh
/// temporary allocation instead.
pub(crate) fn with_scratch<R>(f: impl FnOnce(&mut Scratch) -> R) -> R {
    SCRATCH.with(|cell| match cell.try_borrow_mut() {
        Ok(mut scratch) => f(&mut scratch),
        Err(_) => f(&mut Scratch::default()),
    })
}
