use std::sync::Arc;

use nalgebra::{DMatrix, DVector};

use super::{adopt, detach, Evaluation, EvaluationState};
use crate::core::base::{check_dim, check_index, Error};

/// Evaluation container of a vector function.
///
/// Values, gradients and Hessians are indexed by the output number `which`.
/// The lists always have `num_functions` elements; each gradient and Hessian
/// is allocated lazily.
#[derive(Debug, Clone)]
pub struct VectorEvaluation {
    state: EvaluationState,
    num_functions: usize,
    values: Vec<f64>,
    gradients: Vec<Option<Arc<DVector<f64>>>>,
    hessians: Vec<Option<Arc<DMatrix<f64>>>>,
}

impl VectorEvaluation {
    /// Creates an empty container for `num_functions` outputs of
    /// `num_parameters` parameters.
    pub fn new(num_parameters: usize, num_functions: usize) -> Self {
        Self {
            state: EvaluationState::new(num_parameters),
            num_functions,
            values: vec![0.0; num_functions],
            gradients: vec![None; num_functions],
            hessians: vec![None; num_functions],
        }
    }

    /// Sets the request flags.
    pub fn with_request(mut self, value: bool, gradient: bool, hessian: bool) -> Self {
        self.request(value, gradient, hessian);
        self
    }

    /// Sets the point by copying given values.
    pub fn with_parameters(mut self, parameters: &DVector<f64>) -> Result<Self, Error> {
        self.set_parameters_from(parameters)?;
        Ok(self)
    }

    /// Number of outputs.
    pub fn num_functions(&self) -> usize {
        self.num_functions
    }

    /// Changes the number of outputs. A different number drops all values,
    /// gradients and Hessians.
    pub fn set_num_functions(&mut self, num_functions: usize) {
        if self.num_functions != num_functions {
            self.num_functions = num_functions;
            self.values = vec![0.0; num_functions];
            self.gradients = vec![None; num_functions];
            self.hessians = vec![None; num_functions];
            self.flags_mut().clear_calculated();
        }
    }

    /// Whether the container is sized for given dimensions.
    pub fn matches(&self, num_parameters: usize, num_functions: usize) -> bool {
        self.num_parameters() == num_parameters && self.num_functions == num_functions
    }

    /// All values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Value of output `which`.
    pub fn value(&self, which: usize) -> Result<f64, Error> {
        check_index(which, self.num_functions)?;
        Ok(self.values[which])
    }

    /// Sets the value of output `which`.
    pub fn set_value(&mut self, which: usize, value: f64) -> Result<(), Error> {
        check_index(which, self.num_functions)?;
        self.values[which] = value;
        Ok(())
    }

    /// Gradient of output `which`, if allocated.
    pub fn gradient(&self, which: usize) -> Result<Option<&DVector<f64>>, Error> {
        check_index(which, self.num_functions)?;
        Ok(self.gradients[which].as_deref())
    }

    /// Shared handle to the gradient of output `which`, if allocated.
    pub fn gradient_shared(&self, which: usize) -> Result<Option<Arc<DVector<f64>>>, Error> {
        check_index(which, self.num_functions)?;
        Ok(self.gradients[which].clone())
    }

    /// Gradient buffer of output `which` for writing, allocated on first
    /// use.
    pub fn gradient_mut(&mut self, which: usize) -> Result<&mut DVector<f64>, Error> {
        check_index(which, self.num_functions)?;
        let n = self.num_parameters();
        let gradient = self.gradients[which].get_or_insert_with(|| Arc::new(DVector::zeros(n)));
        Ok(Arc::make_mut(gradient))
    }

    /// Sets the gradient buffer of output `which`.
    pub fn set_gradient(&mut self, which: usize, gradient: Arc<DVector<f64>>) -> Result<(), Error> {
        check_index(which, self.num_functions)?;
        check_dim(self.num_parameters(), gradient.len())?;
        self.gradients[which] = Some(adopt(self.copy_references(), gradient));
        Ok(())
    }

    /// Moves the gradient of output `which` out of the container.
    pub fn take_gradient(&mut self, which: usize) -> Result<Option<Arc<DVector<f64>>>, Error> {
        check_index(which, self.num_functions)?;
        Ok(self.gradients[which].take())
    }

    /// Component `k` of the gradient of output `which`.
    pub fn derivative(&self, which: usize, k: usize) -> Result<f64, Error> {
        check_index(k, self.num_parameters())?;
        self.gradient(which)?
            .map(|g| g[k])
            .ok_or_else(|| not_allocated("gradient", which))
    }

    /// Sets component `k` of the gradient of output `which`.
    pub fn set_derivative(&mut self, which: usize, k: usize, value: f64) -> Result<(), Error> {
        check_index(k, self.num_parameters())?;
        self.gradient_mut(which)?[k] = value;
        Ok(())
    }

    /// Hessian of output `which`, if allocated.
    pub fn hessian(&self, which: usize) -> Result<Option<&DMatrix<f64>>, Error> {
        check_index(which, self.num_functions)?;
        Ok(self.hessians[which].as_deref())
    }

    /// Shared handle to the Hessian of output `which`, if allocated.
    pub fn hessian_shared(&self, which: usize) -> Result<Option<Arc<DMatrix<f64>>>, Error> {
        check_index(which, self.num_functions)?;
        Ok(self.hessians[which].clone())
    }

    /// Hessian buffer of output `which` for writing, allocated on first
    /// use.
    pub fn hessian_mut(&mut self, which: usize) -> Result<&mut DMatrix<f64>, Error> {
        check_index(which, self.num_functions)?;
        let n = self.num_parameters();
        let hessian = self.hessians[which].get_or_insert_with(|| Arc::new(DMatrix::zeros(n, n)));
        Ok(Arc::make_mut(hessian))
    }

    /// Sets the Hessian buffer of output `which`.
    pub fn set_hessian(&mut self, which: usize, hessian: Arc<DMatrix<f64>>) -> Result<(), Error> {
        check_index(which, self.num_functions)?;
        check_dim(self.num_parameters(), hessian.nrows())?;
        check_dim(self.num_parameters(), hessian.ncols())?;
        self.hessians[which] = Some(adopt(self.copy_references(), hessian));
        Ok(())
    }

    /// Moves the Hessian of output `which` out of the container.
    pub fn take_hessian(&mut self, which: usize) -> Result<Option<Arc<DMatrix<f64>>>, Error> {
        check_index(which, self.num_functions)?;
        Ok(self.hessians[which].take())
    }

    /// Element `(i, j)` of the Hessian of output `which`.
    pub fn second_derivative(&self, which: usize, i: usize, j: usize) -> Result<f64, Error> {
        check_index(i, self.num_parameters())?;
        check_index(j, self.num_parameters())?;
        self.hessian(which)?
            .map(|h| h[(i, j)])
            .ok_or_else(|| not_allocated("hessian", which))
    }

    /// Sets element `(i, j)` of the Hessian of output `which`.
    pub fn set_second_derivative(
        &mut self,
        which: usize,
        i: usize,
        j: usize,
        value: f64,
    ) -> Result<(), Error> {
        check_index(i, self.num_parameters())?;
        check_index(j, self.num_parameters())?;
        self.hessian_mut(which)?[(i, j)] = value;
        Ok(())
    }
}

fn not_allocated(what: &str, which: usize) -> Error {
    Error::InvalidOperation(format!("{} of function {} is not allocated", what, which))
}

impl Evaluation for VectorEvaluation {
    fn state(&self) -> &EvaluationState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut EvaluationState {
        &mut self.state
    }

    fn invalidate_buffers(&mut self) {
        self.values.iter_mut().for_each(|v| *v = 0.0);
        self.gradients.iter_mut().for_each(|g| *g = None);
        self.hessians.iter_mut().for_each(|h| *h = None);
    }

    fn detach_buffers(&mut self) {
        self.gradients.iter_mut().for_each(detach);
        self.hessians.iter_mut().for_each(detach);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use nalgebra::dvector;

    #[test]
    fn lists_follow_num_functions() {
        let mut eval = VectorEvaluation::new(2, 3);
        assert_eq!(eval.values().len(), 3);

        eval.set_num_functions(5);
        assert_eq!(eval.values().len(), 5);
        assert!(eval.gradient(4).unwrap().is_none());
        assert!(eval.matches(2, 5));
    }

    #[test]
    fn elements_are_allocated_independently() {
        let mut eval = VectorEvaluation::new(2, 3);
        eval.set_derivative(1, 0, 4.0).unwrap();

        assert!(eval.gradient(0).unwrap().is_none());
        assert_eq!(eval.gradient(1).unwrap().map(|g| g.len()), Some(2));
        assert!(eval.gradient(2).unwrap().is_none());
        assert_eq!(eval.derivative(1, 0), Ok(4.0));

        eval.set_second_derivative(2, 1, 1, -3.0).unwrap();
        assert_eq!(
            eval.hessian(2).unwrap().map(|h| h.shape()),
            Some((2, 2))
        );
        assert_eq!(eval.second_derivative(2, 1, 1), Ok(-3.0));
    }

    #[test]
    fn indices_are_checked() {
        let mut eval = VectorEvaluation::new(2, 3);
        assert_eq!(eval.value(3), Err(Error::OutOfRange { index: 3, len: 3 }));
        assert_eq!(
            eval.set_derivative(0, 2, 1.0),
            Err(Error::OutOfRange { index: 2, len: 2 })
        );
        assert_eq!(
            eval.set_second_derivative(9, 0, 0, 1.0),
            Err(Error::OutOfRange { index: 9, len: 3 })
        );
        assert!(matches!(
            eval.derivative(0, 0),
            Err(Error::InvalidOperation(_))
        ));
    }

    #[test]
    fn reference_mode_detached_on_switch() {
        let gradient = Arc::new(dvector![1.0, 1.0]);

        let mut eval = VectorEvaluation::new(2, 2);
        eval.set_copy_references(true);
        eval.set_gradient(1, Arc::clone(&gradient)).unwrap();
        assert!(Arc::ptr_eq(
            &gradient,
            &eval.gradient_shared(1).unwrap().unwrap()
        ));

        eval.set_copy_references(false);
        assert!(!Arc::ptr_eq(
            &gradient,
            &eval.gradient_shared(1).unwrap().unwrap()
        ));
    }

    #[test]
    fn release_nulls_every_element() {
        let mut eval = VectorEvaluation::new(2, 2)
            .with_request(true, true, true)
            .with_parameters(&dvector![1.0, 2.0])
            .unwrap();
        for which in 0..2 {
            eval.set_value(which, 1.0).unwrap();
            eval.gradient_mut(which).unwrap().fill(1.0);
            eval.hessian_mut(which).unwrap().fill(1.0);
        }

        eval.release();

        assert!(eval.parameters().is_none());
        for which in 0..2 {
            assert_eq!(eval.value(which), Ok(0.0));
            assert!(eval.gradient(which).unwrap().is_none());
            assert!(eval.hessian(which).unwrap().is_none());
        }
        assert!(!eval.flags().any_requested());
    }
}
