use std::sync::Arc;

use nalgebra::{DMatrix, DVector};

use super::{adopt, detach, Evaluation, EvaluationState};
use crate::core::base::{check_dim, check_index, Error};

/// Evaluation container of a scalar function.
///
/// ```rust
/// use feval::nalgebra::dvector;
/// use feval::{Evaluation, ScalarEvaluation};
///
/// let mut eval = ScalarEvaluation::new(2).with_request(true, true, false);
/// eval.set_parameters_from(&dvector![1.0, 2.0]).unwrap();
///
/// assert!(!eval.calculated());
/// assert!(eval.gradient().is_none());
/// ```
#[derive(Debug, Clone)]
pub struct ScalarEvaluation {
    state: EvaluationState,
    value: f64,
    gradient: Option<Arc<DVector<f64>>>,
    hessian: Option<Arc<DMatrix<f64>>>,
}

impl ScalarEvaluation {
    /// Creates an empty container for a function of `num_parameters`
    /// parameters. Buffers are allocated lazily.
    pub fn new(num_parameters: usize) -> Self {
        Self {
            state: EvaluationState::new(num_parameters),
            value: 0.0,
            gradient: None,
            hessian: None,
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

    /// Function value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Sets the function value.
    pub fn set_value(&mut self, value: f64) {
        self.value = value;
    }

    /// Gradient, if allocated.
    pub fn gradient(&self) -> Option<&DVector<f64>> {
        self.gradient.as_deref()
    }

    /// Shared handle to the gradient, if allocated.
    pub fn gradient_shared(&self) -> Option<Arc<DVector<f64>>> {
        self.gradient.clone()
    }

    /// Gradient buffer for writing, allocated on first use.
    pub fn gradient_mut(&mut self) -> &mut DVector<f64> {
        let n = self.num_parameters();
        let gradient = self
            .gradient
            .get_or_insert_with(|| Arc::new(DVector::zeros(n)));
        Arc::make_mut(gradient)
    }

    /// Sets the gradient buffer.
    pub fn set_gradient(&mut self, gradient: Arc<DVector<f64>>) -> Result<(), Error> {
        check_dim(self.num_parameters(), gradient.len())?;
        self.gradient = Some(adopt(self.copy_references(), gradient));
        Ok(())
    }

    /// Moves the gradient out of the container.
    pub fn take_gradient(&mut self) -> Option<Arc<DVector<f64>>> {
        self.gradient.take()
    }

    /// A single component of the gradient.
    pub fn gradient_component(&self, k: usize) -> Result<f64, Error> {
        check_index(k, self.num_parameters())?;
        self.gradient()
            .map(|g| g[k])
            .ok_or_else(|| Error::InvalidOperation("gradient is not allocated".to_string()))
    }

    /// Sets a single component of the gradient.
    pub fn set_gradient_component(&mut self, k: usize, value: f64) -> Result<(), Error> {
        check_index(k, self.num_parameters())?;
        self.gradient_mut()[k] = value;
        Ok(())
    }

    /// Hessian, if allocated.
    pub fn hessian(&self) -> Option<&DMatrix<f64>> {
        self.hessian.as_deref()
    }

    /// Shared handle to the Hessian, if allocated.
    pub fn hessian_shared(&self) -> Option<Arc<DMatrix<f64>>> {
        self.hessian.clone()
    }

    /// Hessian buffer for writing, allocated on first use.
    pub fn hessian_mut(&mut self) -> &mut DMatrix<f64> {
        let n = self.num_parameters();
        let hessian = self
            .hessian
            .get_or_insert_with(|| Arc::new(DMatrix::zeros(n, n)));
        Arc::make_mut(hessian)
    }

    /// Sets the Hessian buffer.
    pub fn set_hessian(&mut self, hessian: Arc<DMatrix<f64>>) -> Result<(), Error> {
        check_dim(self.num_parameters(), hessian.nrows())?;
        check_dim(self.num_parameters(), hessian.ncols())?;
        self.hessian = Some(adopt(self.copy_references(), hessian));
        Ok(())
    }

    /// Moves the Hessian out of the container.
    pub fn take_hessian(&mut self) -> Option<Arc<DMatrix<f64>>> {
        self.hessian.take()
    }

    /// A single element of the Hessian.
    pub fn hessian_component(&self, i: usize, j: usize) -> Result<f64, Error> {
        check_index(i, self.num_parameters())?;
        check_index(j, self.num_parameters())?;
        self.hessian()
            .map(|h| h[(i, j)])
            .ok_or_else(|| Error::InvalidOperation("hessian is not allocated".to_string()))
    }

    /// Sets a single element of the Hessian.
    pub fn set_hessian_component(&mut self, i: usize, j: usize, value: f64) -> Result<(), Error> {
        check_index(i, self.num_parameters())?;
        check_index(j, self.num_parameters())?;
        self.hessian_mut()[(i, j)] = value;
        Ok(())
    }
}

impl Evaluation for ScalarEvaluation {
    fn state(&self) -> &EvaluationState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut EvaluationState {
        &mut self.state
    }

    fn invalidate_buffers(&mut self) {
        self.value = 0.0;
        self.gradient = None;
        self.hessian = None;
    }

    fn detach_buffers(&mut self) {
        detach(&mut self.gradient);
        detach(&mut self.hessian);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EvaluationStatus;

    use nalgebra::dvector;

    #[test]
    fn buffers_are_lazy() {
        let mut eval = ScalarEvaluation::new(3);
        assert!(eval.gradient().is_none());
        assert!(eval.hessian().is_none());

        eval.set_gradient_component(1, 2.0).unwrap();
        assert_eq!(eval.gradient().unwrap().len(), 3);
        assert_eq!(eval.gradient_component(1), Ok(2.0));

        eval.set_hessian_component(2, 0, -1.0).unwrap();
        assert_eq!(eval.hessian().unwrap().shape(), (3, 3));
        assert_eq!(eval.hessian_component(2, 0), Ok(-1.0));
    }

    #[test]
    fn indices_are_checked() {
        let mut eval = ScalarEvaluation::new(2);
        assert_eq!(
            eval.set_gradient_component(2, 1.0),
            Err(Error::OutOfRange { index: 2, len: 2 })
        );
        assert_eq!(
            eval.hessian_component(0, 5),
            Err(Error::OutOfRange { index: 5, len: 2 })
        );
        assert_eq!(
            eval.parameter(7),
            Err(Error::OutOfRange { index: 7, len: 2 })
        );
    }

    #[test]
    fn changing_dimension_invalidates_buffers() {
        let mut eval = ScalarEvaluation::new(2)
            .with_parameters(&dvector![1.0, 2.0])
            .unwrap();
        eval.gradient_mut().fill(1.0);
        eval.hessian_mut().fill(1.0);

        eval.set_num_parameters(2);
        assert!(eval.parameters().is_some());

        eval.set_num_parameters(3);
        assert!(eval.parameters().is_none());
        assert!(eval.gradient().is_none());
        assert!(eval.hessian().is_none());
    }

    #[test]
    fn wrong_parameters_length_rejected() {
        let mut eval = ScalarEvaluation::new(2);
        assert_eq!(
            eval.set_parameters_from(&dvector![1.0]),
            Err(Error::DimensionMismatch {
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn copy_mode_never_aliases() {
        let caller = Arc::new(dvector![1.0, 2.0]);
        let mut eval = ScalarEvaluation::new(2);
        eval.set_parameters(Arc::clone(&caller)).unwrap();

        assert!(!Arc::ptr_eq(&caller, &eval.parameters_shared().unwrap()));
        assert_eq!(eval.parameters(), Some(&*caller));
    }

    #[test]
    fn reference_mode_stores_as_is_until_switched_off() {
        let params = Arc::new(dvector![1.0, 2.0]);
        let gradient = Arc::new(dvector![0.5, 0.5]);

        let mut eval = ScalarEvaluation::new(2);
        eval.set_copy_references(true);
        eval.set_parameters(Arc::clone(&params)).unwrap();
        eval.set_gradient(Arc::clone(&gradient)).unwrap();

        assert!(Arc::ptr_eq(&params, &eval.parameters_shared().unwrap()));
        assert!(Arc::ptr_eq(&gradient, &eval.gradient_shared().unwrap()));

        eval.set_copy_references(false);

        assert!(!Arc::ptr_eq(&params, &eval.parameters_shared().unwrap()));
        assert!(!Arc::ptr_eq(&gradient, &eval.gradient_shared().unwrap()));
        assert_eq!(eval.gradient(), Some(&*gradient));
    }

    #[test]
    fn writing_shared_buffer_does_not_touch_caller() {
        let gradient = Arc::new(dvector![0.5, 0.5]);

        let mut eval = ScalarEvaluation::new(2);
        eval.set_copy_references(true);
        eval.set_gradient(Arc::clone(&gradient)).unwrap();
        eval.set_gradient_component(0, 9.0).unwrap();

        assert_eq!(gradient[0], 0.5);
        assert_eq!(eval.gradient_component(0), Ok(9.0));
    }

    #[test]
    fn reset_results_keeps_parameters_and_requests() {
        let mut eval = ScalarEvaluation::new(1)
            .with_request(true, true, false)
            .with_parameters(&dvector![3.0])
            .unwrap();
        eval.set_calculated(true);
        eval.set_error(-2, "boom".to_string());

        eval.reset_results();

        assert!(!eval.flags().any_calculated());
        assert!(eval.flags().req_value());
        assert!(eval.flags().req_gradient());
        assert_eq!(eval.parameter(0), Ok(3.0));
        assert_eq!(eval.error_code(), 0);
        assert!(eval.error_string().is_none());
    }

    #[test]
    fn status_transitions() {
        let mut eval = ScalarEvaluation::new(1);
        assert_eq!(eval.status(), EvaluationStatus::Reset);

        eval.request(true, true, false);
        eval.set_parameters_from(&dvector![1.0]).unwrap();
        assert_eq!(eval.status(), EvaluationStatus::Requested);

        eval.flags_mut().set_calculated_value(true);
        assert_eq!(eval.status(), EvaluationStatus::PartiallyCalculated);

        eval.set_error(-1, "no gradient here".to_string());
        assert_eq!(eval.status(), EvaluationStatus::Errored);

        eval.clear_error();
        eval.flags_mut().set_calculated_gradient(true);
        assert_eq!(eval.status(), EvaluationStatus::FullyCalculated);
    }

    #[test]
    fn new_parameters_clear_calculated() {
        let mut eval = ScalarEvaluation::new(1).with_request(true, false, false);
        eval.set_parameters_from(&dvector![1.0]).unwrap();
        eval.set_calculated(true);
        assert!(eval.calculated());

        eval.set_parameter(0, 2.0).unwrap();
        assert!(!eval.calculated());
    }

    #[test]
    fn release_nulls_everything() {
        let mut eval = ScalarEvaluation::new(2)
            .with_request(true, true, true)
            .with_parameters(&dvector![1.0, 2.0])
            .unwrap();
        eval.set_value(4.0);
        eval.gradient_mut().fill(1.0);
        eval.hessian_mut().fill(1.0);
        eval.set_calculated(true);

        eval.release();

        assert!(eval.parameters().is_none());
        assert!(eval.gradient().is_none());
        assert!(eval.hessian().is_none());
        assert_eq!(eval.value(), 0.0);
        assert_eq!(eval.status(), EvaluationStatus::Reset);
    }
}
