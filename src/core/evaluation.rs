//! Request/result containers exchanged between callers and functions.
//!
//! A container carries the point (parameters), the request flags set by the
//! caller, the output buffers filled by the function together with the
//! calculated flags, and the error state. Two variants exist,
//! [`ScalarEvaluation`] for scalar functions and [`VectorEvaluation`] for
//! vector functions, sharing the behavior of the [`Evaluation`] trait.
//!
//! ## Ownership of buffers
//!
//! Buffers are stored behind [`Arc`]. In the default mode
//! ([`copy_references`](Evaluation::copy_references) is false), a buffer
//! passed to a setter is deep-copied unless the caller handed over its only
//! reference, so the container never aliases memory observed by anyone else.
//! With `copy_references` enabled, the given `Arc` is stored as is. Writing
//! into a shared buffer always clones it first, so a buffer owned by the
//! caller is never mutated behind their back.

use std::sync::Arc;

use getset::{CopyGetters, Setters};
use nalgebra::DVector;

use super::base::{check_dim, check_index, Error};

mod scalar;
mod vector;

pub use scalar::*;
pub use vector::*;

/// Request and calculated flags of an evaluation container.
///
/// Request flags are set by the caller before the evaluation, calculated
/// flags are set by the function when the corresponding quantity was
/// computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, CopyGetters, Setters)]
#[getset(get_copy = "pub", set = "pub")]
pub struct Flags {
    /// Value is requested.
    req_value: bool,
    /// Gradient is requested.
    req_gradient: bool,
    /// Hessian is requested.
    req_hessian: bool,
    /// Value was calculated.
    calculated_value: bool,
    /// Gradient was calculated.
    calculated_gradient: bool,
    /// Hessian was calculated.
    calculated_hessian: bool,
}

impl Flags {
    /// Sets all request flags at once.
    pub fn request(&mut self, value: bool, gradient: bool, hessian: bool) -> &mut Self {
        self.req_value = value;
        self.req_gradient = gradient;
        self.req_hessian = hessian;
        self
    }

    /// Whether every requested quantity was calculated.
    pub fn calculated(&self) -> bool {
        (!self.req_value || self.calculated_value)
            && (!self.req_gradient || self.calculated_gradient)
            && (!self.req_hessian || self.calculated_hessian)
    }

    /// Setting to true raises the calculated flags of the requested
    /// quantities only. Setting to false clears all calculated flags.
    pub fn set_calculated(&mut self, calculated: bool) {
        if calculated {
            self.calculated_value |= self.req_value;
            self.calculated_gradient |= self.req_gradient;
            self.calculated_hessian |= self.req_hessian;
        } else {
            self.clear_calculated();
        }
    }

    /// Clears the calculated flags, leaving the request flags untouched.
    pub fn clear_calculated(&mut self) {
        self.calculated_value = false;
        self.calculated_gradient = false;
        self.calculated_hessian = false;
    }

    /// Whether any quantity is requested.
    pub fn any_requested(&self) -> bool {
        self.req_value || self.req_gradient || self.req_hessian
    }

    /// Whether any quantity was calculated.
    pub fn any_calculated(&self) -> bool {
        self.calculated_value || self.calculated_gradient || self.calculated_hessian
    }

    /// Human-readable list of requested quantities that are not calculated.
    pub(crate) fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.req_value && !self.calculated_value {
            missing.push("value");
        }
        if self.req_gradient && !self.calculated_gradient {
            missing.push("gradient");
        }
        if self.req_hessian && !self.calculated_hessian {
            missing.push("hessian");
        }
        missing
    }
}

/// State of an evaluation container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationStatus {
    /// Nothing is requested nor calculated.
    Reset,
    /// Some quantities are requested, none is calculated yet.
    Requested,
    /// Some, but not all, requested quantities are calculated.
    PartiallyCalculated,
    /// All requested quantities are calculated.
    FullyCalculated,
    /// The evaluation failed and left a requested quantity uncalculated.
    Errored,
}

/// Data shared by both variants of evaluation containers.
#[derive(Debug, Clone)]
pub struct EvaluationState {
    num_parameters: usize,
    parameters: Option<Arc<DVector<f64>>>,
    flags: Flags,
    error_code: i32,
    error_string: Option<String>,
    copy_references: bool,
}

impl EvaluationState {
    pub(crate) fn new(num_parameters: usize) -> Self {
        Self {
            num_parameters,
            parameters: None,
            flags: Flags::default(),
            error_code: 0,
            error_string: None,
            copy_references: false,
        }
    }
}

/// Takes a buffer into a container. Unless `copy_references` is enabled, a
/// buffer that is shared with anyone else is deep-copied.
pub(crate) fn adopt<T: Clone>(copy_references: bool, mut buffer: Arc<T>) -> Arc<T> {
    if !copy_references {
        Arc::make_mut(&mut buffer);
    }
    buffer
}

/// Deep-copies the buffer if it is shared with anyone else.
pub(crate) fn detach<T: Clone>(slot: &mut Option<Arc<T>>) {
    if let Some(buffer) = slot {
        Arc::make_mut(buffer);
    }
}

/// Common behavior of [`ScalarEvaluation`] and [`VectorEvaluation`].
///
/// The implementors provide access to the shared [`EvaluationState`] and
/// know how to invalidate and detach their own output buffers; everything
/// else is provided.
pub trait Evaluation {
    /// Shared state of the container.
    fn state(&self) -> &EvaluationState;

    /// Mutable shared state of the container.
    fn state_mut(&mut self) -> &mut EvaluationState;

    /// Drops all output buffers and zeroes the values.
    fn invalidate_buffers(&mut self);

    /// Deep-copies all output buffers that are shared with anyone else.
    fn detach_buffers(&mut self);

    /// Number of parameters the container is sized for.
    fn num_parameters(&self) -> usize {
        self.state().num_parameters
    }

    /// Changes the number of parameters. A different dimension drops the
    /// parameters and all output buffers since their sizes depend on it.
    fn set_num_parameters(&mut self, num_parameters: usize) {
        if self.state().num_parameters != num_parameters {
            let state = self.state_mut();
            state.num_parameters = num_parameters;
            state.parameters = None;
            state.flags.clear_calculated();
            self.clear_error();
            self.invalidate_buffers();
        }
    }

    /// The point, if set.
    fn parameters(&self) -> Option<&DVector<f64>> {
        self.state().parameters.as_deref()
    }

    /// Shared handle to the point, if set.
    fn parameters_shared(&self) -> Option<Arc<DVector<f64>>> {
        self.state().parameters.clone()
    }

    /// Sets the point. See the [module](self) documentation for the
    /// ownership rules. Calculated flags and the error state are cleared
    /// since the previous results do not correspond to the new point.
    fn set_parameters(&mut self, parameters: Arc<DVector<f64>>) -> Result<(), Error> {
        check_dim(self.num_parameters(), parameters.len())?;

        let state = self.state_mut();
        state.parameters = Some(adopt(state.copy_references, parameters));
        state.flags.clear_calculated();
        self.clear_error();
        Ok(())
    }

    /// Sets the point by copying the values. An existing, exclusively owned
    /// buffer is reused.
    fn set_parameters_from(&mut self, parameters: &DVector<f64>) -> Result<(), Error> {
        check_dim(self.num_parameters(), parameters.len())?;

        let state = self.state_mut();
        match state.parameters.as_mut().and_then(Arc::get_mut) {
            Some(existing) => existing.copy_from(parameters),
            None => state.parameters = Some(Arc::new(parameters.clone())),
        }
        state.flags.clear_calculated();
        self.clear_error();
        Ok(())
    }

    /// A single component of the point.
    fn parameter(&self, i: usize) -> Result<f64, Error> {
        check_index(i, self.num_parameters())?;
        self.parameters()
            .map(|x| x[i])
            .ok_or_else(|| Error::InvalidOperation("parameters are not set".to_string()))
    }

    /// Sets a single component of the point, allocating zeroed parameters if
    /// none are set.
    fn set_parameter(&mut self, i: usize, value: f64) -> Result<(), Error> {
        let n = self.num_parameters();
        check_index(i, n)?;

        let state = self.state_mut();
        let parameters = state
            .parameters
            .get_or_insert_with(|| Arc::new(DVector::zeros(n)));
        Arc::make_mut(parameters)[i] = value;
        state.flags.clear_calculated();
        self.clear_error();
        Ok(())
    }

    /// Request and calculated flags.
    fn flags(&self) -> &Flags {
        &self.state().flags
    }

    /// Mutable request and calculated flags.
    fn flags_mut(&mut self) -> &mut Flags {
        &mut self.state_mut().flags
    }

    /// Sets all request flags at once.
    fn request(&mut self, value: bool, gradient: bool, hessian: bool) {
        self.flags_mut().request(value, gradient, hessian);
    }

    /// Whether every requested quantity was calculated.
    fn calculated(&self) -> bool {
        self.flags().calculated()
    }

    /// See [`Flags::set_calculated`].
    fn set_calculated(&mut self, calculated: bool) {
        self.flags_mut().set_calculated(calculated);
    }

    /// Error code of the last evaluation, 0 means success.
    fn error_code(&self) -> i32 {
        self.state().error_code
    }

    /// Human-readable cause of the failure, if any.
    fn error_string(&self) -> Option<&str> {
        self.state().error_string.as_deref()
    }

    /// Records an evaluation failure.
    fn set_error(&mut self, code: i32, message: String) {
        let state = self.state_mut();
        state.error_code = code;
        state.error_string = Some(message);
    }

    /// Clears the error state.
    fn clear_error(&mut self) {
        let state = self.state_mut();
        state.error_code = 0;
        state.error_string = None;
    }

    /// Whether the last evaluation failed.
    fn is_errored(&self) -> bool {
        self.error_code() < 0
    }

    /// Current state of the container.
    fn status(&self) -> EvaluationStatus {
        let flags = self.flags();
        if self.is_errored() && !flags.calculated() {
            EvaluationStatus::Errored
        } else if flags.any_requested() && flags.calculated() {
            EvaluationStatus::FullyCalculated
        } else if flags.any_calculated() {
            EvaluationStatus::PartiallyCalculated
        } else if flags.any_requested() {
            EvaluationStatus::Requested
        } else {
            EvaluationStatus::Reset
        }
    }

    /// Prepares the container for a fresh calculation pass with the same
    /// point and requests.
    fn reset_results(&mut self) {
        self.flags_mut().clear_calculated();
        self.clear_error();
    }

    /// Whether buffers given to setters are stored without copying.
    fn copy_references(&self) -> bool {
        self.state().copy_references
    }

    /// Switches the buffer ownership mode. Switching off deep-copies every
    /// buffer currently shared with anyone else.
    fn set_copy_references(&mut self, copy_references: bool) {
        if self.copy_references() && !copy_references {
            detach(&mut self.state_mut().parameters);
            self.detach_buffers();
        }
        self.state_mut().copy_references = copy_references;
    }

    /// Drops every buffer reference and resets flags and errors. Used when
    /// the container is returned to a pool.
    fn release(&mut self) {
        let state = self.state_mut();
        state.parameters = None;
        state.flags = Flags::default();
        state.error_code = 0;
        state.error_string = None;
        self.invalidate_buffers();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calculated_follows_requests() {
        let mut flags = Flags::default();
        assert!(flags.calculated());

        flags.request(true, true, false);
        assert!(!flags.calculated());

        flags.set_calculated_value(true);
        assert!(!flags.calculated());

        flags.set_calculated_gradient(true);
        assert!(flags.calculated());
    }

    #[test]
    fn set_calculated_raises_only_requested() {
        let mut flags = Flags::default();
        flags.request(true, false, true);
        flags.set_calculated(true);

        assert!(flags.calculated_value());
        assert!(!flags.calculated_gradient());
        assert!(flags.calculated_hessian());
    }

    #[test]
    fn set_calculated_false_keeps_requests() {
        let mut flags = Flags::default();
        flags.request(true, true, true);
        flags.set_calculated(true);
        flags.set_calculated(false);

        assert!(!flags.any_calculated());
        assert!(flags.req_value());
        assert!(flags.req_gradient());
        assert!(flags.req_hessian());
    }

    #[test]
    fn missing_quantities() {
        let mut flags = Flags::default();
        flags.request(true, true, false);
        flags.set_calculated_value(true);
        assert_eq!(flags.missing(), vec!["gradient"]);
    }

    #[test]
    fn adopt_copies_shared_buffers() {
        let caller = Arc::new(DVector::from_element(2, 1.0));

        let stored = adopt(false, Arc::clone(&caller));
        assert!(!Arc::ptr_eq(&caller, &stored));

        let stored = adopt(true, Arc::clone(&caller));
        assert!(Arc::ptr_eq(&caller, &stored));
    }
}
