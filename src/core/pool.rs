//! Reuse pool of evaluation containers.

use std::sync::{Mutex, MutexGuard, PoisonError};

use getset::{CopyGetters, Setters};
use log::{debug, trace};

use super::{
    base::Error,
    evaluation::{Evaluation, VectorEvaluation},
};

/// Default maximum number of idle containers kept by a pool.
pub const DEFAULT_CAPACITY: usize = 8;

/// Options for [`EvaluationPool`].
#[derive(Debug, Clone, Copy, CopyGetters, Setters)]
#[getset(get_copy = "pub", set = "pub")]
pub struct PoolOptions {
    /// Maximum number of idle containers kept for reuse. Default:
    /// [`DEFAULT_CAPACITY`].
    capacity: usize,
    /// Whether containers handed out by the pool store buffers given to
    /// their setters without copying. Default: true.
    copy_references: bool,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            copy_references: true,
        }
    }
}

/// Pool of [`VectorEvaluation`] containers owned by a single function.
///
/// Containers are handed out sized to the dimensions of the function. On
/// release, every buffer reference of the container is dropped before it
/// becomes available again, so no borrower ever observes data of a previous
/// one.
#[derive(Debug)]
pub struct EvaluationPool {
    idle: Mutex<Vec<VectorEvaluation>>,
    options: PoolOptions,
}

impl Default for EvaluationPool {
    fn default() -> Self {
        Self::new()
    }
}

impl EvaluationPool {
    /// Creates an empty pool with default options.
    pub fn new() -> Self {
        Self::with_options(PoolOptions::default())
    }

    /// Creates an empty pool with given options.
    pub fn with_options(options: PoolOptions) -> Self {
        Self {
            idle: Mutex::new(Vec::with_capacity(options.capacity())),
            options,
        }
    }

    /// Options of the pool.
    pub fn options(&self) -> &PoolOptions {
        &self.options
    }

    /// Number of idle containers.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether there is no idle container.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drops all idle containers.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Takes a container sized for given dimensions, constructing a new one
    /// if none is idle. Fails with [`Error::PoolUnavailable`] if the number
    /// of values is undefined.
    pub fn acquire(
        &self,
        num_parameters: usize,
        num_values: Option<usize>,
    ) -> Result<VectorEvaluation, Error> {
        let mut idle = self.lock();
        self.take(&mut idle, num_parameters, num_values)
    }

    /// Returns a container to the pool. All its buffers are dropped first.
    pub fn release(&self, eval: VectorEvaluation) {
        let mut idle = self.lock();
        self.put(&mut idle, eval);
    }

    /// Acquires a container, runs `f` with it and releases it, all in one
    /// critical section.
    pub fn with_borrowed<R, F>(
        &self,
        num_parameters: usize,
        num_values: Option<usize>,
        f: F,
    ) -> Result<R, Error>
    where
        F: FnOnce(&mut VectorEvaluation) -> Result<R, Error>,
    {
        let mut idle = self.lock();
        let mut eval = self.take(&mut idle, num_parameters, num_values)?;
        let result = f(&mut eval);
        self.put(&mut idle, eval);
        result
    }

    fn lock(&self) -> MutexGuard<'_, Vec<VectorEvaluation>> {
        // Idle containers are always released, so a panicking borrower
        // cannot leave one in an inconsistent state.
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take(
        &self,
        idle: &mut Vec<VectorEvaluation>,
        num_parameters: usize,
        num_values: Option<usize>,
    ) -> Result<VectorEvaluation, Error> {
        let num_values = num_values.ok_or(Error::PoolUnavailable)?;

        match idle
            .iter()
            .position(|eval| eval.matches(num_parameters, num_values))
        {
            Some(index) => {
                trace!("reusing pooled evaluation {}", index);
                Ok(idle.swap_remove(index))
            }
            None => {
                debug!(
                    "allocating pooled evaluation for {} parameters and {} values",
                    num_parameters, num_values
                );
                let mut eval = VectorEvaluation::new(num_parameters, num_values);
                eval.set_copy_references(self.options.copy_references());
                Ok(eval)
            }
        }
    }

    fn put(&self, idle: &mut Vec<VectorEvaluation>, mut eval: VectorEvaluation) {
        eval.release();
        if idle.len() < self.options.capacity() {
            idle.push(eval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use nalgebra::dvector;

    #[test]
    fn undefined_dimensions_are_rejected() {
        let pool = EvaluationPool::new();
        assert_eq!(pool.acquire(2, None).unwrap_err(), Error::PoolUnavailable);
    }

    #[test]
    fn acquired_container_has_requested_dimensions() {
        let pool = EvaluationPool::new();
        let eval = pool.acquire(3, Some(2)).unwrap();
        assert!(eval.matches(3, 2));
        assert!(eval.copy_references());
    }

    #[test]
    fn released_container_is_reused_and_clean() {
        let pool = EvaluationPool::new();

        let mut eval = pool.acquire(2, Some(2)).unwrap();
        eval.request(true, true, false);
        eval.set_parameters_from(&dvector![1.0, 2.0]).unwrap();
        eval.set_value(0, 5.0).unwrap();
        eval.gradient_mut(1).unwrap().fill(3.0);
        eval.set_calculated(true);
        pool.release(eval);

        assert_eq!(pool.len(), 1);

        let eval = pool.acquire(2, Some(2)).unwrap();
        assert!(pool.is_empty());
        assert!(eval.parameters().is_none());
        assert_eq!(eval.value(0), Ok(0.0));
        assert!(eval.gradient(1).unwrap().is_none());
        assert!(!eval.flags().any_requested());
        assert!(!eval.flags().any_calculated());
    }

    #[test]
    fn mismatching_container_is_not_reused() {
        let pool = EvaluationPool::new();
        pool.release(VectorEvaluation::new(2, 2));

        let eval = pool.acquire(3, Some(2)).unwrap();
        assert!(eval.matches(3, 2));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn capacity_is_respected() {
        let mut options = PoolOptions::default();
        options.set_capacity(1);
        let pool = EvaluationPool::with_options(options);

        pool.release(VectorEvaluation::new(1, 1));
        pool.release(VectorEvaluation::new(1, 1));
        assert_eq!(pool.len(), 1);

        pool.clear();
        assert!(pool.is_empty());
    }

    #[test]
    fn borrowed_container_is_returned() {
        let pool = EvaluationPool::new();
        let value = pool
            .with_borrowed(1, Some(1), |eval| {
                eval.set_value(0, 2.0)?;
                eval.value(0)
            })
            .unwrap();

        assert_eq!(value, 2.0);
        assert_eq!(pool.len(), 1);

        let failed: Result<(), Error> =
            pool.with_borrowed(1, Some(1), |_| Err(Error::evaluation("nope")));
        assert!(failed.is_err());
        assert_eq!(pool.len(), 1);
    }
}
