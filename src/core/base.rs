use thiserror::Error;

/// Generic failure of a formula that could not produce a result.
pub const ERROR_FAILED: i32 = -1;

/// The point lies outside of the domain of the formula.
pub const ERROR_DOMAIN: i32 = -2;

/// The result of the formula is not representable (overflow).
pub const ERROR_OVERFLOW: i32 = -3;

/// The base trait for scalar and vector functions.
pub trait Problem {
    /// Number of parameters (variables) the function takes.
    fn num_parameters(&self) -> usize;
}

/// Error encountered while evaluating a function or manipulating an
/// evaluation container.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// The length of a vector (or the size of a matrix) does not match the
    /// dimension expected by the function or the container.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Dimension that was actually provided.
        actual: usize,
    },
    /// The requested quantity is not defined for the function.
    #[error("unsupported operation: {0}")]
    Unsupported(String),
    /// The formula could not produce a result in the given point.
    #[error("evaluation failed (code {code}): {message}")]
    Evaluation {
        /// Negative error code.
        code: i32,
        /// Human-readable cause.
        message: String,
    },
    /// Index out of range in an indexed accessor.
    #[error("index {index} out of range for length {len}")]
    OutOfRange {
        /// Index that was used.
        index: usize,
        /// Valid length.
        len: usize,
    },
    /// A requested quantity was left uncalculated or the container is not in
    /// a state that allows the operation.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    /// A parameter of a function family is outside of its valid range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// No pooled evaluation container can be produced because the dimensions
    /// of the function are undefined.
    #[error("no pooled evaluation available: dimensions of the function are undefined")]
    PoolUnavailable,
    /// The transform is not invertible or its parts are inconsistent.
    #[error("invalid transform: {0}")]
    InvalidTransform(String),
}

impl Error {
    /// Evaluation failure with [`ERROR_FAILED`] code.
    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::Evaluation {
            code: ERROR_FAILED,
            message: message.into(),
        }
    }

    /// Evaluation failure with [`ERROR_DOMAIN`] code.
    pub fn domain(message: impl Into<String>) -> Self {
        Self::Evaluation {
            code: ERROR_DOMAIN,
            message: message.into(),
        }
    }

    /// Evaluation failure with [`ERROR_OVERFLOW`] code.
    pub fn overflow(message: impl Into<String>) -> Self {
        Self::Evaluation {
            code: ERROR_OVERFLOW,
            message: message.into(),
        }
    }

    /// Unsupported operation for a quantity that is not defined.
    pub fn unsupported(what: impl Into<String>) -> Self {
        Self::Unsupported(what.into())
    }

    /// Whether the error can be recorded on an evaluation container instead
    /// of being propagated. Only evaluation failures are recoverable, the
    /// rest indicates a programming error upstream.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Evaluation { .. })
    }
}

/// Fails with [`Error::DimensionMismatch`] if the dimensions differ.
pub(crate) fn check_dim(expected: usize, actual: usize) -> Result<(), Error> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::DimensionMismatch { expected, actual })
    }
}

/// Fails with [`Error::OutOfRange`] if the index is not lower than `len`.
pub(crate) fn check_index(index: usize, len: usize) -> Result<(), Error> {
    if index < len {
        Ok(())
    } else {
        Err(Error::OutOfRange { index, len })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_evaluation_failures_are_recoverable() {
        assert!(Error::domain("log of negative number").is_recoverable());
        assert!(Error::overflow("too big").is_recoverable());
        assert!(!Error::unsupported("hessian").is_recoverable());
        assert!(!Error::PoolUnavailable.is_recoverable());
        assert!(!Error::DimensionMismatch {
            expected: 2,
            actual: 3
        }
        .is_recoverable());
    }

    #[test]
    fn dimension_mismatch_message_contains_lengths() {
        let err = check_dim(1, 2).unwrap_err();
        let message = format!("{err}");
        assert!(message.contains('1'));
        assert!(message.contains('2'));
    }

    #[test]
    fn index_check() {
        assert!(check_index(0, 1).is_ok());
        assert_eq!(
            check_index(3, 3),
            Err(Error::OutOfRange { index: 3, len: 3 })
        );
    }
}
