//! Affine transformation of coordinates.
//!
//! Functions are defined by a formula in *reference* coordinates. The caller
//! works in *actual* coordinates which are related to the reference ones by
//!
//! ```text
//! actual = L * reference + t
//! reference = L^-1 * (actual - t)
//! ```
//!
//! The map from actual to reference coordinates has the constant Jacobian
//! `J = L^-1`, so the derivatives in actual coordinates are obtained by the
//! chain rule:
//!
//! ```text
//! grad_actual = J^T * grad_reference
//! hess_actual = J^T * hess_reference * J
//! ```

use log::debug;
use nalgebra::{DMatrix, DVector};

use super::base::{check_dim, Error};

/// Affine map between actual and reference coordinates. See the
/// [module](self) documentation for the conventions.
#[derive(Debug, Clone, PartialEq)]
pub struct AffineTransform {
    linear: DMatrix<f64>,
    translation: DVector<f64>,
    jacobian: DMatrix<f64>,
}

impl AffineTransform {
    /// Creates a transform `actual = linear * reference + translation`.
    ///
    /// The linear part must be square, invertible and of the same dimension
    /// as the translation.
    pub fn new(linear: DMatrix<f64>, translation: DVector<f64>) -> Result<Self, Error> {
        if !linear.is_square() {
            return Err(Error::InvalidTransform(format!(
                "linear part is not square ({} x {})",
                linear.nrows(),
                linear.ncols()
            )));
        }

        if linear.nrows() != translation.len() {
            return Err(Error::InvalidTransform(format!(
                "linear part has dimension {} but translation has {}",
                linear.nrows(),
                translation.len()
            )));
        }

        if linear.iter().any(|x| !x.is_finite()) || translation.iter().any(|x| !x.is_finite()) {
            return Err(Error::InvalidTransform("non-finite coefficients".to_string()));
        }

        let jacobian = match linear.clone().try_inverse() {
            Some(inverse) => inverse,
            None => {
                debug!("rejecting singular linear part {:?}", linear.as_slice());
                return Err(Error::InvalidTransform(
                    "linear part is not invertible".to_string(),
                ));
            }
        };

        Ok(Self {
            linear,
            translation,
            jacobian,
        })
    }

    /// Identity transform of given dimension.
    pub fn identity(dim: usize) -> Self {
        Self {
            linear: DMatrix::identity(dim, dim),
            translation: DVector::zeros(dim),
            jacobian: DMatrix::identity(dim, dim),
        }
    }

    /// Per-coordinate scaling and shift, `actual_i = scales_i * reference_i +
    /// shifts_i`. Zero scale factors are rejected.
    pub fn scaling(scales: DVector<f64>, shifts: DVector<f64>) -> Result<Self, Error> {
        if let Some(i) = scales.iter().position(|s| *s == 0.0) {
            return Err(Error::InvalidTransform(format!(
                "zero scale factor for coordinate {}",
                i
            )));
        }

        Self::new(DMatrix::from_diagonal(&scales), shifts)
    }

    /// One-dimensional transform `actual = scale * reference + shift`.
    pub fn one_dim(scale: f64, shift: f64) -> Result<Self, Error> {
        Self::scaling(DVector::from_element(1, scale), DVector::from_element(1, shift))
    }

    /// Dimension of the transformed space.
    pub fn dim(&self) -> usize {
        self.translation.len()
    }

    /// The linear part `L`.
    pub fn linear(&self) -> &DMatrix<f64> {
        &self.linear
    }

    /// The translation `t`.
    pub fn translation(&self) -> &DVector<f64> {
        &self.translation
    }

    /// Jacobian of the map from actual to reference coordinates, `L^-1`.
    pub fn jacobian(&self) -> &DMatrix<f64> {
        &self.jacobian
    }

    /// Maps reference coordinates to actual coordinates.
    pub fn transform_coordinates(&self, reference: &DVector<f64>) -> Result<DVector<f64>, Error> {
        let mut actual = DVector::zeros(self.dim());
        self.transform_coordinates_into(reference, &mut actual)?;
        Ok(actual)
    }

    /// Maps reference coordinates to actual coordinates into given buffer.
    /// The buffer is resized if needed.
    pub fn transform_coordinates_into(
        &self,
        reference: &DVector<f64>,
        actual: &mut DVector<f64>,
    ) -> Result<(), Error> {
        check_dim(self.dim(), reference.len())?;
        ensure_len(actual, self.dim());

        actual.copy_from(&self.translation);
        actual.gemv(1.0, &self.linear, reference, 1.0);
        Ok(())
    }

    /// Maps actual coordinates back to reference coordinates.
    pub fn transform_back_coordinates(&self, actual: &DVector<f64>) -> Result<DVector<f64>, Error> {
        let mut reference = DVector::zeros(self.dim());
        self.transform_back_coordinates_into(actual, &mut reference)?;
        Ok(reference)
    }

    /// Maps actual coordinates back to reference coordinates into given
    /// buffer. The buffer is resized if needed.
    pub fn transform_back_coordinates_into(
        &self,
        actual: &DVector<f64>,
        reference: &mut DVector<f64>,
    ) -> Result<(), Error> {
        check_dim(self.dim(), actual.len())?;
        ensure_len(reference, self.dim());

        reference.gemv(1.0, &self.jacobian, actual, 0.0);
        reference.gemv(-1.0, &self.jacobian, &self.translation, 1.0);
        Ok(())
    }

    /// Propagates a gradient in reference coordinates to actual coordinates,
    /// `actual = J^T * reference`.
    pub fn transform_gradient_plain(
        &self,
        reference: &DVector<f64>,
        actual: &mut DVector<f64>,
    ) -> Result<(), Error> {
        check_dim(self.dim(), reference.len())?;
        ensure_len(actual, self.dim());

        actual.fill(0.0);
        actual.gemv_tr(1.0, &self.jacobian, reference, 0.0);
        Ok(())
    }

    /// Propagates a Hessian in reference coordinates to actual coordinates,
    /// `actual = J^T * reference * J`.
    pub fn transform_hessian_plain(
        &self,
        reference: &DMatrix<f64>,
        actual: &mut DMatrix<f64>,
    ) -> Result<(), Error> {
        let mut work = DVector::zeros(self.dim());
        self.transform_hessian_with_workspace(reference, actual, &mut work)
    }

    /// Same as [`transform_hessian_plain`](AffineTransform::transform_hessian_plain),
    /// using `work` as the temporary column storage. Both `actual` and `work`
    /// are resized if needed.
    pub fn transform_hessian_with_workspace(
        &self,
        reference: &DMatrix<f64>,
        actual: &mut DMatrix<f64>,
        work: &mut DVector<f64>,
    ) -> Result<(), Error> {
        check_dim(self.dim(), reference.nrows())?;
        check_dim(self.dim(), reference.ncols())?;

        if actual.shape() != (self.dim(), self.dim()) {
            *actual = DMatrix::zeros(self.dim(), self.dim());
        }
        ensure_len(work, self.dim());

        actual.fill(0.0);
        actual.quadform_with_workspace(work, 1.0, reference, &self.jacobian, 0.0);
        Ok(())
    }
}

pub(crate) fn ensure_len(v: &mut DVector<f64>, len: usize) {
    if v.len() != len {
        *v = DVector::zeros(len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;
    use nalgebra::{dmatrix, dvector};

    fn rotation_like() -> AffineTransform {
        AffineTransform::new(dmatrix![2.0, 1.0; -1.0, 3.0], dvector![0.5, -2.0]).unwrap()
    }

    #[test]
    fn round_trip() {
        let t = rotation_like();
        let points = [
            dvector![0.0, 0.0],
            dvector![1.0, -1.0],
            dvector![-3.5, 10.25],
            dvector![1e3, 1e-3],
        ];

        for x in points.iter() {
            let back = t.transform_back_coordinates(x).unwrap();
            let forth = t.transform_coordinates(&back).unwrap();
            assert_abs_diff_eq!(forth, x.clone(), epsilon = 1e-9);

            let forth = t.transform_coordinates(x).unwrap();
            let back = t.transform_back_coordinates(&forth).unwrap();
            assert_abs_diff_eq!(back, x.clone(), epsilon = 1e-9);
        }
    }

    #[test]
    fn one_dim_scaling() {
        let t = AffineTransform::one_dim(2.0, 1.0).unwrap();
        let actual = t.transform_coordinates(&dvector![3.0]).unwrap();
        assert_abs_diff_eq!(actual[0], 7.0);

        let reference = t.transform_back_coordinates(&dvector![7.0]).unwrap();
        assert_abs_diff_eq!(reference[0], 3.0);
        assert_abs_diff_eq!(t.jacobian()[(0, 0)], 0.5);
    }

    #[test]
    fn zero_scale_rejected() {
        assert!(matches!(
            AffineTransform::one_dim(0.0, 1.0),
            Err(Error::InvalidTransform(_))
        ));
    }

    #[test]
    fn singular_rejected() {
        let res = AffineTransform::new(dmatrix![1.0, 2.0; 2.0, 4.0], dvector![0.0, 0.0]);
        assert!(matches!(res, Err(Error::InvalidTransform(_))));
    }

    #[test]
    fn inconsistent_parts_rejected() {
        let res = AffineTransform::new(dmatrix![1.0, 0.0; 0.0, 1.0], dvector![0.0]);
        assert!(matches!(res, Err(Error::InvalidTransform(_))));
    }

    #[test]
    fn gradient_uses_transposed_jacobian() {
        let t = rotation_like();
        let reference = dvector![1.0, 2.0];
        let mut actual = DVector::zeros(0);
        t.transform_gradient_plain(&reference, &mut actual).unwrap();

        let expected = t.jacobian().transpose() * &reference;
        assert_abs_diff_eq!(actual, expected, epsilon = 1e-12);
    }

    #[test]
    fn hessian_is_congruent() {
        let t = rotation_like();
        let reference = dmatrix![2.0, 1.0; 1.0, -18.0];
        let mut actual = DMatrix::zeros(1, 1);
        t.transform_hessian_plain(&reference, &mut actual).unwrap();

        let j = t.jacobian();
        let expected = j.transpose() * &reference * j;
        assert_abs_diff_eq!(actual, expected, epsilon = 1e-12);
        assert_abs_diff_eq!(actual.clone(), actual.transpose(), epsilon = 1e-12);
    }

    #[test]
    fn hessian_workspace_is_reused() {
        let t = rotation_like();
        let reference = dmatrix![1.0, -3.0; 0.5, 4.0];
        let mut actual = DMatrix::zeros(2, 2);
        let mut work = DVector::zeros(0);

        t.transform_hessian_with_workspace(&reference, &mut actual, &mut work)
            .unwrap();
        assert_eq!(work.len(), 2);

        let j = t.jacobian();
        let expected = j.transpose() * &reference * j;
        assert_abs_diff_eq!(actual, expected, epsilon = 1e-12);

        let ptr = work.as_ptr();
        t.transform_hessian_with_workspace(&(reference * 2.0), &mut actual, &mut work)
            .unwrap();
        assert_eq!(work.as_ptr(), ptr);
        assert_abs_diff_eq!(actual, expected * 2.0, epsilon = 1e-12);
    }

    #[test]
    fn back_coordinates_reuse_buffer() {
        let t = rotation_like();
        let actual = dvector![3.0, -1.0];
        let mut reference = DVector::zeros(2);
        let ptr = reference.as_ptr();

        t.transform_back_coordinates_into(&actual, &mut reference)
            .unwrap();
        assert_eq!(reference.as_ptr(), ptr);

        let expected = t.jacobian() * (&actual - t.translation());
        assert_abs_diff_eq!(reference, expected, epsilon = 1e-12);
    }

    #[test]
    fn dimension_checked() {
        let t = rotation_like();
        assert_eq!(
            t.transform_back_coordinates(&dvector![1.0]),
            Err(Error::DimensionMismatch {
                expected: 2,
                actual: 1
            })
        );
    }
}
