//! Differentiable linear-algebra primitives.

use burn::prelude::*;
use nalgebra::DMatrix;

use crate::error::{Error, Result};

fn to_matrix<B: Backend>(t: &Tensor<B, 2>) -> Result<DMatrix<f64>> {
    let [rows, cols] = t.dims();
    let data = t
        .to_data()
        .convert::<f64>()
        .to_vec::<f64>()
        .map_err(|err| Error::TensorData(format!("{err:?}")))?;
    Ok(DMatrix::from_row_slice(rows, cols, &data))
}

fn from_matrix<B: Backend>(m: &DMatrix<f64>, device: &B::Device) -> Tensor<B, 2> {
    let (rows, cols) = m.shape();
    // nalgebra is column-major; the transpose's storage is the row-major layout.
    let data = m.transpose().as_slice().to_vec();
    Tensor::from_data(TensorData::new(data, [rows, cols]), device)
}

fn check_square<B: Backend>(a: &Tensor<B, 2>) -> Result<usize> {
    let [rows, cols] = a.dims();
    if rows != cols {
        return Err(Error::ShapeMismatch {
            expected: "a square matrix".to_string(),
            actual: format!("[{rows}, {cols}]"),
        });
    }
    Ok(rows)
}

/// Computes `A⁻¹B` inside the autodiff graph.
///
/// The solve itself runs on the host. The returned tensor is
/// `X + A⁻¹(B − A·X)` with `X = A⁻¹B` and `A⁻¹` held constant; the correction
/// term is zero in value and routes the gradients through the rule
///
/// ```text
/// dL/dB = A⁻ᵀ G
/// dL/dA = −A⁻ᵀ G Xᵀ
/// ```
///
/// where `G` is the upstream gradient.
pub fn invmm<B: Backend>(a: Tensor<B, 2>, b: Tensor<B, 2>) -> Result<Tensor<B, 2>> {
    let n = check_square(&a)?;
    let [rows, _] = b.dims();
    if rows != n {
        return Err(Error::ShapeMismatch {
            expected: format!("{n} rows on the right-hand side"),
            actual: format!("{rows} rows"),
        });
    }

    let device = a.device();
    let a_inv = to_matrix(&a)?
        .try_inverse()
        .ok_or(Error::SingularMatrix)?;
    let x = &a_inv * to_matrix(&b)?;

    let a_inv = from_matrix::<B>(&a_inv, &device);
    let x = from_matrix::<B>(&x, &device);
    let residual = b - a.matmul(x.clone());
    Ok(x + a_inv.matmul(residual))
}

/// Adds `diag` (a one-element tensor) to the diagonal of the square matrix `a`.
pub fn add_diag<B: Backend>(a: Tensor<B, 2>, diag: Tensor<B, 1>) -> Result<Tensor<B, 2>> {
    let n = check_square(&a)?;
    let device = a.device();
    let eye = from_matrix::<B>(&DMatrix::identity(n, n), &device);
    Ok(a + eye * diag.reshape([1, 1]).expand([n, n]))
}
