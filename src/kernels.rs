//! Covariance kernels on `burn` tensors.
//!
//! Kernels are written against any [`Backend`], so wrapping the backend in
//! `burn::backend::Autodiff` gives gradients with respect to inputs and
//! hyperparameters for free.

use burn::prelude::*;

use crate::error::{Error, Result};

/// A covariance function between the rows of two inputs.
pub trait Kernel<B: Backend> {
    /// Hyperparameters the kernel is evaluated with.
    type Params;

    /// Computes the `[n, m]` covariance between `x1: [n, d]` and `x2: [m, d]`.
    fn forward(&self, x1: Tensor<B, 2>, x2: Tensor<B, 2>, params: &Self::Params) -> Tensor<B, 2>;

    /// Like [`Kernel::forward`], with `x2` defaulting to `x1`.
    ///
    /// Fails if the inputs do not have the same number of columns.
    fn covariance(
        &self,
        x1: Tensor<B, 2>,
        x2: Option<Tensor<B, 2>>,
        params: &Self::Params,
    ) -> Result<Tensor<B, 2>> {
        let x2 = x2.unwrap_or_else(|| x1.clone());
        let (d1, d2) = (x1.dims()[1], x2.dims()[1]);
        if d1 != d2 {
            return Err(Error::ShapeMismatch {
                expected: format!("{d1} input columns"),
                actual: format!("{d2} input columns"),
            });
        }
        Ok(self.forward(x1, x2, params))
    }
}

/// Turns `n` scalar inputs into an `[n, 1]` matrix.
pub fn as_column<B: Backend>(x: Tensor<B, 1>) -> Tensor<B, 2> {
    x.unsqueeze_dim(1)
}

/// Pairwise squared Euclidean distances between the rows of `x1` and `x2`.
pub fn squared_distances<B: Backend>(x1: Tensor<B, 2>, x2: Tensor<B, 2>) -> Tensor<B, 2> {
    let [n, d] = x1.dims();
    let m = x2.dims()[0];
    let lhs = x1.unsqueeze_dim::<3>(1).expand([n, m, d]);
    let rhs = x2.unsqueeze_dim::<3>(0).expand([n, m, d]);
    (lhs - rhs).powi_scalar(2).sum_dim(2).reshape([n, m])
}

/// Radial basis function kernel, `k(a, b) = exp(-|a - b|^2 / exp(log_lengthscale))`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RbfKernel;

#[derive(Debug, Clone)]
pub struct RbfParams<B: Backend> {
    /// One-element tensor holding the log of the lengthscale.
    pub log_lengthscale: Tensor<B, 1>,
}

impl<B: Backend> RbfParams<B> {
    pub fn new(lengthscale: f64, device: &B::Device) -> Self {
        Self {
            log_lengthscale: Tensor::from_data(TensorData::new(vec![lengthscale.ln()], [1]), device),
        }
    }
}

impl<B: Backend> Kernel<B> for RbfKernel {
    type Params = RbfParams<B>;

    fn forward(&self, x1: Tensor<B, 2>, x2: Tensor<B, 2>, params: &Self::Params) -> Tensor<B, 2> {
        let sq_dist = squared_distances(x1, x2);
        let [n, m] = sq_dist.dims();
        let lengthscale = params
            .log_lengthscale
            .clone()
            .exp()
            .reshape([1, 1])
            .expand([n, m]);
        sq_dist.div(lengthscale).neg().exp()
    }
}
