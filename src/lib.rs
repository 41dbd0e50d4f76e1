//! Gibbs sampling of categorical parameters alongside differentiable
//! Gaussian-process building blocks on `burn` tensors.

pub mod core;
pub mod distributions;
pub mod error;
pub mod functions;
pub mod gibbs;
pub mod kernels;
pub mod math;
pub mod samples;

pub use error::{Error, Result, UpdateError};
