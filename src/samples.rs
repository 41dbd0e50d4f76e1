//! Posterior draws of a categorical parameter and their summary statistics.

use ndarray::prelude::*;
use ndarray_stats::QuantileExt;
use rand::Rng;

use crate::error::{Error, Result};

/// Draws stored as a `[n_samples, batch_size]` matrix of category indices.
///
/// Scalar parameters keep a single column but report their shape as
/// `[n_samples]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplesRandomVariable {
    draws: Array2<usize>,
    batched: bool,
}

impl SamplesRandomVariable {
    /// A zero-filled store for `n_samples` draws of `batch_size` elements.
    pub fn zeros(n_samples: usize, batch_size: usize, batched: bool) -> Self {
        Self {
            draws: Array2::zeros((n_samples, batch_size)),
            batched,
        }
    }

    pub fn from_draws(draws: Array2<usize>) -> Self {
        Self {
            draws,
            batched: true,
        }
    }

    pub fn from_scalar_draws(draws: Array1<usize>) -> Self {
        Self {
            draws: draws.insert_axis(Axis(1)),
            batched: false,
        }
    }

    pub(crate) fn record(&mut self, iteration: usize, element: usize, value: usize) {
        self.draws[[iteration, element]] = value;
    }

    pub fn num_samples(&self) -> usize {
        self.draws.nrows()
    }

    pub fn batch_size(&self) -> usize {
        self.draws.ncols()
    }

    pub fn is_batched(&self) -> bool {
        self.batched
    }

    /// `[n_samples, batch_size]` for batches, `[n_samples]` for scalars.
    pub fn shape(&self) -> Vec<usize> {
        if self.batched {
            vec![self.num_samples(), self.batch_size()]
        } else {
            vec![self.num_samples()]
        }
    }

    pub fn as_array(&self) -> ArrayView2<'_, usize> {
        self.draws.view()
    }

    /// Draws of a single element, in sampling order.
    pub fn column(&self, element: usize) -> Option<ArrayView1<'_, usize>> {
        (element < self.batch_size()).then(|| self.draws.column(element))
    }

    /// Per-element mean of the drawn indices.
    pub fn mean(&self) -> Option<Array1<f64>> {
        self.draws.mapv(|x| x as f64).mean_axis(Axis(0))
    }

    /// Per-element sample variance, unbiased when more than one draw is stored.
    pub fn variance(&self) -> Option<Array1<f64>> {
        let n = self.num_samples();
        if n == 0 {
            return None;
        }
        let ddof = if n > 1 { 1.0 } else { 0.0 };
        Some(self.draws.mapv(|x| x as f64).var_axis(Axis(0), ddof))
    }

    /// Per-element most frequent category. Ties go to the smaller index.
    pub fn mode(&self) -> Option<Array1<usize>> {
        if self.num_samples() == 0 {
            return None;
        }
        let n_categories = self.draws.iter().copied().max().unwrap_or(0) + 1;
        self.draws
            .columns()
            .into_iter()
            .map(|col| {
                let mut counts = Array1::<usize>::zeros(n_categories);
                col.iter().for_each(|&k| counts[k] += 1);
                counts.argmax().ok()
            })
            .collect::<Option<Vec<usize>>>()
            .map(Array1::from)
    }

    /// Empirical category frequencies, shape `[batch_size, n_categories]`.
    pub fn frequencies(&self, n_categories: usize) -> Result<Array2<f64>> {
        let mut freqs = Array2::<f64>::zeros((self.batch_size(), n_categories));
        for (j, col) in self.draws.columns().into_iter().enumerate() {
            for &k in col.iter() {
                if k >= n_categories {
                    return Err(Error::CategoryOutOfRange {
                        index: k,
                        num_categories: n_categories,
                    });
                }
                freqs[[j, k]] += 1.0;
            }
        }
        let n = self.num_samples().max(1) as f64;
        Ok(freqs / n)
    }

    /// Returns one stored draw, chosen uniformly at random.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<usize> {
        if self.num_samples() == 0 {
            return Vec::new();
        }
        let i = rng.gen_range(0..self.num_samples());
        self.draws.row(i).to_vec()
    }
}
