//! Log-space helpers used by the samplers.

use num_traits::Float;

/// Computes `log(sum(exp(x)))` without overflowing.
///
/// Returns `-inf` for an empty slice or when every entry is `-inf`, and `NaN`
/// if any entry is `NaN`.
pub fn logsumexp<T: Float>(values: &[T]) -> T {
    if values.iter().any(|x| x.is_nan()) {
        return T::nan();
    }
    let max = values.iter().copied().fold(T::neg_infinity(), T::max);
    if max == T::neg_infinity() || max == T::infinity() {
        return max;
    }
    let sum = values
        .iter()
        .fold(T::zero(), |acc, &x| acc + (x - max).exp());
    max + sum.ln()
}

/// Normalises log-weights in place so that `exp` of them sums to one.
///
/// Returns the normalising constant. When it is not finite the slice is left
/// untouched and the caller has to treat the weights as degenerate.
pub fn log_normalize<T: Float>(log_weights: &mut [T]) -> T {
    let norm = logsumexp(log_weights);
    if norm.is_finite() {
        log_weights.iter_mut().for_each(|x| *x = *x - norm);
    }
    norm
}

/// Turns log-weights into a probability vector.
pub fn softmax<T: Float>(log_weights: &[T]) -> Option<Vec<T>> {
    let mut normalized = log_weights.to_vec();
    let norm = log_normalize(&mut normalized);
    if !norm.is_finite() {
        return None;
    }
    Some(normalized.into_iter().map(T::exp).collect())
}
