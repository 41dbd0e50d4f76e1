/*!
Discrete random variables used as priors and posterior summaries by the
Monte Carlo parameter groups.

The family is closed: a [`RandomVariable`] is either a [`Categorical`], a
point-mass [`ConstantRandomVariable`], a [`SamplesRandomVariable`] holding
posterior draws, or a [`BatchRandomVariables`] treating an ordered collection
of them as one vector-valued parameter.

# Examples

```rust
use mini_gpmc::distributions::{BatchRandomVariables, Categorical, DiscreteDistribution};
use rand::{rngs::SmallRng, SeedableRng};

let mut rng = SmallRng::seed_from_u64(42);

// Weights do not need to be normalized.
let cat = Categorical::new(vec![2.0, 3.0, 5.0]).unwrap();
let k = cat.sample(&mut rng);
assert!(k < cat.num_categories());
assert!((cat.log_prob(2).unwrap() - 0.5f64.ln()).abs() < 1e-12);

// The same prior for four elements of a vector-valued parameter.
let batch = BatchRandomVariables::replicate(cat.into(), 4);
assert_eq!(batch.sample(&mut rng).len(), 4);
```
*/

use std::fmt;

use rand::Rng;

use crate::error::{Error, Result};
use crate::math::softmax;
use crate::samples::SamplesRandomVariable;

/// A trait for discrete distributions whose state is represented as an index.
pub trait DiscreteDistribution {
    /// Samples an index from the distribution.
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> usize;
    /// Evaluates the log-probability of the given index.
    fn log_prob(&self, index: usize) -> Result<f64>;
}

/**
A categorical distribution over a finite set of categories.

The weights passed to [`Categorical::new`] are normalized so that they sum to 1.
*/
#[derive(Debug, Clone, PartialEq)]
pub struct Categorical {
    probs: Vec<f64>,
}

impl Categorical {
    /// Creates a new categorical distribution from non-negative weights.
    pub fn new(weights: Vec<f64>) -> Result<Self> {
        if weights.is_empty() {
            return Err(Error::InvalidWeights(
                "expected at least one category".to_string(),
            ));
        }
        if let Some(w) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(Error::InvalidWeights(format!(
                "weights must be finite and non-negative, got {w}"
            )));
        }
        let sum: f64 = weights.iter().sum();
        if sum <= 0.0 {
            return Err(Error::InvalidWeights(
                "weights must not all be zero".to_string(),
            ));
        }
        let probs = weights.into_iter().map(|w| w / sum).collect();
        Ok(Self { probs })
    }

    /// Uniform distribution over `num_categories` categories.
    pub fn uniform(num_categories: usize) -> Result<Self> {
        Self::new(vec![1.0; num_categories])
    }

    /// Creates a categorical distribution from unnormalized log-weights.
    pub fn from_log_weights(log_weights: &[f64]) -> Result<Self> {
        if log_weights.is_empty() {
            return Err(Error::InvalidWeights(
                "expected at least one category".to_string(),
            ));
        }
        let probs = softmax(log_weights).ok_or_else(|| {
            Error::InvalidWeights(format!(
                "log-weights have no finite normalizer: {log_weights:?}"
            ))
        })?;
        Ok(Self { probs })
    }

    pub fn num_categories(&self) -> usize {
        self.probs.len()
    }

    pub fn probs(&self) -> &[f64] {
        &self.probs
    }
}

impl DiscreteDistribution for Categorical {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let r: f64 = rng.gen();
        let mut cum = 0.0;
        for (i, &p) in self.probs.iter().enumerate() {
            cum += p;
            if r < cum {
                return i;
            }
        }
        // Rounding left `cum` just below one; fall back to the last possible category.
        self.probs.iter().rposition(|&p| p > 0.0).unwrap_or(0)
    }

    fn log_prob(&self, index: usize) -> Result<f64> {
        self.probs
            .get(index)
            .map(|p| p.ln())
            .ok_or(Error::CategoryOutOfRange {
                index,
                num_categories: self.probs.len(),
            })
    }
}

/// A point mass on a single category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantRandomVariable {
    value: usize,
}

impl ConstantRandomVariable {
    pub fn new(value: usize) -> Self {
        Self { value }
    }

    pub fn value(&self) -> usize {
        self.value
    }
}

impl DiscreteDistribution for ConstantRandomVariable {
    fn sample<R: Rng + ?Sized>(&self, _rng: &mut R) -> usize {
        self.value
    }

    fn log_prob(&self, index: usize) -> Result<f64> {
        if index == self.value {
            Ok(0.0)
        } else {
            Ok(f64::NEG_INFINITY)
        }
    }
}

/// Names the variant of a [`RandomVariable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RandomVariableKind {
    Categorical,
    Constant,
    Samples,
    Batch,
}

impl fmt::Display for RandomVariableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RandomVariableKind::Categorical => "a categorical random variable",
            RandomVariableKind::Constant => "a constant random variable",
            RandomVariableKind::Samples => "a samples random variable",
            RandomVariableKind::Batch => "a batch of random variables",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RandomVariable {
    Categorical(Categorical),
    Constant(ConstantRandomVariable),
    Samples(SamplesRandomVariable),
    Batch(BatchRandomVariables),
}

impl RandomVariable {
    pub fn kind(&self) -> RandomVariableKind {
        match self {
            RandomVariable::Categorical(_) => RandomVariableKind::Categorical,
            RandomVariable::Constant(_) => RandomVariableKind::Constant,
            RandomVariable::Samples(_) => RandomVariableKind::Samples,
            RandomVariable::Batch(_) => RandomVariableKind::Batch,
        }
    }

    /// Number of scalar elements a draw of this variable has.
    pub fn len(&self) -> usize {
        match self {
            RandomVariable::Categorical(_) | RandomVariable::Constant(_) => 1,
            RandomVariable::Samples(s) => s.batch_size(),
            RandomVariable::Batch(b) => b.iter().map(RandomVariable::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Draws one value, flattened to one index per element.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<usize> {
        match self {
            RandomVariable::Categorical(c) => vec![c.sample(rng)],
            RandomVariable::Constant(c) => vec![c.sample(rng)],
            RandomVariable::Samples(s) => s.sample(rng),
            RandomVariable::Batch(b) => b.sample(rng),
        }
    }

    /// Log-probability of `index` for a scalar variable.
    pub fn log_prob(&self, index: usize) -> Result<f64> {
        match self {
            RandomVariable::Categorical(c) => c.log_prob(index),
            RandomVariable::Constant(c) => c.log_prob(index),
            other => Err(Error::ShapeMismatch {
                expected: "a scalar random variable".to_string(),
                actual: other.kind().to_string(),
            }),
        }
    }
}

impl From<Categorical> for RandomVariable {
    fn from(value: Categorical) -> Self {
        RandomVariable::Categorical(value)
    }
}

impl From<ConstantRandomVariable> for RandomVariable {
    fn from(value: ConstantRandomVariable) -> Self {
        RandomVariable::Constant(value)
    }
}

impl From<SamplesRandomVariable> for RandomVariable {
    fn from(value: SamplesRandomVariable) -> Self {
        RandomVariable::Samples(value)
    }
}

impl From<BatchRandomVariables> for RandomVariable {
    fn from(value: BatchRandomVariables) -> Self {
        RandomVariable::Batch(value)
    }
}

/// An ordered collection of random variables treated as one vector-valued variable.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRandomVariables {
    elements: Vec<RandomVariable>,
}

impl BatchRandomVariables {
    pub fn new(elements: Vec<RandomVariable>) -> Self {
        Self { elements }
    }

    /// Uses the same random variable for `n` elements.
    pub fn replicate(rv: RandomVariable, n: usize) -> Self {
        Self {
            elements: vec![rv; n],
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&RandomVariable> {
        self.elements.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RandomVariable> {
        self.elements.iter()
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<usize> {
        self.elements.iter().flat_map(|rv| rv.sample(rng)).collect()
    }

    /// Log-probability of category `index` under element `element`.
    pub fn log_prob_at(&self, element: usize, index: usize) -> Result<f64> {
        self.elements
            .get(element)
            .ok_or(Error::ElementOutOfRange {
                index: element,
                len: self.elements.len(),
            })?
            .log_prob(index)
    }

    /// Joint log-probability of one index per element.
    pub fn log_prob(&self, values: &[usize]) -> Result<f64> {
        if values.len() != self.elements.len() {
            return Err(Error::ShapeMismatch {
                expected: format!("{} values", self.elements.len()),
                actual: format!("{} values", values.len()),
            });
        }
        values
            .iter()
            .enumerate()
            .map(|(j, &k)| self.log_prob_at(j, k))
            .sum()
    }
}

impl<'a> IntoIterator for &'a BatchRandomVariables {
    type Item = &'a RandomVariable;
    type IntoIter = std::slice::Iter<'a, RandomVariable>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

#[cfg(test)]
mod distributions_tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::{rngs::SmallRng, SeedableRng};

    #[test]
    fn categorical_normalizes_weights() {
        let cat = Categorical::new(vec![1.0, 1.0, 2.0]).unwrap();
        assert_eq!(cat.num_categories(), 3);
        assert_abs_diff_eq!(cat.probs()[2], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(cat.log_prob(0).unwrap(), 0.25f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn categorical_rejects_bad_weights() {
        assert!(matches!(
            Categorical::new(vec![]),
            Err(Error::InvalidWeights(_))
        ));
        assert!(Categorical::uniform(0).is_err());
        assert!(Categorical::new(vec![1.0, -0.5]).is_err());
        assert!(Categorical::new(vec![0.0, 0.0]).is_err());
        assert!(Categorical::new(vec![f64::NAN, 1.0]).is_err());
    }

    #[test]
    fn categorical_log_prob_out_of_range() {
        let cat = Categorical::uniform(2).unwrap();
        assert_eq!(
            cat.log_prob(2),
            Err(Error::CategoryOutOfRange {
                index: 2,
                num_categories: 2
            })
        );
    }

    #[test]
    fn categorical_from_log_weights() {
        let cat = Categorical::from_log_weights(&[-1000.0, -1000.0 + 3f64.ln()]).unwrap();
        assert_abs_diff_eq!(cat.probs()[0], 0.25, epsilon = 1e-9);
        assert_abs_diff_eq!(cat.probs()[1], 0.75, epsilon = 1e-9);
        assert!(Categorical::from_log_weights(&[f64::NEG_INFINITY]).is_err());
    }

    #[test]
    fn categorical_sample_frequencies() {
        let cat = Categorical::new(vec![0.2, 0.3, 0.5]).unwrap();
        let mut rng = SmallRng::seed_from_u64(42);
        let n = 20_000;
        let mut counts = [0usize; 3];
        for _ in 0..n {
            counts[cat.sample(&mut rng)] += 1;
        }
        for (count, p) in counts.iter().zip(cat.probs()) {
            let freq = *count as f64 / n as f64;
            assert!((freq - p).abs() < 0.02, "frequency {freq} vs {p}");
        }
    }

    #[test]
    fn categorical_never_samples_zero_weight() {
        let cat = Categorical::new(vec![0.0, 1.0, 0.0]).unwrap();
        let mut rng = SmallRng::seed_from_u64(7);
        assert!((0..1000).all(|_| cat.sample(&mut rng) == 1));
    }

    #[test]
    fn constant_is_a_point_mass() {
        let c = ConstantRandomVariable::new(3);
        let mut rng = SmallRng::seed_from_u64(0);
        assert_eq!(c.sample(&mut rng), 3);
        assert_eq!(c.log_prob(3).unwrap(), 0.0);
        assert_eq!(c.log_prob(1).unwrap(), f64::NEG_INFINITY);
    }

    #[test]
    fn batch_elementwise_contract() {
        let batch = BatchRandomVariables::new(vec![
            Categorical::new(vec![1.0, 3.0]).unwrap().into(),
            ConstantRandomVariable::new(1).into(),
        ]);
        assert_eq!(batch.len(), 2);
        assert_abs_diff_eq!(
            batch.log_prob_at(0, 1).unwrap(),
            0.75f64.ln(),
            epsilon = 1e-12
        );
        assert_eq!(batch.log_prob_at(1, 0).unwrap(), f64::NEG_INFINITY);
        assert_abs_diff_eq!(
            batch.log_prob(&[1, 1]).unwrap(),
            0.75f64.ln(),
            epsilon = 1e-12
        );
        assert!(matches!(
            batch.log_prob_at(2, 0),
            Err(Error::ElementOutOfRange { index: 2, len: 2 })
        ));
        assert!(batch.log_prob(&[0]).is_err());

        let mut rng = SmallRng::seed_from_u64(1);
        let draw = batch.sample(&mut rng);
        assert_eq!(draw.len(), 2);
        assert_eq!(draw[1], 1);
    }

    #[test]
    fn random_variable_kinds_and_lengths() {
        let cat: RandomVariable = Categorical::uniform(3).unwrap().into();
        assert_eq!(cat.kind(), RandomVariableKind::Categorical);
        assert_eq!(cat.len(), 1);
        let batch: RandomVariable = BatchRandomVariables::replicate(cat, 5).into();
        assert_eq!(batch.kind(), RandomVariableKind::Batch);
        assert_eq!(batch.len(), 5);
        assert!(batch.log_prob(0).is_err());
    }
}
