//! Gibbs sampling for groups of categorical parameters.
//!
//! Every element of every parameter is resampled from its exact full
//! conditional: the caller's log-likelihood is evaluated once per category with
//! all other elements held at their current values, the scores are combined
//! with the prior and normalized in log space, and the new value is drawn from
//! the resulting categorical distribution. Updates happen in place, so later
//! elements in a sweep condition on the values just drawn for earlier ones.
//!
//! # Example
//!
//! ```rust
//! use mini_gpmc::core::{McOptions, McParameterGroup};
//! use mini_gpmc::distributions::{BatchRandomVariables, Categorical};
//! use mini_gpmc::gibbs::CategoricalMcParameterGroup;
//!
//! let coin = Categorical::uniform(2).unwrap();
//! let mut group = CategoricalMcParameterGroup::new(vec![
//!     ("z", BatchRandomVariables::replicate(coin.into(), 3).into()),
//! ])
//! .unwrap()
//! .set_options(McOptions::new(50).set_seed(42));
//!
//! // Favour assignments where every element is 1.
//! group
//!     .update_with(|state| {
//!         let z = state.get("z").unwrap();
//!         z.iter().map(|&k| if k == 1 { 0.0 } else { -20.0 }).sum()
//!     })
//!     .unwrap();
//!
//! let posterior = group.posterior("z").unwrap();
//! assert_eq!(posterior.shape(), vec![50, 3]);
//! assert_eq!(posterior.mode().unwrap().to_vec(), vec![1, 1, 1]);
//! ```

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, trace};
use rand::rngs::SmallRng;
use rand::{thread_rng, Rng, SeedableRng};

use crate::core::{McOptions, McParameterGroup, Mode, ParameterState};
use crate::distributions::{
    BatchRandomVariables, Categorical, ConstantRandomVariable, DiscreteDistribution,
    RandomVariable,
};
use crate::error::{Error, Result, UpdateError};
use crate::math::log_normalize;
use crate::samples::SamplesRandomVariable;

/// A validated categorical prior: one distribution per element.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoricalPrior {
    elements: Vec<Categorical>,
    batched: bool,
}

impl CategoricalPrior {
    fn from_random_variable(name: &str, prior: RandomVariable) -> Result<Self> {
        match prior {
            RandomVariable::Categorical(c) => Ok(Self {
                elements: vec![c],
                batched: false,
            }),
            RandomVariable::Batch(batch) => {
                if batch.is_empty() {
                    return Err(Error::EmptyBatch {
                        name: name.to_string(),
                    });
                }
                let elements = batch
                    .iter()
                    .enumerate()
                    .map(|(index, rv)| match rv {
                        RandomVariable::Categorical(c) => Ok(c.clone()),
                        other => Err(Error::MixedBatch {
                            name: name.to_string(),
                            index,
                            kind: other.kind(),
                        }),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Self {
                    elements,
                    batched: true,
                })
            }
            other => Err(Error::InvalidPrior {
                name: name.to_string(),
                kind: other.kind(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn is_batched(&self) -> bool {
        self.batched
    }

    pub fn element(&self, index: usize) -> Option<&Categorical> {
        self.elements.get(index)
    }
}

/// Draws posterior samples for categorical parameters by Gibbs sampling.
#[derive(Debug)]
pub struct CategoricalMcParameterGroup {
    priors: Vec<CategoricalPrior>,
    state: ParameterState,
    snapshots: Vec<Option<RandomVariable>>,
    posteriors: Vec<Option<SamplesRandomVariable>>,
    options: McOptions,

    /// Random seed for reproducibility.
    pub seed: u64,

    rng: SmallRng,
}

impl CategoricalMcParameterGroup {
    /// Creates a group from `(name, prior)` pairs. Parameters are swept in the
    /// order given here.
    ///
    /// Every prior must be a [`Categorical`] or a non-empty batch of them.
    pub fn new<I, S>(priors: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, RandomVariable)>,
        S: Into<String>,
    {
        let mut state = ParameterState::default();
        let mut validated = Vec::new();
        for (name, prior) in priors {
            let name = name.into();
            if state.index_of(&name).is_some() {
                return Err(Error::DuplicateParameter { name });
            }
            let prior = CategoricalPrior::from_random_variable(&name, prior)?;
            state.push(name, prior.len());
            validated.push(prior);
        }

        let seed = thread_rng().gen::<u64>();
        let n = validated.len();
        Ok(Self {
            priors: validated,
            state,
            snapshots: vec![None; n],
            posteriors: vec![None; n],
            options: McOptions::default(),
            seed,
            rng: SmallRng::seed_from_u64(seed),
        })
    }

    /// Replaces the options, reseeding if they carry a seed.
    pub fn set_options(mut self, options: McOptions) -> Self {
        self.options = options;
        match options.seed {
            Some(seed) => self.set_seed(seed),
            None => self,
        }
    }

    /// Sets a new seed.
    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.options.seed = Some(seed);
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    pub fn prior(&self, name: &str) -> Option<&CategoricalPrior> {
        self.state.index_of(name).map(|p| &self.priors[p])
    }

    pub fn priors(&self) -> impl Iterator<Item = (&str, &CategoricalPrior)> {
        self.state.names().zip(&self.priors)
    }

    /// The point mass the chain of `name` was restarted from at the beginning
    /// of the most recent update, if it had a posterior by then.
    pub fn snapshot(&self, name: &str) -> Option<&RandomVariable> {
        self.state
            .index_of(name)
            .and_then(|p| self.snapshots[p].as_ref())
    }

    pub fn posteriors(&self) -> impl Iterator<Item = (&str, &SamplesRandomVariable)> {
        self.state
            .names()
            .zip(&self.posteriors)
            .filter_map(|(name, post)| post.as_ref().map(|post| (name, post)))
    }

    /// Runs [`McParameterGroup::update`] while displaying a progress bar with the
    /// log-likelihood of the latest accepted assignment.
    pub fn update_with_progress<F, E>(
        &mut self,
        mut log_likelihood: F,
    ) -> std::result::Result<(), UpdateError<E>>
    where
        F: FnMut(&ParameterState) -> std::result::Result<f64, E>,
    {
        let pb = ProgressBar::new(self.options.num_samples as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{prefix:8} {bar:40.white} ETA {eta:3} | {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb.set_prefix("Gibbs");
        let result = self.run(&mut log_likelihood, Some(&pb));
        match &result {
            Ok(()) => pb.finish_with_message("Done!"),
            Err(_) => pb.abandon_with_message("Failed"),
        }
        result
    }

    fn run<F, E>(
        &mut self,
        log_likelihood: &mut F,
        pb: Option<&ProgressBar>,
    ) -> std::result::Result<(), UpdateError<E>>
    where
        F: FnMut(&ParameterState) -> std::result::Result<f64, E>,
    {
        self.options.validate()?;
        let result = self.sweeps(log_likelihood, pb);
        // Leave the sweep even if it aborted half-way; buffers keep whatever was written.
        self.state.clear_proposal();
        self.state.set_mode(Mode::Evaluation);
        result
    }

    fn sweeps<F, E>(
        &mut self,
        log_likelihood: &mut F,
        pb: Option<&ProgressBar>,
    ) -> std::result::Result<(), UpdateError<E>>
    where
        F: FnMut(&ParameterState) -> std::result::Result<f64, E>,
    {
        let num_samples = self.options.num_samples;
        debug!(
            "Gibbs update: {} sweeps over {} parameters",
            num_samples,
            self.priors.len()
        );

        self.state.set_mode(Mode::Evaluation);
        self.restart_from_posteriors();

        self.state.set_mode(Mode::Sampling);
        self.allocate_posteriors(num_samples);

        for i in 0..num_samples {
            let mut last_loglik = f64::NAN;
            for p in 0..self.priors.len() {
                for j in 0..self.priors[p].len() {
                    let (s, loglik) = self.sample_element(log_likelihood, p, j)?;
                    self.state.set(p, j, s);
                    if let Some(post) = self.posteriors[p].as_mut() {
                        post.record(i, j, s);
                    }
                    last_loglik = loglik;
                }
            }
            trace!("sweep {i}: log-likelihood {last_loglik}");
            if let Some(pb) = pb {
                pb.inc(1);
                pb.set_message(format!("log-lik≈{:.2}", last_loglik));
            }
        }
        debug!("Gibbs update finished");
        Ok(())
    }

    /// Loads one stored draw of each existing posterior into the current values.
    fn restart_from_posteriors(&mut self) {
        for p in 0..self.priors.len() {
            let Some(posterior) = &self.posteriors[p] else {
                continue;
            };
            let draw = posterior.sample(&mut self.rng);
            if draw.len() != self.priors[p].len() {
                continue;
            }
            let snapshot = if self.priors[p].is_batched() {
                BatchRandomVariables::new(
                    draw.iter()
                        .map(|&k| ConstantRandomVariable::new(k).into())
                        .collect(),
                )
                .into()
            } else {
                ConstantRandomVariable::new(draw[0]).into()
            };
            self.state.assign(p, &draw);
            self.snapshots[p] = Some(snapshot);
        }
    }

    fn allocate_posteriors(&mut self, num_samples: usize) {
        for (p, prior) in self.priors.iter().enumerate() {
            let fits = self.posteriors[p]
                .as_ref()
                .is_some_and(|post| post.num_samples() == num_samples);
            if !fits {
                if self.posteriors[p].is_some() {
                    debug!("re-allocating posterior store for {num_samples} samples");
                }
                self.posteriors[p] = Some(SamplesRandomVariable::zeros(
                    num_samples,
                    prior.len(),
                    prior.is_batched(),
                ));
            }
        }
    }

    /// Draws element `j` of parameter `p` from its full conditional.
    ///
    /// Returns the draw and the log-likelihood of the state it completes.
    fn sample_element<F, E>(
        &mut self,
        log_likelihood: &mut F,
        p: usize,
        j: usize,
    ) -> std::result::Result<(usize, f64), UpdateError<E>>
    where
        F: FnMut(&ParameterState) -> std::result::Result<f64, E>,
    {
        let prior = &self.priors[p].elements[j];
        let num_categories = prior.num_categories();

        let mut logliks = Vec::with_capacity(num_categories);
        let mut log_posts = Vec::with_capacity(num_categories);
        for k in 0..num_categories {
            self.state.propose(p, j, k);
            let loglik = log_likelihood(&self.state).map_err(UpdateError::LogLikelihood)?;
            log_posts.push(loglik + prior.log_prob(k)?);
            logliks.push(loglik);
        }

        let degenerate = || Error::DegenerateConditional {
            name: self.state.names().nth(p).unwrap_or_default().to_string(),
            index: j,
        };
        if log_posts.iter().any(|lp| lp.is_nan() || *lp == f64::INFINITY) {
            return Err(degenerate().into());
        }
        if !log_normalize(&mut log_posts).is_finite() {
            return Err(degenerate().into());
        }

        let posts: Vec<f64> = log_posts.iter().map(|lp| lp.exp()).collect();
        let s = Categorical::new(posts)?.sample(&mut self.rng);
        Ok((s, logliks[s]))
    }
}

impl McParameterGroup for CategoricalMcParameterGroup {
    fn options(&self) -> &McOptions {
        &self.options
    }

    fn mode(&self) -> Mode {
        self.state.mode()
    }

    fn state(&self) -> &ParameterState {
        &self.state
    }

    fn posterior(&self, name: &str) -> Option<&SamplesRandomVariable> {
        self.state
            .index_of(name)
            .and_then(|p| self.posteriors[p].as_ref())
    }

    fn update<F, E>(&mut self, mut log_likelihood: F) -> std::result::Result<(), UpdateError<E>>
    where
        F: FnMut(&ParameterState) -> std::result::Result<f64, E>,
    {
        self.run(&mut log_likelihood, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributions::RandomVariableKind;
    use std::fmt;

    #[derive(Debug, PartialEq)]
    struct ModelError;

    impl fmt::Display for ModelError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "model blew up")
        }
    }

    impl std::error::Error for ModelError {}

    fn uniform(n: usize) -> RandomVariable {
        Categorical::uniform(n).unwrap().into()
    }

    fn batch(n_categories: usize, len: usize) -> RandomVariable {
        BatchRandomVariables::replicate(uniform(n_categories), len).into()
    }

    fn group(num_samples: usize, seed: u64) -> CategoricalMcParameterGroup {
        CategoricalMcParameterGroup::new(vec![("x", uniform(3)), ("z", batch(2, 4))])
            .unwrap()
            .set_options(McOptions::new(num_samples).set_seed(seed))
    }

    #[test]
    fn test_construction_allocates_zero_buffers() {
        let group = group(10, 0);
        assert_eq!(group.current_value("x"), Some(&[0][..]));
        assert_eq!(group.current_value("z"), Some(&[0, 0, 0, 0][..]));
        assert_eq!(group.mode(), Mode::Evaluation);
        assert!(group.posterior("x").is_none());
        assert!(!group.prior("x").unwrap().is_batched());
        assert!(group.prior("z").unwrap().is_batched());
        let names: Vec<&str> = group.priors().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["x", "z"]);
    }

    #[test]
    fn test_rejects_non_categorical_priors() {
        let err = CategoricalMcParameterGroup::new(vec![
            ("x", uniform(2)),
            ("c", ConstantRandomVariable::new(1).into()),
        ])
        .err()
        .unwrap();
        assert_eq!(
            err,
            Error::InvalidPrior {
                name: "c".to_string(),
                kind: RandomVariableKind::Constant
            }
        );

        let mixed: RandomVariable =
            BatchRandomVariables::new(vec![uniform(2), ConstantRandomVariable::new(0).into()])
                .into();
        assert!(matches!(
            CategoricalMcParameterGroup::new(vec![("m", mixed)]),
            Err(Error::MixedBatch { index: 1, .. })
        ));

        let nested: RandomVariable = BatchRandomVariables::new(vec![batch(2, 2)]).into();
        assert!(matches!(
            CategoricalMcParameterGroup::new(vec![("n", nested)]),
            Err(Error::MixedBatch {
                kind: RandomVariableKind::Batch,
                ..
            })
        ));

        let empty: RandomVariable = BatchRandomVariables::new(vec![]).into();
        assert!(matches!(
            CategoricalMcParameterGroup::new(vec![("e", empty)]),
            Err(Error::EmptyBatch { .. })
        ));

        assert!(matches!(
            CategoricalMcParameterGroup::new(vec![("x", uniform(2)), ("x", uniform(3))]),
            Err(Error::DuplicateParameter { .. })
        ));
    }

    #[test]
    fn test_posterior_shapes_and_ranges() {
        let mut group = group(25, 1);
        group.update_with(|_| 0.0).unwrap();

        let x = group.posterior("x").unwrap();
        assert_eq!(x.shape(), vec![25]);
        assert!(x.as_array().iter().all(|&k| k < 3));

        let z = group.posterior("z").unwrap();
        assert_eq!(z.shape(), vec![25, 4]);
        assert!(z.as_array().iter().all(|&k| k < 2));
    }

    #[test]
    fn test_reinvocation_overwrites_posteriors() {
        let mut group = group(30, 2);
        assert!(group.snapshot("z").is_none());
        group.update_with(|_| 0.0).unwrap();
        assert!(group.snapshot("z").is_none());

        group.update_with(|_| 0.0).unwrap();
        assert_eq!(group.posterior("x").unwrap().shape(), vec![30]);
        assert_eq!(group.posterior("z").unwrap().shape(), vec![30, 4]);

        match group.snapshot("x") {
            Some(RandomVariable::Constant(c)) => assert!(c.value() < 3),
            other => panic!("expected a constant snapshot, got {other:?}"),
        }
        match group.snapshot("z") {
            Some(RandomVariable::Batch(b)) => assert_eq!(b.len(), 4),
            other => panic!("expected a batch snapshot, got {other:?}"),
        }

        let mut group = group.set_options(McOptions::new(7));
        group.update_with(|_| 0.0).unwrap();
        assert_eq!(group.posterior("z").unwrap().shape(), vec![7, 4]);
    }

    #[test]
    fn test_same_seed_same_draws() {
        let loglik = |state: &ParameterState| {
            let x = state.value("x", 0).unwrap() as f64;
            let z: usize = state.get("z").unwrap().iter().sum();
            -0.3 * x + 0.7 * z as f64
        };
        let mut a = group(40, 123);
        let mut b = group(40, 123);
        a.update_with(loglik).unwrap();
        b.update_with(loglik).unwrap();
        assert_eq!(a.posterior("x"), b.posterior("x"));
        assert_eq!(a.posterior("z"), b.posterior("z"));

        let mut c = group(40, 124);
        c.update_with(loglik).unwrap();
        assert_ne!(a.posterior("z"), c.posterior("z"));
    }

    #[test]
    fn test_closure_sees_sampling_mode_and_proposals_in_order() {
        let mut group = CategoricalMcParameterGroup::new(vec![("x", uniform(3)), ("z", batch(2, 2))])
            .unwrap()
            .set_options(McOptions::new(1).set_seed(5));
        let mut seen = Vec::new();
        group
            .update_with(|state| {
                assert_eq!(state.mode(), Mode::Sampling);
                let proposal = state.proposal().unwrap();
                assert_eq!(
                    state.value(proposal.name, proposal.element),
                    Some(proposal.category)
                );
                seen.push((
                    proposal.name.to_string(),
                    proposal.element,
                    proposal.category,
                ));
                0.0
            })
            .unwrap();
        let expected: Vec<(String, usize, usize)> = vec![
            ("x".into(), 0, 0),
            ("x".into(), 0, 1),
            ("x".into(), 0, 2),
            ("z".into(), 0, 0),
            ("z".into(), 0, 1),
            ("z".into(), 1, 0),
            ("z".into(), 1, 1),
        ];
        assert_eq!(seen, expected);
        assert_eq!(group.mode(), Mode::Evaluation);
        assert!(group.state().proposal().is_none());
    }

    #[test]
    fn test_likelihood_dominates_prior() {
        let mut group = group(20, 3);
        group
            .update_with(|state| {
                if state.value("x", 0) == Some(2) {
                    0.0
                } else {
                    -1.0e4
                }
            })
            .unwrap();
        let x = group.posterior("x").unwrap();
        assert!(x.as_array().iter().all(|&k| k == 2));
        assert_eq!(group.current_value("x"), Some(&[2][..]));
    }

    #[test]
    fn test_elements_condition_on_fresh_siblings() {
        // Only assignments where both elements agree have non-negligible mass.
        let mut group = CategoricalMcParameterGroup::new(vec![("z", batch(2, 2))])
            .unwrap()
            .set_options(McOptions::new(200).set_seed(11));
        group
            .update_with(|state| {
                let z = state.get("z").unwrap();
                if z[0] == z[1] {
                    0.0
                } else {
                    -50.0
                }
            })
            .unwrap();
        let z = group.posterior("z").unwrap().as_array().to_owned();
        for row in z.rows() {
            assert_eq!(row[0], row[1]);
        }
    }

    #[test]
    fn test_prior_weights_respected() {
        let skewed: RandomVariable = Categorical::new(vec![0.0, 1.0, 0.0]).unwrap().into();
        let mut group = CategoricalMcParameterGroup::new(vec![("x", skewed)])
            .unwrap()
            .set_options(McOptions::new(50).set_seed(4));
        group.update_with(|_| 0.0).unwrap();
        assert!(group
            .posterior("x")
            .unwrap()
            .as_array()
            .iter()
            .all(|&k| k == 1));
    }

    #[test]
    fn test_closure_failure_propagates_and_restores_mode() {
        let mut group = group(10, 6);
        let mut calls = 0;
        let err = group
            .update(|_| {
                calls += 1;
                if calls == 5 {
                    Err(ModelError)
                } else {
                    Ok(0.0)
                }
            })
            .unwrap_err();
        assert!(matches!(err, UpdateError::LogLikelihood(ModelError)));
        assert!(err.sampler_error().is_none());
        assert_eq!(calls, 5);
        assert_eq!(group.mode(), Mode::Evaluation);
        assert!(group.state().proposal().is_none());
    }

    #[test]
    fn test_non_finite_loglik_is_degenerate() {
        let mut group = group(10, 7);
        let err = group.update_with(|_| f64::NAN).unwrap_err();
        assert_eq!(
            err,
            Error::DegenerateConditional {
                name: "x".to_string(),
                index: 0
            }
        );
        assert_eq!(group.mode(), Mode::Evaluation);

        let err = group.update_with(|_| f64::NEG_INFINITY).unwrap_err();
        assert!(matches!(err, Error::DegenerateConditional { .. }));
    }

    #[test]
    fn test_zero_samples_rejected() {
        let mut group = group(0, 8);
        assert!(matches!(
            group.update_with(|_| 0.0),
            Err(Error::InvalidOptions(_))
        ));
        assert!(group.posterior("x").is_none());
    }

    #[test]
    fn test_update_with_progress() {
        let mut group = group(15, 9);
        group
            .update_with_progress(|_| Ok::<f64, ModelError>(0.0))
            .unwrap();
        assert_eq!(group.posterior("z").unwrap().shape(), vec![15, 4]);
        assert_eq!(group.posteriors().count(), 2);
    }
}
