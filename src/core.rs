//! Building blocks shared by Monte Carlo parameter groups.
//!
//! A parameter group owns a named set of discrete parameters, their priors, the
//! values they currently hold and the posterior draws collected for them. The
//! caller's log-likelihood never reaches into the group: every evaluation gets
//! a [`ParameterState`] describing the assignment it should score.

use std::convert::Infallible;

use burn::prelude::*;

use crate::error::{Error, Result, UpdateError};
use crate::samples::SamplesRandomVariable;

/// Which phase of an update a log-likelihood evaluation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Outside of a sweep: values are point estimates, nothing is recorded.
    #[default]
    Evaluation,
    /// Inside a Gibbs sweep: the state holds a hypothesised assignment.
    Sampling,
}

impl Mode {
    pub fn is_sampling(&self) -> bool {
        matches!(self, Mode::Sampling)
    }
}

/// Settings for a Monte Carlo parameter group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct McOptions {
    /// Number of Gibbs sweeps (and recorded draws) per update.
    pub num_samples: usize,
    /// Seed for the group's random number generator. Drawn from entropy if unset.
    pub seed: Option<u64>,
}

impl Default for McOptions {
    fn default() -> Self {
        Self {
            num_samples: 20,
            seed: None,
        }
    }
}

impl McOptions {
    pub fn new(num_samples: usize) -> Self {
        Self {
            num_samples,
            ..Default::default()
        }
    }

    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_samples == 0 {
            return Err(Error::InvalidOptions(
                "num_samples must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// The assignment a log-likelihood evaluation is asked to score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Proposal<'a> {
    pub name: &'a str,
    pub element: usize,
    pub category: usize,
}

/// Current values of every parameter in a group, in registration order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterState {
    names: Vec<String>,
    values: Vec<Vec<usize>>,
    mode: Mode,
    // (parameter, element, category)
    proposal: Option<(usize, usize, usize)>,
}

impl ParameterState {
    pub(crate) fn push(&mut self, name: String, len: usize) {
        self.names.push(name);
        self.values.push(vec![0; len]);
    }

    pub(crate) fn set(&mut self, parameter: usize, element: usize, category: usize) {
        self.values[parameter][element] = category;
    }

    pub(crate) fn assign(&mut self, parameter: usize, values: &[usize]) {
        self.values[parameter].copy_from_slice(values);
    }

    pub(crate) fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    pub(crate) fn propose(&mut self, parameter: usize, element: usize, category: usize) {
        self.set(parameter, element, category);
        self.proposal = Some((parameter, element, category));
    }

    pub(crate) fn clear_proposal(&mut self) {
        self.proposal = None;
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The hypothesised assignment being scored, if any.
    pub fn proposal(&self) -> Option<Proposal<'_>> {
        self.proposal.map(|(p, element, category)| Proposal {
            name: &self.names[p],
            element,
            category,
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn get(&self, name: &str) -> Option<&[usize]> {
        self.index_of(name).map(|i| self.values[i].as_slice())
    }

    pub fn value(&self, name: &str, element: usize) -> Option<usize> {
        self.get(name).and_then(|v| v.get(element).copied())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[usize])> {
        self.names
            .iter()
            .zip(&self.values)
            .map(|(n, v)| (n.as_str(), v.as_slice()))
    }

    /// Current values of `name` as an integer tensor of shape `[len]`.
    pub fn to_tensor<B: Backend>(&self, name: &str, device: &B::Device) -> Option<Tensor<B, 1, Int>> {
        let values = self.get(name)?;
        let data: Vec<i64> = values.iter().map(|&v| v as i64).collect();
        Some(Tensor::from_data(
            TensorData::new(data, [values.len()]),
            device,
        ))
    }

    /// One-hot encoding of `name`, shape `[len, num_categories]`.
    ///
    /// Lets the continuous part of a model consume a sampled assignment as a
    /// regular (differentiable) tensor.
    pub fn one_hot<B: Backend>(
        &self,
        name: &str,
        num_categories: usize,
        device: &B::Device,
    ) -> Result<Tensor<B, 2>> {
        let values = self.get(name).ok_or_else(|| Error::ShapeMismatch {
            expected: "a registered parameter".to_string(),
            actual: format!("`{name}`"),
        })?;
        let mut data = vec![0.0f64; values.len() * num_categories];
        for (j, &k) in values.iter().enumerate() {
            if k >= num_categories {
                return Err(Error::CategoryOutOfRange {
                    index: k,
                    num_categories,
                });
            }
            data[j * num_categories + k] = 1.0;
        }
        Ok(Tensor::from_data(
            TensorData::new(data, [values.len(), num_categories]),
            device,
        ))
    }
}

/// A group of parameters updated together by a Monte Carlo scheme.
pub trait McParameterGroup {
    fn options(&self) -> &McOptions;

    fn mode(&self) -> Mode;

    fn state(&self) -> &ParameterState;

    fn posterior(&self, name: &str) -> Option<&SamplesRandomVariable>;

    /// Draws `options().num_samples` new posterior samples for every parameter.
    ///
    /// `log_likelihood` scores the model under the assignment in the given
    /// state. Its errors abort the update and are returned unchanged.
    fn update<F, E>(&mut self, log_likelihood: F) -> std::result::Result<(), UpdateError<E>>
    where
        F: FnMut(&ParameterState) -> std::result::Result<f64, E>;

    /// Same as [`McParameterGroup::update`] for a log-likelihood that cannot fail.
    fn update_with<F>(&mut self, mut log_likelihood: F) -> Result<()>
    where
        F: FnMut(&ParameterState) -> f64,
        Self: Sized,
    {
        self.update(|state| Ok::<f64, Infallible>(log_likelihood(state)))
            .map_err(|err| match err {
                UpdateError::Sampler(err) => err,
                UpdateError::LogLikelihood(never) => match never {},
            })
    }

    fn current_value(&self, name: &str) -> Option<&[usize]> {
        self.state().get(name)
    }
}
