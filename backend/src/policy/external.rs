//! Externally driven policy
//!
//! Wraps a closure so a training loop, remote model or control plane can
//! answer the engine's per-minute query.

use super::{DispatchPolicy, PolicyError};
use crate::dispatch::{ActionMask, DispatchAction, Observation};

type DecideFn =
    Box<dyn FnMut(&Observation, &ActionMask) -> Result<DispatchAction, PolicyError> + Send>;

pub struct ExternalPolicy {
    name: String,
    decide: DecideFn,
}

impl ExternalPolicy {
    pub fn new<F>(name: impl Into<String>, decide: F) -> Self
    where
        F: FnMut(&Observation, &ActionMask) -> Result<DispatchAction, PolicyError> + Send + 'static,
    {
        Self {
            name: name.into(),
            decide: Box::new(decide),
        }
    }
}

impl DispatchPolicy for ExternalPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    fn decide(
        &mut self,
        observation: &Observation,
        mask: &ActionMask,
    ) -> Result<DispatchAction, PolicyError> {
        (self.decide)(observation, mask)
    }
}

impl std::fmt::Debug for ExternalPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalPolicy")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
