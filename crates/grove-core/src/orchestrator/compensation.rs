//! LIFO stack of undo actions for multi-step provisioning.

use crate::error::{Error, Result};
use std::fmt;
use tracing::{debug, warn};

type Action<'a> = Box<dyn FnOnce() -> Result<()> + 'a>;

/// A compensation step that itself failed while unwinding.
#[derive(Debug)]
pub struct CompensationFailure {
    pub step: String,
    pub error: Error,
}

impl fmt::Display for CompensationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.step, self.error)
    }
}

/// Undo actions registered after each successful step.
///
/// Dropping the stack without calling [`Compensation::unwind`] discards the
/// actions; call [`Compensation::commit`] to make that explicit on success.
#[derive(Default)]
pub struct Compensation<'a> {
    actions: Vec<(String, Action<'a>)>,
}

impl<'a> Compensation<'a> {
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
        }
    }

    pub fn push(&mut self, step: impl Into<String>, action: impl FnOnce() -> Result<()> + 'a) {
        let step = step.into();
        debug!("Registered compensation: {}", step);
        self.actions.push((step, Box::new(action)));
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Registered step labels, oldest first.
    pub fn steps(&self) -> Vec<&str> {
        self.actions.iter().map(|(s, _)| s.as_str()).collect()
    }

    /// Run every action newest-first. Failures are logged and collected; the
    /// remaining actions still run.
    pub fn unwind(mut self) -> Vec<CompensationFailure> {
        let mut failures = Vec::new();
        while let Some((step, action)) = self.actions.pop() {
            debug!("Compensating: {}", step);
            if let Err(error) = action() {
                warn!("Compensation step '{}' failed: {}", step, error);
                failures.push(CompensationFailure { step, error });
            }
        }
        failures
    }

    /// The workflow succeeded; forget all actions.
    pub fn commit(mut self) {
        self.actions.clear();
    }
}
