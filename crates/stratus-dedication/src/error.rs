//! Dedication constraint error types.

use stratus_topology::TopologyError;
use thiserror::Error;

/// Result type alias for dedication constraint processing.
pub type DedicationResult<T> = Result<T, DedicationError>;

/// Errors raised while processing dedication constraints.
///
/// A `Conflict` is fatal to the current placement attempt: the plan pins a
/// topology element the VM's dedication policy forbids, and the caller
/// must re-plan with a less constrained input. Directory failures
/// propagate unchanged — dedication correctness is never approximated.
#[derive(Debug, Error)]
pub enum DedicationError {
    #[error("placement denied: {element} is not dedicated to the requesting owner")]
    Conflict { element: String },

    #[error("topology directory error: {0}")]
    Directory(#[from] TopologyError),
}

impl DedicationError {
    pub(crate) fn conflict(element: impl Into<String>) -> Self {
        DedicationError::Conflict {
            element: element.into(),
        }
    }
}
