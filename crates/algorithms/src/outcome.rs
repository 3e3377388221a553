//! Results of iterative and cancellable runs

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a run ended.
///
/// Neither non-convergence nor cancellation is an error: the output is still
/// returned, and the status says how far the run got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// The run finished normally
    Complete,
    /// The iteration cap was hit before the convergence criterion held
    ConvergenceIncomplete { iterations: usize },
    /// A cancellation request stopped the run at a block/iteration boundary
    Cancelled,
}

impl RunStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, RunStatus::Complete)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Complete => f.write_str("complete"),
            RunStatus::ConvergenceIncomplete { iterations } => {
                write!(f, "not converged after {} iterations", iterations)
            }
            RunStatus::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Output of a run together with its status
#[derive(Debug, Clone)]
pub struct Outcome<T> {
    pub output: T,
    pub status: RunStatus,
}

impl<T> Outcome<T> {
    pub fn complete(output: T) -> Self {
        Self {
            output,
            status: RunStatus::Complete,
        }
    }

    pub fn with_status(output: T, status: RunStatus) -> Self {
        Self { output, status }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            output: f(self.output),
            status: self.status,
        }
    }

    pub fn into_output(self) -> T {
        self.output
    }
}
