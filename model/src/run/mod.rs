/*!

The test-run lifecycle controller: provisions the namespace, optionally
installs the operator and publishes images, launches the driver pod, waits
for it to run, streams its output, and reads its terminal phase.

!*/

pub use controller::TestRun;
pub use error::{Error, Result};

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Pod;
use std::fmt;

mod controller;
mod error;

/// The driver pod's final lifecycle state. Anything other than `Succeeded`
/// makes the run a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalPhase {
    Succeeded,
    Failed,
    /// The phase never settled within the configured bound.
    Unknown,
}

impl TerminalPhase {
    fn of(pod: &Pod) -> Self {
        match pod_phase(pod) {
            Some("Succeeded") => TerminalPhase::Succeeded,
            Some("Failed") => TerminalPhase::Failed,
            _ => TerminalPhase::Unknown,
        }
    }
}

impl fmt::Display for TerminalPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminalPhase::Succeeded => write!(f, "Succeeded"),
            TerminalPhase::Failed => write!(f, "Failed"),
            TerminalPhase::Unknown => write!(f, "Unknown"),
        }
    }
}

/// The outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub terminal_phase: TerminalPhase,
    pub captured_at: DateTime<Utc>,
}

impl RunResult {
    pub fn succeeded(&self) -> bool {
        self.terminal_phase == TerminalPhase::Succeeded
    }
}

fn pod_phase(pod: &Pod) -> Option<&str> {
    pod.status.as_ref().and_then(|status| status.phase.as_deref())
}
