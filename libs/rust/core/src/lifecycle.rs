//! Service bootstrap finite state machine.
//!
//! Phases:
//! - Starting
//! - DependencyCheck
//! - ModelAcquisition
//! - ModelLoad
//! - Ready | Degraded (terminal, both long-running)
//!
//! Tracks time spent in each phase and rejects transitions the bootstrap
//! sequence never takes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::metrics::METRICS;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapPhase { Starting, DependencyCheck, ModelAcquisition, ModelLoad, Ready, Degraded }

impl BootstrapPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            BootstrapPhase::Starting => "starting",
            BootstrapPhase::DependencyCheck => "dependency_check",
            BootstrapPhase::ModelAcquisition => "model_acquisition",
            BootstrapPhase::ModelLoad => "model_load",
            BootstrapPhase::Ready => "ready",
            BootstrapPhase::Degraded => "degraded",
        }
    }

    pub fn is_terminal(&self) -> bool { matches!(self, BootstrapPhase::Ready | BootstrapPhase::Degraded) }

    fn can_move_to(&self, next: BootstrapPhase) -> bool {
        use BootstrapPhase::*;
        matches!(
            (self, next),
            (Starting, DependencyCheck)
                | (DependencyCheck, ModelAcquisition)
                | (DependencyCheck, Degraded)
                | (ModelAcquisition, ModelLoad)
                | (ModelAcquisition, Degraded)
                | (ModelLoad, Ready)
                | (ModelLoad, Degraded)
        )
    }
}

impl fmt::Display for BootstrapPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("invalid bootstrap transition {from} -> {to}")]
    InvalidTransition { from: BootstrapPhase, to: BootstrapPhase },
}

#[derive(Debug)]
pub struct BootstrapState {
    phase: BootstrapPhase,
    started_at: DateTime<Utc>,
    phase_started_at: Instant,
    phase_durations: Vec<(BootstrapPhase, Duration)>,
}

/// Serializable summary of a finished (or running) bootstrap.
#[derive(Debug, Clone, Serialize)]
pub struct BootstrapReport {
    pub phase: BootstrapPhase,
    pub started_at: DateTime<Utc>,
    pub phases: Vec<PhaseTiming>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhaseTiming { pub phase: BootstrapPhase, pub millis: u64 }

impl Default for BootstrapState {
    fn default() -> Self { Self::new() }
}

impl BootstrapState {
    pub fn new() -> Self {
        Self { phase: BootstrapPhase::Starting, started_at: Utc::now(), phase_started_at: Instant::now(), phase_durations: Vec::new() }
    }

    pub fn phase(&self) -> BootstrapPhase { self.phase }

    pub fn advance(&mut self, next: BootstrapPhase) -> Result<(), LifecycleError> {
        if !self.phase.can_move_to(next) {
            return Err(LifecycleError::InvalidTransition { from: self.phase, to: next });
        }
        let now = Instant::now();
        let dur = now - self.phase_started_at;
        METRICS.bootstrap_phase_seconds.with_label_values(&[self.phase.as_str()]).set(dur.as_secs_f64());
        self.phase_durations.push((self.phase, dur));
        tracing::debug!(target: "referee", from = %self.phase, to = %next, ?dur, "bootstrap transition");
        self.phase = next;
        self.phase_started_at = now;
        Ok(())
    }

    pub fn is_ready(&self) -> bool { self.phase == BootstrapPhase::Ready }
    pub fn is_finished(&self) -> bool { self.phase.is_terminal() }
    pub fn durations(&self) -> &[(BootstrapPhase, Duration)] { &self.phase_durations }

    pub fn report(&self) -> BootstrapReport {
        BootstrapReport {
            phase: self.phase,
            started_at: self.started_at,
            phases: self.phase_durations.iter().map(|(p, d)| PhaseTiming { phase: *p, millis: d.as_millis() as u64 }).collect(),
        }
    }
}
