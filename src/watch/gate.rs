// src/watch/gate.rs

//! Per-rule rerun gate.
//!
//! While a rule's run is in flight, further triggers collapse into at most
//! one pending rerun that starts when the current run finishes.

use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum GateState {
    #[default]
    Idle,
    Running,
    RunningWithPending,
}

/// What a trigger should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// No run in flight: the caller starts one now.
    Start,
    /// A run is in flight: a rerun was queued behind it.
    Queued,
    /// A rerun was already queued; this trigger is absorbed by it.
    Coalesced,
}

#[derive(Debug, Default)]
pub struct RerunGate {
    state: Mutex<GateState>,
}

impl RerunGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) -> GateDecision {
        let mut state = self.lock();
        let (next, decision) = match *state {
            GateState::Idle => (GateState::Running, GateDecision::Start),
            GateState::Running => (GateState::RunningWithPending, GateDecision::Queued),
            GateState::RunningWithPending => {
                (GateState::RunningWithPending, GateDecision::Coalesced)
            }
        };
        *state = next;
        decision
    }

    /// Mark the current run finished.
    ///
    /// Returns `true` when a rerun was pending; the gate stays held and the
    /// caller must run again.
    pub fn finish(&self) -> bool {
        let mut state = self.lock();
        match *state {
            GateState::RunningWithPending => {
                *state = GateState::Running;
                true
            }
            GateState::Running | GateState::Idle => {
                *state = GateState::Idle;
                false
            }
        }
    }

    pub fn is_idle(&self) -> bool {
        *self.lock() == GateState::Idle
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triggers_during_a_run_collapse_into_one_rerun() {
        let gate = RerunGate::new();
        assert_eq!(gate.request(), GateDecision::Start);
        assert_eq!(gate.request(), GateDecision::Queued);
        assert_eq!(gate.request(), GateDecision::Coalesced);
        assert_eq!(gate.request(), GateDecision::Coalesced);

        assert!(gate.finish(), "one rerun pending");
        assert!(!gate.is_idle());
        assert!(!gate.finish(), "no second rerun");
        assert!(gate.is_idle());
    }

    #[test]
    fn finish_without_pending_returns_to_idle() {
        let gate = RerunGate::new();
        gate.request();
        assert!(!gate.finish());
        assert_eq!(gate.request(), GateDecision::Start);
    }
}
