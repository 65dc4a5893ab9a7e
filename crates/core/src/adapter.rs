//! Adapter Manager — TTL-bounded advisory deltas with guaranteed rollback.
//!
//! Core TTL/rollback contract grounded on `hti/core/adapter.py`. The
//! optional magnitude bound on `apply` is grounded on
//! `crates/core/src/adaptive_engine/safety_executor.rs`'s `validate_delta`
//! in the teacher crate — it operationalizes the spec's introductory claim
//! that advisory adjustments are "bounded in magnitude" without changing the
//! single-slot TTL contract.
//!
//! Single-slot policy (M0): applying a new delta replaces the old one
//! immediately, no fairness or queue. Shared mutable state is guarded by a
//! single short critical section (`Mutex`); no lock crosses into the Ring
//! Buffer or Shield.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::clock::Clock;
use crate::error::AdapterRejected;

/// Who produced an [`AdapterDelta`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterSource {
    Predict,
    Probe,
    Manual,
}

/// A time-bounded set of control adjustments produced by an advisory band.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterDelta {
    pub ttl_ms: u32,
    pub source: AdapterSource,
    pub payload: HashMap<String, f64>,
}

impl AdapterDelta {
    pub fn new(ttl_ms: u32, source: AdapterSource, payload: HashMap<String, f64>) -> Self {
        assert!(ttl_ms > 0, "AdapterDelta::ttl_ms must be > 0");
        Self {
            ttl_ms,
            source,
            payload,
        }
    }
}

struct AdapterState {
    active: Option<AdapterDelta>,
    expiry: Option<f64>,
    rollback_requested: bool,
}

/// TTL + rollback manager owning at most one active [`AdapterDelta`].
pub struct AdapterManager<'c> {
    clock: &'c dyn Clock,
    state: Mutex<AdapterState>,
    /// Largest absolute payload value permitted on `apply`; `None` disables
    /// the check. This is additive safety texture beyond the source's
    /// original TTL-only contract.
    max_abs_payload_value: Option<f64>,
}

impl<'c> AdapterManager<'c> {
    pub fn new(clock: &'c dyn Clock) -> Self {
        Self {
            clock,
            state: Mutex::new(AdapterState {
                active: None,
                expiry: None,
                rollback_requested: false,
            }),
            max_abs_payload_value: None,
        }
    }

    pub fn with_magnitude_bound(clock: &'c dyn Clock, max_abs_payload_value: f64) -> Self {
        let mut mgr = Self::new(clock);
        mgr.max_abs_payload_value = Some(max_abs_payload_value);
        mgr
    }

    /// Install a single `AdapterDelta`, replacing any currently active one.
    /// Rejected (and not installed) if a magnitude bound is configured and
    /// any payload entry exceeds it.
    pub fn apply(&self, delta: AdapterDelta) -> Result<(), AdapterRejected> {
        if let Some(bound) = self.max_abs_payload_value {
            for (param, value) in &delta.payload {
                if value.abs() > bound {
                    return Err(AdapterRejected {
                        param: param.clone(),
                        delta: *value,
                        bound,
                    });
                }
            }
        }

        let now = self.clock.now();
        let mut state = self.state.lock().unwrap();
        state.expiry = Some(now + delta.ttl_ms as f64 / 1000.0);
        state.active = Some(delta);
        state.rollback_requested = false;
        Ok(())
    }

    /// Called once per Control tick. Evicts the active delta on TTL expiry
    /// and sets `rollback_requested` for exactly the one cycle following.
    pub fn cycle(&self) {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap();

        match state.expiry {
            None => {
                state.rollback_requested = false;
            }
            Some(expiry) if now >= expiry => {
                state.active = None;
                state.expiry = None;
                state.rollback_requested = true;
            }
            Some(_) => {
                state.rollback_requested = false;
            }
        }
    }

    pub fn active(&self) -> Option<AdapterDelta> {
        self.state.lock().unwrap().active.clone()
    }

    pub fn rollback_requested(&self) -> bool {
        self.state.lock().unwrap().rollback_requested
    }
}
