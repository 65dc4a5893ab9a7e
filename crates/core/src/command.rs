//! Actuator command and safety-cap value types.
//!
//! `Command` is modeled as a small struct with `Option<f64>` fields rather
//! than an open map: the source's `Command` is a loose dict with three
//! recognized keys (`v_cap`, `fn`, `tau`) and missing keys treated as zero.
//! M0 does not need an extension point at the type level, so unknown fields
//! are simply not representable — see `DESIGN.md` for the open-question
//! decision. Commands, caps, and decisions are values: nothing here is
//! `Clone`-avoidant or holds a borrow back to a caller.

use serde::{Deserialize, Serialize};

/// A command to the actuators: TCP velocity cap, normal force, joint torque.
///
/// Missing fields default to zero when read via the `*_or_zero` accessors,
/// matching the source's `dict.get(key, 0.0)` semantics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub v_cap: Option<f64>,
    pub fn_n: Option<f64>,
    pub tau: Option<f64>,
}

impl Command {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_v_cap(v_cap: f64) -> Self {
        Self {
            v_cap: Some(v_cap),
            ..Self::default()
        }
    }

    pub fn v_cap_or_zero(&self) -> f64 {
        self.v_cap.unwrap_or(0.0)
    }

    pub fn fn_or_zero(&self) -> f64 {
        self.fn_n.unwrap_or(0.0)
    }

    pub fn tau_or_zero(&self) -> f64 {
        self.tau.unwrap_or(0.0)
    }

    /// Zero-motion command used as the Risk Gate's abstain collapse target.
    pub fn zero_motion() -> Self {
        Self {
            v_cap: Some(0.0),
            ..Self::default()
        }
    }
}

/// Immutable hard ceilings enforced by the Shield. Built once at startup
/// from config; never mutated thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafetyCaps {
    /// TCP velocity cap, m/s.
    pub v_mps: f64,
    /// TCP acceleration cap, m/s^2 (not enforced in M0 — see `Shield`).
    pub a_mps2: f64,
    /// Normal force cap, N.
    pub fn_n: f64,
    /// Per-joint torque magnitude cap, N*m.
    pub tau_nm: f64,
}
