//! Shield — last-writer safety gate.
//!
//! Grounded on `hti/core/shield.py`: pure veto policy (M0), fixed evaluation
//! order for stable `reason` strings, with an optional clamp path kept as a
//! documented hook rather than wired onto the default write path.

use crate::command::{Command, SafetyCaps};

/// Outcome of [`Shield::evaluate`]. `final_cmd` is the authoritative
/// actuator input for the cycle: the `proposed` value if accepted, the
/// `fallback` value if vetoed — never a partial merge.
#[derive(Debug, Clone, PartialEq)]
pub struct ShieldDecision {
    pub accepted: bool,
    pub reason: Option<String>,
    pub final_cmd: Command,
}

/// Fields clamped by [`Shield::clamp`], and what each was clamped from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClampInfo {
    pub v_cap_clamped_from: Option<f64>,
    pub fn_clamped_from: Option<f64>,
    pub tau_clamped_from: Option<f64>,
}

/// The last writer before actuators. Policy (M0): pure veto.
pub struct Shield {
    caps: SafetyCaps,
}

impl Shield {
    pub fn new(caps: SafetyCaps) -> Self {
        Self { caps }
    }

    pub fn caps(&self) -> SafetyCaps {
        self.caps
    }

    /// Evaluate a proposed command against hard caps, in fixed order:
    /// `v_cap`, then `fn`, then `|tau|`. Acceleration and jerk checks are
    /// explicitly deferred (documented hook — see `SafetyCaps::a_mps2`).
    pub fn evaluate(&self, proposed: Command, fallback: Command) -> ShieldDecision {
        let v = proposed.v_cap_or_zero();
        if v > self.caps.v_mps {
            return ShieldDecision {
                accepted: false,
                reason: Some(format!("v_cap>{}", self.caps.v_mps)),
                final_cmd: fallback,
            };
        }

        let fn_n = proposed.fn_or_zero();
        if fn_n > self.caps.fn_n {
            return ShieldDecision {
                accepted: false,
                reason: Some(format!("fn>{}", self.caps.fn_n)),
                final_cmd: fallback,
            };
        }

        let tau = proposed.tau_or_zero();
        if tau.abs() > self.caps.tau_nm {
            return ShieldDecision {
                accepted: false,
                reason: Some(format!("|tau|>{}", self.caps.tau_nm)),
                final_cmd: fallback,
            };
        }

        ShieldDecision {
            accepted: true,
            reason: None,
            final_cmd: proposed,
        }
    }

    /// Clamp path: saturate each offending field to its cap instead of
    /// vetoing outright. Not on the default write path in M0 — an
    /// extension hook for callers that prefer clamping over rejection.
    pub fn clamp(&self, proposed: Command) -> (Command, ClampInfo) {
        let mut out = proposed;
        let mut info = ClampInfo::default();

        if let Some(v) = out.v_cap {
            if v > self.caps.v_mps {
                info.v_cap_clamped_from = Some(v);
                out.v_cap = Some(self.caps.v_mps);
            }
        }
        if let Some(fn_n) = out.fn_n {
            if fn_n > self.caps.fn_n {
                info.fn_clamped_from = Some(fn_n);
                out.fn_n = Some(self.caps.fn_n);
            }
        }
        if let Some(tau) = out.tau {
            if tau.abs() > self.caps.tau_nm {
                info.tau_clamped_from = Some(tau);
                out.tau = Some(tau.clamp(-self.caps.tau_nm, self.caps.tau_nm));
            }
        }

        (out, info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps() -> SafetyCaps {
        SafetyCaps {
            v_mps: 0.25,
            a_mps2: 1.0,
            fn_n: 12.0,
            tau_nm: 6.0,
        }
    }

    #[test]
    fn accepts_within_caps() {
        let shield = Shield::new(caps());
        let proposed = Command {
            v_cap: Some(0.20),
            fn_n: Some(6.0),
            tau: Some(2.0),
        };
        let fallback = Command::zero_motion();
        let decision = shield.evaluate(proposed, fallback);
        assert!(decision.accepted);
        assert_eq!(decision.reason, None);
        assert_eq!(decision.final_cmd, proposed);
    }

    #[test]
    fn vetoes_v_cap_over_limit_in_fixed_order() {
        let shield = Shield::new(caps());
        let proposed = Command {
            v_cap: Some(0.40),
            fn_n: Some(6.0),
            tau: Some(2.0),
        };
        let fallback = Command {
            v_cap: Some(0.20),
            fn_n: Some(6.0),
            tau: Some(2.0),
        };
        let decision = shield.evaluate(proposed, fallback);
        assert!(!decision.accepted);
        assert!(decision.reason.unwrap().contains("v_cap"));
        assert_eq!(decision.final_cmd, fallback);
    }

    #[test]
    fn vetoes_fn_before_tau_when_both_violated() {
        let shield = Shield::new(caps());
        let proposed = Command {
            v_cap: Some(0.1),
            fn_n: Some(20.0),
            tau: Some(100.0),
        };
        let decision = shield.evaluate(proposed, Command::zero_motion());
        assert!(!decision.accepted);
        assert!(decision.reason.unwrap().starts_with("fn>"));
    }

    #[test]
    fn vetoes_tau_magnitude_both_signs() {
        let shield = Shield::new(caps());
        let proposed = Command {
            v_cap: Some(0.1),
            fn_n: Some(1.0),
            tau: Some(-7.0),
        };
        let decision = shield.evaluate(proposed, Command::zero_motion());
        assert!(!decision.accepted);
        assert!(decision.reason.unwrap().starts_with("|tau|>"));
    }

    #[test]
    fn final_cmd_is_never_a_partial_merge() {
        let shield = Shield::new(caps());
        let proposed = Command {
            v_cap: Some(10.0),
            fn_n: Some(1.0),
            tau: Some(1.0),
        };
        let fallback = Command {
            v_cap: Some(0.1),
            fn_n: Some(0.5),
            tau: Some(0.5),
        };
        let decision = shield.evaluate(proposed, fallback);
        assert_eq!(decision.final_cmd, fallback);
        assert_ne!(decision.final_cmd, proposed);
    }

    #[test]
    fn clamp_saturates_each_offending_field() {
        let shield = Shield::new(caps());
        let proposed = Command {
            v_cap: Some(0.5),
            fn_n: Some(20.0),
            tau: Some(-9.0),
        };
        let (clamped, info) = shield.clamp(proposed);
        assert_eq!(clamped.v_cap, Some(0.25));
        assert_eq!(clamped.fn_n, Some(12.0));
        assert_eq!(clamped.tau, Some(-6.0));
        assert_eq!(info.v_cap_clamped_from, Some(0.5));
        assert_eq!(info.fn_clamped_from, Some(20.0));
        assert_eq!(info.tau_clamped_from, Some(-9.0));
    }
}
