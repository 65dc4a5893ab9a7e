//! Risk Gate — pre-Shield admission control.
//!
//! Grounded on `hti/core/risk.py`: deterministic `risk = uncertainty *
//! hazard`, ABSTAIN at `risk >= tau` (exact equality abstains). Uncertainty
//! is a swappable source; M0 uses a config-provided constant stub.

use crate::command::{Command, SafetyCaps};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Abstain,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskDecision {
    pub decision: Decision,
    pub risk: f64,
    pub uncertainty: f64,
    pub hazard: f64,
}

/// Source of the uncertainty scalar `U`. M0 implements a fixed stub;
/// production OOD detectors or conformal residual estimators plug in here
/// without touching `RiskGate::decide`.
pub trait UncertaintySource: Send + Sync {
    fn uncertainty(&self) -> f64;
}

/// M0 stub: a fixed uncertainty value taken from config.
pub struct ConstantUncertainty(pub f64);

impl UncertaintySource for ConstantUncertainty {
    fn uncertainty(&self) -> f64 {
        self.0
    }
}

/// Pre-Shield admission controller. ABSTAIN is an operational soft-stop,
/// distinct from a Shield veto, and is counted separately.
pub struct RiskGate {
    tau: f64,
    uncertainty: Box<dyn UncertaintySource>,
}

impl RiskGate {
    pub fn new(tau: f64, uncertainty: Box<dyn UncertaintySource>) -> Self {
        Self { tau, uncertainty }
    }

    pub fn with_constant_uncertainty(tau: f64, uncertainty_stub: f64) -> Self {
        Self::new(tau, Box::new(ConstantUncertainty(uncertainty_stub)))
    }

    /// Hazard is the maximum of normalized ratios of commanded quantities to
    /// caps. M0 implements only the `v_cap` term; additional terms (e.g.
    /// normal-force hazard) are explicitly pluggable by extending this
    /// method once more observation fields are wired through.
    pub fn compute_hazard(&self, cmd: &Command, caps: &SafetyCaps) -> f64 {
        let h_v = if caps.v_mps > 0.0 {
            (cmd.v_cap_or_zero() / caps.v_mps).max(0.0)
        } else {
            0.0
        };
        h_v.max(0.0)
    }

    pub fn decide(&self, cmd: &Command, caps: &SafetyCaps) -> RiskDecision {
        let uncertainty = self.uncertainty.uncertainty();
        let hazard = self.compute_hazard(cmd, caps);
        let risk = uncertainty * hazard;
        let decision = if risk >= self.tau {
            Decision::Abstain
        } else {
            Decision::Accept
        };
        RiskDecision {
            decision,
            risk,
            uncertainty,
            hazard,
        }
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
    fn abstains_at_exact_equality() {
        let gate = RiskGate::with_constant_uncertainty(0.25, 0.5);
        let cmd = Command::with_v_cap(0.125);
        let decision = gate.decide(&cmd, &caps());
        assert_eq!(decision.hazard, 0.5);
        assert_eq!(decision.risk, 0.25);
        assert_eq!(decision.decision, Decision::Abstain);
    }

    #[test]
    fn accepts_below_threshold() {
        let gate = RiskGate::with_constant_uncertainty(0.25, 0.5);
        let cmd = Command::with_v_cap(0.1);
        let decision = gate.decide(&cmd, &caps());
        assert!(decision.risk < 0.25);
        assert_eq!(decision.decision, Decision::Accept);
    }

    #[test]
    fn hazard_never_negative_for_zero_v_cap() {
        let gate = RiskGate::with_constant_uncertainty(0.25, 0.5);
        let cmd = Command::zero_motion();
        let decision = gate.decide(&cmd, &caps());
        assert_eq!(decision.hazard, 0.0);
        assert_eq!(decision.decision, Decision::Accept);
    }
}
