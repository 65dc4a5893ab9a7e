//! Probe Engine — deterministic hygiene rules for micro-probes.
//!
//! Grounded on `hti/probes/engine.py`: TTL per probe, refractory between
//! starts, and a quota of probes allowed before the next guarded action.
//! The teacher crate's `probe.rs` names a different concept (Sobol-style
//! hyperparameter sampling) and is not reused here beyond the `Probe`
//! vocabulary — see `DESIGN.md`.

use std::collections::HashMap;

use crate::clock::Clock;

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveProbe {
    pub name: String,
    pub t_start: f64,
    pub t_expire: f64,
    pub params: HashMap<String, f64>,
}

/// Clock-driven, non-blocking probe admission engine. Does not itself
/// actuate — it publishes admitted probe records for the Control band to
/// fuse into its command.
pub struct ProbeEngine<'c> {
    clock: &'c dyn Clock,
    ttl_s: f64,
    refractory_s: f64,
    max_before_action: u32,
    active: Vec<ActiveProbe>,
    last_start_t: Option<f64>,
    count_since_action: u32,
}

impl<'c> ProbeEngine<'c> {
    pub const DEFAULT_TTL_MS: u32 = 300;
    pub const DEFAULT_REFRACTORY_MS: u32 = 150;
    pub const DEFAULT_MAX_BEFORE_ACTION: u32 = 2;

    pub fn new(clock: &'c dyn Clock, ttl_ms: u32, refractory_ms: u32, max_before_action: u32) -> Self {
        Self {
            clock,
            ttl_s: ttl_ms as f64 / 1000.0,
            refractory_s: refractory_ms as f64 / 1000.0,
            max_before_action,
            active: Vec::new(),
            last_start_t: None,
            count_since_action: 0,
        }
    }

    pub fn with_defaults(clock: &'c dyn Clock) -> Self {
        Self::new(
            clock,
            Self::DEFAULT_TTL_MS,
            Self::DEFAULT_REFRACTORY_MS,
            Self::DEFAULT_MAX_BEFORE_ACTION,
        )
    }

    pub fn active(&self) -> &[ActiveProbe] {
        &self.active
    }

    pub fn count_since_action(&self) -> u32 {
        self.count_since_action
    }

    /// Evict any probe with `t_expire <= now`. Called each loop.
    pub fn cycle(&mut self) {
        let now = self.clock.now();
        self.active.retain(|p| p.t_expire > now);
    }

    fn can_start(&self) -> bool {
        if self.count_since_action >= self.max_before_action {
            return false;
        }
        match self.last_start_t {
            None => true,
            Some(last) => (self.clock.now() - last) >= self.refractory_s,
        }
    }

    /// Attempt to start a probe under hygiene rules, in order: quota, then
    /// refractory, then accept. Returns whether it started.
    pub fn request_probe(&mut self, name: impl Into<String>, params: HashMap<String, f64>) -> bool {
        if !self.can_start() {
            return false;
        }
        let now = self.clock.now();
        self.active.push(ActiveProbe {
            name: name.into(),
            t_start: now,
            t_expire: now + self.ttl_s,
            params,
        });
        self.last_start_t = Some(now);
        self.count_since_action += 1;
        true
    }

    /// Signal that the guarded downstream action has begun; resets the quota.
    pub fn complete_action(&mut self) {
        self.count_since_action = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;

    #[test]
    fn probe_hygiene_scenario_from_spec() {
        let clock = FakeClock::new(0.0);
        let mut engine = ProbeEngine::new(&clock, 300, 150, 2);

        assert!(engine.request_probe("p1", HashMap::new()));

        clock.set(0.10);
        assert!(!engine.request_probe("p2", HashMap::new()), "refractory");

        clock.set(0.15);
        assert!(engine.request_probe("p3", HashMap::new()));

        clock.set(0.35);
        assert!(!engine.request_probe("p4", HashMap::new()), "quota");

        engine.complete_action();
        clock.set(0.36);
        assert!(engine.request_probe("p5", HashMap::new()));
    }

    #[test]
    fn cycle_evicts_expired_probes() {
        let clock = FakeClock::new(0.0);
        let mut engine = ProbeEngine::new(&clock, 300, 150, 2);
        engine.request_probe("p1", HashMap::new());
        assert_eq!(engine.active().len(), 1);

        clock.set(0.301);
        engine.cycle();
        assert!(engine.active().is_empty());
    }

    #[test]
    fn expiry_is_strict_ge_not_gt() {
        let clock = FakeClock::new(0.0);
        let mut engine = ProbeEngine::new(&clock, 300, 150, 2);
        engine.request_probe("p1", HashMap::new());

        clock.set(0.300);
        engine.cycle();
        assert!(engine.active().is_empty(), "t_expire <= now evicts");
    }
}
