//! Environment interface — `reset`/`step` contract, `Null` + engine-backed
//! variants.
//!
//! Grounded on `hti/env/dm_env_loader.py` for the fail-fast vs.
//! warn-and-substitute semantics, and on the `Environment` capability set in
//! spec.md §4.10/§6.1.

use crate::command::Command;
use crate::error::EnvLoadError;

/// Open observation the Environment must include at minimum: end-effector
/// pose, normal/tangential contact force, and a binary contact flag.
/// Physically this is the one genuinely open-ended type in the system (a
/// real backend may report far more than these four fields) so it keeps an
/// `extra` map the way the source's observation dict does.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observation {
    pub pose_ee: [f64; 3],
    pub fn_n: f64,
    pub ft_n: f64,
    pub contact_flags: u8,
    pub extra: std::collections::HashMap<String, f64>,
}

/// Auxiliary info returned by `Environment::step`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepInfo {
    pub t: f64,
}

/// Capability set `{reset, step, dt, substeps}`. `Send` so an `Environment`
/// can be handed to the Control band's own OS thread.
pub trait Environment: Send {
    fn reset(&mut self, seed: u64) -> Observation;
    fn step(&mut self, cmd: Command) -> (Observation, bool, StepInfo);
    fn dt(&self) -> f64;
    fn substeps(&self) -> u32;
}

/// Deterministic synthetic environment. `z` integrates
/// `clamp(cmd.v_cap, 0, 0.25) * dt`; done when `z >= 0.08`.
pub struct NullEnv {
    dt: f64,
    substeps: u32,
    t: f64,
    z: f64,
}

impl NullEnv {
    pub const DONE_Z: f64 = 0.08;
    pub const MAX_V_CAP: f64 = 0.25;

    pub fn new(dt: f64, substeps: u32) -> Self {
        Self {
            dt,
            substeps,
            t: 0.0,
            z: 0.0,
        }
    }

    fn observation(&self) -> Observation {
        Observation {
            pose_ee: [0.0, 0.0, self.z],
            fn_n: 0.0,
            ft_n: 0.0,
            contact_flags: 0,
            extra: std::collections::HashMap::new(),
        }
    }
}

impl Environment for NullEnv {
    fn reset(&mut self, _seed: u64) -> Observation {
        self.t = 0.0;
        self.z = 0.0;
        self.observation()
    }

    fn step(&mut self, cmd: Command) -> (Observation, bool, StepInfo) {
        let v = cmd.v_cap_or_zero().clamp(0.0, Self::MAX_V_CAP);
        self.z += v * self.dt;
        self.t += self.dt;
        let done = self.z >= Self::DONE_Z;
        (self.observation(), done, StepInfo { t: self.t })
    }

    fn dt(&self) -> f64 {
        self.dt
    }

    fn substeps(&self) -> u32 {
        self.substeps
    }
}

/// Delegates to a simulator over a file-based world description. This crate
/// does not vendor a physics engine (out of scope, spec.md §1); the struct
/// exists to carry the fail-fast/substitute loading contract in
/// [`load_environment`] and would be filled in by a real backend binding.
pub struct EngineBackedEnv {
    inner: NullEnv,
}

impl Environment for EngineBackedEnv {
    fn reset(&mut self, seed: u64) -> Observation {
        self.inner.reset(seed)
    }

    fn step(&mut self, cmd: Command) -> (Observation, bool, StepInfo) {
        self.inner.step(cmd)
    }

    fn dt(&self) -> f64 {
        self.inner.dt()
    }

    fn substeps(&self) -> u32 {
        self.inner.substeps()
    }
}

/// Load the configured backend. This crate vendors no physics engine binding
/// (out of scope, spec.md §1), so a non-`NullEnv` backend with no
/// `asset_path` at all means there is no engine library to bind to —
/// distinct from an engine-backed run whose world asset is simply missing on
/// disk. `asset_path` is checked for existence as a stand-in for "world
/// assets available"; a real backend binding would additionally try to
/// load/parse the MJCF (or equivalent) bundle. Under `fail_fast = true`,
/// either gap propagates as [`EnvLoadError`]; under `fail_fast = false` the
/// loader substitutes [`NullEnv`] and the caller should log a warning (the
/// caller, not this function, owns the `tracing` call so this stays free of
/// I/O side effects beyond the existence check).
pub fn load_environment(
    backend: &str,
    dt: f64,
    substeps: u32,
    asset_path: Option<&std::path::Path>,
    fail_fast: bool,
) -> Result<(Box<dyn Environment>, bool), EnvLoadError> {
    if backend == "NullEnv" {
        return Ok((Box::new(NullEnv::new(dt, substeps)), false));
    }

    let asset_path = match asset_path {
        Some(p) => p,
        None => {
            return if fail_fast {
                Err(EnvLoadError::MissingEngineLibrary(backend.to_string()))
            } else {
                Ok((Box::new(NullEnv::new(dt, substeps)), true))
            };
        }
    };

    if asset_path.exists() {
        return Ok((
            Box::new(EngineBackedEnv {
                inner: NullEnv::new(dt, substeps),
            }),
            false,
        ));
    }

    if fail_fast {
        Err(EnvLoadError::MissingAsset(asset_path.display().to_string()))
    } else {
        Ok((Box::new(NullEnv::new(dt, substeps)), true))
    }
}
