//! Success / Time-to-Result detector — relative-threshold stability
//! detector over pose streams.
//!
//! Grounded on `hti/core/success.py`: success requires 20 consecutive
//! samples (200 ms at 100 Hz; the constant is part of the contract) at or
//! above `z0 + dz`. Relative to `z0` so the detector works from arbitrary
//! starting heights (dm_control-backed envs start near z=0.72, NullEnv near
//! z=0.0).

/// Number of consecutive samples required for a stable lift — 200 ms at
/// 100 Hz, fixed by the contract regardless of the caller's actual rate.
pub const STABLE_WINDOW_SAMPLES: usize = 20;

fn threshold_run_start(poses: &[(f64, f64, f64)], z0: f64, dz: f64) -> Option<usize> {
    let threshold = z0 + dz;
    let mut consec = 0usize;
    for (i, &(_, _, z)) in poses.iter().enumerate() {
        if z >= threshold {
            consec += 1;
            if consec >= STABLE_WINDOW_SAMPLES {
                return Some(i + 1 - STABLE_WINDOW_SAMPLES);
            }
        } else {
            consec = 0;
        }
    }
    None
}

/// True iff there exists a window of [`STABLE_WINDOW_SAMPLES`] consecutive
/// samples whose `z` values are all `>= z0 + dz`.
pub fn detect_lift_success(poses: &[(f64, f64, f64)], z0: f64, dz: f64) -> bool {
    threshold_run_start(poses, z0, dz).is_some()
}

/// Millisecond timestamp of the first sample in the earliest qualifying
/// window, or `None` if no stable lift is detected.
pub fn ttr_ms(poses: &[(f64, f64, f64)], dt: f64, z0: f64, dz: f64) -> Option<u64> {
    threshold_run_start(poses, z0, dz).map(|first_idx| (first_idx as f64 * dt * 1000.0).round() as u64)
}
