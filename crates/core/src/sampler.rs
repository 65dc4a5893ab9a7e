//! Sampler — thin helper pushing per-step samples into the [`RingBuffer`].
//!
//! Grounded on `hti/io/sampler.py`: no allocations beyond the payload
//! itself; extend [`Sample`] with more fields (e.g. `tau_cmd`, `i_motor`) as
//! the wire contract grows.

use crate::clock::Clock;
use crate::command::Command;
use crate::env::Observation;
use crate::ring_buffer::RingBuffer;

/// A single logged observation/command pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub pose_ee: [f64; 3],
    pub fn_n: f64,
    pub ft_n: f64,
    pub contact_flags: u8,
    pub cmd: Command,
}

/// Streams environment observations and commands into a ring buffer. Call
/// `sample_env` each Control cycle after `environment.step()`.
pub struct Sampler<'a> {
    ring: &'a std::sync::Mutex<RingBuffer<Sample>>,
    clock: &'a dyn Clock,
}

impl<'a> Sampler<'a> {
    pub fn new(ring: &'a std::sync::Mutex<RingBuffer<Sample>>, clock: &'a dyn Clock) -> Self {
        Self { ring, clock }
    }

    pub fn sample_env(&self, obs: &Observation, cmd: Command) {
        let payload = Sample {
            pose_ee: obs.pose_ee,
            fn_n: obs.fn_n,
            ft_n: obs.ft_n,
            contact_flags: obs.contact_flags,
            cmd,
        };
        self.ring.lock().unwrap().add(self.clock.now(), payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;

    #[test]
    fn pushes_sample_at_current_time() {
        let clock = FakeClock::new(1.5);
        let ring = std::sync::Mutex::new(RingBuffer::<Sample>::new(8));
        let sampler = Sampler::new(&ring, &clock);

        let obs = Observation {
            pose_ee: [0.0, 0.0, 0.05],
            fn_n: 1.0,
            ft_n: 0.0,
            contact_flags: 1,
            extra: Default::default(),
        };
        sampler.sample_env(&obs, Command::with_v_cap(0.1));

        let win = ring.lock().unwrap().window(1.5, 1.5);
        assert_eq!(win.len(), 1);
        assert_eq!(win[0].payload.pose_ee[2], 0.05);
    }
}
