//! Event-Pack Assembler — ±300 ms windowed snapshots for post-hoc audit.
//!
//! Grounded on `hti/io/eventpack.py`'s `EventPackAssembler`: fixed 600 ms
//! window centered on the trigger time, meta pulled from a provider closure
//! and merged with optional counters/env/risk/signals-quality fields under
//! fixed keys.

use std::collections::{HashMap, HashSet};

use crate::adapter::AdapterDelta;
use crate::ring_buffer::{RingBuffer, Timestamped};

/// Half-width of the assembly window, in seconds. `t1 - t0 == 2 * WINDOW_S`.
pub const WINDOW_S: f64 = 0.300;

/// Required meta keys a meta-provider is expected to supply (non-exhaustive
/// beyond what spec.md names; `band_clocks`/`caps`/`loop_stats` sub-fields
/// are not invariant-bearing per spec.md §9).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoopStats {
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Meta {
    pub config_hash: String,
    pub physics_hash: String,
    pub sim_seed: u64,
    pub band_clocks: HashMap<String, f64>,
    pub caps: HashMap<String, f64>,
    pub loop_stats: HashMap<String, LoopStats>,
    pub missed_cycles: u64,
    pub counters: Option<Counters>,
    pub env: Option<HashMap<String, String>>,
    pub risk: Option<RiskMeta>,
    pub signals_quality: Option<SignalsQuality>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Counters {
    pub abstain: u64,
    pub veto: u64,
    pub ttl_expired: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RiskMeta {
    pub uncertainty: f64,
    pub hazard: f64,
    pub risk: f64,
}

/// `contacts` must be one of `{"placeholder", "measured"}` per spec.md §9.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalsQuality {
    pub contacts: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventPack<T> {
    pub t0: f64,
    pub t1: f64,
    pub signals: Vec<Timestamped<T>>,
    pub meta: Meta,
    pub discrepancies: HashSet<String>,
    pub adapter: Option<AdapterDelta>,
    pub outcome: Option<HashMap<String, String>>,
}

/// Optional fields merged into `meta` and the pack itself at assembly time.
#[derive(Default)]
pub struct AssembleArgs {
    pub discrepancies: HashSet<String>,
    pub adapter: Option<AdapterDelta>,
    pub outcome: Option<HashMap<String, String>>,
    pub counters: Option<Counters>,
    pub env_meta: Option<HashMap<String, String>>,
    pub risk: Option<RiskMeta>,
    pub signals_quality: Option<SignalsQuality>,
}

/// Builds `EventPack`s by slicing a [`RingBuffer`] around a trigger time.
pub struct EventPackAssembler<'a, T, F>
where
    F: Fn() -> Meta,
{
    ring: &'a std::sync::Mutex<RingBuffer<T>>,
    meta_provider: F,
}

impl<'a, T, F> EventPackAssembler<'a, T, F>
where
    T: Clone,
    F: Fn() -> Meta,
{
    pub fn new(ring: &'a std::sync::Mutex<RingBuffer<T>>, meta_provider: F) -> Self {
        Self {
            ring,
            meta_provider,
        }
    }

    pub fn assemble(&self, trigger_t: f64, args: AssembleArgs) -> EventPack<T> {
        let t0 = trigger_t - WINDOW_S;
        let t1 = trigger_t + WINDOW_S;
        let signals = self.ring.lock().unwrap().window(t0, t1);
        let mut meta = (self.meta_provider)();

        if args.counters.is_some() {
            meta.counters = args.counters;
        }
        if args.env_meta.is_some() {
            meta.env = args.env_meta.clone();
        }
        if args.risk.is_some() {
            meta.risk = args.risk;
        }
        if args.signals_quality.is_some() {
            meta.signals_quality = args.signals_quality.clone();
        }

        EventPack {
            t0,
            t1,
            signals,
            meta,
            discrepancies: args.discrepancies,
            adapter: args.adapter,
            outcome: args.outcome,
        }
    }
}
