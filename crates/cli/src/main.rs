use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bandrt_core::adapter::AdapterManager;
use bandrt_core::audit::{AuditEvent, AuditQueue, AuditSink, EnqueueResult, EventType, JsonlFileSink};
use bandrt_core::clock::{Clock, MonotonicClock};
use bandrt_core::command::{Command as ActuatorCommand, SafetyCaps};
use bandrt_core::config::{self, SystemConfig};
use bandrt_core::env::load_environment;
use bandrt_core::eventpack::{AssembleArgs, Counters, EventPackAssembler, Meta};
use bandrt_core::metrics::cvar;
use bandrt_core::probe::ProbeEngine;
use bandrt_core::ring_buffer::RingBuffer;
use bandrt_core::risk::{ConstantUncertainty, Decision, RiskGate};
use bandrt_core::sampler::{Sample, Sampler};
use bandrt_core::scheduler::BandScheduler;
use bandrt_core::shield::Shield;
use bandrt_core::success::{detect_lift_success, ttr_ms};

use clap::{Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};

#[derive(Parser)]
#[command(name = "bandrt", version, about = "Banded runtime harness for safety-gated robot control")]
struct Cli {
    #[arg(long, value_enum, default_value = "pretty")]
    log_format: LogFormat,
    #[arg(long, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a system-slice config against a JSON Schema and enforce the
    /// physics hash.
    Validate {
        config: PathBuf,
        schema: PathBuf,
        #[arg(long)]
        strict: bool,
    },
    /// Run the Control band end-to-end against the configured Environment.
    Run {
        config: PathBuf,
        #[arg(long, default_value_t = 2)]
        seconds: u64,
    },
}

fn init_tracing(log_format: LogFormat, log_level: &str) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_new(log_level)
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))
        .into_diagnostic()?;
    let fmt = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);
    match log_format {
        LogFormat::Json => fmt.json().init(),
        LogFormat::Pretty => fmt.init(),
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format, &cli.log_level)?;

    let exit_code = match cli.command {
        Commands::Validate { config, schema, strict } => validate_command(&config, &schema, strict),
        Commands::Run { config, seconds } => run_command(&config, seconds),
    };

    std::process::exit(exit_code);
}

/// Mirrors `tools/validate_system_slice.py`'s exit-code and message
/// contract: 0 on success (including bootstrap sentinel unless `--strict`),
/// 1 on schema failure, hash mismatch, I/O error, or strict-mode sentinel.
fn validate_command(config_path: &Path, schema_path: &Path, strict: bool) -> i32 {
    tracing::info!(command = "validate", config = %config_path.display());

    let raw_config = match std::fs::read_to_string(config_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("[validator] ERROR: failed to read YAML: {e}");
            return 1;
        }
    };
    let cfg_value: serde_json::Value = match serde_yaml::from_str(&raw_config) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("[validator] ERROR: failed to parse YAML: {e}");
            return 1;
        }
    };

    let raw_schema = match std::fs::read_to_string(schema_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("[validator] ERROR: failed to read schema: {e}");
            return 1;
        }
    };
    let schema_value: serde_json::Value = match serde_json::from_str(&raw_schema) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("[validator] ERROR: failed to parse schema JSON: {e}");
            return 1;
        }
    };

    let validator = match jsonschema::validator_for(&schema_value) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("[validator] ERROR: invalid schema: {e}");
            return 1;
        }
    };

    let errors: Vec<_> = validator.iter_errors(&cfg_value).collect();
    if !errors.is_empty() {
        println!("[validator] SCHEMA FAIL:");
        for e in &errors {
            let loc = e.instance_path.to_string();
            let loc = if loc.is_empty() { "(root)".to_string() } else { loc };
            println!("  - at {loc}: {e}");
        }
        return 1;
    }
    println!("[validator] schema: OK");

    let config: SystemConfig = match serde_yaml::from_str(&raw_config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("[validator] ERROR: config does not match the typed record: {e}");
            return 1;
        }
    };

    match config::validate_physics_hash(&config, None, strict) {
        Ok(computed) if config.seeds.physics_hash == config::FILL_ME_SENTINEL => {
            println!("[validator] computed physics_hash = {computed}");
            println!("[validator] non-strict bootstrapping: pass (will enforce once filled).");
            0
        }
        Ok(_) => {
            println!("[validator] physics_hash: OK");
            println!("[validator] VALIDATION OK");
            0
        }
        Err(bandrt_core::error::ConfigError::StrictSentinel) => {
            println!(
                "[validator] computed physics_hash = {}",
                config::compute_physics_hash(&config.physics, None)
            );
            println!("[validator] STRICT mode: fill seeds.physics_hash and re-run.");
            1
        }
        Err(bandrt_core::error::ConfigError::HashMismatch { configured, computed }) => {
            println!("[validator] physics_hash mismatch: configured={configured} computed={computed}");
            1
        }
        Err(e) => {
            eprintln!("[validator] ERROR: {e}");
            1
        }
    }
}

/// Aggregate state the Control tick writes to each cycle and the main thread
/// reads back once the run is finished. The only state shared between the
/// Control thread and this function outside of the lock-free `AuditQueue`.
struct RunSummary {
    poses: Vec<(f64, f64, f64)>,
    z0: f64,
    abstain_count: u64,
    veto_count: u64,
    ttl_expired_count: u64,
    finished: bool,
}

fn push_audit(audit: &AuditQueue, event: AuditEvent) {
    match audit.enqueue(event) {
        EnqueueResult::Full => tracing::warn!("audit queue full; event dropped"),
        EnqueueResult::HighWaterMark => tracing::warn!("audit queue past high-water mark"),
        EnqueueResult::Ok => {}
    }
}

/// Wires C1–C12 into the smoke-lift scenario (spec.md §8 scenario 1): the
/// Control tick runs on `BandScheduler`'s own fixed-period thread, gates
/// each cycle through the Risk Gate and Shield, admits micro-probes through
/// the Probe Engine, and assembles + audits an EventPack on every abstain,
/// veto, and adapter rollback. A second background band drains the audit
/// queue into a JSONL file independently of Control.
fn run_command(config_path: &Path, seconds: u64) -> i32 {
    tracing::info!(command = "run", config = %config_path.display());

    let config = match config::load_system_config(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load config: {e}");
            return 1;
        }
    };

    let env_cfg = config.env.clone().unwrap_or_default();
    let (mut environment, substituted) = match load_environment(
        &env_cfg.backend,
        config.physics.dt,
        config.physics.substeps,
        None,
        env_cfg.fail_fast,
    ) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("failed to load environment: {e}");
            return 1;
        }
    };
    if substituted {
        tracing::warn!("environment backend unavailable, substituted NullEnv");
    }

    let caps = SafetyCaps::from(config.caps);
    let shield = Shield::new(caps);
    let risk_cfg = config.risk.unwrap_or(bandrt_core::config::RiskCfg {
        tau: 0.25,
        uncertainty_stub: 0.20,
    });
    let risk_gate = RiskGate::new(risk_cfg.tau, Box::new(ConstantUncertainty(risk_cfg.uncertainty_stub)));

    // Leaked once, for the life of this one-shot run: AdapterManager,
    // ProbeEngine, Sampler, and EventPackAssembler borrow their Clock/
    // RingBuffer rather than own them, so they need a 'static referent to
    // be movable into the Control thread's 'static tick closure.
    let clock: &'static MonotonicClock = Box::leak(Box::new(MonotonicClock::new()));
    let ring: &'static Mutex<RingBuffer<Sample>> = Box::leak(Box::new(Mutex::new(RingBuffer::new(100_000))));

    let adapter = AdapterManager::new(clock);
    let mut probe_engine = ProbeEngine::new(
        clock,
        config.probes.ttl_ms,
        config.probes.refractory_ms,
        config.probes.max_before_action,
    );
    let sampler = Sampler::new(ring, clock);

    let config_hash = config.seeds.config_hash.clone();
    let physics_hash = config.seeds.physics_hash.clone();
    let sim_seed = config.seeds.sim_seed;
    let meta_provider = move || Meta {
        config_hash: config_hash.clone(),
        physics_hash: physics_hash.clone(),
        sim_seed,
        ..Meta::default()
    };
    let assembler = EventPackAssembler::new(ring, meta_provider);

    let audit = Arc::new(AuditQueue::new(4096));
    let audit_log_path = std::env::temp_dir().join(format!("bandrt-audit-{}.jsonl", std::process::id()));
    let keep_draining = Arc::new(AtomicBool::new(true));

    let mut sched = BandScheduler::new(config.bands.control_hz);

    {
        let audit = Arc::clone(&audit);
        let keep_draining = Arc::clone(&keep_draining);
        let path = audit_log_path.clone();
        sched.run_background(move || {
            let mut sink = match JsonlFileSink::create(&path) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!("failed to open audit log {}: {e}", path.display());
                    return;
                }
            };
            loop {
                let events = audit.drain();
                if !events.is_empty() {
                    if let Err(e) = sink.write_events(&events) {
                        tracing::warn!("failed to write audit events: {e}");
                    }
                }
                if !keep_draining.load(Ordering::SeqCst) {
                    break;
                }
                std::thread::sleep(Duration::from_millis(50));
            }
        });
    }

    let initial_obs = environment.reset(sim_seed);
    let v_cap = 0.05_f64.min(caps.v_mps);
    let dt = environment.dt();
    let dz = 0.03;
    let n_steps = ((seconds as f64) / dt).ceil() as u64;

    let summary = Arc::new(Mutex::new(RunSummary {
        poses: Vec::new(),
        z0: initial_obs.pose_ee[2],
        abstain_count: 0,
        veto_count: 0,
        ttl_expired_count: 0,
        finished: false,
    }));

    let tick_audit = Arc::clone(&audit);
    let tick_summary = Arc::clone(&summary);
    let mut step: u64 = 0;

    sched.start_control(move || {
        if tick_summary.lock().unwrap().finished {
            return;
        }

        probe_engine.cycle();
        let mut probe_params = HashMap::new();
        probe_params.insert("v_cap_bias".to_string(), 0.0);
        if probe_engine.request_probe("pre_lift_probe", probe_params) {
            push_audit(&tick_audit, AuditEvent::new(EventType::ProbeStart, clock.now()));
        }

        let proposed = ActuatorCommand::with_v_cap(v_cap);
        let risk_decision = risk_gate.decide(&proposed, &caps);
        let admitted = match risk_decision.decision {
            Decision::Abstain => ActuatorCommand::zero_motion(),
            Decision::Accept => proposed,
        };

        let decision = shield.evaluate(admitted, ActuatorCommand::zero_motion());
        let (obs, done, _info) = environment.step(decision.final_cmd);
        sampler.sample_env(&obs, decision.final_cmd);

        adapter.cycle();
        let rolled_back = adapter.rollback_requested();

        let counters = {
            let mut s = tick_summary.lock().unwrap();
            s.poses.push((obs.pose_ee[0], obs.pose_ee[1], obs.pose_ee[2]));
            if risk_decision.decision == Decision::Abstain {
                s.abstain_count += 1;
            }
            if !decision.accepted {
                s.veto_count += 1;
            }
            if rolled_back {
                s.ttl_expired_count += 1;
            }
            Counters {
                abstain: s.abstain_count,
                veto: s.veto_count,
                ttl_expired: s.ttl_expired_count,
            }
        };

        let t = clock.now();
        if risk_decision.decision == Decision::Abstain {
            let pack = assembler.assemble(t, AssembleArgs { counters: Some(counters), ..Default::default() });
            push_audit(
                &tick_audit,
                AuditEvent::new(EventType::RiskAbstain, t).with_payload(format!("signals={}", pack.signals.len())),
            );
            push_audit(&tick_audit, AuditEvent::new(EventType::EventPackAssembled, t));
        }
        if !decision.accepted {
            let pack = assembler.assemble(t, AssembleArgs { counters: Some(counters), ..Default::default() });
            push_audit(
                &tick_audit,
                AuditEvent::new(EventType::ShieldVeto, t).with_payload(decision.reason.clone().unwrap_or_default()),
            );
            push_audit(&tick_audit, AuditEvent::new(EventType::EventPackAssembled, t));
        }
        if rolled_back {
            let pack = assembler.assemble(t, AssembleArgs { counters: Some(counters), ..Default::default() });
            push_audit(
                &tick_audit,
                AuditEvent::new(EventType::AdapterRollback, t).with_payload(format!("signals={}", pack.signals.len())),
            );
            push_audit(&tick_audit, AuditEvent::new(EventType::EventPackAssembled, t));
        }

        if done {
            probe_engine.complete_action();
        }

        step += 1;
        if done || step >= n_steps {
            tick_summary.lock().unwrap().finished = true;
        }
    });

    let poll_deadline = Instant::now() + Duration::from_secs(seconds + 5);
    loop {
        if summary.lock().unwrap().finished {
            break;
        }
        if Instant::now() >= poll_deadline {
            tracing::warn!("run exceeded its expected duration; stopping");
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    sched.stop(Duration::from_secs(1));
    keep_draining.store(false, Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(120));

    let final_summary = summary.lock().unwrap();
    let poses = final_summary.poses.clone();
    let z0 = final_summary.z0;
    let abstain_count = final_summary.abstain_count;
    let veto_count = final_summary.veto_count;
    let ttl_expired_count = final_summary.ttl_expired_count;
    drop(final_summary);

    let success = detect_lift_success(&poses, z0, dz);
    let ttr = ttr_ms(&poses, dt, z0, dz);

    println!("=== bandrt run ===");
    println!("success: {success}");
    if let Some(ttr) = ttr {
        println!("ttr_ms: {ttr}");
    } else {
        println!("ttr_ms: n/a");
    }
    println!("counters: abstain={abstain_count} veto={veto_count} ttl_expired={ttl_expired_count}");
    println!("audit log: {}", audit_log_path.display());

    let deltas: Vec<f64> = poses.windows(2).map(|w| (w[1].2 - w[0].2).abs()).collect();
    if !deltas.is_empty() {
        if let Ok(tail_risk) = cvar(&deltas, 0.1) {
            println!("cvar(step_delta, 0.1): {tail_risk:.6}");
        }
    }

    if success {
        0
    } else {
        1
    }
}
