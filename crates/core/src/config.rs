//! Config Loader — typed system-slice config with range parsing, env
//! overrides, caching, and a deterministic physics/geometry hash.
//!
//! Grounded on `hti/core/config.py` (`SystemSlice`, `_parse_range`,
//! `load_system_slice`) and `tools/validate_system_slice.py`
//! (`compute_physics_hash`, `compute_geometry_hash`, the `<FILL_ME>` bootstrap
//! sentinel and `--strict` gate). The teacher's `config.rs` (`SolverConfig`)
//! names an unrelated hyperparameter-search config and is not reused for
//! semantics, only for how the teacher shapes a typed, env-backed,
//! range-validating loader.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ConfigError;

/// A field accepted as a bare number or a `"lo-hi"` string, always resolved
/// to an ordered, positive pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RangeOrScalar {
    Scalar(f64),
    Range(String),
}

/// Resolved, validated `(lo, hi)` with `lo <= hi` and `lo > 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub lo: f64,
    pub hi: f64,
}

impl RangeOrScalar {
    pub fn resolve(&self, field: &str) -> Result<Range, ConfigError> {
        let (lo, hi) = match self {
            RangeOrScalar::Scalar(x) => (*x, *x),
            RangeOrScalar::Range(s) => {
                if let Some((lo_s, hi_s)) = s.split_once('-') {
                    let lo = lo_s.trim().parse::<f64>().map_err(|_| ConfigError::RangeUnparseable {
                        field: field.to_string(),
                        value: s.clone(),
                    })?;
                    let hi = hi_s.trim().parse::<f64>().map_err(|_| ConfigError::RangeUnparseable {
                        field: field.to_string(),
                        value: s.clone(),
                    })?;
                    (lo, hi)
                } else {
                    let x = s.trim().parse::<f64>().map_err(|_| ConfigError::RangeUnparseable {
                        field: field.to_string(),
                        value: s.clone(),
                    })?;
                    (x, x)
                }
            }
        };
        if lo > hi {
            return Err(ConfigError::RangeOrder {
                field: field.to_string(),
                lo,
                hi,
            });
        }
        if lo <= 0.0 || hi <= 0.0 {
            return Err(ConfigError::RangeNotPositive {
                field: field.to_string(),
                lo,
                hi,
            });
        }
        Ok(Range { lo, hi })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicsCfg {
    pub dt: f64,
    pub substeps: u32,
    pub solver: String,
    pub tol: f64,
    pub contact_margin: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedsCfg {
    pub sim_seed: u64,
    pub config_hash: String,
    pub physics_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandsCfg {
    pub reflex_hz: f64,
    pub control_hz: f64,
    pub predict_hz: RangeOrScalar,
    pub semantics_hz: RangeOrScalar,
}

impl BandsCfg {
    pub fn predict_range(&self) -> Result<Range, ConfigError> {
        self.predict_hz.resolve("bands.predict_hz")
    }

    pub fn semantics_range(&self) -> Result<Range, ConfigError> {
        self.semantics_hz.resolve("bands.semantics_hz")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapsCfg {
    pub v_mps: f64,
    pub a_mps2: f64,
    pub jerk_mps3: f64,
    pub fn_n: f64,
    pub tau_nm: f64,
}

impl From<CapsCfg> for crate::command::SafetyCaps {
    fn from(c: CapsCfg) -> Self {
        crate::command::SafetyCaps {
            v_mps: c.v_mps,
            a_mps2: c.a_mps2,
            fn_n: c.fn_n,
            tau_nm: c.tau_nm,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbesCfg {
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u32,
    #[serde(default = "default_max_before_action")]
    pub max_before_action: u32,
    #[serde(default = "default_refractory_ms")]
    pub refractory_ms: u32,
    #[serde(default)]
    pub dither_hz: Vec<f64>,
}

fn default_ttl_ms() -> u32 {
    300
}
fn default_max_before_action() -> u32 {
    2
}
fn default_refractory_ms() -> u32 {
    150
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskCfg {
    #[serde(default = "default_tau")]
    pub tau: f64,
    #[serde(default = "default_uncertainty_stub")]
    pub uncertainty_stub: f64,
}

fn default_tau() -> f64 {
    0.25
}
fn default_uncertainty_stub() -> f64 {
    0.20
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvCfg {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_fail_fast")]
    pub fail_fast: bool,
}

fn default_backend() -> String {
    "NullEnv".to_string()
}
fn default_fail_fast() -> bool {
    true
}

impl Default for EnvCfg {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            fail_fast: default_fail_fast(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    pub engine: String,
    pub physics: PhysicsCfg,
    pub seeds: SeedsCfg,
    pub bands: BandsCfg,
    pub caps: CapsCfg,
    pub probes: ProbesCfg,
    #[serde(default)]
    pub risk: Option<RiskCfg>,
    #[serde(default)]
    pub env: Option<EnvCfg>,
}

/// Bootstrap sentinel accepted in `seeds.physics_hash` before the real hash
/// is filled in.
pub const FILL_ME_SENTINEL: &str = "<FILL_ME>";

fn canon_json(value: &serde_json::Value) -> Vec<u8> {
    fn sort(value: &serde_json::Value) -> serde_json::Value {
        match value {
            serde_json::Value::Object(map) => {
                let mut sorted = serde_json::Map::new();
                let mut keys: Vec<_> = map.keys().cloned().collect();
                keys.sort();
                for k in keys {
                    sorted.insert(k.clone(), sort(&map[&k]));
                }
                serde_json::Value::Object(sorted)
            }
            serde_json::Value::Array(xs) => serde_json::Value::Array(xs.iter().map(sort).collect()),
            other => other.clone(),
        }
    }
    serde_json::to_vec(&sort(value)).expect("canonical JSON serialization cannot fail")
}

fn hash12(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex_prefix(&digest, 6) // 6 bytes = 12 hex chars
}

fn hex_prefix(bytes: &[u8], n: usize) -> String {
    bytes.iter().take(n).map(|b| format!("{b:02x}")).collect()
}

/// 12-character SHA-256 prefix over the canonical JSON of `physics`, or of
/// `{physics, geometry}` when a geometry hash is supplied.
pub fn compute_physics_hash(physics: &PhysicsCfg, geometry_hash: Option<&str>) -> String {
    let physics_json = serde_json::to_value(physics).expect("PhysicsCfg always serializes");
    let value = match geometry_hash {
        None => physics_json,
        Some(g) => serde_json::json!({ "physics": physics_json, "geometry": g }),
    };
    hash12(&canon_json(&value))
}

/// 12-character SHA-256 prefix over the concatenated `(filename, bytes)`
/// pairs of every `*.xml` file under `assets_dir`, sorted by filename. `None`
/// if the directory is missing or has no XML files.
pub fn compute_geometry_hash(assets_dir: &Path) -> Result<Option<String>, ConfigError> {
    if !assets_dir.is_dir() {
        return Ok(None);
    }
    let mut names: Vec<std::path::PathBuf> = std::fs::read_dir(assets_dir)
        .map_err(|e| ConfigError::Io {
            path: assets_dir.display().to_string(),
            source: e,
        })?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("xml"))
        .collect();
    if names.is_empty() {
        return Ok(None);
    }
    names.sort();

    let mut hasher = Sha256::new();
    for path in &names {
        let name = path.file_name().unwrap().to_string_lossy();
        hasher.update(name.as_bytes());
        let bytes = std::fs::read(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        hasher.update(&bytes);
    }
    let digest = hasher.finalize();
    Ok(Some(hex_prefix(&digest, 6)))
}

fn truthy(s: &str) -> bool {
    matches!(s.to_lowercase().as_str(), "true" | "1" | "yes")
}

/// Applies `ENV_BACKEND`/`ENV_FAIL_FAST` overrides on top of a parsed config.
fn apply_env_overrides(mut config: SystemConfig) -> SystemConfig {
    let backend_override = std::env::var("ENV_BACKEND").ok();
    let fail_fast_override = std::env::var("ENV_FAIL_FAST").ok();

    if backend_override.is_some() || fail_fast_override.is_some() {
        let mut env = config.env.unwrap_or_default();
        if let Some(b) = backend_override {
            env.backend = b;
        }
        if let Some(f) = fail_fast_override {
            env.fail_fast = truthy(&f);
        }
        config.env = Some(env);
    }
    config
}

fn validate(config: &SystemConfig) -> Result<(), ConfigError> {
    if !config.engine.starts_with("mujoco-") {
        return Err(ConfigError::BadEngineTag(config.engine.clone()));
    }
    config.bands.predict_range()?;
    config.bands.semantics_range()?;
    Ok(())
}

/// Validates `seeds.physics_hash` against the computed hash, honoring the
/// `<FILL_ME>` bootstrap sentinel. `strict` rejects the sentinel instead of
/// passing it through.
pub fn validate_physics_hash(config: &SystemConfig, geometry_hash: Option<&str>, strict: bool) -> Result<String, ConfigError> {
    let computed = compute_physics_hash(&config.physics, geometry_hash);
    if config.seeds.physics_hash == FILL_ME_SENTINEL {
        if strict {
            return Err(ConfigError::StrictSentinel);
        }
        return Ok(computed);
    }
    if config.seeds.physics_hash != computed {
        return Err(ConfigError::HashMismatch {
            configured: config.seeds.physics_hash.clone(),
            computed,
        });
    }
    Ok(computed)
}

static CACHE: OnceLock<Mutex<HashMap<String, SystemConfig>>> = OnceLock::new();

fn cache() -> &'static Mutex<HashMap<String, SystemConfig>> {
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Loads and type-validates a system-slice YAML file, memoized by path so
/// advisory bands share one immutable object. Do not call from a Control hot
/// path; load once and pass the result down.
pub fn load_system_config(path: &Path) -> Result<SystemConfig, ConfigError> {
    let key = path.display().to_string();
    if let Some(cached) = cache().lock().unwrap().get(&key) {
        return Ok(cached.clone());
    }

    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: key.clone(),
        source: e,
    })?;
    let parsed: SystemConfig = serde_yaml::from_str(&raw)?;
    let parsed = apply_env_overrides(parsed);
    validate(&parsed)?;

    cache().lock().unwrap().insert(key, parsed.clone());
    Ok(parsed)
}

/// Test-only cache invalidation.
pub fn clear_cache() {
    cache().lock().unwrap().clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_yaml() -> &'static str {
        r#"
engine: mujoco-3.1.0
physics:
  dt: 0.002
  substeps: 4
  solver: newton
  tol: 1e-8
  contact_margin: 0.001
seeds:
  sim_seed: 42
  config_hash: abcdef123456
  physics_hash: "<FILL_ME>"
bands:
  reflex_hz: 1000
  control_hz: 50
  predict_hz: "20-50"
  semantics_hz: 2
caps:
  v_mps: 0.25
  a_mps2: 2.0
  jerk_mps3: 10.0
  fn_n: 12.0
  tau_nm: 6.0
probes:
  ttl_ms: 300
  max_before_action: 2
  refractory_ms: 150
  dither_hz: []
"#
    }

    #[test]
    fn parses_full_config_and_resolves_ranges() {
        let config: SystemConfig = serde_yaml::from_str(sample_yaml()).unwrap();
        validate(&config).unwrap();
        assert_eq!(config.bands.predict_range().unwrap(), Range { lo: 20.0, hi: 50.0 });
        assert_eq!(config.bands.semantics_range().unwrap(), Range { lo: 2.0, hi: 2.0 });
    }

    #[test]
    fn bad_engine_tag_is_rejected() {
        let mut config: SystemConfig = serde_yaml::from_str(sample_yaml()).unwrap();
        config.engine = "bullet-3".to_string();
        assert!(matches!(validate(&config), Err(ConfigError::BadEngineTag(_))));
    }

    #[test]
    fn range_lo_greater_than_hi_is_rejected() {
        let r = RangeOrScalar::Range("50-20".to_string());
        assert!(matches!(r.resolve("x"), Err(ConfigError::RangeOrder { .. })));
    }

    #[test]
    fn range_non_positive_is_rejected() {
        let r = RangeOrScalar::Range("-5-10".to_string());
        // "-5-10" splits at the first '-' into ("", "5-10") which fails to parse as f64.
        assert!(matches!(r.resolve("x"), Err(ConfigError::RangeUnparseable { .. })));

        let r2 = RangeOrScalar::Scalar(0.0);
        assert!(matches!(r2.resolve("x"), Err(ConfigError::RangeNotPositive { .. })));
    }

    #[test]
    fn physics_hash_is_deterministic_and_sensitive() {
        let physics = PhysicsCfg {
            dt: 0.002,
            substeps: 4,
            solver: "newton".to_string(),
            tol: 1e-8,
            contact_margin: 0.001,
        };
        let h1 = compute_physics_hash(&physics, None);
        let h2 = compute_physics_hash(&physics, None);
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 12);

        let mut physics2 = physics.clone();
        physics2.tol = 1e-7;
        assert_ne!(compute_physics_hash(&physics2, None), h1);
    }

    #[test]
    fn geometry_hash_none_when_dir_empty_or_absent() {
        assert_eq!(compute_geometry_hash(Path::new("/nonexistent/path/xyz")).unwrap(), None);

        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(compute_geometry_hash(tmp.path()).unwrap(), None);
    }

    #[test]
    fn geometry_hash_changes_with_asset_content() {
        let tmp = tempfile::tempdir().unwrap();
        let p1 = tmp.path().join("a.xml");
        std::fs::write(&p1, "<mujoco><worldbody/></mujoco>").unwrap();
        let h1 = compute_geometry_hash(tmp.path()).unwrap().unwrap();
        assert_eq!(h1.len(), 12);

        let p2 = tmp.path().join("b.xml");
        std::fs::write(&p2, "<mujoco><worldbody><body/></worldbody></mujoco>").unwrap();
        let h2 = compute_geometry_hash(tmp.path()).unwrap().unwrap();
        assert_ne!(h1, h2);

        std::fs::write(&p1, "<mujoco><worldbody><geom/></worldbody></mujoco>").unwrap();
        let h3 = compute_geometry_hash(tmp.path()).unwrap().unwrap();
        assert_ne!(h3, h2);
    }

    #[test]
    fn sentinel_passes_non_strict_and_fails_strict() {
        let config: SystemConfig = serde_yaml::from_str(sample_yaml()).unwrap();
        assert!(validate_physics_hash(&config, None, false).is_ok());
        assert!(matches!(
            validate_physics_hash(&config, None, true),
            Err(ConfigError::StrictSentinel)
        ));
    }

    #[test]
    fn configured_hash_mismatch_is_rejected() {
        let mut config: SystemConfig = serde_yaml::from_str(sample_yaml()).unwrap();
        config.seeds.physics_hash = "000000000000".to_string();
        assert!(matches!(
            validate_physics_hash(&config, None, false),
            Err(ConfigError::HashMismatch { .. })
        ));
    }

    #[test]
    fn configured_hash_match_passes() {
        let mut config: SystemConfig = serde_yaml::from_str(sample_yaml()).unwrap();
        let computed = compute_physics_hash(&config.physics, None);
        config.seeds.physics_hash = computed.clone();
        assert_eq!(validate_physics_hash(&config, None, false).unwrap(), computed);
    }

    #[test]
    fn load_from_file_and_cache() {
        clear_cache();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(sample_yaml().as_bytes()).unwrap();
        let path = file.path().to_path_buf();

        let config1 = load_system_config(&path).unwrap();
        let config2 = load_system_config(&path).unwrap();
        assert_eq!(config1, config2);
    }

    #[test]
    fn env_backend_override_applies() {
        clear_cache();
        std::env::set_var("ENV_BACKEND", "DmControlEnv");
        let config: SystemConfig = serde_yaml::from_str(sample_yaml()).unwrap();
        let config = apply_env_overrides(config);
        assert_eq!(config.env.unwrap().backend, "DmControlEnv");
        std::env::remove_var("ENV_BACKEND");
    }

    #[test]
    fn env_fail_fast_override_is_case_insensitive_truthy() {
        clear_cache();
        std::env::set_var("ENV_FAIL_FAST", "Yes");
        let config: SystemConfig = serde_yaml::from_str(sample_yaml()).unwrap();
        let config = apply_env_overrides(config);
        assert!(config.env.unwrap().fail_fast);
        std::env::remove_var("ENV_FAIL_FAST");
    }
}
