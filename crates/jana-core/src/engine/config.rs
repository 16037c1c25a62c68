//! Engine configuration, consumed from an external parameter store (§6).
//! Loaded the same way the rest of this workspace's ambient config is
//! loaded: environment variables plus a `.env` file, read once per process.

use std::env;
use std::time::Duration;

use once_cell::sync::Lazy;

use crate::constants::{
    DEFAULT_BACKOFF_CAP_MILLIS, DEFAULT_BACKOFF_TRIES, DEFAULT_CHECKIN_MILLIS, DEFAULT_CHUNKSIZE,
    DEFAULT_EVENT_POOL_SIZE, DEFAULT_NTHREADS, DEFAULT_QUEUE_THRESHOLD, DEFAULT_TIMEOUT_SECS,
    DEFAULT_WARMUP_TIMEOUT_SECS,
};

static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenvy::dotenv();
});

/// Locality/CPU-pin strategy for a worker set. The core only records the
/// choice; applying it is a platform-specific hook (§9.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Affinity {
    #[default]
    None,
    PinToCpu,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub nthreads: usize,
    pub event_pool_size: usize,
    pub limit_total_events_in_flight: bool,
    pub event_queue_threshold: usize,
    pub event_source_chunksize: usize,
    pub event_processor_chunksize: usize,
    pub enable_stealing: bool,
    pub affinity: Affinity,
    pub locality: usize,
    pub timeout: Duration,
    pub warmup_timeout: Duration,
    pub ordering: bool,
    pub checkin_time: Duration,
    pub backoff_cap: Duration,
    pub backoff_tries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            nthreads: DEFAULT_NTHREADS,
            event_pool_size: DEFAULT_EVENT_POOL_SIZE,
            limit_total_events_in_flight: true,
            event_queue_threshold: DEFAULT_QUEUE_THRESHOLD,
            event_source_chunksize: DEFAULT_CHUNKSIZE,
            event_processor_chunksize: DEFAULT_CHUNKSIZE,
            enable_stealing: false,
            affinity: Affinity::None,
            locality: 1,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            warmup_timeout: Duration::from_secs(DEFAULT_WARMUP_TIMEOUT_SECS),
            ordering: false,
            checkin_time: Duration::from_millis(DEFAULT_CHECKIN_MILLIS),
            backoff_cap: Duration::from_millis(DEFAULT_BACKOFF_CAP_MILLIS),
            backoff_tries: DEFAULT_BACKOFF_TRIES,
        }
    }
}

impl EngineConfig {
    /// Reads overrides from the environment (`JANA_*`), falling back to
    /// defaults. `"Ncores"` for `JANA_NTHREADS` maps to the host CPU count.
    pub fn from_env() -> Self {
        Lazy::force(&DOTENV_LOADED);
        let mut cfg = Self::default();

        if let Ok(v) = env::var("JANA_NTHREADS") {
            cfg.nthreads = if v.eq_ignore_ascii_case("ncores") {
                std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
            } else {
                v.parse().unwrap_or(cfg.nthreads)
            };
        }
        if let Ok(v) = env_usize("JANA_EVENT_POOL_SIZE") {
            cfg.event_pool_size = v;
        }
        if let Ok(v) = env::var("JANA_LIMIT_TOTAL_EVENTS_IN_FLIGHT") {
            cfg.limit_total_events_in_flight = parse_bool(&v, cfg.limit_total_events_in_flight);
        }
        if let Ok(v) = env_usize("JANA_EVENT_QUEUE_THRESHOLD") {
            cfg.event_queue_threshold = v;
        }
        if let Ok(v) = env_usize("JANA_EVENT_SOURCE_CHUNKSIZE") {
            cfg.event_source_chunksize = v;
        }
        if let Ok(v) = env_usize("JANA_EVENT_PROCESSOR_CHUNKSIZE") {
            cfg.event_processor_chunksize = v;
        }
        if let Ok(v) = env::var("JANA_ENABLE_STEALING") {
            cfg.enable_stealing = parse_bool(&v, cfg.enable_stealing);
        }
        if let Ok(v) = env::var("JANA_AFFINITY") {
            cfg.affinity = if v.eq_ignore_ascii_case("pin") {
                Affinity::PinToCpu
            } else {
                Affinity::None
            };
        }
        if let Ok(v) = env_usize("JANA_LOCALITY") {
            cfg.locality = v.max(1);
        }
        if let Some(v) = env::var("JANA_TIMEOUT").ok().and_then(|v| v.parse::<u64>().ok()) {
            cfg.timeout = Duration::from_secs(v);
        }
        if let Some(v) = env::var("JANA_WARMUP_TIMEOUT").ok().and_then(|v| v.parse::<u64>().ok()) {
            cfg.warmup_timeout = Duration::from_secs(v);
        }
        if let Ok(v) = env::var("JANA_ORDERING") {
            cfg.ordering = parse_bool(&v, cfg.ordering);
        }
        cfg
    }
}

fn env_usize(key: &str) -> Result<usize, ()> {
    env::var(key).ok().and_then(|v| v.parse().ok()).ok_or(())
}

fn parse_bool(v: &str, default: bool) -> bool {
    match v.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => true,
        "0" | "false" | "no" => false,
        _ => default,
    }
}
