//! Engine-wide defaults. Every value here is overridable via
//! [`crate::engine::EngineConfig`].

/// Default number of worker threads when `nthreads` is unset.
pub const DEFAULT_NTHREADS: usize = 1;

/// Default event pool capacity.
pub const DEFAULT_EVENT_POOL_SIZE: usize = 16;

/// Default per-queue back-pressure threshold.
pub const DEFAULT_QUEUE_THRESHOLD: usize = 64;

/// Default chunk size for source and processor arrows.
pub const DEFAULT_CHUNKSIZE: usize = 1;

/// Default steady-state per-event timeout, in seconds. `0` disables it.
pub const DEFAULT_TIMEOUT_SECS: u64 = 0;

/// Default warmup timeout (covers each arrow's first invocation per worker),
/// in seconds. `0` disables it.
pub const DEFAULT_WARMUP_TIMEOUT_SECS: u64 = 0;

/// How often a worker pushes a metrics snapshot up to the engine.
pub const DEFAULT_CHECKIN_MILLIS: u64 = 200;

/// Worker backoff cap, in milliseconds, regardless of strategy.
pub const DEFAULT_BACKOFF_CAP_MILLIS: u64 = 50;

/// Number of backoff attempts before a worker's sleep is treated as idle for
/// utilisation accounting.
pub const DEFAULT_BACKOFF_TRIES: u32 = 4;

/// Sentinel run number meaning "unknown".
pub const UNKNOWN_RUN_NUMBER: i64 = -1;
