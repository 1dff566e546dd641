//! Module: config
//! Responsibility: every tunable numeric constant named in §6, grouped by
//! the subsystem that owns it, each with its documented default.
//! Does not own: validation beyond construction-time sanity (e.g. `nlist >
//! 0`); runtime policy enforcement lives with the subsystem itself.

use std::time::Duration;

///
/// CachePolicy
/// Read-version acquisition policy for a transaction, per §5.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CachePolicy {
    /// Always fetch a fresh read version from the KV store.
    Server,
    /// Use the process-wide `ReadVersionCache` unconditionally.
    Cached,
    /// Use the cache if it is no older than `N` milliseconds.
    Stale(u32),
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::Server
    }
}

///
/// TransactionConfig
/// Per-transaction knobs threaded through the retry wrapper (§5).
///

#[derive(Clone, Copy, Debug)]
pub struct TransactionConfig {
    pub timeout_ms: u32,
    pub retry_limit: u32,
    pub priority: Priority,
    pub cache_policy: CachePolicy,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            retry_limit: 10,
            priority: Priority::Default,
            cache_policy: CachePolicy::default(),
        }
    }
}

impl TransactionConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms as u64)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Priority {
    Batch,
    Default,
    Immediate,
}

///
/// RetryPolicy
/// Exponential backoff with jitter, per §5:
/// `delay = min(initial * 2^attempt, max) + jitter∈[0, 0.5·delay]`.
///

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub initial_delay_ms: u32,
    pub max_delay_ms: u32,
    pub retry_limit: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 10,
            max_delay_ms: 1_000,
            retry_limit: 10,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay (pre-jitter) for the given zero-based attempt.
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let scaled = u64::from(self.initial_delay_ms).saturating_mul(1u64 << attempt.min(32));
        Duration::from_millis(scaled.min(u64::from(self.max_delay_ms)))
    }
}

///
/// RankConfig
/// Skip-list tuning, per §6: `bucket_size=100`, `p=1/4`, `max_level=32`.
///

#[derive(Clone, Copy, Debug)]
pub struct RankConfig {
    pub bucket_size: u32,
    pub p: f64,
    pub max_level: u8,
}

impl Default for RankConfig {
    fn default() -> Self {
        Self {
            bucket_size: 100,
            p: 0.25,
            max_level: 32,
        }
    }
}

///
/// IvfConfig
/// `{nlist, nprobe, kmeansIterations}` with the named presets from §6.
///

#[derive(Clone, Copy, Debug)]
pub struct IvfConfig {
    pub nlist: u32,
    pub nprobe: u32,
    pub kmeans_iterations: u32,
}

impl IvfConfig {
    #[must_use]
    pub const fn default_preset() -> Self {
        Self {
            nlist: 100,
            nprobe: 10,
            kmeans_iterations: 20,
        }
    }

    #[must_use]
    pub const fn fast() -> Self {
        Self {
            nlist: 256,
            nprobe: 5,
            kmeans_iterations: 20,
        }
    }

    #[must_use]
    pub const fn high_recall() -> Self {
        Self {
            nlist: 100,
            nprobe: 25,
            kmeans_iterations: 20,
        }
    }

    /// `nlist ≈ 4·√n`, `nprobe ≈ √nlist`.
    #[must_use]
    pub fn auto(n: usize) -> Self {
        let nlist = ((4.0 * (n as f64).sqrt()).round() as u32).max(1);
        let nprobe = ((nlist as f64).sqrt().round() as u32).max(1);
        Self {
            nlist,
            nprobe,
            kmeans_iterations: 20,
        }
    }
}

impl Default for IvfConfig {
    fn default() -> Self {
        Self::default_preset()
    }
}

///
/// HllConfig
/// HyperLogLog precision, per §6: `precision=14` (16384 registers).
///

#[derive(Clone, Copy, Debug)]
pub struct HllConfig {
    pub precision: u8,
}

impl Default for HllConfig {
    fn default() -> Self {
        Self { precision: 14 }
    }
}

///
/// TDigestConfig
/// Streaming quantile digest compression, per §6: default `δ=100`.
///

#[derive(Clone, Copy, Debug)]
pub struct TDigestConfig {
    pub compression: f64,
}

impl Default for TDigestConfig {
    fn default() -> Self {
        Self { compression: 100.0 }
    }
}
