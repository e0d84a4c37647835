//! # Configuration
//!
//! `PlannerConfig` layers defaults, an optional TOML file, and `BF_`-prefixed
//! environment variables via `figment`, the same `Toml`/`Env`/`Serialized`
//! layering this lineage's other crates use for their own config structs.

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunable knobs for the planner, rewriter, register allocator, and
/// interpreter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// [`crate::rewriter::RewriteConfig::target_row_count`]: stop recursing
    /// once every root-to-leaf path references at least this many distinct
    /// rows.
    #[serde(default = "default_target_row_count")]
    pub target_row_count: u32,

    /// [`crate::rewriter::RewriteConfig::target_cross_product_term_count`]:
    /// soft cap on OR cross-product expansion.
    #[serde(default = "default_target_cross_product_term_count")]
    pub target_cross_product_term_count: u32,

    /// First register index the allocator may assign.
    #[serde(default = "default_register_base")]
    pub register_base: u8,

    /// Number of registers available to the allocator.
    #[serde(default = "default_register_count")]
    pub register_count: u8,

    /// Ceiling on row rank; the spec fixes this at 6.
    #[serde(default = "default_max_rank")]
    pub max_rank: u8,

    /// Capacity of the interpreter's [`crate::interpreter::ResultsBuffer`].
    #[serde(default = "default_results_buffer_capacity")]
    pub results_buffer_capacity: usize,

    /// Per-query wall-clock budget, polled cooperatively at rank-down
    /// iteration and slice boundaries (see [`crate::concurrency`]). `None`
    /// means no timeout.
    #[serde(default, with = "duration_millis_opt")]
    pub query_timeout: Option<Duration>,

    /// Ceiling on the arena's node count, reported as
    /// [`crate::error::ArenaError::AllocationExhausted`] rather than a
    /// separate resource error, since the arena is this crate's only
    /// dynamic allocation. `None` means unbounded.
    #[serde(default)]
    pub max_memory_bytes: Option<usize>,
}

fn default_target_row_count() -> u32 {
    8
}
fn default_target_cross_product_term_count() -> u32 {
    8
}
fn default_register_base() -> u8 {
    8
}
fn default_register_count() -> u8 {
    8
}
fn default_max_rank() -> u8 {
    crate::row::MAX_RANK
}
fn default_results_buffer_capacity() -> usize {
    4096
}

mod duration_millis_opt {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        value.map(|d| d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

impl PlannerConfig {
    /// Load configuration from `planner.toml`, `planner.local.toml`, and
    /// `BF_`-prefixed environment variables (double underscore nests
    /// fields), in that precedence order, falling back to [`PlannerConfig::default`]
    /// for anything none of those layers set.
    pub fn load() -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(PlannerConfig::default()))
            .merge(Toml::file("planner.toml"))
            .merge(Toml::file("planner.local.toml"))
            .merge(Env::prefixed("BF_").split("__"))
            .extract()
    }

    /// Load configuration from a specific TOML file, falling back to
    /// defaults for anything it doesn't set.
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(PlannerConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("BF_").split("__"))
            .extract()
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            target_row_count: default_target_row_count(),
            target_cross_product_term_count: default_target_cross_product_term_count(),
            register_base: default_register_base(),
            register_count: default_register_count(),
            max_rank: default_max_rank(),
            results_buffer_capacity: default_results_buffer_capacity(),
            query_timeout: None,
            max_memory_bytes: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_historically_documented_values() {
        let config = PlannerConfig::default();
        assert_eq!(config.target_row_count, 8);
        assert_eq!(config.target_cross_product_term_count, 8);
        assert_eq!(config.register_base, 8);
        assert_eq!(config.register_count, 8);
        assert_eq!(config.max_rank, 6);
        assert!(config.query_timeout.is_none());
    }

    #[test]
    fn round_trips_through_toml() {
        let config = PlannerConfig::default();
        let serialized = toml::to_string(&config).unwrap();
        assert!(serialized.contains("target_row_count"));
    }
}
