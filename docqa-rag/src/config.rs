//! Configuration for chunking, retrieval, and relevance gating.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::gate::GatePolicy;
use crate::vectorstore::DistanceMetric;

/// Environment variable names read by [`RagConfig::from_env`].
pub mod env {
    /// Maximum chunk size in characters.
    pub const CHUNK_SIZE: &str = "DOCQA_CHUNK_SIZE";
    /// Overlap between consecutive chunks in characters.
    pub const CHUNK_OVERLAP: &str = "DOCQA_CHUNK_OVERLAP";
    /// Default number of results per query.
    pub const TOP_K: &str = "DOCQA_TOP_K";
    /// Best-match distance above which the fallback prompt is used.
    pub const RELEVANCE_THRESHOLD: &str = "DOCQA_RELEVANCE_THRESHOLD";
    /// `cosine`, `l2`, or `ip`.
    pub const DISTANCE_METRIC: &str = "DOCQA_DISTANCE_METRIC";
    /// `best_match` or `per_chunk`.
    pub const GATE_POLICY: &str = "DOCQA_GATE_POLICY";
}

/// Configuration parameters for the RAG service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of nearest chunks retrieved per query.
    pub top_k: usize,
    /// Maximum best-match distance at which retrieved context is trusted.
    pub relevance_threshold: f32,
    /// Distance metric, fixed when the index is created.
    pub metric: DistanceMetric,
    /// How the relevance gate treats the retrieved set.
    pub gate_policy: GatePolicy,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 3,
            relevance_threshold: 0.7,
            metric: DistanceMetric::Cosine,
            gate_policy: GatePolicy::BestMatch,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Read the configuration from `DOCQA_*` environment variables.
    ///
    /// Unset variables keep their defaults. See [`env`] for the names.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if a variable cannot be parsed or the
    /// resulting configuration is inconsistent.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = RagConfigBuilder::default();
        if let Some(v) = parse_var::<usize, _>(&lookup, env::CHUNK_SIZE)? {
            builder = builder.chunk_size(v);
        }
        if let Some(v) = parse_var::<usize, _>(&lookup, env::CHUNK_OVERLAP)? {
            builder = builder.chunk_overlap(v);
        }
        if let Some(v) = parse_var::<usize, _>(&lookup, env::TOP_K)? {
            builder = builder.top_k(v);
        }
        if let Some(v) = parse_var::<f32, _>(&lookup, env::RELEVANCE_THRESHOLD)? {
            builder = builder.relevance_threshold(v);
        }
        if let Some(v) = parse_var::<DistanceMetric, _>(&lookup, env::DISTANCE_METRIC)? {
            builder = builder.metric(v);
        }
        if let Some(v) = parse_var::<GatePolicy, _>(&lookup, env::GATE_POLICY)? {
            builder = builder.gate_policy(v);
        }
        builder.build()
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if:
    /// - `chunk_size == 0`
    /// - `chunk_overlap >= chunk_size`
    /// - `top_k == 0`
    /// - `relevance_threshold` is negative or not finite
    pub fn validate(&self) -> Result<()> {
        validate_chunking(self.chunk_size, self.chunk_overlap)?;
        if self.top_k == 0 {
            return Err(RagError::Config("top_k must be greater than zero".to_string()));
        }
        if !self.relevance_threshold.is_finite() || self.relevance_threshold < 0.0 {
            return Err(RagError::Config(format!(
                "relevance_threshold ({}) must be a finite, non-negative distance",
                self.relevance_threshold
            )));
        }
        Ok(())
    }
}

/// Validate a chunk size / overlap pair.
pub(crate) fn validate_chunking(chunk_size: usize, chunk_overlap: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(RagError::Config("chunk_size must be greater than zero".to_string()));
    }
    if chunk_overlap >= chunk_size {
        return Err(RagError::Config(format!(
            "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
        )));
    }
    Ok(())
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| RagError::Config(format!("{key}={raw:?} is invalid: {e}"))),
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of nearest chunks retrieved per query.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the best-match distance threshold for grounded answers.
    pub fn relevance_threshold(mut self, threshold: f32) -> Self {
        self.config.relevance_threshold = threshold;
        self
    }

    /// Set the distance metric.
    pub fn metric(mut self, metric: DistanceMetric) -> Self {
        self.config.metric = metric;
        self
    }

    /// Set the relevance gate policy.
    pub fn gate_policy(mut self, policy: GatePolicy) -> Self {
        self.config.gate_policy = policy;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_the_documented_values() {
        let config = RagConfig::default();
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.chunk_overlap, 200);
        assert_eq!(config.top_k, 3);
        assert!((config.relevance_threshold - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.metric, DistanceMetric::Cosine);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn overlap_not_smaller_than_size_is_rejected() {
        let err = RagConfig::builder().chunk_size(100).chunk_overlap(100).build().unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
        assert!(RagConfig::builder().chunk_size(0).chunk_overlap(0).build().is_err());
        assert!(RagConfig::builder().top_k(0).build().is_err());
        assert!(RagConfig::builder().relevance_threshold(f32::NAN).build().is_err());
    }

    #[test]
    fn env_values_override_defaults() {
        let config = RagConfig::from_lookup(lookup(&[
            (env::CHUNK_SIZE, "500"),
            (env::CHUNK_OVERLAP, "50"),
            (env::TOP_K, "5"),
            (env::RELEVANCE_THRESHOLD, "0.4"),
            (env::DISTANCE_METRIC, "l2"),
            (env::GATE_POLICY, "per_chunk"),
        ]))
        .unwrap();
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.chunk_overlap, 50);
        assert_eq!(config.top_k, 5);
        assert!((config.relevance_threshold - 0.4).abs() < f32::EPSILON);
        assert_eq!(config.metric, DistanceMetric::L2);
        assert_eq!(config.gate_policy, GatePolicy::PerChunk);
    }

    #[test]
    fn unparsable_env_value_names_the_variable() {
        let err = RagConfig::from_lookup(lookup(&[(env::TOP_K, "three")])).unwrap_err();
        assert!(err.to_string().contains(env::TOP_K));
    }
}
