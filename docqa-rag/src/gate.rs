//! Relevance gate: decides between grounded and fallback answers.
//!
//! The default [`GatePolicy::BestMatch`] looks only at the single nearest
//! chunk. If its distance is within the threshold, the *whole* retrieved set
//! is used as context; otherwise the answer falls back to general knowledge.
//! This top-1 rule is intentional and kept as the default;
//! [`GatePolicy::PerChunk`] is an opt-in alternative that additionally drops
//! chunks beyond the threshold.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::document::{RetrievalResult, RetrievedChunk};

/// How the gate treats retrieved chunks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatePolicy {
    /// Gate on the best distance; keep every retrieved chunk when it passes.
    #[default]
    BestMatch,
    /// Keep only chunks whose own distance is within the threshold.
    PerChunk,
}

impl fmt::Display for GatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatePolicy::BestMatch => f.write_str("best_match"),
            GatePolicy::PerChunk => f.write_str("per_chunk"),
        }
    }
}

impl FromStr for GatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "best_match" | "top1" | "top_1" => Ok(GatePolicy::BestMatch),
            "per_chunk" => Ok(GatePolicy::PerChunk),
            other => Err(format!("unknown gate policy '{other}' (expected best_match or per_chunk)")),
        }
    }
}

/// The response mode chosen by the gate.
#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    /// Answer from the carried chunks, in ascending-distance order.
    Grounded(Vec<RetrievedChunk>),
    /// Answer from general knowledge, with a disclaimer.
    Fallback,
}

impl Mode {
    /// Whether this is [`Mode::Grounded`].
    pub fn is_grounded(&self) -> bool {
        matches!(self, Mode::Grounded(_))
    }

    /// `"grounded"` or `"fallback"`.
    pub fn label(&self) -> &'static str {
        match self {
            Mode::Grounded(_) => "grounded",
            Mode::Fallback => "fallback",
        }
    }
}

/// Chooses the response mode from a retrieval result.
///
/// Pure and side-effect free; safe to share across threads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelevanceGate {
    threshold: f32,
    policy: GatePolicy,
}

impl RelevanceGate {
    /// Create a best-match gate with the given distance threshold.
    pub fn new(threshold: f32) -> Self {
        Self { threshold, policy: GatePolicy::BestMatch }
    }

    /// Use the given policy.
    pub fn with_policy(mut self, policy: GatePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The distance threshold.
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// The active policy.
    pub fn policy(&self) -> GatePolicy {
        self.policy
    }

    /// Decide the response mode.
    ///
    /// Returns [`Mode::Fallback`] if `retrieval` is empty or its smallest
    /// distance exceeds the threshold (a NaN distance counts as exceeding).
    /// Otherwise returns [`Mode::Grounded`] with the retrieved chunks sorted
    /// by ascending distance.
    pub fn decide(&self, mut retrieval: RetrievalResult) -> Mode {
        let best = retrieval.iter().map(|chunk| chunk.distance).min_by(f32::total_cmp);
        match best {
            Some(distance) if self.within(distance) => {}
            _ => return Mode::Fallback,
        }

        retrieval.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        if self.policy == GatePolicy::PerChunk {
            retrieval.retain(|chunk| self.within(chunk.distance));
        }
        Mode::Grounded(retrieval)
    }

    fn within(&self, distance: f32) -> bool {
        distance <= self.threshold
    }
}

impl Default for RelevanceGate {
    fn default() -> Self {
        Self::new(0.7)
    }
}
