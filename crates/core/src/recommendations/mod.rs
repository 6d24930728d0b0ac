//! Recommendation generation and lifecycle.

mod enrich;
mod guardrails;
pub mod ports;
mod service;

#[cfg(test)]
pub(crate) mod fakes;

pub use enrich::{Enricher, Enrichment};
pub use guardrails::apply_guardrails;
pub use service::{parse_apply_result, GenerateRequest, GenerationSettings, RecommendationService};
