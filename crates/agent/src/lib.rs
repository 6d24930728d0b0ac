//! LLM integration for adpilot.
//!
//! The model only rewrites text and may propose stricter guardrails. Scores, matches and
//! action payloads stay with the deterministic rule engine in `adpilot-core`.
//!
//! - `llm` - `LlmClient` trait and the HTTP client for OpenAI, Anthropic and Ollama
//! - `explanation` - `ExplanationService` used by recommendation enrichment
//! - `description` - `DescriptionGenerator` used by the heuristic rules
//! - `guardrails` - screens model-proposed guardrails so they can only tighten
//! - `runtime` - builds the above from `LlmConfig`

pub mod description;
pub mod explanation;
pub mod guardrails;
pub mod llm;
pub mod runtime;

pub use description::LlmDescriptionGenerator;
pub use explanation::LlmExplanationService;
pub use guardrails::{GuardrailDecision, GuardrailPolicy};
pub use llm::{HttpLlmClient, LlmClient};
pub use runtime::AgentRuntime;
