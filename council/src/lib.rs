//! LLM council: multi-model consensus for subjective review rules.
//!
//! A council run fans a pass/fail prompt out to the enabled judge
//! models, parses each response with a deliberately tolerant verdict
//! parser, and aggregates by majority, unanimity, or a chairman model
//! that synthesises the judges' votes and reasoning into the final
//! verdict. The streaming variant surfaces each judge's tokens as they
//! arrive.
//!
//! Judges are reached through the [`ModelTransport`] seam; the shipped
//! implementation speaks an OpenRouter-style chat-completions API with
//! per-provider concurrency limits. A judge that errors or times out
//! contributes an `unclear` vote and never fails the run.

mod council;
mod limiter;
mod transport;
mod verdict;

pub use council::Council;
pub use council::CouncilOutcome;
pub use limiter::RateLimiter;
pub use transport::ModelTransport;
pub use transport::OpenRouterTransport;
pub use transport::ScriptedTransport;
pub use transport::TokenStream;
pub use transport::TransportError;
pub use verdict::parse_verdict;
