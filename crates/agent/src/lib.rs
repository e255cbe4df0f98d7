//! Support desk agent pipeline.
//!
//! A customer turn flows through:
//! 1. **Input gate** (`guardrails`) - refuse requests outside the four support domains
//! 2. **Router** (`router`) - pick account, billing, order or technical, or ask to clarify
//! 3. **Specialist** (`specialists`, `responder`) - render instructions and draft an answer,
//!    calling tools from the specialist's subset (`tools`)
//! 4. **Output gate** (`guardrails`) - replace drafts that leak another domain's data
//!
//! `runtime::SupportRuntime` owns the pipeline and serializes turns per session.
//! Model-backed classifiers and responders talk to an `llm::LlmClient`; without
//! one, the keyword classifier and scripted responder run fully offline.

pub mod guardrails;
pub mod llm;
pub mod responder;
pub mod router;
pub mod runtime;
pub mod specialists;
pub mod tools;

pub use runtime::{ResponseChunk, ResponseStream, SupportRuntime, TurnOutcome};
