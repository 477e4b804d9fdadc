#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(tail_expr_drop_order)]
//! Seki wraps LLM calls in prioritized, observable guardrails.
//!
//! Checks run on both sides of the model: input guardrails reject bad
//! requests before they cost tokens, output guardrails vet what came
//! back. A blocked output can be regenerated with corrective feedback,
//! replaced by a fallback, surfaced as an error, or just logged. The
//! same machinery guards streaming calls and every step of a
//! tool-calling agent, and an offline evaluator scores guardrails
//! against labeled datasets.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use seki::prelude::*;
//! use seki::checks::{MaxInputLength, MinOutputLength};
//!
//! let guarded = GuardedProvider::new(my_provider)
//!     .with_input_guardrail(Guardrail::new("max-input", MaxInputLength::new(4000)))
//!     .with_output_guardrail(Guardrail::new("min-output", MinOutputLength::new(50)))
//!     .with_retry(RetryPolicy::new(2));
//!
//! let generation = guarded
//!     .generate(&GenerationRequest::from_prompt("Explain tripwires"))
//!     .await?;
//! ```

pub mod agent;
pub mod checks;
pub mod context;
pub mod error;
pub mod eval;
pub mod executor;
pub mod guarded;
pub mod guardrail;
pub mod hooks;
pub mod prelude;
pub mod provider;
pub mod retry;
pub mod streaming;

pub use error::{Error, Result};
pub use guarded::GuardedProvider;
pub use guardrail::{Guardrail, GuardrailOutput};
