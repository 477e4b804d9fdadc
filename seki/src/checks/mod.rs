//! Built-in checks.
//!
//! Ready-made [`GuardrailCheck`](crate::guardrail::GuardrailCheck)
//! implementations for the usual suspects: length limits, blocked
//! content, leaked secrets, and rate limiting. Each documents the
//! metadata keys it populates, so downstream feedback and evaluation can
//! rely on them.
//!
//! ```rust,ignore
//! use seki::checks::{MaxInputLength, SecretScan};
//! use seki::guardrail::{Guardrail, Priority};
//!
//! let guardrails = vec![
//!     Guardrail::new("max-input", MaxInputLength::new(4000)),
//!     Guardrail::new("secret-scan", SecretScan::new()).with_priority(Priority::Critical),
//! ];
//! ```

mod content;
mod length;
mod rate_limit;
mod secrets;

pub use content::{BlockedPatterns, RegexFilter, TextSource};
pub use length::{MaxInputLength, MaxOutputLength, MinOutputLength};
pub use rate_limit::{KeyFn, RateLimit};
pub use secrets::SecretScan;
