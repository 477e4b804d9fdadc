//! Guarded generation against a mock provider.
//!
//! Demonstrates input blocking (the provider is never called), and a
//! blocked output recovered by corrective retry.
//!
//! ```bash
//! cargo run --example guarded_generate
//! ```

#![allow(clippy::print_stdout)]

use std::sync::Mutex;

use async_trait::async_trait;
use seki::checks::{BlockedPatterns, MinOutputLength};
use seki::prelude::*;
use seki::retry::Backoff;

/// Replays canned generations, one per call.
struct Replay(Mutex<Vec<&'static str>>);

#[async_trait]
impl Provider for Replay {
    fn name(&self) -> &str {
        "replay"
    }

    async fn generate(
        &self,
        _request: &GenerationRequest,
    ) -> std::result::Result<Generation, ProviderError> {
        let mut replies = self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if replies.is_empty() {
            return Err(ProviderError::internal("replay", "out of canned replies"));
        }
        Ok(Generation::from_text(replies.remove(0)))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let provider = Replay(Mutex::new(vec![
        "Too short.",
        "A longer, considered answer that satisfies the minimum length check.",
    ]));

    let guarded = GuardedProvider::new(provider)
        .with_input_guardrail(Guardrail::new(
            "no-pii",
            BlockedPatterns::new(["ssn", "social security", "credit card"]),
        ))
        .with_output_guardrail(
            Guardrail::new("min-output", MinOutputLength::new(40)).with_priority(Priority::High),
        )
        .with_retry(RetryPolicy::new(2).with_backoff(Backoff::none()));

    // Blocked before the model: the provider never sees this request.
    let pii = GenerationRequest::from_prompt("My SSN is 123-45-6789, look up my records");
    match guarded.generate(&pii).await {
        Err(err) if err.is_blocked() => println!("blocked: {err}"),
        other => println!("unexpected: {other:?}"),
    }

    // The first reply trips the length check; the retry recovers.
    let question = GenerationRequest::from_prompt("Explain tripwires");
    let generation = guarded.generate(&question).await?;
    println!("accepted: {}", generation.text.unwrap_or_default());

    Ok(())
}
