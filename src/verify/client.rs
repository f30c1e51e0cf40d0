use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use super::parse;
use super::prompts;
use super::types::{ChunkVerdict, Claim, DocumentVerdict};
use crate::error::PipelineError;
use crate::llm::{LlmClient, Message};

/// Response budget for one verdict; batch calls scale it per claim.
const VERDICT_MAX_TOKENS: u32 = 600;

/// External natural-language verification service.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn ask(&self, system: &str, user: &str, max_tokens: u32) -> Result<String>;
}

#[async_trait]
impl Oracle for LlmClient {
    async fn ask(&self, system: &str, user: &str, max_tokens: u32) -> Result<String> {
        self.chat(&[Message::system(system), Message::user(user)], max_tokens)
            .await
    }
}

/// Bounded retry around the oracle with schema validation at the boundary.
pub struct VerifierClient {
    oracle: Arc<dyn Oracle>,
    max_attempts: u32,
    call_timeout: Duration,
    backoff: Duration,
}

impl VerifierClient {
    pub fn new(oracle: Arc<dyn Oracle>, max_attempts: u32, call_timeout: Duration) -> Self {
        Self {
            oracle,
            max_attempts: max_attempts.max(1),
            call_timeout,
            backoff: Duration::from_millis(500),
        }
    }

    /// Ask, validate, and retry on timeout, transport error or malformed output.
    async fn call<T>(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
        parse: impl Fn(&str) -> Result<T>,
    ) -> Result<T, PipelineError> {
        let mut attempt = 0u32;
        let mut delay = self.backoff;
        let mut last_error = String::new();

        while attempt < self.max_attempts {
            attempt += 1;
            let ask = self.oracle.ask(system, user, max_tokens);
            let outcome = tokio::time::timeout(self.call_timeout, ask).await;
            let reason = match outcome {
                Ok(Ok(raw)) => match parse(&raw) {
                    Ok(value) => return Ok(value),
                    Err(e) => format!("invalid response: {}", e),
                },
                Ok(Err(e)) => format!("oracle error: {}", e),
                Err(_) => format!("timed out after {:?}", self.call_timeout),
            };
            warn!(
                attempt,
                max_attempts = self.max_attempts,
                "verifier call failed: {}",
                reason
            );
            last_error = reason;

            if attempt < self.max_attempts {
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }

        Err(PipelineError::VerifierTransport {
            attempts: attempt,
            reason: last_error,
        })
    }

    /// Verify one claim against one excerpt. Exhausted retries degrade to `not_found`.
    pub async fn verify_one(&self, claim: &Claim, document: &str, excerpt: &str) -> ChunkVerdict {
        let user = prompts::single_user_prompt(claim, document, excerpt);
        let outcome = self
            .call(prompts::SINGLE_SYSTEM_PROMPT, &user, VERDICT_MAX_TOKENS, parse::parse_single)
            .await;
        match outcome {
            Ok(verdict) => {
                debug!(
                    claim = %claim.id,
                    document,
                    confidence = verdict.confidence,
                    "claim verified"
                );
                verdict
            }
            Err(e) => ChunkVerdict::not_found(e.to_string()),
        }
    }

    /// Verify several claims in one call. Always returns one verdict per
    /// claim, in order; exhausted retries degrade every claim to `not_found`.
    pub async fn verify_batch(
        &self,
        claims: &[&Claim],
        document: &str,
        excerpt: &str,
    ) -> Vec<ChunkVerdict> {
        if claims.is_empty() {
            return Vec::new();
        }
        let ids: Vec<String> = claims.iter().map(|c| c.id.clone()).collect();
        let user = prompts::batch_user_prompt(claims, document, excerpt);
        let max_tokens = VERDICT_MAX_TOKENS * claims.len() as u32;
        let outcome = self
            .call(prompts::BATCH_SYSTEM_PROMPT, &user, max_tokens, |raw| {
                parse::parse_batch(raw, &ids)
            })
            .await;
        match outcome {
            Ok(verdicts) => {
                debug!(claims = claims.len(), document, "batch verified");
                verdicts
            }
            Err(e) => {
                let reason = e.to_string();
                claims.iter().map(|_| ChunkVerdict::not_found(reason.clone())).collect()
            }
        }
    }

    /// Ask for a combined verdict across sources. Errors are left to the
    /// caller, which falls back to the best individual verdict.
    pub async fn synthesize(
        &self,
        parameter: &str,
        value: &str,
        findings: &[DocumentVerdict],
    ) -> Result<ChunkVerdict, PipelineError> {
        let user = prompts::synthesis_user_prompt(parameter, value, findings);
        let max_tokens = VERDICT_MAX_TOKENS * 2;
        self.call(prompts::SYNTHESIS_SYSTEM_PROMPT, &user, max_tokens, parse::parse_single)
            .await
    }
}
