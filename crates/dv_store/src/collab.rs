//! External collaborator seams.
//!
//! Both collaborators live outside the trust-boundary core and are
//! specified here only as interfaces. The persistence layer guarantees the
//! interpreter sees decrypted plaintext (never envelopes) and that its
//! output is encrypted before it is persisted remotely.

use async_trait::async_trait;

use crate::models::SubscriptionTier;

/// Plaintext context handed to the AI interpreter alongside the dream text.
#[derive(Debug, Clone, Default)]
pub struct InterpretationContext {
    pub tags: Vec<String>,
    pub emotions: Vec<String>,
}

/// AI text generation — a pure request/response collaborator.
#[async_trait]
pub trait Interpreter: Send + Sync {
    async fn interpret(
        &self,
        content: &str,
        context: &InterpretationContext,
    ) -> anyhow::Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageAction {
    CreateEntry,
    Interpret,
}

/// Entitlement oracle — consulted by callers before facade writes, not
/// enforced inside the persistence layer itself.
pub trait EntitlementGate: Send + Sync {
    fn check_limit(&self, tier: SubscriptionTier, action: UsageAction, usage: u32) -> bool;
}
