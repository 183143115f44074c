//! The contract every scoring rule implements.

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use tripwire_core::Guild;

use crate::context::RuleContext;
use crate::error::RuleError;

/// Broad category a rule belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleType {
    General,
    CryptoScam,
    GameCheats,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::General => "GENERAL",
            RuleType::CryptoScam => "CRYPTO_SCAM",
            RuleType::GameCheats => "GAME_CHEATS",
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluatorProperties {
    /// Key under which the rule's score is recorded.
    pub rule_name: &'static str,
    pub rule_type: RuleType,
    /// Run as an independent task instead of inline on the worker.
    pub parallel: bool,
}

/// A scoring rule.
///
/// `evaluate` returns the rule's contribution to the aggregate score. The
/// dispatcher bounds every call by the pass deadline and reports expiry as
/// [`RuleError::Timeout`]; implementations only need to be cancel-safe.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, ctx: &RuleContext, guild: &Guild) -> Result<u32, RuleError>;

    /// Must return the same value on every call.
    fn properties(&self) -> EvaluatorProperties;
}
