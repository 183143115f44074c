use async_trait::async_trait;

use tripwire_core::Guild;

use super::highest_keyword_score;
use crate::context::RuleContext;
use crate::error::RuleError;
use crate::evaluator::{Evaluator, EvaluatorProperties, RuleType};

const KEYWORDS: &[(&str, u32)] = &[("ticket", 50), ("support ticket", 70)];

/// Fake "support ticket" servers used to phish wallet credentials.
pub struct CryptoScamNameEvaluator;

#[async_trait]
impl Evaluator for CryptoScamNameEvaluator {
    async fn evaluate(&self, _ctx: &RuleContext, guild: &Guild) -> Result<u32, RuleError> {
        Ok(highest_keyword_score(&guild.name, KEYWORDS))
    }

    fn properties(&self) -> EvaluatorProperties {
        EvaluatorProperties {
            rule_name: "Guild name contains \"ticket\"",
            rule_type: RuleType::CryptoScam,
            parallel: false,
        }
    }
}
