use async_trait::async_trait;
use chrono::{Duration, Utc};

use tripwire_core::{snowflake_timestamp, Guild};

use crate::context::RuleContext;
use crate::error::RuleError;
use crate::evaluator::{Evaluator, EvaluatorProperties, RuleType};

/// Freshly registered owner accounts are a strong throwaway signal.
pub struct AccountAgeEvaluator;

fn score_for_age(age: Duration) -> u32 {
    if age < Duration::hours(24) {
        80
    } else if age < Duration::days(7) {
        50
    } else if age < Duration::days(30) {
        20
    } else {
        0
    }
}

#[async_trait]
impl Evaluator for AccountAgeEvaluator {
    async fn evaluate(&self, _ctx: &RuleContext, guild: &Guild) -> Result<u32, RuleError> {
        let age = Utc::now() - snowflake_timestamp(guild.owner_id);
        Ok(score_for_age(age))
    }

    fn properties(&self) -> EvaluatorProperties {
        EvaluatorProperties {
            rule_name: "Account age",
            rule_type: RuleType::General,
            parallel: false,
        }
    }
}
