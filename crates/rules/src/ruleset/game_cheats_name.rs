use async_trait::async_trait;

use tripwire_core::Guild;

use super::highest_keyword_score;
use crate::context::RuleContext;
use crate::error::RuleError;
use crate::evaluator::{Evaluator, EvaluatorProperties, RuleType};

/// Weighted below the alert threshold: a cheats name only raises an alert
/// together with another signal.
const KEYWORDS: &[(&str, u32)] = &[
    ("aimbot", 20),
    ("cheats", 15),
    ("hacks", 15),
    ("spoofer", 20),
    ("injector", 20),
];

pub struct GameCheatsNameEvaluator;

#[async_trait]
impl Evaluator for GameCheatsNameEvaluator {
    async fn evaluate(&self, _ctx: &RuleContext, guild: &Guild) -> Result<u32, RuleError> {
        Ok(highest_keyword_score(&guild.name, KEYWORDS))
    }

    fn properties(&self) -> EvaluatorProperties {
        EvaluatorProperties {
            rule_name: "Guild name advertises cheats",
            rule_type: RuleType::GameCheats,
            parallel: false,
        }
    }
}
