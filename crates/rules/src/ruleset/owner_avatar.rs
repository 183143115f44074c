use async_trait::async_trait;
use tracing::debug;

use tripwire_core::Guild;

use crate::context::RuleContext;
use crate::error::RuleError;
use crate::evaluator::{Evaluator, EvaluatorProperties, RuleType};

const DEFAULT_AVATAR_SCORE: u32 = 15;

/// Owners who never set an avatar. Needs a user lookup, so runs as its own task.
pub struct OwnerAvatarEvaluator;

#[async_trait]
impl Evaluator for OwnerAvatarEvaluator {
    async fn evaluate(&self, ctx: &RuleContext, guild: &Guild) -> Result<u32, RuleError> {
        let Some(owner) = ctx.fetch_user(guild.owner_id).await? else {
            debug!(guild_id = guild.id, owner_id = guild.owner_id, "Owner not found");
            return Ok(0);
        };

        Ok(if owner.has_default_avatar() {
            DEFAULT_AVATAR_SCORE
        } else {
            0
        })
    }

    fn properties(&self) -> EvaluatorProperties {
        EvaluatorProperties {
            rule_name: "Owner has default avatar",
            rule_type: RuleType::General,
            parallel: true,
        }
    }
}
