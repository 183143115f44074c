//! Built-in rules.

mod account_age;
mod crypto_scam_name;
mod game_cheats_name;
mod owner_avatar;

use std::sync::Arc;

pub use account_age::AccountAgeEvaluator;
pub use crypto_scam_name::CryptoScamNameEvaluator;
pub use game_cheats_name::GameCheatsNameEvaluator;
pub use owner_avatar::OwnerAvatarEvaluator;

use crate::evaluator::Evaluator;

/// Every rule the detector runs, in registration order.
pub fn default_ruleset() -> Vec<Arc<dyn Evaluator>> {
    vec![
        Arc::new(CryptoScamNameEvaluator),
        Arc::new(AccountAgeEvaluator),
        Arc::new(GameCheatsNameEvaluator),
        Arc::new(OwnerAvatarEvaluator),
    ]
}

/// Highest score among keywords contained in `name`, case-insensitively.
fn highest_keyword_score(name: &str, keywords: &[(&str, u32)]) -> u32 {
    let lower = name.to_lowercase();
    keywords
        .iter()
        .filter(|(word, _)| lower.contains(word))
        .map(|(_, score)| *score)
        .max()
        .unwrap_or(0)
}
