use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::entity::Guild;

/// Rule name → score that rule produced for one guild during one pass.
pub type ScoreMap = HashMap<String, u32>;

/// Emitted when a guild's aggregate score crosses the action threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MisconductAlert {
    pub guild: Guild,
    /// Clamped aggregate score.
    pub score: u32,
    pub rule_scores: ScoreMap,
}
