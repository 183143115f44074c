//! Scoring rules and the metadata they resolve.
//!
//! Each rule implements [`Evaluator`] and contributes a non-negative score for
//! a joined guild. Rules that need account data go through [`RuleContext`],
//! a read-through accessor over a [`UserCache`] and the Discord API.

pub mod cache;
pub mod context;
pub mod discord;
pub mod error;
pub mod evaluator;
pub mod ruleset;

pub use cache::{MemoryUserCache, PgUserCache, UserCache};
pub use context::{RuleContext, UserApi};
pub use discord::DiscordClient;
pub use error::{ApiError, CacheError, ContextError, RuleError};
pub use evaluator::{Evaluator, EvaluatorProperties, RuleType};
pub use ruleset::default_ruleset;
