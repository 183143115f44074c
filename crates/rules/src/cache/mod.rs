//! User cache backends.

mod memory;
mod postgres;

pub use memory::MemoryUserCache;
pub use postgres::PgUserCache;

use async_trait::async_trait;

use tripwire_core::{Snowflake, User};

use crate::error::CacheError;

/// Read/write store for resolved users.
#[async_trait]
pub trait UserCache: Send + Sync {
    /// Returns [`CacheError::NotFound`] on a miss.
    async fn get_user(&self, user_id: Snowflake) -> Result<User, CacheError>;

    /// Insert or replace.
    async fn store_user(&self, user: &User) -> Result<(), CacheError>;
}
