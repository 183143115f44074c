use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use tripwire_core::config::CacheConfig;
use tripwire_core::{Snowflake, User};

use super::UserCache;
use crate::error::CacheError;

/// User cache backed by the `users` table: one JSONB document per user.
#[derive(Clone)]
pub struct PgUserCache {
    pool: PgPool,
}

impl PgUserCache {
    /// Connect and apply pending migrations.
    pub async fn connect(config: &CacheConfig) -> Result<Self, CacheError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout)
            .connect(&config.uri)
            .await?;
        info!(max_connections = config.max_connections, "User cache connected");

        sqlx::migrate!("../../migrations")
            .run(&pool)
            .await
            .map_err(sqlx::Error::from)?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

// BIGINT is signed; snowflakes fit in 63 bits until 2084.
fn to_key(user_id: Snowflake) -> i64 {
    user_id as i64
}

#[async_trait]
impl UserCache for PgUserCache {
    async fn get_user(&self, user_id: Snowflake) -> Result<User, CacheError> {
        let row = sqlx::query_as::<_, (String,)>("SELECT data::text FROM users WHERE user_id = $1")
            .bind(to_key(user_id))
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some((data,)) => Ok(serde_json::from_str(&data)?),
            None => Err(CacheError::NotFound),
        }
    }

    async fn store_user(&self, user: &User) -> Result<(), CacheError> {
        let data = serde_json::to_string(user)?;
        sqlx::query(
            "INSERT INTO users (user_id, data) VALUES ($1, $2::jsonb)
             ON CONFLICT (user_id) DO UPDATE SET data = EXCLUDED.data",
        )
        .bind(to_key(user.id))
        .bind(&data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_snowflakes_fit_the_key_column() {
        let id: Snowflake = 1_234_567_890_123_456_789;
        assert_eq!(to_key(id), 1_234_567_890_123_456_789_i64);
    }
}
