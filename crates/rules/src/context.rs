//! Shared metadata accessor handed to every rule.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use tripwire_core::{Snowflake, User};

use crate::cache::UserCache;
use crate::error::{ApiError, CacheError, ContextError};

/// Remote source of user records.
#[async_trait]
pub trait UserApi: Send + Sync {
    async fn get_user(&self, user_id: Snowflake) -> Result<User, ApiError>;
}

/// Read-through accessor over the user cache and the remote API.
///
/// Cloning is cheap and every method takes `&self`; one instance is shared by
/// all workers and all parallel rules.
#[derive(Clone)]
pub struct RuleContext {
    cache: Arc<dyn UserCache>,
    api: Arc<dyn UserApi>,
}

impl RuleContext {
    pub fn new(cache: Arc<dyn UserCache>, api: Arc<dyn UserApi>) -> Self {
        Self { cache, api }
    }

    /// Look a user up, serving from cache when possible.
    ///
    /// - `Ok(Some(user))`: found in cache, or fetched and cached
    /// - `Ok(None)`: the API reports the user does not exist; nothing is cached
    /// - `Err(_)`: any other cache or API failure, including a failed cache write
    pub async fn fetch_user(&self, user_id: Snowflake) -> Result<Option<User>, ContextError> {
        match self.cache.get_user(user_id).await {
            Ok(user) => {
                debug!(user_id, "User cache hit");
                return Ok(Some(user));
            }
            Err(CacheError::NotFound) => {}
            Err(e) => return Err(ContextError::CacheRead(e)),
        }

        let fetched = match self.api.get_user(user_id).await {
            Ok(user) => user,
            Err(e) if e.is_not_found() => {
                debug!(user_id, "User does not exist");
                return Ok(None);
            }
            Err(e) => return Err(ContextError::Api(e)),
        };

        self.cache
            .store_user(&fetched)
            .await
            .map_err(ContextError::CacheWrite)?;

        Ok(Some(fetched))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crate::cache::MemoryUserCache;

    fn user(id: Snowflake) -> User {
        User {
            id,
            username: format!("user{id}"),
            discriminator: None,
            global_name: None,
            avatar: Some("a1b2c3".into()),
            bot: false,
        }
    }

    /// Serves users from a fixed list, 404 for anything else.
    #[derive(Default)]
    struct StubApi {
        users: Vec<User>,
        fail_with: Option<u16>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl UserApi for StubApi {
        async fn get_user(&self, user_id: Snowflake) -> Result<User, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(status) = self.fail_with {
                return Err(ApiError::Status {
                    status,
                    body: "boom".into(),
                });
            }
            self.users
                .iter()
                .find(|u| u.id == user_id)
                .cloned()
                .ok_or(ApiError::Status {
                    status: 404,
                    body: "Unknown User".into(),
                })
        }
    }

    /// A cache whose reads miss and whose writes always fail.
    #[derive(Default)]
    struct BrokenCache {
        reads_fail: bool,
        stored: Mutex<Vec<Snowflake>>,
    }

    #[async_trait]
    impl UserCache for BrokenCache {
        async fn get_user(&self, _user_id: Snowflake) -> Result<User, CacheError> {
            if self.reads_fail {
                Err(CacheError::Decode(
                    serde_json::from_str::<User>("{").unwrap_err(),
                ))
            } else {
                Err(CacheError::NotFound)
            }
        }

        async fn store_user(&self, user: &User) -> Result<(), CacheError> {
            self.stored.lock().unwrap().push(user.id);
            Err(CacheError::Decode(
                serde_json::from_str::<User>("[]").unwrap_err(),
            ))
        }
    }

    #[tokio::test]
    async fn cache_hit_skips_the_api() {
        let cache = Arc::new(MemoryUserCache::new(16));
        cache.store_user(&user(7)).await.unwrap();
        let api = Arc::new(StubApi::default());
        let ctx = RuleContext::new(cache, api.clone());

        let found = ctx.fetch_user(7).await.unwrap();

        assert_eq!(found, Some(user(7)));
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn miss_fetches_and_populates_cache() {
        let cache = Arc::new(MemoryUserCache::new(16));
        let api = Arc::new(StubApi {
            users: vec![user(8)],
            ..Default::default()
        });
        let ctx = RuleContext::new(cache.clone(), api.clone());

        assert_eq!(ctx.fetch_user(8).await.unwrap(), Some(user(8)));
        assert_eq!(cache.get_user(8).await.unwrap(), user(8));

        // Second lookup is served locally.
        assert_eq!(ctx.fetch_user(8).await.unwrap(), Some(user(8)));
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn remote_404_is_not_found_without_error() {
        let cache = Arc::new(MemoryUserCache::new(16));
        let api = Arc::new(StubApi::default());
        let ctx = RuleContext::new(cache.clone(), api);

        assert_eq!(ctx.fetch_user(9).await.unwrap(), None);
        assert!(matches!(cache.get_user(9).await, Err(CacheError::NotFound)));
    }

    #[tokio::test]
    async fn other_api_status_is_an_error() {
        let api = Arc::new(StubApi {
            fail_with: Some(500),
            ..Default::default()
        });
        let ctx = RuleContext::new(Arc::new(MemoryUserCache::new(16)), api);

        let err = ctx.fetch_user(10).await.unwrap_err();
        assert!(matches!(err, ContextError::Api(ApiError::Status { status: 500, .. })));
    }

    #[tokio::test]
    async fn cache_read_failure_is_an_error() {
        let cache = Arc::new(BrokenCache {
            reads_fail: true,
            ..Default::default()
        });
        let api = Arc::new(StubApi {
            users: vec![user(11)],
            ..Default::default()
        });
        let ctx = RuleContext::new(cache, api.clone());

        assert!(matches!(
            ctx.fetch_user(11).await,
            Err(ContextError::CacheRead(_))
        ));
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cache_write_failure_surfaces() {
        let cache = Arc::new(BrokenCache::default());
        let api = Arc::new(StubApi {
            users: vec![user(12)],
            ..Default::default()
        });
        let ctx = RuleContext::new(cache.clone(), api);

        assert!(matches!(
            ctx.fetch_user(12).await,
            Err(ContextError::CacheWrite(_))
        ));
        assert_eq!(cache.stored.lock().unwrap().as_slice(), &[12]);
    }
}
