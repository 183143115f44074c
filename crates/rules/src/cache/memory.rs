use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use lru::LruCache;

use tripwire_core::{Snowflake, User};

use super::UserCache;
use crate::error::CacheError;

/// Bounded in-process cache, least recently used entries evicted first.
pub struct MemoryUserCache {
    cache: Mutex<LruCache<Snowflake, User>>,
}

impl MemoryUserCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl UserCache for MemoryUserCache {
    async fn get_user(&self, user_id: Snowflake) -> Result<User, CacheError> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.get(&user_id).cloned().ok_or(CacheError::NotFound)
    }

    async fn store_user(&self, user: &User) -> Result<(), CacheError> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.put(user.id, user.clone());
        Ok(())
    }
}
