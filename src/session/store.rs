use std::collections::HashMap;
use std::sync::RwLock;

use super::token::merge_segments;
use crate::core::{DriverError, Result};

/// Process-wide map of `(container, range id)` to the latest session token.
pub trait SessionTokenStore: Send + Sync {
    fn get(&self, container_id: &str, range_id: &str) -> Result<Option<String>>;

    /// Records `token`, merging it with whatever is already stored for the key.
    fn set(&self, container_id: &str, range_id: &str, token: &str) -> Result<()>;

    /// Forgets every token of a container, e.g. after it was deleted.
    fn clear(&self, container_id: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SessionKey {
    container_id: String,
    range_id: String,
}

/// A `SessionTokenStore` split into independently locked shards.
///
/// Keys hash to a fixed shard, so operations on unrelated ranges rarely
/// contend on the same lock.
#[derive(Debug)]
pub struct ShardedSessionTokenStore {
    shards: Vec<RwLock<HashMap<SessionKey, String>>>,
}

impl ShardedSessionTokenStore {
    pub fn new(shard_count: usize) -> Result<Self> {
        if shard_count == 0 {
            return Err(DriverError::Configuration(
                "session store needs at least one shard".to_string(),
            ));
        }
        Ok(Self {
            shards: (0..shard_count)
                .map(|_| RwLock::new(HashMap::new()))
                .collect(),
        })
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Every `(range id, token)` pair stored for a container, sorted by range id.
    pub fn tokens_for_container(&self, container_id: &str) -> Result<Vec<(String, String)>> {
        let mut tokens = Vec::new();
        for shard in &self.shards {
            let guard = shard.read()?;
            tokens.extend(
                guard
                    .iter()
                    .filter(|(key, _)| key.container_id == container_id)
                    .map(|(key, token)| (key.range_id.clone(), token.clone())),
            );
        }
        tokens.sort();
        Ok(tokens)
    }

    fn shard_for(&self, container_id: &str, range_id: &str) -> &RwLock<HashMap<SessionKey, String>> {
        let index = stable_shard_for(container_id, range_id, self.shards.len() as u32);
        &self.shards[index as usize]
    }
}

impl Default for ShardedSessionTokenStore {
    fn default() -> Self {
        Self {
            shards: (0..16).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }
}

impl SessionTokenStore for ShardedSessionTokenStore {
    fn get(&self, container_id: &str, range_id: &str) -> Result<Option<String>> {
        let key = SessionKey {
            container_id: container_id.to_string(),
            range_id: range_id.to_string(),
        };
        let guard = self.shard_for(container_id, range_id).read()?;
        Ok(guard.get(&key).cloned())
    }

    fn set(&self, container_id: &str, range_id: &str, token: &str) -> Result<()> {
        let key = SessionKey {
            container_id: container_id.to_string(),
            range_id: range_id.to_string(),
        };
        let mut guard = self.shard_for(container_id, range_id).write()?;
        let merged = match guard.get(&key) {
            Some(existing) => merge_segments(existing, token),
            None => token.to_string(),
        };
        log::trace!(
            "session token for {}/{} is now {}",
            container_id,
            range_id,
            merged
        );
        guard.insert(key, merged);
        Ok(())
    }

    fn clear(&self, container_id: &str) -> Result<()> {
        for shard in &self.shards {
            shard.write()?.retain(|key, _| key.container_id != container_id);
        }
        log::trace!("session tokens cleared for {}", container_id);
        Ok(())
    }
}

/// FNV-1a over the container and range id with a separator byte.
fn stable_shard_for(container_id: &str, range_id: &str, shard_count: u32) -> u32 {
    if shard_count == 0 {
        return 0;
    }
    let mut hash = 14695981039346656037u64;
    for byte in container_id.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(1099511628211);
    }
    hash ^= 0xff;
    hash = hash.wrapping_mul(1099511628211);
    for byte in range_id.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(1099511628211);
    }
    (hash % shard_count as u64) as u32
}
