//! Object storage for generated images: bucket `images`, path prefix
//! `users/{user_id}/images/` (spec §6).

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::error::{PersistenceError, Result};

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` under `users/{user_id}/images/{uuid}.png` and return a
    /// public URL.
    async fn put_image(&self, user_id: &str, bytes: Vec<u8>) -> Result<String>;

    /// Fetch the bytes previously stored at `url`, for feeding scoped image
    /// attachments back into a multimodal synthesis call (spec §4.6). `None`
    /// if nothing is stored there (e.g. a caller-supplied external URL).
    async fn fetch_image(&self, url: &str) -> Result<Option<Vec<u8>>>;
}

/// Ephemeral in-process storage; the "URL" is a `mem://` locator so tests
/// can round-trip without a real bucket.
#[derive(Default)]
pub struct InMemoryObjectStorage {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, url: &str) -> Option<Vec<u8>> {
        self.objects.read().unwrap().get(url).cloned()
    }
}

#[async_trait]
impl ObjectStorage for InMemoryObjectStorage {
    async fn put_image(&self, user_id: &str, bytes: Vec<u8>) -> Result<String> {
        if user_id.is_empty() {
            return Err(PersistenceError::Storage("user_id must not be empty".into()).into());
        }
        let path = format!("users/{user_id}/images/{}.png", Uuid::new_v4());
        let url = format!("mem://images/{path}");
        self.objects.write().unwrap().insert(url.clone(), bytes);
        Ok(url)
    }

    async fn fetch_image(&self, url: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.get(url))
    }
}
