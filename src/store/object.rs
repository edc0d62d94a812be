//! Object store contract for rendered export artifacts

use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::{Result, ValuationError};

const MAX_PRESIGN_SECONDS: u64 = 7 * 24 * 3600;

/// Tenant-partitioned blob storage
pub trait ObjectStore: Send + Sync {
    /// Store bytes under `file_key`; returns the storage path
    fn save(&self, file_key: &str, bytes: &[u8], organization_id: &str) -> Result<String>;

    fn presigned_url(&self, file_key: &str, organization_id: &str, ttl_seconds: u64) -> Result<String>;

    /// A randomly unique key for a new object
    fn generate_file_key(&self, organization_id: &str, deal_id: &str, filename: &str, user_id: &str) -> String;
}

/// Object store backed by a map, keyed by (tenant, file key)
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
    base_url: String,
}

impl InMemoryObjectStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            base_url: base_url.into(),
        }
    }

    pub fn get(&self, file_key: &str, organization_id: &str) -> Result<Option<Vec<u8>>> {
        let objects = self
            .objects
            .lock()
            .map_err(|_| ValuationError::StorageError("object store mutex poisoned".to_string()))?;
        Ok(objects
            .get(&(organization_id.to_string(), file_key.to_string()))
            .cloned())
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn sanitize(filename: &str) -> String {
    filename
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect()
}

impl ObjectStore for InMemoryObjectStore {
    fn save(&self, file_key: &str, bytes: &[u8], organization_id: &str) -> Result<String> {
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| ValuationError::StorageError("object store mutex poisoned".to_string()))?;
        objects.insert((organization_id.to_string(), file_key.to_string()), bytes.to_vec());
        Ok(format!("{organization_id}/{file_key}"))
    }

    fn presigned_url(&self, file_key: &str, organization_id: &str, ttl_seconds: u64) -> Result<String> {
        if self.get(file_key, organization_id)?.is_none() {
            return Err(ValuationError::StorageError(format!("no object {file_key}")));
        }
        // Presigned URLs are capped at seven days
        let ttl = i64::try_from(ttl_seconds.min(MAX_PRESIGN_SECONDS)).unwrap_or(0);
        let expires = (Utc::now() + Duration::seconds(ttl)).timestamp();
        Ok(format!("{}/{organization_id}/{file_key}?expires={expires}", self.base_url))
    }

    fn generate_file_key(&self, organization_id: &str, deal_id: &str, filename: &str, user_id: &str) -> String {
        format!(
            "{}/deals/{}/{}/{}-{}",
            sanitize(organization_id),
            sanitize(deal_id),
            sanitize(user_id),
            Uuid::new_v4(),
            sanitize(filename)
        )
    }
}
